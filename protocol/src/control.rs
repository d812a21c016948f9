//! Control channel framing
//!
//! Pre-probe: a 4-byte big-endian length followed by the JSON config object.
//! Post-probe: the ASCII verdict followed by a single NUL byte.

use crate::config::ProbeConfig;
use crate::constants::{MAX_CONFIG_FRAME, VERDICT_BUFFER_SIZE};
use crate::decision::Verdict;
use crate::error::ProbeError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length-prefixed JSON frame for `config`.
pub fn encode_config(config: &ProbeConfig) -> Result<Vec<u8>, ProbeError> {
    let body = serde_json::to_vec(config)
        .map_err(|e| ProbeError::ConfigMalformed(format!("cannot serialize config: {}", e)))?;
    if body.len() > MAX_CONFIG_FRAME {
        return Err(ProbeError::ConfigMalformed(format!(
            "config frame of {} bytes exceeds {}",
            body.len(),
            MAX_CONFIG_FRAME
        )));
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Parse a frame body (without the length prefix) and validate it.
pub fn decode_config(body: &[u8]) -> Result<ProbeConfig, ProbeError> {
    let config: ProbeConfig = serde_json::from_slice(body)
        .map_err(|e| ProbeError::ConfigMalformed(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

pub async fn write_config<W>(writer: &mut W, config: &ProbeConfig) -> Result<(), ProbeError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_config(config)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| ProbeError::send("config frame", e))?;
    writer
        .flush()
        .await
        .map_err(|e| ProbeError::send("config frame", e))
}

pub async fn read_config<R>(reader: &mut R) -> Result<ProbeConfig, ProbeError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(|e| ProbeError::ConfigMalformed(format!("truncated frame length: {}", e)))?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_CONFIG_FRAME {
        return Err(ProbeError::ConfigMalformed(format!(
            "config frame of {} bytes exceeds {}",
            len, MAX_CONFIG_FRAME
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| ProbeError::ConfigMalformed(format!("truncated frame body: {}", e)))?;

    decode_config(&body)
}

pub fn encode_verdict(verdict: Verdict) -> Vec<u8> {
    let mut bytes = verdict.as_str().as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Parse a verdict message, ignoring everything from the first NUL on.
pub fn decode_verdict(bytes: &[u8]) -> Result<Verdict, ProbeError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| ProbeError::InvalidVerdict(String::from_utf8_lossy(&bytes[..end]).into()))?;
    text.parse()
}

pub async fn write_verdict<W>(writer: &mut W, verdict: Verdict) -> Result<(), ProbeError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&encode_verdict(verdict))
        .await
        .map_err(|e| ProbeError::send("verdict", e))?;
    writer
        .flush()
        .await
        .map_err(|e| ProbeError::send("verdict", e))
}

/// Read until the terminating NUL, EOF, or the buffer limit.
pub async fn read_verdict<R>(reader: &mut R) -> Result<Verdict, ProbeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; VERDICT_BUFFER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(ProbeError::Receive)?;
        if n == 0 {
            break;
        }
        filled += n;
        if buf[..filled].contains(&0) {
            break;
        }
    }
    decode_verdict(&buf[..filled])
}
