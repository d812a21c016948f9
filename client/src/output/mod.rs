//! Console output

use chrono::{DateTime, Local};
use protocol::Verdict;
use std::net::SocketAddr;

/// One line reporting the server's verdict.
pub fn format_verdict(at: DateTime<Local>, server: SocketAddr, verdict: Verdict) -> String {
    format!("[{}] {} -> {}", at.format("%Y-%m-%d %H:%M:%S"), server, verdict)
}

pub fn print_verdict(server: SocketAddr, verdict: Verdict) {
    println!("{}", format_verdict(Local::now(), server, verdict));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_verdict() {
        let at = Local.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let server: SocketAddr = "192.0.2.10:6666".parse().unwrap();
        assert_eq!(
            format_verdict(at, server, Verdict::NoCompressionDetected),
            "[2024-03-01 12:30:05] 192.0.2.10:6666 -> No compression detected"
        );
    }
}
