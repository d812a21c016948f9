//! UDP side of burst transport

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::train::PacketTrain;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Inter-packet spacing within a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    #[default]
    BackToBack,
    Interval(Duration),
}

impl Pacing {
    pub fn from_micros(us: u64) -> Self {
        if us == 0 {
            Self::BackToBack
        } else {
            Self::Interval(Duration::from_micros(us))
        }
    }
}

/// UDP socket for sending probe trains: bound to `src_port_udp`, TTL
/// `udp_ttl`, Don't Fragment set where the platform allows it.
pub fn probe_socket(config: &ProbeConfig, bind_ip: IpAddr) -> Result<UdpSocket, ProbeError> {
    let bind_addr = SocketAddr::new(bind_ip, config.src_port_udp);
    let context = format!("UDP probe socket {}", bind_addr);

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .set_ttl(config.udp_ttl as u32)
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    set_dont_fragment(&socket).map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .bind(&bind_addr.into())
        .map_err(|e| ProbeError::socket_setup(&context, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ProbeError::socket_setup(&context, e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| ProbeError::socket_setup(&context, e))
}

#[cfg(target_os = "linux")]
fn set_dont_fragment(socket: &Socket) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let value: libc::c_int = libc::IP_PMTUDISC_DO;
    // SAFETY: valid fd owned by `socket`; option value is a c_int of the given size.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_MTU_DISCOVER,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_dont_fragment(_socket: &Socket) -> std::io::Result<()> {
    Ok(())
}

/// Send every packet of `train` to `dest` in index order.
///
/// Any send error aborts the burst; nothing is retried.
pub async fn send_train(
    socket: &UdpSocket,
    train: &mut PacketTrain,
    dest: SocketAddr,
    pacing: Pacing,
) -> Result<u32, ProbeError> {
    let entropy = train.entropy();
    for index in 0..train.len() {
        if index > 0 {
            if let Pacing::Interval(gap) = pacing {
                tokio::time::sleep(gap).await;
            }
        }
        let payload = train.packet(index);
        socket.send_to(payload, dest).await.map_err(|e| {
            ProbeError::send(format!("{} packet {} to {}", entropy, index, dest), e)
        })?;
    }
    debug!("Sent {} {} packets to {}", train.len(), entropy, dest);
    Ok(train.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::{Entropy, RngEntropy, sequence_of};
    use std::net::Ipv4Addr;
    use std::time::Instant;

    #[tokio::test]
    async fn test_send_train_in_order() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        let mut train = PacketTrain::high(48, 10, &mut RngEntropy).unwrap();
        let sent = send_train(&sender, &mut train, dest, Pacing::BackToBack)
            .await
            .unwrap();
        assert_eq!(sent, 10);

        let mut buf = [0u8; 64];
        for i in 0..10u16 {
            let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, 48);
            assert_eq!(sequence_of(&buf[..n]), Some(i));
            assert_eq!(Entropy::classify(&buf[..n]), Some(Entropy::High));
        }
    }

    #[tokio::test]
    async fn test_paced_train_takes_longer() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        let mut train = PacketTrain::low(16, 5).unwrap();
        let started = Instant::now();
        send_train(&sender, &mut train, dest, Pacing::from_micros(10_000))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_probe_socket_binds_configured_port() {
        let mut config = crate::config::tests::sample_config();
        let free = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        config.src_port_udp = free.local_addr().unwrap().port();
        config.udp_ttl = 17;
        drop(free);

        let socket = probe_socket(&config, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert_eq!(socket.local_addr().unwrap().port(), config.src_port_udp);
        assert_eq!(socket.ttl().unwrap(), 17);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_probe_socket_sets_dont_fragment() {
        use std::os::fd::AsRawFd;

        let mut config = crate::config::tests::sample_config();
        config.src_port_udp = 0;
        let socket = probe_socket(&config, IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();

        let mut value: libc::c_int = -1;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                socket.as_raw_fd(),
                libc::IPPROTO_IP,
                libc::IP_MTU_DISCOVER,
                &mut value as *mut libc::c_int as *mut libc::c_void,
                &mut len,
            )
        };
        assert_eq!(ret, 0);
        assert_eq!(value, libc::IP_PMTUDISC_DO);
    }

    #[test]
    fn test_pacing_from_micros() {
        assert_eq!(Pacing::from_micros(0), Pacing::BackToBack);
        assert_eq!(
            Pacing::from_micros(250),
            Pacing::Interval(Duration::from_micros(250))
        );
    }
}
