//! Network probes for both camera families, and family A network settings.
//!
//! These run on the [IoWorker][crate::IoWorker]; use them through
//! [CameraHub][crate::CameraHub].
use crate::{
    config::DiscoveryConfig,
    descriptor::CameraDescriptor,
    protocol::{
        discovery::{NetworkReply, SearchReply, SetNetworkRequest, ENQUIRY, SEARCH_TOKEN},
        ViscaPacket,
    },
    transport::HexDump,
    Error, Result,
};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};
use tokio::{net::UdpSocket, time::timeout};

/// Binds a broadcast-capable socket.
fn broadcast_socket(port: u16) -> Result<UdpSocket> {
    let sock = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))?;
    sock.set_broadcast(true)?;
    sock.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(sock)?)
}

/// Receives datagrams until none arrives for `listen_timeout`, passing each to
/// `handle`.
async fn collect<T>(
    sock: &UdpSocket,
    listen_timeout: Duration,
    mut handle: impl FnMut(&[u8], SocketAddr) -> Option<T>,
) -> Vec<T> {
    let mut found = Vec::new();
    let mut b = [0; ViscaPacket::MAX_PACKET_LENGTH];
    loop {
        let (l, peer) = match timeout(listen_timeout, sock.recv_from(&mut b)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                debug!("discovery receive error: {e}");
                continue;
            }
            Ok(Ok(r)) => r,
        };
        trace!("{peer} >>> {}", HexDump(&b[..l]));
        if let Some(o) = handle(&b[..l], peer) {
            found.push(o);
        }
    }
    found
}

/// Sends [ENQUIRY] to `target` from `sock`, and collects family A replies.
async fn enquire(
    sock: &UdpSocket,
    target: SocketAddr,
    listen_timeout: Duration,
) -> Result<Vec<CameraDescriptor>> {
    info!("sending network enquiry to {target}");
    sock.send_to(ENQUIRY, target).await?;

    let mut macs = Vec::new();
    let cameras = collect(sock, listen_timeout, |raw, peer| {
        if raw == ENQUIRY {
            // Our own broadcast
            return None;
        }
        let Some(reply) = NetworkReply::parse(raw) else {
            debug!("{peer}: ignoring unrecognised enquiry reply");
            return None;
        };
        if macs.contains(&reply.mac) {
            return None;
        }
        macs.push(reply.mac.clone());

        let camera = CameraDescriptor::from_network_reply(&reply, peer.ip());
        info!("found camera {camera}");
        Some(camera)
    })
    .await;
    info!("network enquiry finished, {} cameras", cameras.len());
    Ok(cameras)
}

/// Broadcasts [ENQUIRY], and collects family A cameras which answer.
pub(crate) async fn probe_family_a(config: &DiscoveryConfig) -> Result<Vec<CameraDescriptor>> {
    let sock = broadcast_socket(config.port)?;
    let target = SocketAddrV4::new(config.broadcast_addr, config.port);
    enquire(&sock, target.into(), config.listen_timeout).await
}

/// Sends [SEARCH_TOKEN] to `target` from `sock`, and collects family B
/// replies.
async fn search(
    sock: &UdpSocket,
    target: SocketAddr,
    listen_timeout: Duration,
) -> Result<Vec<CameraDescriptor>> {
    info!("sending device search to {target}");
    sock.send_to(SEARCH_TOKEN, target).await?;

    let mut macs = Vec::new();
    let cameras = collect(sock, listen_timeout, |raw, peer| {
        let Some(reply) = SearchReply::parse(raw) else {
            debug!("{peer}: ignoring unrecognised search reply");
            return None;
        };
        if macs.contains(&reply.mac) {
            return None;
        }
        macs.push(reply.mac.clone());

        let camera = CameraDescriptor::from_search_reply(&reply);
        info!("found camera {camera}");
        Some(camera)
    })
    .await;
    info!("device search finished, {} cameras", cameras.len());
    Ok(cameras)
}

/// Joins the search multicast group, and collects family B cameras which
/// answer [SEARCH_TOKEN].
pub(crate) async fn probe_family_b(config: &DiscoveryConfig) -> Result<Vec<CameraDescriptor>> {
    let sock = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    sock.join_multicast_v4(config.multicast_addr.ip(), &Ipv4Addr::UNSPECIFIED)?;
    sock.set_nonblocking(true)?;
    let sock = UdpSocket::from_std(sock)?;
    search(&sock, config.multicast_addr.into(), config.listen_timeout).await
}

/// Sends `request` to `target`, and waits for its acknowledgement.
async fn request_network(
    sock: &UdpSocket,
    target: SocketAddr,
    request: &SetNetworkRequest,
    ack_timeout: Duration,
) -> Result {
    info!(
        "{}: setting address {}/{}, gateway {}, name {:?}",
        request.mac, request.ip, request.netmask, request.gateway, request.name
    );
    sock.send_to(&request.to_bytes(), target).await?;

    let mut b = [0; ViscaPacket::MAX_PACKET_LENGTH];
    let wait = async {
        loop {
            let (l, peer) = sock.recv_from(&mut b).await?;
            if request.is_ack(&b[..l]) {
                info!("{}: {peer} acknowledged network settings", request.mac);
                return Ok::<_, Error>(());
            }
            trace!("{peer}: ignoring {}", HexDump(&b[..l]));
        }
    };
    timeout(ack_timeout, wait).await.map_err(|_| {
        error!("{}: timeout waiting for network settings ack", request.mac);
        Error::Timeout
    })?
}

/// Broadcasts new network settings to a family A camera.
pub(crate) async fn set_network(config: &DiscoveryConfig, request: &SetNetworkRequest) -> Result {
    let sock = broadcast_socket(config.port)?;
    let target = SocketAddrV4::new(config.broadcast_addr, config.port);
    request_network(&sock, target.into(), request, config.set_network_timeout).await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::ProtocolVariant;
    use std::thread;

    /// Answers the first datagram it receives with each of `replies`.
    fn responder(replies: Vec<&'static [u8]>) -> (SocketAddr, thread::JoinHandle<Vec<u8>>) {
        let sock = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let addr = sock.local_addr().unwrap();
        let thread = thread::spawn(move || {
            let mut b = [0; 1024];
            let (l, peer) = sock.recv_from(&mut b).unwrap();
            for reply in replies {
                sock.send_to(reply, peer).unwrap();
            }
            b[..l].to_vec()
        });
        (addr, thread)
    }

    async fn local_socket() -> Result<UdpSocket> {
        Ok(UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?)
    }

    #[tokio::test]
    async fn family_a() -> Result<()> {
        let (addr, camera) = responder(vec![
            ENQUIRY,
            b"\x02MAC:AA-BB\xffNAME:CAM1\xff\x03".as_slice(),
            b"garbage".as_slice(),
            // Answered twice
            b"\x02MAC:AA-BB\xffNAME:CAM1\xff\x03".as_slice(),
        ]);
        let sock = local_socket().await?;

        let cameras = enquire(&sock, addr, Duration::from_millis(200)).await?;
        assert_eq!(ENQUIRY, camera.join().unwrap());
        assert_eq!(1, cameras.len());
        assert_eq!("AA-BB", cameras[0].mac);
        assert_eq!("CAM1", cameras[0].name);
        assert_eq!(addr.ip(), cameras[0].addr);
        assert_eq!(ProtocolVariant::Full, cameras[0].protocol);
        assert_eq!(52381, cameras[0].port);
        Ok(())
    }

    #[tokio::test]
    async fn family_b() -> Result<()> {
        let (addr, camera) = responder(vec![
            b"Client-ID=1\nDevice-ID=HD20X0012345\nIP=10.0.0.5 MAC=aa:bb:cc:dd:ee:ff".as_slice(),
            b"Client-ID=2\nDevice-ID=CAM2\nIP=10.0.0.6\nMAC=aa:bb:cc:dd:ee:00\n".as_slice(),
        ]);
        let sock = local_socket().await?;

        let cameras = search(&sock, addr, Duration::from_millis(200)).await?;
        assert_eq!(SEARCH_TOKEN, camera.join().unwrap());
        assert_eq!(2, cameras.len());
        assert_eq!("HD20X001", cameras[0].name);
        assert_eq!(ProtocolVariant::Simplified, cameras[0].protocol);
        assert_eq!(1259, cameras[0].port);
        assert_eq!(
            SocketAddr::from(([10, 0, 0, 6], 1259)),
            cameras[1].socket_addr()
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_cameras() -> Result<()> {
        let sock = local_socket().await?;
        let target = local_socket().await?.local_addr()?;
        assert!(enquire(&sock, target, Duration::from_millis(50))
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn set_network_ack() -> Result<()> {
        let request = SetNetworkRequest {
            mac: "AA-BB".to_string(),
            ip: Ipv4Addr::new(10, 0, 0, 9),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            name: "CAM9".to_string(),
        };

        let (addr, camera) = responder(vec![
            b"\x02ACK:CC-DD\xff\x03".as_slice(),
            b"\x02ACK:AA-BB\xff\x03".as_slice(),
        ]);
        let sock = local_socket().await?;
        request_network(&sock, addr, &request, Duration::from_millis(500)).await?;
        assert_eq!(request.to_bytes(), camera.join().unwrap());

        let (addr, camera) = responder(vec![b"\x02NAK:AA-BB\xff\x03".as_slice()]);
        let sock = local_socket().await?;
        assert!(matches!(
            request_network(&sock, addr, &request, Duration::from_millis(100)).await,
            Err(Error::Timeout)
        ));
        camera.join().unwrap();
        Ok(())
    }
}
