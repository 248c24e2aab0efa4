//! UDP transport for camera sessions.
//!
//! Cameras send their replies to a well-known port (52381), so every session
//! shares one [LocalEndpoint] listening there. It sorts incoming datagrams
//! into a mailbox per camera IP address, so a session only ever reads its own
//! camera's replies.
//!
//! Each session sends through its own [RemoteEndpoint], connected to its
//! camera.
//!
//! The [ReceiverPool] hands out the shared [LocalEndpoint] as reference
//! counted [ReceiverLease]s, and closes it when the last lease is dropped.
//!
//! All of these must be used from within the [IoWorker][crate::IoWorker]'s
//! runtime.
use crate::{protocol::ViscaPacket, Error, Result};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    ops::Deref,
    sync::{Arc, Mutex},
};
use tokio::{net::UdpSocket, sync::Notify, task::JoinHandle};

/// Datagrams queued for one camera.
#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: std::sync::atomic::AtomicBool,
}

impl Mailbox {
    /// Maximum number of unread datagrams kept per camera.
    const DEPTH: usize = 64;

    fn push(&self, ip: IpAddr, datagram: Vec<u8>) {
        if let Ok(mut q) = self.queue.lock() {
            if q.len() >= Self::DEPTH {
                warn!("{ip}: receive queue full, dropping oldest datagram");
                q.pop_front();
            }
            q.push_back(datagram);
        }
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().ok()?.pop_front()
    }

    fn clear(&self) -> usize {
        self.queue.lock().map_or(0, |mut q| q.drain(..).count())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        loop {
            // Register interest before checking, so a push in between isn't
            // missed.
            let notified = self.notify.notified();
            if let Some(d) = self.pop() {
                return Ok(d);
            }
            if self.is_closed() {
                return Err(Error::EndpointClosed);
            }
            notified.await;
        }
    }
}

type Mailboxes = Arc<Mutex<HashMap<IpAddr, Arc<Mailbox>>>>;

/// Shared receiver, demultiplexing datagrams by source IP address.
pub struct LocalEndpoint {
    local_addr: SocketAddr,
    mailboxes: Mailboxes,
    recv_task: JoinHandle<()>,
}

impl LocalEndpoint {
    /// Binds to `addr`, and starts receiving.
    pub fn open(addr: SocketAddr) -> Result<Self> {
        let sock = std::net::UdpSocket::bind(addr)?;
        sock.set_nonblocking(true)?;
        let sock = UdpSocket::from_std(sock)?;
        let local_addr = sock.local_addr()?;
        info!("listening for camera replies on {local_addr}");

        let mailboxes: Mailboxes = Default::default();
        let recv_task = tokio::task::spawn(Self::run(sock, mailboxes.clone()));

        Ok(Self {
            local_addr,
            mailboxes,
            recv_task,
        })
    }

    async fn run(sock: UdpSocket, mailboxes: Mailboxes) {
        let mut b = [0u8; ViscaPacket::MAX_PACKET_LENGTH];
        loop {
            let (l, peer) = match sock.recv_from(&mut b).await {
                Ok(r) => r,
                Err(e) => {
                    // ICMP errors from earlier sends surface here.
                    debug!("receive error: {e}");
                    continue;
                }
            };

            let ip = peer.ip();
            let mailbox = mailboxes.lock().ok().and_then(|m| m.get(&ip).cloned());
            match mailbox {
                Some(mailbox) => {
                    trace!("{peer} >>> {}", HexDump(&b[..l]));
                    mailbox.push(ip, b[..l].to_vec());
                }
                None => trace!("{peer}: ignoring datagram from unregistered address"),
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts collecting datagrams from `ip`.
    pub fn register(&self, ip: IpAddr) {
        if let Ok(mut m) = self.mailboxes.lock() {
            m.entry(ip).or_default();
        }
    }

    /// Stops collecting datagrams from `ip`, waking any pending
    /// [receive][Self::receive] with [Error::EndpointClosed].
    pub fn unregister(&self, ip: IpAddr) {
        let mailbox = self.mailboxes.lock().ok().and_then(|mut m| m.remove(&ip));
        if let Some(mailbox) = mailbox {
            mailbox.close();
        }
    }

    fn mailbox(&self, ip: IpAddr) -> Option<Arc<Mailbox>> {
        self.mailboxes.lock().ok()?.get(&ip).cloned()
    }

    /// Waits for the next datagram from `ip`.
    ///
    /// Returns [Error::EndpointClosed] if the endpoint is closed, or `ip` is
    /// not registered.
    pub async fn receive(&self, ip: IpAddr) -> Result<Vec<u8>> {
        self.mailbox(ip).ok_or(Error::EndpointClosed)?.recv().await
    }

    /// Drops any datagrams from `ip` which have not been read yet, returning
    /// how many were dropped.
    pub fn discard_pending(&self, ip: IpAddr) -> usize {
        self.mailbox(ip).map_or(0, |m| m.clear())
    }

    /// Stops receiving, and wakes all pending receivers with
    /// [Error::EndpointClosed].
    pub fn close(&self) {
        self.recv_task.abort();
        let mailboxes: Vec<_> = self
            .mailboxes
            .lock()
            .map(|mut m| m.drain().map(|(_, v)| v).collect())
            .unwrap_or_default();
        for mailbox in mailboxes {
            mailbox.close();
        }
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Send-only handle connected to one camera.
pub struct RemoteEndpoint {
    sock: UdpSocket,
    peer: SocketAddr,
}

impl RemoteEndpoint {
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let bind: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let sock = UdpSocket::bind(bind).await?;
        sock.connect(peer).await?;
        debug!("opened send socket to {peer}");
        Ok(Self { sock, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&self, datagram: &[u8]) -> Result {
        trace!("{} <<< {}", self.peer, HexDump(datagram));
        self.sock.send(datagram).await?;
        Ok(())
    }
}

#[derive(Default)]
struct PoolState {
    endpoint: Option<Arc<LocalEndpoint>>,
    leases: usize,
}

/// Owner of the shared [LocalEndpoint].
///
/// The endpoint is opened by the first [acquire][Self::acquire], and closed
/// when the last [ReceiverLease] is dropped.
pub struct ReceiverPool {
    addr: SocketAddr,
    state: Mutex<PoolState>,
}

impl ReceiverPool {
    pub fn new(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            addr,
            state: Mutex::default(),
        })
    }

    /// Gets a lease on the shared endpoint, opening it if needed.
    pub fn acquire(self: &Arc<Self>) -> Result<ReceiverLease> {
        let mut state = self.state.lock().map_err(|_| Error::Internal)?;
        let endpoint = match &state.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let endpoint = Arc::new(LocalEndpoint::open(self.addr)?);
                state.endpoint = Some(endpoint.clone());
                endpoint
            }
        };
        state.leases += 1;
        trace!("receiver leases: {}", state.leases);

        Ok(ReceiverLease {
            pool: self.clone(),
            endpoint,
        })
    }

    /// Number of live leases.
    pub fn leases(&self) -> usize {
        self.state.lock().map_or(0, |s| s.leases)
    }

    /// Address of the open endpoint, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.state.lock().ok()?;
        state.endpoint.as_ref().map(|e| e.local_addr())
    }

    fn release(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.leases = state.leases.saturating_sub(1);
        trace!("receiver leases: {}", state.leases);
        if state.leases == 0 {
            if let Some(endpoint) = state.endpoint.take() {
                info!("last session closed, closing receiver on {}", endpoint.local_addr());
                endpoint.close();
            }
        }
    }
}

/// A reference to the shared [LocalEndpoint].
pub struct ReceiverLease {
    pool: Arc<ReceiverPool>,
    endpoint: Arc<LocalEndpoint>,
}

impl Deref for ReceiverLease {
    type Target = LocalEndpoint;

    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for ReceiverLease {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Formats bytes as hex for trace logs.
pub(crate) struct HexDump<'a>(pub &'a [u8]);

impl std::fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
