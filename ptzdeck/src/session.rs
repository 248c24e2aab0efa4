use crate::{
    config::HubConfig,
    descriptor::CameraDescriptor,
    protocol::{
        frame, inquiry::InquiryBlock, CameraCommand, Inquiry, PanTiltPosition, ProtocolVariant,
        Reply, ReplyKind, ViscaPacket,
    },
    queue::{Command, CommandOutcome, CommandQueue, QueueMode},
    state::{CameraState, PropertyUpdate},
    transport::{ReceiverLease, ReceiverPool, RemoteEndpoint},
    worker::IoWorker,
    Error, Result,
};
use concread::cowcell::asynch::{CowCell, CowCellReadTxn};
use futures::{pin_mut, StreamExt};
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle, time::interval};
use tokio_stream::wrappers::IntervalStream;

/// Lifecycle of a [CameraSession].
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum SessionState {
    #[default]
    Uninitialised,
    Initialising,
    /// Ready, and the camera has answered.
    Connected,
    /// Ready for sending, but the camera hasn't answered the handshake or a
    /// command yet.
    Degraded,
    Closing,
    Closed,
}

impl SessionState {
    /// Commands can be queued in this state.
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Connected | Self::Degraded)
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

pub type StateEvent = (CowCellReadTxn<CameraState>, PropertyUpdate);

/// Sockets owned by an open session.
struct SessionLink {
    lease: ReceiverLease,
    remote: RemoteEndpoint,
}

/// Session state shared between the caller-facing [CameraSession] and tasks
/// on the [IoWorker].
///
/// This must never hold the [IoWorker], so that the last reference to it is
/// always dropped off the worker thread.
struct SessionInner {
    descriptor: CameraDescriptor,
    config: HubConfig,
    pool: Arc<ReceiverPool>,
    /// Sequence number for the next command sent.
    sequence: AtomicU32,
    status: Mutex<SessionState>,
    queue: CommandQueue,
    /// Held for a whole round trip, so replies can't be interleaved.
    link: tokio::sync::Mutex<Option<SessionLink>>,
    worker_task: Mutex<Option<JoinHandle<()>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    state: CowCell<CameraState>,
    state_tx: broadcast::Sender<StateEvent>,
}

impl SessionInner {
    fn status(&self) -> SessionState {
        self.status.lock().map_or(SessionState::Closed, |s| *s)
    }

    fn set_status(&self, new: SessionState) {
        if let Ok(mut status) = self.status.lock() {
            if *status != new {
                debug!("{}: {} -> {new}", self.descriptor, *status);
                *status = new;
            }
        }
    }

    /// Opens the session's sockets, then resets the camera's sequence number
    /// (full protocol only).
    async fn open(&self) -> Result {
        let lease = self.pool.acquire()?;
        lease.register(self.descriptor.addr);
        let remote = match RemoteEndpoint::connect(self.descriptor.socket_addr()).await {
            Ok(remote) => remote,
            Err(e) => {
                lease.unregister(self.descriptor.addr);
                return Err(e);
            }
        };
        info!("{}: opened session to {}", self.descriptor, remote.peer());
        *self.link.lock().await = Some(SessionLink { lease, remote });
        self.sequence.store(1, Ordering::SeqCst);

        match self.descriptor.protocol {
            ProtocolVariant::Full => self.handshake().await?,
            // Nothing to wait for.
            ProtocolVariant::Simplified => self.set_connected(true).await,
        }
        Ok(())
    }

    /// Resets the sequence number to `1`, on both ends.
    async fn handshake(&self) -> Result {
        let guard = self.link.lock().await;
        let link = guard.as_ref().ok_or(Error::Disconnected)?;
        self.sequence.store(1, Ordering::SeqCst);

        link.lease.discard_pending(self.descriptor.addr);
        link.remote
            .send(&ViscaPacket::reset_sequence().to_bytes()?)
            .await?;

        match self.wait_reply(link).await {
            Ok(reply) => {
                if reply.kind == ReplyKind::SequenceReset {
                    debug!("{}: sequence number reset", self.descriptor);
                } else {
                    warn!("{}: unexpected handshake reply: {}", self.descriptor, reply.kind);
                }
                self.set_connected(true).await;
                Ok(())
            }
            Err(Error::Timeout) => {
                error!("{}: timeout waiting for sequence number reset", self.descriptor);
                Err(Error::HandshakeTimeout)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_reply(&self, link: &SessionLink) -> Result<Reply> {
        let raw = tokio::time::timeout(
            self.config.reply_timeout,
            link.lease.receive(self.descriptor.addr),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        Ok(Reply::new(raw))
    }

    fn log_reply(&self, reply: &Reply) {
        match reply.kind {
            ReplyKind::Error { .. } | ReplyKind::Nak => {
                error!("{}: command failed: {}", self.descriptor, reply.kind);
            }
            ReplyKind::Unknown => {
                warn!("{}: unrecognised reply", self.descriptor);
            }
            _ => debug!("{}: {}", self.descriptor, reply.kind),
        }
    }

    /// Frames and sends `payload`, then collects its replies.
    ///
    /// The sequence number advances on every call, whatever the outcome.
    async fn round_trip(&self, payload: &[u8], skip_completion: bool) -> CommandOutcome {
        let guard = self.link.lock().await;
        let Some(link) = guard.as_ref() else {
            return CommandOutcome::Failed(Error::Disconnected.to_string());
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let datagram = match frame(self.descriptor.protocol, sequence, payload) {
            Ok(d) => d,
            Err(e) => return CommandOutcome::Failed(e.to_string()),
        };

        // A late reply to an earlier, timed-out command would otherwise be
        // read as this command's acknowledgement.
        let stale = link.lease.discard_pending(self.descriptor.addr);
        if stale > 0 {
            debug!("{}: discarded {stale} stale replies", self.descriptor);
        }

        trace!("{}: sending #{sequence}", self.descriptor);
        if let Err(e) = link.remote.send(&datagram).await {
            error!("{}: send failed: {e}", self.descriptor);
            return CommandOutcome::Failed(e.to_string());
        }

        if self.descriptor.protocol == ProtocolVariant::Simplified {
            // These cameras don't reply.
            return CommandOutcome::Sent;
        }

        let mut reply = None;
        let waits = if skip_completion { 1 } else { 2 };
        for _ in 0..waits {
            match self.wait_reply(link).await {
                Ok(r) => {
                    self.log_reply(&r);
                    let acked = matches!(r.kind, ReplyKind::Acknowledge { .. });
                    reply = Some(r);
                    if !acked {
                        // Completion, or an error which ends the command.
                        break;
                    }
                }
                Err(Error::Timeout) => {
                    error!("{}: timeout waiting for reply to #{sequence}", self.descriptor);
                    return CommandOutcome::TimedOut;
                }
                Err(e) => return CommandOutcome::Failed(e.to_string()),
            }
        }

        match reply {
            Some(r) => CommandOutcome::Replied(r),
            None => CommandOutcome::TimedOut,
        }
    }

    /// Runs a round trip, and tracks whether the camera is answering.
    async fn execute(&self, payload: &[u8], skip_completion: bool) -> CommandOutcome {
        let outcome = self.round_trip(payload, skip_completion).await;
        match &outcome {
            CommandOutcome::Replied(r) if r.kind.is_success() => {
                if self.status() == SessionState::Degraded {
                    info!("{}: camera is answering again", self.descriptor);
                    self.set_status(SessionState::Connected);
                }
                self.set_connected(true).await;
            }
            CommandOutcome::TimedOut => self.set_connected(false).await,
            _ => (),
        }
        outcome
    }

    /// Drains the command queue until it is shut down.
    async fn run_queue(self: Arc<Self>) {
        info!("{}: starting queue worker", self.descriptor);
        while let Some(cmd) = self.queue.next().await {
            let outcome = self.execute(cmd.payload(), cmd.skip_completion()).await;
            cmd.set_result(outcome);
            tokio::time::sleep(self.config.command_interval).await;
        }
        info!("{}: queue worker exited", self.descriptor);
    }

    /// Starts the queue worker, unless one is already running.
    fn ensure_worker(self: &Arc<Self>) {
        let Ok(mut task) = self.worker_task.lock() else {
            return;
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(tokio::task::spawn(self.clone().run_queue()));
    }

    async fn inquire(&self, inquiry: Inquiry) -> Option<Vec<u8>> {
        match self.execute(&inquiry.to_bytes(), true).await {
            CommandOutcome::Replied(Reply {
                kind: ReplyKind::Completion { .. },
                raw,
            }) => Some(raw),
            CommandOutcome::Replied(r) => {
                warn!("{}: {inquiry:?} inquiry got {}", self.descriptor, r.kind);
                None
            }
            _ => None,
        }
    }

    /// Applies `update` to the camera state, and broadcasts whatever it
    /// reports as changed.
    async fn publish(
        &self,
        update: impl FnOnce(&mut CameraState) -> PropertyUpdate,
    ) -> PropertyUpdate {
        let mut w = self.state.write().await;
        let updated = update(&mut *w);
        if !updated.is_empty() {
            w.commit().await;
            // It doesn't matter whether anyone is listening
            let _ = self.state_tx.send((self.state.read().await, updated));
        }
        updated
    }

    async fn set_connected(&self, connected: bool) {
        self.publish(|s| s.set_connected(connected)).await;
    }

    /// Inquires every block and the pan-tilt position, and publishes what
    /// changed.
    async fn refresh(&self) -> PropertyUpdate {
        if self.descriptor.protocol == ProtocolVariant::Simplified {
            // No replies to decode.
            return PropertyUpdate::empty();
        }

        let mut replies = Vec::with_capacity(InquiryBlock::ALL.len());
        for block in InquiryBlock::ALL {
            replies.push((block, self.inquire(Inquiry::Block(block)).await));
        }
        let pan_tilt = self.inquire(Inquiry::PanTiltPosition).await;

        self.publish(|s| {
            s.update_blocks(replies.iter().map(|(b, r)| (*b, r.as_deref())))
                | s.update_pan_tilt(pan_tilt.as_deref())
        })
        .await
    }

    async fn run_monitor(self: Arc<Self>, period: Duration) {
        let ticks = IntervalStream::new(interval(period));
        pin_mut!(ticks);
        while ticks.next().await.is_some() {
            let updated = self.refresh().await;
            trace!("{}: monitor refreshed {updated:?}", self.descriptor);
        }
    }

    fn stop_monitor(&self) {
        if let Some(task) = self.monitor_task.lock().ok().and_then(|mut t| t.take()) {
            task.abort();
        }
    }

    /// Stops the queue worker and monitor, and releases the sockets.
    async fn shutdown(&self) {
        self.stop_monitor();
        let discarded = self.queue.trigger_shutdown();
        if !discarded.is_empty() {
            debug!("{}: cancelled {} queued commands", self.descriptor, discarded.len());
        }

        let task = self.worker_task.lock().ok().and_then(|mut t| t.take());
        if let Some(mut task) = task {
            debug!("{}: waiting for queue worker to exit...", self.descriptor);
            if tokio::time::timeout(self.config.shutdown_timeout, &mut task)
                .await
                .is_err()
            {
                warn!("{}: queue worker didn't stop in time, aborting", self.descriptor);
                task.abort();
            }
        }

        if let Some(link) = self.link.lock().await.take() {
            link.lease.unregister(self.descriptor.addr);
            info!("{}: closed session", self.descriptor);
        }
        self.set_connected(false).await;
    }
}

/// One camera's protocol and connection state.
///
/// All network I/O happens on the [IoWorker]; the methods here block the
/// calling thread until the worker has done the requested part of the work.
/// They must not be called from inside an async runtime.
///
/// Commands go through a single queue per session, drained by one worker
/// task. [CameraSession::send_command] and [CameraSession::inquire] bypass
/// the queue, but never interleave with a queued command on the wire.
pub struct CameraSession {
    io: Arc<IoWorker>,
    inner: Arc<SessionInner>,
}

impl CameraSession {
    /// Depth of the state update channel.
    const EVENT_CHANNEL_SIZE: usize = 16;

    pub(crate) fn new(
        io: Arc<IoWorker>,
        pool: Arc<ReceiverPool>,
        descriptor: CameraDescriptor,
        config: HubConfig,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(Self::EVENT_CHANNEL_SIZE);
        Self {
            io,
            inner: Arc::new(SessionInner {
                descriptor,
                config,
                pool,
                sequence: AtomicU32::new(1),
                status: Mutex::new(SessionState::Uninitialised),
                queue: CommandQueue::new(),
                link: tokio::sync::Mutex::new(None),
                worker_task: Mutex::new(None),
                monitor_task: Mutex::new(None),
                state: CowCell::new(CameraState::default()),
                state_tx,
            }),
        }
    }

    pub fn descriptor(&self) -> &CameraDescriptor {
        &self.inner.descriptor
    }

    pub fn state(&self) -> SessionState {
        self.inner.status()
    }

    /// `true` once the camera has answered the handshake or a command.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Sequence number the next command will be sent with.
    pub fn sequence_number(&self) -> u32 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// Number of queued commands which haven't started.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Opens the session's sockets and, for the full protocol, resets the
    /// camera's sequence number.
    ///
    /// If the camera doesn't answer the reset, the session is left
    /// [Degraded][SessionState::Degraded] and this returns
    /// [Error::HandshakeTimeout]; commands can still be sent.
    pub fn initialise(&self) -> Result {
        match self.state() {
            SessionState::Uninitialised | SessionState::Closed => (),
            s => {
                error!("{}: can't initialise from {s}", self.inner.descriptor);
                return Err(Error::UnexpectedState);
            }
        }
        info!("{}: initialising", self.inner.descriptor);
        self.inner.set_status(SessionState::Initialising);
        self.inner.queue.reset();

        let inner = self.inner.clone();
        let r = self.io.submit(async move { inner.open().await });
        match r {
            Ok(Ok(())) => {
                self.inner.set_status(SessionState::Connected);
                Ok(())
            }
            Ok(Err(Error::HandshakeTimeout)) => {
                self.inner.set_status(SessionState::Degraded);
                Err(Error::HandshakeTimeout)
            }
            Ok(Err(e)) | Err(e) => {
                error!("{}: initialisation failed: {e}", self.inner.descriptor);
                let inner = self.inner.clone();
                let _ = self.io.submit(async move { inner.shutdown().await });
                self.inner.set_status(SessionState::Uninitialised);
                Err(e)
            }
        }
    }

    /// Resets the sequence number with a new handshake.
    pub fn reset_sequence_number(&self) -> Result {
        if !self.state().is_open() {
            return Err(Error::Disconnected);
        }
        let inner = self.inner.clone();
        match self.io.submit(async move { inner.handshake().await })? {
            Ok(()) => {
                self.inner.set_status(SessionState::Connected);
                Ok(())
            }
            Err(e) => {
                if matches!(e, Error::HandshakeTimeout) {
                    self.inner.set_status(SessionState::Degraded);
                }
                Err(e)
            }
        }
    }

    /// Queues commands, and starts the queue worker if needed.
    ///
    /// Returns once the commands are queued; use [Command::wait_result] to
    /// wait for their outcomes.
    pub fn queue(&self, cmds: Vec<Arc<Command>>, mode: QueueMode) -> Result {
        if !self.state().is_open() {
            for cmd in &cmds {
                cmd.cancel();
            }
            return Err(Error::Disconnected);
        }

        let inner = self.inner.clone();
        self.io.submit(async move {
            let discarded = inner.queue.put(cmds, mode);
            if !discarded.is_empty() {
                trace!("{}: replaced {} queued commands", inner.descriptor, discarded.len());
            }
            inner.ensure_worker();
        })
    }

    /// Queues camera commands. See [CameraSession::queue].
    pub fn queue_commands(
        &self,
        cmds: impl IntoIterator<Item = CameraCommand>,
        mode: QueueMode,
    ) -> Result<Vec<Arc<Command>>> {
        let cmds: Vec<_> = cmds.into_iter().map(|c| Command::new(&c)).collect();
        self.queue(cmds.clone(), mode)?;
        Ok(cmds)
    }

    /// Sends one command immediately, and waits for it to complete.
    pub fn send_command(&self, cmd: &CameraCommand) -> Result<CommandOutcome> {
        if !self.state().is_open() {
            return Err(Error::Disconnected);
        }
        let inner = self.inner.clone();
        let payload = cmd.to_bytes();
        self.io
            .submit(async move { inner.execute(&payload, false).await })
    }

    /// Sends an inquiry, and waits for its reply.
    ///
    /// Returns the raw reply (frame header included), or `None` if the
    /// camera didn't answer, answered with an error, or never replies.
    pub fn inquire(&self, inquiry: Inquiry) -> Result<Option<Vec<u8>>> {
        if !self.state().is_open() {
            return Err(Error::Disconnected);
        }
        let inner = self.inner.clone();
        self.io.submit(async move { inner.inquire(inquiry).await })
    }

    pub fn pan_tilt_position(&self) -> Result<Option<PanTiltPosition>> {
        let reply = self.inquire(Inquiry::PanTiltPosition)?;
        let pos = reply.as_deref().and_then(PanTiltPosition::decode);
        if let Some(pos) = pos {
            debug!(
                "{}: pan {:#06x}, tilt {:#06x}",
                self.inner.descriptor, pos.pan, pos.tilt
            );
        }
        Ok(pos)
    }

    /// Inquires all property blocks and the pan-tilt position, decodes them
    /// into the session's [CameraState], and publishes the changes to
    /// [CameraSession::events].
    pub fn refresh_properties(&self) -> Result<PropertyUpdate> {
        if !self.state().is_open() {
            return Err(Error::Disconnected);
        }
        let inner = self.inner.clone();
        self.io.submit(async move { inner.refresh().await })
    }

    /// Refreshes properties every `period` in the background, until the
    /// session is closed or [CameraSession::stop_monitor] is called.
    pub fn start_monitor(&self, period: Duration) -> Result {
        if !self.state().is_open() {
            return Err(Error::Disconnected);
        }
        let inner = self.inner.clone();
        self.io.submit(async move {
            inner.stop_monitor();
            let task = tokio::task::spawn(inner.clone().run_monitor(period));
            if let Ok(mut t) = inner.monitor_task.lock() {
                *t = Some(task);
            }
        })
    }

    pub fn stop_monitor(&self) {
        self.inner.stop_monitor();
    }

    /// Current decoded camera state.
    pub fn snapshot(&self) -> Result<CameraState> {
        let inner = self.inner.clone();
        self.io
            .submit(async move { CameraState::clone(&*inner.state.read().await) })
    }

    /// Subscribes to camera state updates.
    pub fn events(&self) -> broadcast::Receiver<StateEvent> {
        self.inner.state_tx.subscribe()
    }

    /// Stops the queue worker (cancelling anything still queued) and the
    /// monitor, and releases the session's sockets. The shared receiver is
    /// closed with the last session.
    pub fn close(&self) -> Result {
        match self.state() {
            SessionState::Uninitialised | SessionState::Closed | SessionState::Closing => {
                return Ok(())
            }
            _ => (),
        }
        self.inner.set_status(SessionState::Closing);

        let inner = self.inner.clone();
        let r = self.io.submit(async move { inner.shutdown().await });
        self.inner.set_status(SessionState::Closed);
        r
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if matches!(self.state(), SessionState::Closed | SessionState::Uninitialised) {
            return;
        }
        if self.close().is_err() {
            // Probably dropped inside an async context; finish in the
            // background.
            let inner = self.inner.clone();
            self.io.spawn(async move { inner.shutdown().await });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{protocol::discovery::FULL_PROTOCOL_PORT, CameraHub};
    use std::{
        net::{Ipv4Addr, SocketAddr, UdpSocket},
        sync::atomic::AtomicBool,
        thread,
    };

    /// How the fake camera answers a command.
    #[derive(Clone, Copy)]
    enum Behaviour {
        /// Acknowledge, then complete.
        Normal,
        /// Acknowledge, then report an error.
        Error(u8),
        /// Don't reply at all.
        Silent,
    }

    /// A camera on 127.0.0.1, replying to the hub's listen address.
    struct FakeCamera {
        addr: SocketAddr,
        received: Arc<Mutex<Vec<Vec<u8>>>>,
        stop: Arc<AtomicBool>,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl FakeCamera {
        fn start(reply_to: SocketAddr, behaviour: Behaviour) -> Self {
            let sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            sock.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
            let addr = sock.local_addr().unwrap();
            let received = Arc::new(Mutex::new(Vec::new()));
            let stop = Arc::new(AtomicBool::new(false));

            let thread = {
                let received = received.clone();
                let stop = stop.clone();
                thread::spawn(move || {
                    let mut b = [0; 1024];
                    while !stop.load(Ordering::SeqCst) {
                        let Ok(l) = sock.recv(&mut b) else {
                            continue;
                        };
                        let pkt = b[..l].to_vec();
                        received.lock().unwrap().push(pkt.clone());
                        Self::answer(&sock, reply_to, behaviour, &pkt);
                    }
                })
            };

            Self {
                addr,
                received,
                stop,
                thread: Some(thread),
            }
        }

        fn answer(sock: &UdpSocket, to: SocketAddr, behaviour: Behaviour, pkt: &[u8]) {
            if pkt == ViscaPacket::reset_sequence().to_bytes().unwrap() {
                if !matches!(behaviour, Behaviour::Silent) {
                    sock.send_to(&hex::decode("020100010000000001").unwrap(), to)
                        .unwrap();
                }
                return;
            }
            if matches!(behaviour, Behaviour::Silent) {
                return;
            }

            let seq = &pkt[4..8];
            let reply = |body: &str| {
                let body = hex::decode(body).unwrap();
                let mut r = vec![0x01, 0x11, 0x00, body.len() as u8];
                r.extend_from_slice(seq);
                r.extend(body);
                sock.send_to(&r, to).unwrap();
            };

            // Inquiries
            if pkt[9] == 0x09 {
                match pkt[10..] {
                    // Pan-tilt position: pan 0x0123, tilt 0xfedc
                    [0x06, 0x12, ..] => reply("9050000102030f0e0d0cff"),
                    _ => reply("9050ff"),
                }
                return;
            }

            match behaviour {
                Behaviour::Normal => {
                    reply("9041ff");
                    reply("9051ff");
                }
                Behaviour::Error(code) => {
                    reply("9041ff");
                    reply(&format!("9061{code:02x}ff"));
                }
                Behaviour::Silent => unreachable!(),
            }
        }

        fn received(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }

        fn descriptor(&self) -> CameraDescriptor {
            CameraDescriptor {
                port: self.addr.port(),
                ..CameraDescriptor::new("FAKE", self.addr.ip(), "AA-BB-CC-DD-EE-FF")
            }
        }
    }

    impl Drop for FakeCamera {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(t) = self.thread.take() {
                let _ = t.join();
            }
        }
    }

    /// A hub listening on a free local port.
    fn hub(reply_timeout: Duration) -> CameraHub {
        let port = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        assert_ne!(FULL_PROTOCOL_PORT, port);
        CameraHub::new(HubConfig {
            listen_addr: (Ipv4Addr::LOCALHOST, port).into(),
            reply_timeout,
            command_interval: Duration::from_millis(1),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn commands_and_inquiries() -> Result<()> {
        let hub = hub(Duration::from_millis(500));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Normal);
        let session = hub.session(camera.descriptor());

        session.initialise()?;
        assert!(session.is_connected());
        assert_eq!(1, session.sequence_number());

        let outcome = session.send_command(&CameraCommand::ZoomTele)?;
        assert!(outcome.is_success());
        assert!(matches!(
            outcome,
            CommandOutcome::Replied(Reply {
                kind: ReplyKind::Completion { socket: 1 },
                ..
            })
        ));

        let cmds = session.queue_commands(
            [CameraCommand::ZoomStop, CameraCommand::FocusStop],
            QueueMode::Append,
        )?;
        for cmd in &cmds {
            assert!(cmd.wait_result(Duration::from_secs(2))?.is_success());
        }
        assert_eq!(4, session.sequence_number());

        let pos = session.pan_tilt_position()?;
        assert_eq!(
            Some(PanTiltPosition {
                pan: 0x0123,
                tilt: 0xfedc
            }),
            pos
        );
        assert_eq!(5, session.sequence_number());

        // Check what went over the wire
        let received = camera.received();
        assert_eq!(hex::decode("020000010000000101")?, received[0]);
        assert_eq!(hex::decode("01000006000000018101040702ff")?, received[1]);
        assert_eq!(hex::decode("01000006000000028101040700ff")?, received[2]);
        assert_eq!(hex::decode("01000006000000038101040800ff")?, received[3]);
        assert_eq!(hex::decode("010000050000000481090612ff")?, received[4]);

        session.close()?;
        assert_eq!(SessionState::Closed, session.state());
        assert!(matches!(
            session.send_command(&CameraCommand::ZoomStop),
            Err(Error::Disconnected)
        ));
        Ok(())
    }

    #[test]
    fn sequence_advances_on_timeout() -> Result<()> {
        let hub = hub(Duration::from_millis(50));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Silent);
        let session = hub.session(camera.descriptor());

        assert!(matches!(session.initialise(), Err(Error::HandshakeTimeout)));
        assert_eq!(SessionState::Degraded, session.state());
        assert!(!session.is_connected());

        for i in 0..3 {
            assert_eq!(1 + i, session.sequence_number());
            assert_eq!(
                CommandOutcome::TimedOut,
                session.send_command(&CameraCommand::PanTiltHome)?
            );
        }
        assert_eq!(4, session.sequence_number());
        assert_eq!(None, session.inquire(Inquiry::Power)?);
        assert_eq!(5, session.sequence_number());
        assert!(!session.snapshot()?.connected);

        // A new handshake starts again from 1
        assert!(matches!(
            session.reset_sequence_number(),
            Err(Error::HandshakeTimeout)
        ));
        assert_eq!(1, session.sequence_number());
        Ok(())
    }

    #[test]
    fn simplified_session() -> Result<()> {
        let hub = hub(Duration::from_millis(50));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Silent);
        let session = hub.session(CameraDescriptor {
            port: camera.addr.port(),
            ..CameraDescriptor::simplified("HD20X001", camera.addr.ip(), "aa:bb")
        });
        let mut events = session.events();

        // No handshake, and nothing to wait for.
        session.initialise()?;
        assert_eq!(SessionState::Connected, session.state());
        assert!(session.is_connected());
        let (state, flags) = events.try_recv().map_err(|_| Error::Internal)?;
        assert_eq!(PropertyUpdate::CONNECTIVITY, flags);
        assert!(state.connected);

        assert_eq!(
            CommandOutcome::Sent,
            session.send_command(&CameraCommand::ZoomStop)?
        );
        assert!(session.is_connected());
        assert_eq!(2, session.sequence_number());
        assert_eq!(PropertyUpdate::empty(), session.refresh_properties()?);

        // Sent unframed
        thread::sleep(Duration::from_millis(50));
        assert_eq!(vec![hex::decode("8101040700ff")?], camera.received());
        Ok(())
    }

    #[test]
    fn error_reply() -> Result<()> {
        let hub = hub(Duration::from_millis(500));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Error(0x41));
        let session = hub.session(camera.descriptor());
        session.initialise()?;

        let outcome = session.send_command(&CameraCommand::MemoryRecall(3))?;
        assert!(!outcome.is_success());
        let CommandOutcome::Replied(reply) = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        assert_eq!("error: Command not executable", reply.kind.to_string());
        // Errors don't change the session state.
        assert!(session.is_connected());
        Ok(())
    }

    #[test]
    fn refresh_publishes_updates() -> Result<()> {
        let hub = hub(Duration::from_millis(200));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Normal);
        let session = hub.session(camera.descriptor());
        let mut events = session.events();
        session.initialise()?;

        let (state, flags) = events.try_recv().map_err(|_| Error::Internal)?;
        assert_eq!(PropertyUpdate::CONNECTIVITY, flags);
        assert!(state.connected);

        // The fake camera's block replies are too short to decode.
        let updated = session.refresh_properties()?;
        assert_eq!(PropertyUpdate::PAN_TILT, updated);
        let (state, flags) = events.try_recv().map_err(|_| Error::Internal)?;
        assert_eq!(PropertyUpdate::PAN_TILT, flags);
        assert_eq!(0x0123, state.properties.pan_tilt.map_or(0, |p| p.pan));
        assert!(events.try_recv().is_err());

        assert_eq!(
            Some(PanTiltPosition {
                pan: 0x0123,
                tilt: 0xfedc
            }),
            session.snapshot()?.pan_tilt()
        );
        Ok(())
    }

    #[test]
    fn override_queue() -> Result<()> {
        let hub = hub(Duration::from_millis(100));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Silent);
        let session = hub.session(camera.descriptor());
        let _ = session.initialise();

        // The first command is in flight (waiting out its timeout) while the
        // rest are replaced.
        let first = session.queue_commands([CameraCommand::ZoomTele], QueueMode::Append)?;
        thread::sleep(Duration::from_millis(30));
        let replaced = session.queue_commands(
            (0..5).map(CameraCommand::MemoryRecall),
            QueueMode::Append,
        )?;
        let latest = session.queue_commands([CameraCommand::ZoomStop], QueueMode::Override)?;
        assert_eq!(1, session.pending());

        assert_eq!(
            CommandOutcome::TimedOut,
            first[0].wait_result(Duration::from_secs(2))?
        );
        for cmd in replaced {
            assert_eq!(Some(CommandOutcome::Cancelled), cmd.try_result());
        }
        assert_eq!(
            CommandOutcome::TimedOut,
            latest[0].wait_result(Duration::from_secs(2))?
        );
        assert_eq!(0, session.pending());

        // Handshake, ZoomTele, ZoomStop
        assert_eq!(3, camera.received().len());
        Ok(())
    }

    #[test]
    fn close_cancels_pending_and_releases_receiver() -> Result<()> {
        let hub = hub(Duration::from_millis(100));
        let camera = FakeCamera::start(hub.listen_addr(), Behaviour::Silent);
        let a = hub.session(camera.descriptor());
        let b = hub.session(CameraDescriptor {
            addr: Ipv4Addr::new(127, 0, 0, 2).into(),
            ..camera.descriptor()
        });
        let _ = a.initialise();
        let _ = b.initialise();
        assert!(hub.receiver_addr().is_some());
        assert_eq!(2, hub.open_sessions());

        let cmds = a.queue_commands(
            (0..4).map(CameraCommand::MemoryRecall),
            QueueMode::Append,
        )?;
        a.close()?;
        assert!(cmds
            .iter()
            .any(|c| c.try_result() == Some(CommandOutcome::Cancelled)));
        assert!(cmds.iter().all(|c| c.try_result().is_some()));
        assert_eq!(1, hub.open_sessions());

        drop(b);
        assert_eq!(0, hub.open_sessions());
        assert_eq!(None, hub.receiver_addr());
        Ok(())
    }
}
