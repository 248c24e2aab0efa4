//! Commands and the per-session command queue.
use crate::{
    protocol::{CameraCommand, Inquiry, Reply},
    Error, Result,
};
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};
use tokio::sync::Notify;

/// What happened to a [Command].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Sent to a camera which doesn't reply.
    Sent,
    /// The last reply from the camera: a completion, an acknowledgement (if
    /// the command skips the completion wait), or an error.
    Replied(Reply),
    /// The camera didn't reply in time.
    TimedOut,
    /// Discarded from the queue before it was sent.
    Cancelled,
    /// Couldn't be sent.
    Failed(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Sent => true,
            Self::Replied(r) => r.kind.is_success(),
            _ => false,
        }
    }
}

/// A unit of work for a session: a VISCA payload, and a slot for its
/// [CommandOutcome].
///
/// The session's worker fills the slot exactly once, waking anyone blocked in
/// [Command::wait_result].
#[derive(Debug)]
pub struct Command {
    payload: Vec<u8>,
    skip_completion: bool,
    result: Mutex<Option<CommandOutcome>>,
    ready: Condvar,
}

impl Command {
    /// A command which waits for acknowledge and completion replies.
    pub fn new(cmd: &CameraCommand) -> Arc<Self> {
        Self::raw(cmd.to_bytes(), false)
    }

    /// An inquiry; there is no separate completion reply to wait for.
    pub fn inquiry(inquiry: &Inquiry) -> Arc<Self> {
        Self::raw(inquiry.to_bytes(), true)
    }

    /// A command from a raw VISCA payload.
    pub fn raw(payload: Vec<u8>, skip_completion: bool) -> Arc<Self> {
        Arc::new(Self {
            payload,
            skip_completion,
            result: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn skip_completion(&self) -> bool {
        self.skip_completion
    }

    /// Stores the outcome, if none has been stored yet.
    pub(crate) fn set_result(&self, outcome: CommandOutcome) {
        let Ok(mut result) = self.result.lock() else {
            return;
        };
        if result.is_none() {
            *result = Some(outcome);
            self.ready.notify_all();
        }
    }

    pub(crate) fn cancel(&self) {
        self.set_result(CommandOutcome::Cancelled);
    }

    /// Gets the outcome without waiting.
    pub fn try_result(&self) -> Option<CommandOutcome> {
        self.result.lock().ok()?.clone()
    }

    /// Blocks until the command has an outcome, or `timeout` elapses.
    pub fn wait_result(&self, timeout: Duration) -> Result<CommandOutcome> {
        let guard = self.result.lock().map_err(|_| Error::Internal)?;
        let (guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |r| r.is_none())
            .map_err(|_| Error::Internal)?;
        guard.clone().ok_or(Error::Timeout)
    }
}

/// How to add commands to a [CommandQueue].
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum QueueMode {
    /// Add after pending commands; they all run, in order.
    Append,
    /// Replace pending commands. The command in flight is not interrupted.
    ///
    /// This suits continuous controls, where only the latest intent matters.
    #[default]
    Override,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Arc<Command>>,
    /// Set once the worker has been asked to stop; nothing more is accepted.
    shutdown: bool,
}

/// Pending commands for one session.
#[derive(Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds commands according to `mode`.
    ///
    /// Returns the commands which were discarded (and cancelled): either
    /// those replaced by an [Override][QueueMode::Override], or `cmds` itself
    /// if the queue is shut down.
    pub fn put(&self, cmds: Vec<Arc<Command>>, mode: QueueMode) -> Vec<Arc<Command>> {
        let discarded = match self.state.lock() {
            Ok(mut state) if !state.shutdown => {
                let discarded = match mode {
                    QueueMode::Append => Vec::new(),
                    QueueMode::Override => state.pending.drain(..).collect(),
                };
                state.pending.extend(cmds);
                discarded
            }
            _ => cmds,
        };

        for cmd in &discarded {
            cmd.cancel();
        }
        self.notify.notify_one();
        discarded
    }

    /// Appends commands, keeping everything pending.
    pub fn put_many(&self, cmds: Vec<Arc<Command>>) -> Vec<Arc<Command>> {
        self.put(cmds, QueueMode::Append)
    }

    /// Replaces everything pending with `cmds`.
    pub fn clear_and_put(&self, cmds: Vec<Arc<Command>>) -> Vec<Arc<Command>> {
        self.put(cmds, QueueMode::Override)
    }

    /// Discards all pending commands, and makes [next][Self::next] return
    /// `None` from now on.
    pub fn trigger_shutdown(&self) -> Vec<Arc<Command>> {
        let discarded: Vec<_> = match self.state.lock() {
            Ok(mut state) => {
                state.shutdown = true;
                state.pending.drain(..).collect()
            }
            Err(_) => Vec::new(),
        };
        for cmd in &discarded {
            cmd.cancel();
        }
        self.notify.notify_one();
        discarded
    }

    /// Clears the shutdown flag, so the queue can be used by a new worker.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.shutdown = false;
        }
    }

    fn try_next(&self) -> Option<Option<Arc<Command>>> {
        let mut state = self.state.lock().ok()?;
        if state.shutdown {
            return Some(None);
        }
        state.pending.pop_front().map(Some)
    }

    /// Waits for the next command, or `None` on shutdown.
    pub async fn next(&self) -> Option<Arc<Command>> {
        loop {
            if let Some(r) = self.try_next() {
                return r;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.pending.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().map_or(true, |s| s.shutdown)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::CameraCommand;

    fn commands(n: u8) -> Vec<Arc<Command>> {
        (0..n)
            .map(|i| Command::new(&CameraCommand::MemoryRecall(i)))
            .collect()
    }

    fn payloads(queue: &CommandQueue) -> Vec<Vec<u8>> {
        queue
            .state
            .lock()
            .unwrap()
            .pending
            .iter()
            .map(|c| c.payload().to_vec())
            .collect()
    }

    #[test]
    fn append_keeps_order() {
        let queue = CommandQueue::new();
        let first = commands(3);
        let second = commands(5);
        let mut expected: Vec<_> = first.iter().map(|c| c.payload().to_vec()).collect();
        expected.extend(second.iter().map(|c| c.payload().to_vec()));

        assert!(queue.put_many(first).is_empty());
        assert!(queue.put_many(second).is_empty());
        assert_eq!(8, queue.len());
        assert_eq!(expected, payloads(&queue));
    }

    #[test]
    fn override_replaces_pending() {
        let queue = CommandQueue::new();
        let pending = commands(4);
        queue.put_many(pending.clone());

        let latest = Command::new(&CameraCommand::ZoomStop);
        let discarded = queue.clear_and_put(vec![latest.clone()]);
        assert_eq!(4, discarded.len());
        assert_eq!(1, queue.len());
        assert_eq!(vec![latest.payload().to_vec()], payloads(&queue));

        for cmd in pending {
            assert_eq!(Some(CommandOutcome::Cancelled), cmd.try_result());
        }
        assert_eq!(None, latest.try_result());
    }

    #[tokio::test]
    async fn in_flight_command_survives_override() {
        let queue = CommandQueue::new();
        queue.put_many(commands(3));

        // The worker has taken one command.
        let in_flight = queue.next().await.unwrap();
        assert_eq!(2, queue.len());

        queue.clear_and_put(commands(1));
        assert_eq!(1, queue.len());
        assert_eq!(None, in_flight.try_result());
    }

    #[tokio::test]
    async fn shutdown() {
        let queue = CommandQueue::new();
        let pending = commands(2);
        queue.put_many(pending.clone());

        assert_eq!(2, queue.trigger_shutdown().len());
        assert!(queue.is_shutdown());
        assert!(queue.next().await.is_none());
        assert_eq!(Some(CommandOutcome::Cancelled), pending[0].try_result());

        // Nothing more is accepted, even with override.
        let late = commands(1);
        assert_eq!(1, queue.clear_and_put(late.clone()).len());
        assert_eq!(Some(CommandOutcome::Cancelled), late[0].try_result());
        assert!(queue.next().await.is_none());

        queue.reset();
        queue.put_many(commands(1));
        assert!(queue.next().await.is_some());
    }

    #[test]
    fn wait_result() {
        let cmd = Command::new(&CameraCommand::PowerOn);
        assert!(matches!(
            cmd.wait_result(Duration::from_millis(10)),
            Err(Error::Timeout)
        ));

        let waiter = {
            let cmd = cmd.clone();
            std::thread::spawn(move || cmd.wait_result(Duration::from_secs(5)))
        };
        cmd.set_result(CommandOutcome::TimedOut);
        // Only the first outcome sticks.
        cmd.set_result(CommandOutcome::Sent);

        assert_eq!(CommandOutcome::TimedOut, waiter.join().unwrap().unwrap());
        assert!(!CommandOutcome::TimedOut.is_success());
        assert!(CommandOutcome::Sent.is_success());
    }
}
