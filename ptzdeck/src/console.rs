//! Serial joystick console.
//!
//! [ConsoleDecoder] turns console lines into [ConsoleEvent]s, and
//! [SerialConsole] feeds it from a serial port on its own thread.
use crate::{
    config::ConsoleConfig,
    protocol::{
        console::{Axis, Calibration, LearnReading, HELLO},
        CameraCommand, ConsoleMessage, PanTiltDirection,
    },
    queue::{Command, QueueMode},
    session::CameraSession,
    Error, Result,
};
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Something the console operator did.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConsoleEvent {
    /// The joystick moved; send this to the selected camera with a
    /// [MotionIntent].
    Motion(CameraCommand),
    ButtonPress(i32),
    ButtonRelease(i32),
    /// The console (re)started with a stored calibration.
    Booted(Calibration),
    /// Calibration began; show the calibration UI.
    CalibrationStarted,
    CalibrationProgress(LearnReading),
    /// Calibration is learning the joystick's rest position.
    CalibrationHome,
    /// Calibration ended; hide the calibration UI.
    CalibrationFinished(Calibration),
}

/// Signed camera speeds for each joystick axis, and the speeds last sent.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct JoystickState {
    pub pan: i32,
    pub tilt: i32,
    pub zoom: i32,
    last_pan: i32,
    last_tilt: i32,
    last_zoom: i32,
}

impl JoystickState {
    /// Moves one axis to a joystick `position`.
    pub fn set(&mut self, axis: Axis, position: i32) {
        let speed = axis.speed(position);
        match axis {
            Axis::X => self.pan = speed,
            Axis::Y => self.tilt = speed,
            Axis::Z => self.zoom = speed,
        }
    }

    /// Commands for whichever velocities changed since they were last sent.
    pub fn motion(&mut self) -> Vec<CameraCommand> {
        let mut cmds = Vec::with_capacity(2);

        if (self.pan, self.tilt) != (self.last_pan, self.last_tilt) {
            self.last_pan = self.pan;
            self.last_tilt = self.tilt;
            let direction = PanTiltDirection::from_velocity(self.pan, self.tilt);
            debug!("pan-tilt {direction:?} at {}, {}", self.pan, self.tilt);
            cmds.push(match direction {
                PanTiltDirection::Stop => CameraCommand::pan_tilt_stop(),
                direction => CameraCommand::PanTiltDrive {
                    direction,
                    // The camera wants a valid speed for an idle axis too.
                    pan_speed: self.pan.unsigned_abs().max(1) as u8,
                    tilt_speed: self.tilt.unsigned_abs().max(1) as u8,
                },
            });
        }

        if self.zoom != self.last_zoom {
            self.last_zoom = self.zoom;
            let speed = self.zoom.unsigned_abs() as u8;
            debug!("zoom at {}", self.zoom);
            cmds.push(match self.zoom.signum() {
                0 => CameraCommand::ZoomStop,
                1 => CameraCommand::ZoomTeleVariable(speed),
                _ => CameraCommand::ZoomWideVariable(speed),
            });
        }

        cmds
    }
}

/// Axes which share a motion command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MotionGroup {
    PanTilt,
    Zoom,
}

impl MotionGroup {
    fn of(cmd: &CameraCommand) -> Self {
        match cmd {
            CameraCommand::PanTiltDrive { .. } => Self::PanTilt,
            _ => Self::Zoom,
        }
    }
}

/// The last motion command queued for each group of axes.
///
/// Motion is queued with [QueueMode::Override], so a newer command replaces
/// any that haven't run yet. A batch from [MotionIntent::batch] also carries
/// the other group's last command while it is still waiting, so moving one
/// axis never drops a stop queued for another.
#[derive(Debug, Default, Clone)]
pub struct MotionIntent {
    pan_tilt: Option<(CameraCommand, Arc<Command>)>,
    zoom: Option<(CameraCommand, Arc<Command>)>,
}

impl MotionIntent {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, group: MotionGroup) -> &mut Option<(CameraCommand, Arc<Command>)> {
        match group {
            MotionGroup::PanTilt => &mut self.pan_tilt,
            MotionGroup::Zoom => &mut self.zoom,
        }
    }

    /// Commands to queue for `cmd`: any unfinished command from the other
    /// group, then `cmd`.
    pub fn batch(&self, cmd: CameraCommand) -> Vec<CameraCommand> {
        let other = match MotionGroup::of(&cmd) {
            MotionGroup::PanTilt => &self.zoom,
            MotionGroup::Zoom => &self.pan_tilt,
        };
        let mut cmds = Vec::with_capacity(2);
        if let Some((pending, queued)) = other {
            if queued.try_result().is_none() {
                cmds.push(pending.clone());
            }
        }
        cmds.push(cmd);
        cmds
    }

    /// Remembers the commands queued for a [MotionIntent::batch].
    pub fn record(&mut self, cmds: &[CameraCommand], queued: &[Arc<Command>]) {
        for (cmd, queued) in cmds.iter().zip(queued) {
            *self.slot(MotionGroup::of(cmd)) = Some((cmd.clone(), queued.clone()));
        }
    }

    /// Queues `cmd` on `session`, replacing queued motion.
    pub fn queue(&mut self, session: &CameraSession, cmd: CameraCommand) -> Result {
        let cmds = self.batch(cmd);
        let queued = session.queue_commands(cmds.iter().cloned(), QueueMode::Override)?;
        self.record(&cmds, &queued);
        Ok(())
    }
}

/// Decodes console lines into [ConsoleEvent]s.
#[derive(Debug, Default)]
pub struct ConsoleDecoder {
    joystick: JoystickState,
    learning: bool,
}

impl ConsoleDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joystick(&self) -> &JoystickState {
        &self.joystick
    }

    /// `true` between the first `LRN` line and `FIN`.
    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Decodes one line. Malformed lines are logged and produce no events.
    pub fn feed_line(&mut self, line: &str) -> Vec<ConsoleEvent> {
        let msg = match ConsoleMessage::parse(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("ignoring console line: {e}");
                return Vec::new();
            }
        };
        trace!("console: {msg:?}");

        match msg {
            ConsoleMessage::Axis { axis, position } => {
                self.joystick.set(axis, position);
                self.joystick
                    .motion()
                    .into_iter()
                    .map(ConsoleEvent::Motion)
                    .collect()
            }
            ConsoleMessage::ButtonPress { .. } | ConsoleMessage::ButtonRelease { .. } => {
                let Some(button) = msg.button_index() else {
                    return Vec::new();
                };
                if matches!(msg, ConsoleMessage::ButtonPress { .. }) {
                    debug!("button {button} pressed");
                    vec![ConsoleEvent::ButtonPress(button)]
                } else {
                    debug!("button {button} released");
                    vec![ConsoleEvent::ButtonRelease(button)]
                }
            }
            ConsoleMessage::Boot(calibration) => {
                info!("console booted: {calibration:?}");
                vec![ConsoleEvent::Booted(calibration)]
            }
            ConsoleMessage::Learn(reading) => {
                let mut events = Vec::with_capacity(2);
                if !self.learning {
                    info!("joystick calibration started");
                    self.learning = true;
                    events.push(ConsoleEvent::CalibrationStarted);
                }
                events.push(ConsoleEvent::CalibrationProgress(reading));
                events
            }
            ConsoleMessage::Home => vec![ConsoleEvent::CalibrationHome],
            ConsoleMessage::Finished(calibration) => {
                info!("joystick calibration finished: {calibration:?}");
                self.learning = false;
                vec![ConsoleEvent::CalibrationFinished(calibration)]
            }
            ConsoleMessage::Unknown(line) => {
                warn!("unknown console command: {line}");
                Vec::new()
            }
        }
    }
}

/// Doubling delay between reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Gets the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Starts over after a successful attempt.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Reads lines from `reader` until `stop` is set, passing decoded events to
/// `handler`.
///
/// Read timeouts are only a chance to check `stop`; a partial line survives
/// them. Returns an error when the reader fails or reaches end of file.
fn read_lines(
    reader: &mut impl BufRead,
    decoder: &mut ConsoleDecoder,
    handler: &mut impl FnMut(ConsoleEvent),
    stop: &AtomicBool,
) -> Result {
    let mut line = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                return Err(Error::IoError(ErrorKind::UnexpectedEof.into()));
            }
            Ok(_) => {
                if line.last() != Some(&b'\n') {
                    // End of input without a newline; the next read reports
                    // it.
                    continue;
                }
                let text = String::from_utf8_lossy(&line);
                for event in decoder.feed_line(&text) {
                    handler(event);
                }
                line.clear();
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => (),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// A serial console reader thread.
///
/// The port is opened with a greeting, and reopened after any I/O error, with
/// [Backoff] between attempts. The thread stops when [SerialConsole::stop] is
/// called or the [SerialConsole] is dropped.
pub struct SerialConsole {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SerialConsole {
    const THREAD_NAME: &'static str = "ptzdeck-console";

    /// Starts reading, passing events to `handler` on the reader thread.
    pub fn spawn(
        config: ConsoleConfig,
        mut handler: impl FnMut(ConsoleEvent) + Send + 'static,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(Self::THREAD_NAME.to_string())
                .spawn(move || Self::run(&config, &mut handler, &stop))?
        };

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    fn open(config: &ConsoleConfig) -> Result<Box<dyn serialport::SerialPort>> {
        let path = config.path.to_string_lossy();
        let mut port = serialport::new(path, config.baud_rate)
            .timeout(config.read_timeout)
            .open()?;
        port.write_all(HELLO)?;
        Ok(port)
    }

    fn run(config: &ConsoleConfig, handler: &mut impl FnMut(ConsoleEvent), stop: &AtomicBool) {
        let mut backoff = Backoff::new(config.reconnect_initial, config.reconnect_max);
        let mut decoder = ConsoleDecoder::new();

        while !stop.load(Ordering::SeqCst) {
            let r = Self::open(config).and_then(|port| {
                info!("opened console on {}", config.path.display());
                backoff.reset();
                read_lines(&mut BufReader::new(port), &mut decoder, handler, stop)
            });

            if let Err(e) = r {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let delay = backoff.next_delay();
                error!(
                    "console {}: {e}; reopening in {delay:?}",
                    config.path.display()
                );
                // Sleep in small steps, so stop isn't held up.
                let mut remaining = delay;
                while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
                    let step = remaining.min(config.read_timeout);
                    thread::sleep(step);
                    remaining -= step;
                }
            }
        }
        info!("console reader stopped");
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the reader thread, and waits for it to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("console reader thread panicked");
            }
        }
    }
}

impl Drop for SerialConsole {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::queue::CommandOutcome;
    use std::io::{Cursor, Read};

    fn motion(decoder: &mut ConsoleDecoder, line: &str) -> Vec<CameraCommand> {
        decoder
            .feed_line(line)
            .into_iter()
            .map(|e| match e {
                ConsoleEvent::Motion(cmd) => cmd,
                e => panic!("unexpected event: {e:?}"),
            })
            .collect()
    }

    #[test]
    fn one_command_per_change() {
        let mut decoder = ConsoleDecoder::new();
        assert_eq!(
            vec![CameraCommand::PanTiltDrive {
                direction: PanTiltDirection::Right,
                pan_speed: 9,
                tilt_speed: 1,
            }],
            motion(&mut decoder, "X8")
        );
        assert_eq!(
            vec![CameraCommand::PanTiltDrive {
                direction: PanTiltDirection::Right,
                pan_speed: 18,
                tilt_speed: 1,
            }],
            motion(&mut decoder, "X16")
        );
        // Same speed again
        assert!(motion(&mut decoder, "X16").is_empty());
        assert!(motion(&mut decoder, "X20").is_empty());

        assert_eq!(
            vec![CameraCommand::PanTiltDrive {
                direction: PanTiltDirection::DownRight,
                pan_speed: 18,
                tilt_speed: 17,
            }],
            motion(&mut decoder, "Y-16")
        );
        assert_eq!((18, -17, 0), {
            let j = decoder.joystick();
            (j.pan, j.tilt, j.zoom)
        });

        motion(&mut decoder, "X0");
        assert_eq!(
            vec![CameraCommand::pan_tilt_stop()],
            motion(&mut decoder, "Y0")
        );
    }

    #[test]
    fn rest_is_idempotent() {
        let mut decoder = ConsoleDecoder::new();
        for line in ["X0", "Y0", "Z0", "X0", "Y0"] {
            assert!(motion(&mut decoder, line).is_empty());
        }

        assert_eq!(1, motion(&mut decoder, "X-4").len());
        assert_eq!(
            vec![CameraCommand::pan_tilt_stop()],
            motion(&mut decoder, "X0")
        );
        assert!(motion(&mut decoder, "X0").is_empty());
    }

    #[test]
    fn zoom() {
        let mut decoder = ConsoleDecoder::new();
        assert_eq!(
            vec![CameraCommand::ZoomTeleVariable(7)],
            motion(&mut decoder, "Z16")
        );
        assert_eq!(
            vec![CameraCommand::ZoomWideVariable(3)],
            motion(&mut decoder, "Z-8")
        );
        // -1 * 7 / 16 rounds to 0
        assert_eq!(vec![CameraCommand::ZoomStop], motion(&mut decoder, "Z-1"));
    }

    #[test]
    fn motion_keeps_waiting_stop() {
        fn queue(
            intent: &mut MotionIntent,
            cmd: CameraCommand,
        ) -> (Vec<CameraCommand>, Vec<Arc<Command>>) {
            let cmds = intent.batch(cmd);
            let queued: Vec<_> = cmds.iter().map(Command::new).collect();
            intent.record(&cmds, &queued);
            (cmds, queued)
        }

        let mut decoder = ConsoleDecoder::new();
        let mut intent = MotionIntent::new();
        let stop = CameraCommand::pan_tilt_stop();

        motion(&mut decoder, "X8");
        motion(&mut decoder, "Z8");
        assert_eq!(vec![stop.clone()], motion(&mut decoder, "X0"));
        let (cmds, _) = queue(&mut intent, stop.clone());
        assert_eq!(vec![stop.clone()], cmds);

        // The pan-tilt stop hasn't run yet, so it goes out with the zoom stop.
        assert_eq!(vec![CameraCommand::ZoomStop], motion(&mut decoder, "Z0"));
        let (cmds, queued) = queue(&mut intent, CameraCommand::ZoomStop);
        assert_eq!(vec![stop.clone(), CameraCommand::ZoomStop], cmds);

        // Finished commands aren't repeated.
        for cmd in &queued {
            cmd.set_result(CommandOutcome::Sent);
        }
        assert_eq!(
            vec![CameraCommand::ZoomTeleVariable(2)],
            intent.batch(CameraCommand::ZoomTeleVariable(2))
        );
        assert_eq!(vec![stop.clone()], intent.batch(stop));
    }

    #[test]
    fn buttons() {
        let mut decoder = ConsoleDecoder::new();
        assert_eq!(
            vec![ConsoleEvent::ButtonPress(11)],
            decoder.feed_line("P1,3")
        );
        assert_eq!(
            vec![ConsoleEvent::ButtonRelease(11)],
            decoder.feed_line("R1,3\r\n")
        );
        assert!(decoder.feed_line("P1").is_empty());
        assert!(decoder.feed_line("hello").is_empty());
        assert!(decoder.feed_line("").is_empty());
        assert!(decoder.feed_line("WHAT1,2").is_empty());
    }

    #[test]
    fn calibration() {
        let mut decoder = ConsoleDecoder::new();
        let calibration = Calibration {
            rest: [512, 500, 520],
            step: [30, 31, 29],
        };
        assert_eq!(
            vec![ConsoleEvent::Booted(calibration)],
            decoder.feed_line("BOOT512,500,520,30,31,29")
        );
        assert!(!decoder.is_learning());

        let reading = LearnReading {
            raw: [1, 2, 3],
            min: [0, 0, 0],
            max: [1023, 1023, 1023],
        };
        assert_eq!(
            vec![
                ConsoleEvent::CalibrationStarted,
                ConsoleEvent::CalibrationProgress(reading)
            ],
            decoder.feed_line("LRN1,2,3,0,0,0,1023,1023,1023")
        );
        assert!(decoder.is_learning());

        // Only the first reading starts calibration
        assert_eq!(
            vec![ConsoleEvent::CalibrationProgress(reading)],
            decoder.feed_line("LRN1,2,3,0,0,0,1023,1023,1023")
        );
        assert_eq!(
            vec![ConsoleEvent::CalibrationHome],
            decoder.feed_line("HOME")
        );
        assert_eq!(
            vec![ConsoleEvent::CalibrationFinished(calibration)],
            decoder.feed_line("FIN512,500,520,30,31,29")
        );
        assert!(!decoder.is_learning());

        assert_eq!(
            vec![
                ConsoleEvent::CalibrationStarted,
                ConsoleEvent::CalibrationProgress(reading)
            ],
            decoder.feed_line("LRN1,2,3,0,0,0,1023,1023,1023")
        );
    }

    #[test]
    fn backoff() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(vec![100, 200, 400, 500, 500], delays);

        backoff.reset();
        assert_eq!(Duration::from_millis(100), backoff.next_delay());
    }

    /// Returns `data` in pieces, with a read timeout between each.
    struct Flaky {
        pieces: Vec<&'static [u8]>,
        timed_out: bool,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(ErrorKind::TimedOut.into());
            }
            self.timed_out = false;
            if self.pieces.is_empty() {
                return Ok(0);
            }
            let piece = self.pieces.remove(0);
            buf[..piece.len()].copy_from_slice(piece);
            Ok(piece.len())
        }
    }

    #[test]
    fn reader() {
        let mut decoder = ConsoleDecoder::new();
        let mut events = Vec::new();
        let stop = AtomicBool::new(false);

        let mut port = BufReader::new(Flaky {
            pieces: vec![b"P0,", b"2\nX1", b"6\n", b"R0,2\n"],
            timed_out: false,
        });
        let r = read_lines(&mut port, &mut decoder, &mut |e| events.push(e), &stop);
        assert!(matches!(r, Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof));
        assert_eq!(
            vec![
                ConsoleEvent::ButtonPress(2),
                ConsoleEvent::Motion(CameraCommand::PanTiltDrive {
                    direction: PanTiltDirection::Right,
                    pan_speed: 18,
                    tilt_speed: 1,
                }),
                ConsoleEvent::ButtonRelease(2),
            ],
            events
        );

        // An unfinished line at end of input isn't decoded
        let mut events = Vec::new();
        let mut port = Cursor::new(b"P0,1\nX8".to_vec());
        let r = read_lines(&mut port, &mut decoder, &mut |e| events.push(e), &stop);
        assert!(matches!(r, Err(Error::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof));
        assert_eq!(vec![ConsoleEvent::ButtonPress(1)], events);

        // Stops without reading
        stop.store(true, Ordering::SeqCst);
        let mut port = Cursor::new(b"P0,1\n".to_vec());
        assert!(read_lines(&mut port, &mut decoder, &mut |_| panic!(), &stop).is_ok());
    }

    #[test]
    fn missing_port() -> Result<()> {
        let config = ConsoleConfig {
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(20),
            read_timeout: Duration::from_millis(10),
            ..ConsoleConfig::new("/nonexistent/ptzdeck-console")
        };
        let mut console = SerialConsole::spawn(config, |e| panic!("unexpected event: {e:?}"))?;
        thread::sleep(Duration::from_millis(50));
        assert!(console.is_running());
        console.stop();
        assert!(!console.is_running());
        Ok(())
    }
}
