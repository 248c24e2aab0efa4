use clap::Parser;
use ptzdeck::{
    protocol::{CameraCommand, ProtocolVariant},
    CameraDescriptor, CameraHub, ConsoleConfig, ConsoleEvent, Error, HubConfig, MotionIntent,
    QueueMode, Result, SerialConsole,
};
use std::{net::IpAddr, path::PathBuf, sync::Arc, thread, time::Duration};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

/// Drives one camera with the serial joystick console.
///
/// Keypad buttons `0` to `15` recall camera presets.
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// IP address of the camera.
    #[clap(short, long)]
    pub ip: IpAddr,

    /// Camera protocol.
    #[clap(short, long, value_enum, default_value = "full")]
    pub protocol: ProtocolVariant,

    /// Serial port of the console.
    #[clap(short, long)]
    pub serial: PathBuf,
}

/// Highest preset the keypad recalls.
const MAX_PRESET: i32 = 15;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .compact()
        .init();
    let opts = CliParser::parse();

    let hub = CameraHub::new(HubConfig::default())?;
    let descriptor = match opts.protocol {
        ProtocolVariant::Full => CameraDescriptor::new("camera", opts.ip, "unknown"),
        ProtocolVariant::Simplified => CameraDescriptor::simplified("camera", opts.ip, "unknown"),
    };
    let session = Arc::new(hub.session(descriptor));
    match session.initialise() {
        Err(Error::HandshakeTimeout) => warn!("camera didn't answer the handshake"),
        r => r?,
    }

    let _console = {
        let session = session.clone();
        let mut motion = MotionIntent::new();
        SerialConsole::spawn(ConsoleConfig::new(opts.serial), move |event| {
            let cmd = match event {
                ConsoleEvent::Motion(cmd) => {
                    if let Err(e) = motion.queue(&session, cmd) {
                        error!("can't send to camera: {e}");
                    }
                    return;
                }
                ConsoleEvent::ButtonPress(button @ 0..=MAX_PRESET) => {
                    info!("recalling preset {button}");
                    CameraCommand::MemoryRecall(button as u8)
                }
                ConsoleEvent::CalibrationProgress(reading) => {
                    info!("calibrating:\n{reading}");
                    return;
                }
                event => {
                    info!("{event:?}");
                    return;
                }
            };
            if let Err(e) = session.queue_commands([cmd], QueueMode::Append) {
                error!("can't send to camera: {e}");
            }
        })?
    };

    info!("ready, press Ctrl-C to exit");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
