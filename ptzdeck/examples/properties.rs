use clap::Parser;
use ptzdeck::{
    protocol::{decode_video_format, lookup, CameraProperties, Inquiry},
    CameraDescriptor, CameraHub, Error, HubConfig, PropertyUpdate, Result,
};
use std::{net::IpAddr, time::Duration};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

/// Prints a camera's decoded properties.
///
/// With `--watch`, keeps polling the camera and prints whatever changes.
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// IP address of the camera.
    #[clap(short, long)]
    pub ip: IpAddr,

    /// Poll interval in seconds.
    #[clap(short, long)]
    pub watch: Option<f64>,
}

fn print_properties(p: &CameraProperties) {
    info!("Power: {}", if p.power { "on" } else { "standby" });
    info!("Zoom: {:#06x}, focus: {:#06x}", p.zoom, p.focus);
    info!(
        "Focus: {}, AF mode {:?}",
        if p.auto_focus { "auto" } else { "manual" },
        p.auto_focus_trigger()
    );
    info!(
        "White balance: {:?}, red gain {}, blue gain {}",
        p.white_balance(),
        p.red_gain,
        p.blue_gain
    );
    info!(
        "Exposure: {:?}, iris {}, shutter {}, gain {}",
        p.exposure(),
        p.iris_name().unwrap_or("?"),
        p.shutter_name().unwrap_or("?"),
        p.gain
    );
    info!("Picture effect: {:?}", p.effect());
    if let Some(pt) = p.pan_tilt {
        info!("Pan: {:#06x}, tilt: {:#06x}", pt.pan, pt.tilt);
    }
}

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
    let session = hub.session(CameraDescriptor::new("camera", opts.ip, "unknown"));
    match session.initialise() {
        Err(Error::HandshakeTimeout) => warn!("camera didn't answer the handshake"),
        r => r?,
    }

    if let Some(format) = session.inquire(Inquiry::VideoFormat)? {
        let name = decode_video_format(&format).and_then(lookup::video_format_name);
        info!("Video format: {}", name.unwrap_or("unknown"));
    }

    let updated = session.refresh_properties()?;
    if !updated.intersects(PropertyUpdate::ALL_BLOCKS) {
        error!("camera didn't answer any block inquiries");
    }
    print_properties(&session.snapshot()?.properties);

    let Some(period) = opts.watch else {
        return session.close();
    };
    let mut events = session.events();
    session.start_monitor(Duration::from_secs_f64(period))?;
    loop {
        let Ok((state, update)) = events.blocking_recv() else {
            break;
        };
        if update.contains(PropertyUpdate::CONNECTIVITY) {
            info!("Connected: {}", state.connected);
        }
        if update.intersects(PropertyUpdate::ALL_BLOCKS | PropertyUpdate::PAN_TILT) {
            info!("Updated: {update:?}");
            print_properties(&state.properties);
        }
    }
    session.close()
}
