use clap::Parser;
use ptzdeck::{
    registry::{reconcile, MemoryRegistry},
    CameraHub, DiscoveryConfig, HubConfig, Result,
};
use std::{net::Ipv4Addr, time::Duration};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Finds PTZ cameras on the local network.
#[derive(Debug, Parser)]
#[clap(verbatim_doc_comment)]
struct CliParser {
    /// Broadcast address for the network enquiry.
    #[clap(short, long, default_value = "255.255.255.255")]
    pub broadcast: Ipv4Addr,

    /// Seconds to wait for further replies to each probe.
    #[clap(short, long, default_value_t = 1.0)]
    pub timeout: f64,
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

    let hub = CameraHub::new(HubConfig {
        discovery: DiscoveryConfig {
            broadcast_addr: opts.broadcast,
            listen_timeout: Duration::from_secs_f64(opts.timeout),
            ..Default::default()
        },
        ..Default::default()
    })?;

    let cameras = hub.discover()?;
    let mut registry = MemoryRegistry::default();
    for (camera, status) in cameras.iter().zip(reconcile(&mut registry, &cameras)) {
        info!(
            "{camera}: {:?} protocol on port {}, netmask {:?}, gateway {:?} ({status:?})",
            camera.protocol, camera.port, camera.netmask, camera.gateway
        );
    }
    info!("{} cameras found", cameras.len());
    Ok(())
}
