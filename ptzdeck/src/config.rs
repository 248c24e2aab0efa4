//! Runtime configuration.
use crate::protocol::discovery::{DISCOVERY_PORT, FULL_PROTOCOL_PORT, MULTICAST_GROUP, MULTICAST_PORT};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::PathBuf,
    time::Duration,
};

/// Settings for a [CameraHub][crate::CameraHub] and the sessions it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HubConfig {
    /// Where the shared receiver listens for camera replies.
    pub listen_addr: SocketAddr,
    /// Bound on each individual reply wait.
    pub reply_timeout: Duration,
    /// Bound on waiting for a session's worker to stop.
    pub shutdown_timeout: Duration,
    /// Pause between queued commands sent to one camera.
    pub command_interval: Duration,
    pub discovery: DiscoveryConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, FULL_PROTOCOL_PORT).into(),
            reply_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(2),
            command_interval: Duration::from_millis(15),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveryConfig {
    /// A probe finishes once no reply has arrived for this long.
    pub listen_timeout: Duration,
    pub broadcast_addr: Ipv4Addr,
    /// Family A enquiry and set-IP port.
    pub port: u16,
    /// Family B search group.
    pub multicast_addr: SocketAddrV4,
    /// How long to wait for a set-IP acknowledgement.
    pub set_network_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(1),
            broadcast_addr: Ipv4Addr::BROADCAST,
            port: DISCOVERY_PORT,
            multicast_addr: SocketAddrV4::new(MULTICAST_GROUP, MULTICAST_PORT),
            set_network_timeout: Duration::from_secs(2),
        }
    }
}

/// Serial joystick console settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsoleConfig {
    pub path: PathBuf,
    pub baud_rate: u32,
    /// Read timeout; the reader checks for shutdown this often.
    pub read_timeout: Duration,
    /// First delay before reopening a failed port.
    pub reconnect_initial: Duration,
    /// Longest delay between reopen attempts.
    pub reconnect_max: Duration,
}

impl ConsoleConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(if cfg!(windows) { "COM8" } else { "/dev/ttyACM0" }),
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(250),
            reconnect_initial: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(5),
        }
    }
}
