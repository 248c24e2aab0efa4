#![doc = include_str!("../README.md")]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate tracing;

pub mod config;
pub mod console;
mod descriptor;
mod discovery;
mod error;
mod hub;
pub mod queue;
pub mod registry;
mod session;
mod state;
mod transport;
mod worker;

pub use {
    crate::{
        config::{ConsoleConfig, DiscoveryConfig, HubConfig},
        console::{ConsoleDecoder, ConsoleEvent, MotionIntent, SerialConsole},
        descriptor::CameraDescriptor,
        error::Error,
        hub::CameraHub,
        queue::{Command, CommandOutcome, QueueMode},
        session::{CameraSession, SessionState, StateEvent},
        state::{CameraState, PropertyUpdate},
        worker::IoWorker,
    },
    ptzdeck_protocol as protocol,
};
pub type Result<T = ()> = std::result::Result<T, Error>;
