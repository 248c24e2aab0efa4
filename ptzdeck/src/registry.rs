//! Known cameras, keyed by MAC address.
//!
//! Storage is up to the application; this only defines what discovery needs
//! from it.
use crate::{descriptor::CameraDescriptor, protocol::ProtocolVariant};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::IpAddr};

/// What a registry remembers about a camera.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraRecord {
    pub mac: String,
    pub name: String,
    pub addr: IpAddr,
    pub protocol: ProtocolVariant,
}

impl From<&CameraDescriptor> for CameraRecord {
    fn from(d: &CameraDescriptor) -> Self {
        Self {
            mac: d.mac.clone(),
            name: d.name.clone(),
            addr: d.addr,
            protocol: d.protocol,
        }
    }
}

pub trait CameraRegistry {
    fn lookup(&self, mac: &str) -> Option<CameraRecord>;

    /// Adds or replaces the record for `record.mac`.
    fn upsert(&mut self, record: CameraRecord);
}

/// A registry which forgets everything when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
    records: HashMap<String, CameraRecord>,
}

impl MemoryRegistry {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CameraRegistry for MemoryRegistry {
    fn lookup(&self, mac: &str) -> Option<CameraRecord> {
        self.records.get(mac).cloned()
    }

    fn upsert(&mut self, record: CameraRecord) {
        self.records.insert(record.mac.clone(), record);
    }
}

/// How a discovered camera relates to what the registry knew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    New,
    /// Known, but now at a different address; any session to `previous`
    /// should be closed and recreated.
    Moved { previous: IpAddr },
    Unchanged,
}

/// Classifies each discovered camera against `registry`, and records its
/// current address.
///
/// Names already in the registry are kept, so operators' renames survive
/// rediscovery.
pub fn reconcile(
    registry: &mut impl CameraRegistry,
    discovered: &[CameraDescriptor],
) -> Vec<Reconciliation> {
    discovered
        .iter()
        .map(|camera| {
            let (status, name) = match registry.lookup(&camera.mac) {
                None => {
                    info!("new camera: {camera}");
                    (Reconciliation::New, camera.name.clone())
                }
                Some(known) if known.addr != camera.addr => {
                    info!("camera {} moved from {}", camera, known.addr);
                    (
                        Reconciliation::Moved {
                            previous: known.addr,
                        },
                        known.name,
                    )
                }
                Some(known) => (Reconciliation::Unchanged, known.name),
            };

            registry.upsert(CameraRecord {
                name,
                ..camera.into()
            });
            status
        })
        .collect()
}
