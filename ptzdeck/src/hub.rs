use crate::{
    config::HubConfig,
    descriptor::CameraDescriptor,
    discovery,
    protocol::discovery::SetNetworkRequest,
    session::CameraSession,
    transport::ReceiverPool,
    worker::IoWorker,
    Result,
};
use std::{net::SocketAddr, sync::Arc};

/// Entry point for talking to cameras.
///
/// A hub owns the [IoWorker] and the shared reply receiver, and hands both to
/// every [CameraSession] it creates. The worker thread stops once the hub and
/// all of its sessions are dropped.
///
/// Like [CameraSession], the hub's methods block, and must not be called from
/// inside an async runtime.
pub struct CameraHub {
    io: Arc<IoWorker>,
    pool: Arc<ReceiverPool>,
    config: HubConfig,
}

impl CameraHub {
    pub fn new(config: HubConfig) -> Result<Self> {
        Ok(Self {
            io: Arc::new(IoWorker::start()?),
            pool: ReceiverPool::new(config.listen_addr),
            config,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Address cameras should send their replies to.
    pub fn listen_addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    /// Address of the shared receiver, while at least one session is open.
    pub fn receiver_addr(&self) -> Option<SocketAddr> {
        self.pool.local_addr()
    }

    /// Number of sessions holding the shared receiver open.
    pub fn open_sessions(&self) -> usize {
        self.pool.leases()
    }

    /// Creates an uninitialised session for a camera.
    pub fn session(&self, descriptor: CameraDescriptor) -> CameraSession {
        CameraSession::new(
            self.io.clone(),
            self.pool.clone(),
            descriptor,
            self.config.clone(),
        )
    }

    /// Runs the family A probe, then the family B probe.
    ///
    /// Cameras are not checked against any which are already known; see
    /// [reconcile][crate::registry::reconcile].
    pub fn discover(&self) -> Result<Vec<CameraDescriptor>> {
        let mut cameras = self.discover_family_a()?;
        cameras.extend(self.discover_family_b()?);
        Ok(cameras)
    }

    /// Finds cameras which answer the broadcast network enquiry.
    pub fn discover_family_a(&self) -> Result<Vec<CameraDescriptor>> {
        let config = self.config.discovery.clone();
        self.io
            .submit(async move { discovery::probe_family_a(&config).await })?
    }

    /// Finds cameras which answer the multicast device search.
    pub fn discover_family_b(&self) -> Result<Vec<CameraDescriptor>> {
        let config = self.config.discovery.clone();
        self.io
            .submit(async move { discovery::probe_family_b(&config).await })?
    }

    /// Changes a family A camera's address, netmask, gateway and name, and
    /// waits for it to acknowledge.
    ///
    /// Sessions to the camera's old address need to be closed and recreated.
    pub fn set_network(&self, request: SetNetworkRequest) -> Result {
        let config = self.config.discovery.clone();
        self.io
            .submit(async move { discovery::set_network(&config, &request).await })?
    }
}
