//! Boundary to the IKE negotiation engine.

use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;

use crate::errors::EstablishError;
use crate::status::StatusReporter;
use crate::tunnel_builder::TunnelBuilderAdapter;

pub trait NegotiationEngine: Send + Sync {
    /// Returns `false` if the engine could not be brought up. `handle` stays valid until `deinitialize`.
    fn initialize(&self, handle: EngineHandle, log_path: &Path, data_dir: &Path, byod: bool) -> bool;
    fn deinitialize(&self);
    /// Starts negotiating with the given serialized settings.
    fn initiate(&self, config: &str);
}

/// Everything the engine may call back into. Literal values are passed through as the engine received them.
#[derive(Clone, derive_more::Debug)]
pub struct EngineHandle {
    #[debug(skip)]
    adapter: Arc<TunnelBuilderAdapter>,
    status: StatusReporter,
}

impl EngineHandle {
    pub(crate) fn new(adapter: Arc<TunnelBuilderAdapter>, status: StatusReporter) -> Self {
        Self { adapter, status }
    }

    pub fn add_address(&self, address: &str, prefix: i32) -> bool {
        self.adapter.add_address(address, prefix)
    }

    pub fn add_route(&self, address: &str, prefix: i32) -> bool {
        self.adapter.add_route(address, prefix)
    }

    pub fn add_dns_server(&self, address: &str) -> bool {
        self.adapter.add_dns_server(address)
    }

    pub fn add_search_domain(&self, domain: &str) -> bool {
        self.adapter.add_search_domain(domain)
    }

    pub fn set_mtu(&self, mtu: i32) -> bool {
        self.adapter.set_mtu(mtu)
    }

    pub fn establish(&self) -> Result<OwnedFd, EstablishError> {
        self.adapter.establish()
    }

    /// Used while reestablishing, when DNS servers would not be reachable yet.
    pub fn establish_no_dns(&self) -> Result<OwnedFd, EstablishError> {
        self.adapter.establish_no_dns()
    }

    pub fn update_status(&self, code: i32) {
        self.status.engine_status(code)
    }
}
