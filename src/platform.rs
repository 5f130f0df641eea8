use std::net::IpAddr;
use std::os::fd::OwnedFd;

use serde::{Deserialize, Serialize};

use crate::errors::BuilderError;
use crate::ip_range::AddressFamily;

/// What the platform's interface factory supports. Injected once instead of checking OS versions at each call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformCapabilities {
    /// Apps can be included in or excluded from the tunnel individually.
    pub per_app_scoping: bool,
    /// Unrouted families can be allowed to bypass the tunnel instead of being blocked.
    pub family_bypass: bool,
    /// A blocking placeholder interface can be established while switching connections.
    pub blocking_placeholder: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self { per_app_scoping: true, family_bypass: true, blocking_placeholder: true }
    }
}

impl PlatformCapabilities {
    pub fn intersect(self, other: Self) -> Self {
        Self {
            per_app_scoping: self.per_app_scoping && other.per_app_scoping,
            family_bypass: self.family_bypass && other.family_bypass,
            blocking_placeholder: self.blocking_placeholder && other.blocking_placeholder,
        }
    }
}

/// One-shot builder for a TUN interface, as provided by the platform.
pub trait TunBuilder: Send {
    fn add_address(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError>;
    fn add_route(&mut self, address: IpAddr, prefix: u8) -> Result<(), BuilderError>;
    fn add_dns_server(&mut self, address: IpAddr) -> Result<(), BuilderError>;
    fn add_search_domain(&mut self, domain: &str) -> Result<(), BuilderError>;
    fn set_mtu(&mut self, mtu: u16) -> Result<(), BuilderError>;
    fn allow_family(&mut self, family: AddressFamily) -> Result<(), BuilderError>;
    fn add_disallowed_application(&mut self, app: &str) -> Result<(), BuilderError>;
    fn add_allowed_application(&mut self, app: &str) -> Result<(), BuilderError>;
    fn set_blocking(&mut self, blocking: bool);
    /// `Ok(None)` if the platform declined, e.g. because VPN permission was revoked.
    fn establish(&mut self) -> Result<Option<OwnedFd>, BuilderError>;
}

pub trait TunBuilderFactory: Send + Sync {
    fn create(&self, session: &str) -> Box<dyn TunBuilder>;
    fn capabilities(&self) -> PlatformCapabilities;
}
