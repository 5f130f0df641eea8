//! Serializes interface establishment between the engine and the controller.
//!
//! The adapter owns the live platform builder and the per-attempt `RouteSet` for the current profile. Engine
//! callbacks record into them until `establish` turns them into an interface, at which point the recorded state
//! becomes the snapshot `establish_no_dns` rebuilds from. While switching profiles the controller puts a blocking
//! placeholder interface in place, whose traffic a `PacketDropper` discards until a real interface replaces it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::fd::OwnedFd;
use std::sync::{Arc, Mutex, MutexGuard};

use ipnetwork::IpNetwork;
use static_assertions::assert_impl_all;

use crate::errors::{EstablishError, IpRangeParseError};
use crate::ip_range::{AddressFamily, IpRange};
use crate::packet_dropper::{DropperMonitor, PacketDropper};
use crate::platform::{PlatformCapabilities, TunBuilder, TunBuilderFactory};
use crate::profile::VpnProfile;
use crate::route_policy::RouteSet;

const PLACEHOLDER_ADDRESSES: [(IpAddr, u8); 2] =
    [(IpAddr::V4(Ipv4Addr::new(172, 16, 252, 1)), 32), (IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0xfd02, 1)), 128)];

/// Set on the placeholder so DNS doesn't leak once it's replaced.
const PLACEHOLDER_DNS_SERVERS: [IpAddr; 2] =
    [IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), IpAddr::V6(Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888))];

struct Session {
    profile: Arc<VpnProfile>,
    builder: Box<dyn TunBuilder>,
    route_set: RouteSet,
    /// What `route_set` is reset to after each establish.
    initial_route_set: RouteSet,
    established: Option<RouteSet>,
}

#[derive(Default)]
struct AdapterState {
    session: Option<Session>,
    dropper: Option<PacketDropper>,
}

pub struct TunnelBuilderAdapter {
    state: Mutex<AdapterState>,
    factory: Arc<dyn TunBuilderFactory>,
    capabilities: PlatformCapabilities,
    owning_app_id: String,
}

assert_impl_all!(TunnelBuilderAdapter: Send, Sync);

impl TunnelBuilderAdapter {
    /// `capabilities` may be narrower than what `factory` reports, never wider.
    pub fn new(factory: Arc<dyn TunBuilderFactory>, capabilities: PlatformCapabilities, owning_app_id: String) -> Self {
        let capabilities = capabilities.intersect(factory.capabilities());
        Self { state: Default::default(), factory, capabilities, owning_app_id }
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap()
    }

    /// Starts a fresh builder and accumulator for `profile`. On error the previous profile stays in place.
    pub fn set_profile(&self, profile: Arc<VpnProfile>) -> Result<(), IpRangeParseError> {
        let route_set = RouteSet::new(&profile, &self.owning_app_id)?;
        let builder = self.factory.create(&profile.name);
        self.lock().session =
            Some(Session { profile, builder, initial_route_set: route_set.clone(), route_set, established: None });
        Ok(())
    }

    fn with_session(&self, f: impl FnOnce(&mut Session) -> bool) -> bool {
        match &mut self.lock().session {
            Some(session) => f(session),
            None => {
                tracing::warn!(message_id = "nB4sWq7e", "interface configuration received without a profile");
                false
            }
        }
    }

    pub fn add_address(&self, address: &str, prefix: i32) -> bool {
        let address = match parse_address(address).and_then(|addr| {
            let prefix = u8::try_from(prefix).ok()?;
            IpNetwork::new(addr, prefix).ok()
        }) {
            Some(address) => address,
            None => {
                tracing::warn!(message_id = "Ya9dXm2r", address, prefix, "rejecting invalid interface address");
                return false;
            }
        };
        self.with_session(|session| {
            session.route_set.add_address(address);
            true
        })
    }

    pub fn add_route(&self, address: &str, prefix: i32) -> bool {
        let route = match parse_address(address).and_then(|addr| IpRange::new(addr, u8::try_from(prefix).ok()?).ok()) {
            Some(route) => route,
            None => {
                tracing::warn!(message_id = "g2HcPv6x", address, prefix, "rejecting invalid route");
                return false;
            }
        };
        self.with_session(|session| {
            session.route_set.add_route(route);
            true
        })
    }

    pub fn add_dns_server(&self, address: &str) -> bool {
        let Some(server) = parse_address(address) else {
            tracing::warn!(message_id = "Kx8pTf1b", address, "rejecting invalid dns server");
            return false;
        };
        self.with_session(|session| match session.builder.add_dns_server(server) {
            Ok(()) => {
                session.route_set.add_dns_server(server);
                true
            }
            Err(error) => {
                tracing::warn!(message_id = "mZ0rWe5s", %server, ?error, "platform rejected dns server");
                false
            }
        })
    }

    pub fn add_search_domain(&self, domain: &str) -> bool {
        self.with_session(|session| match session.builder.add_search_domain(domain) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(message_id = "uJ3fBn9y", domain, ?error, "platform rejected search domain");
                false
            }
        })
    }

    pub fn set_mtu(&self, mtu: i32) -> bool {
        let Some(mtu) = u16::try_from(mtu).ok().filter(|&mtu| mtu > 0) else {
            tracing::warn!(message_id = "Vd6kLq3h", mtu, "rejecting invalid mtu");
            return false;
        };
        self.with_session(|session| {
            session.route_set.set_mtu(mtu);
            true
        })
    }

    /// Brings up the interface for everything recorded since the profile was set or the last establish.
    pub fn establish(&self) -> Result<OwnedFd, EstablishError> {
        let mut state = self.lock();
        let fd = self.establish_locked(&mut state)?;
        tracing::info!(message_id = "sH7cRz4m", "interface established");
        Ok(fd)
    }

    fn establish_locked(&self, state: &mut AdapterState) -> Result<OwnedFd, EstablishError> {
        let session = state.session.as_mut().ok_or(EstablishError::NoProfile)?;
        session.route_set.apply(session.builder.as_mut(), self.capabilities)?;
        let fd = session.builder.establish()?.ok_or(EstablishError::Declined)?;
        let established = session.route_set.clone();
        self.commit_established(state, established);
        Ok(fd)
    }

    /// Makes `established` the snapshot and restarts recording from the profile. A builder only establishes
    /// once, so a fresh one replaces it.
    fn commit_established(&self, state: &mut AdapterState, established: RouteSet) {
        if let Some(session) = state.session.as_mut() {
            session.builder = self.factory.create(&session.profile.name);
            session.route_set = session.initial_route_set.clone();
            session.established = Some(established);
        }
        if let Some(dropper) = state.dropper.take() {
            dropper.stop();
        }
    }

    /// Routes all traffic into an interface nobody reads from, except the dropper.
    ///
    /// The placeholder is built aside from the recording builder, so a failure leaves the session untouched.
    pub fn establish_blocking(&self) -> Result<(), EstablishError> {
        let mut state = self.lock();
        let session = state.session.as_ref().ok_or(EstablishError::NoProfile)?;
        let mut placeholder = session.initial_route_set.clone();
        for (address, prefix) in PLACEHOLDER_ADDRESSES {
            // Host prefixes are always valid.
            if let Ok(address) = IpNetwork::new(address, prefix) {
                placeholder.add_address(address);
            }
        }
        for family in AddressFamily::ALL {
            placeholder.add_route(family.whole_space());
        }
        let mut builder = self.factory.create(&session.profile.name);
        for server in PLACEHOLDER_DNS_SERVERS {
            builder.add_dns_server(server)?;
        }
        builder.set_blocking(true);
        placeholder.apply(builder.as_mut(), self.capabilities)?;
        let fd = builder.establish()?.ok_or(EstablishError::Declined)?;
        let mtu = placeholder.mtu();
        self.commit_established(&mut state, placeholder);
        let dropper = PacketDropper::start(fd, mtu).map_err(EstablishError::Dropper)?;
        state.dropper = Some(dropper);
        tracing::info!(message_id = "e5NwAj0p", mtu, "blocking placeholder established");
        Ok(())
    }

    /// Stops the dropper and closes the placeholder, if there is one.
    pub fn close_blocking(&self) {
        if let Some(dropper) = self.lock().dropper.take() {
            dropper.stop();
            tracing::info!(message_id = "Oq2yUb8k", "blocking placeholder closed");
        }
    }

    /// Rebuilds the last established interface on a fresh builder, without DNS servers or search domains.
    pub fn establish_no_dns(&self) -> Result<OwnedFd, EstablishError> {
        let state = self.lock();
        let session = state.session.as_ref().ok_or(EstablishError::NoProfile)?;
        let established = session.established.as_ref().ok_or(EstablishError::NothingEstablished)?;
        let mut builder = self.factory.create(&session.profile.name);
        established.apply(builder.as_mut(), self.capabilities)?;
        let fd = builder.establish()?.ok_or(EstablishError::Declined)?;
        tracing::info!(message_id = "Pi6gEv3t", "interface reestablished without dns");
        Ok(fd)
    }

    pub fn dropper_monitor(&self) -> Option<DropperMonitor> {
        self.lock().dropper.as_ref().map(PacketDropper::monitor)
    }
}

fn parse_address(address: &str) -> Option<IpAddr> {
    address.trim().parse().ok()
}
