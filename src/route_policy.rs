//! Derives the interface configuration for one establish attempt.
//!
//! `RouteSet` accumulates what the negotiation engine learns (addresses, pushed routes, DNS
//! servers, MTU) on top of the profile's split-tunneling settings, and `RouteSet::apply`
//! turns the result into platform builder calls. The per-family decision itself is the pure
//! `plan_family`, the per-app decision the pure `AppScope::new`.

use std::collections::BTreeSet;
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::errors::{BuilderError, EstablishError, IpRangeParseError};
use crate::ip_range::{AddressFamily, IpRange};
use crate::ip_range_set::IpRangeSet;
use crate::platform::{PlatformCapabilities, TunBuilder};
use crate::profile::{SelectedAppsHandling, SplitTunneling, VpnProfile};

/// Used until the engine sets one, and for the placeholder interface.
pub const DEFAULT_MTU: u16 = 1500;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FamilyPlan {
    pub routes: Vec<IpRange>,
    /// Let this family's traffic use the underlying network instead of the tunnel.
    pub bypass: bool,
}

/// Routing decision for one address family. `included` and `pushed` may contain other families, they are ignored.
pub fn plan_family(
    family: AddressFamily,
    block: bool,
    seen: bool,
    included: &IpRangeSet,
    excluded: &IpRangeSet,
    pushed: &IpRangeSet,
) -> FamilyPlan {
    match (block, seen) {
        (false, true) => {
            let included = included.family(family);
            let mut ranges = if included.is_empty() { pushed.family(family) } else { included };
            ranges.remove(excluded);
            FamilyPlan { routes: ranges.subnets(), bypass: false }
        }
        (false, false) => FamilyPlan { routes: Vec::new(), bypass: true },
        (true, true) => FamilyPlan { routes: vec![family.whole_space()], bypass: false },
        // Without an address of this family there is nothing to route it to, so no route blocks it.
        (true, false) => FamilyPlan::default(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppScope {
    /// Never `Disabled`.
    pub handling: SelectedAppsHandling,
    pub apps: BTreeSet<String>,
}

impl AppScope {
    /// Our own app always bypasses the tunnel, otherwise certificate fetches during negotiation would be routed into it.
    pub fn new(handling: SelectedAppsHandling, selected: &BTreeSet<String>, owning_app_id: &str) -> Self {
        let mut apps = selected.clone();
        let handling = match handling {
            SelectedAppsHandling::Disabled => {
                apps.clear();
                apps.insert(owning_app_id.to_string());
                SelectedAppsHandling::Exclude
            }
            SelectedAppsHandling::Exclude => {
                apps.insert(owning_app_id.to_string());
                SelectedAppsHandling::Exclude
            }
            SelectedAppsHandling::Only => {
                apps.remove(owning_app_id);
                SelectedAppsHandling::Only
            }
        };
        Self { handling, apps }
    }
}

/// Per-attempt accumulator. A fresh one is derived from the profile for every establish attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSet {
    addresses: Vec<IpNetwork>,
    pushed_routes: IpRangeSet,
    included: IpRangeSet,
    excluded: IpRangeSet,
    split_tunneling: SplitTunneling,
    app_scope: AppScope,
    dns_servers: Vec<IpAddr>,
    mtu: u16,
    ipv4_seen: bool,
    ipv6_seen: bool,
}

impl RouteSet {
    pub fn new(profile: &VpnProfile, owning_app_id: &str) -> Result<Self, IpRangeParseError> {
        Ok(Self {
            addresses: Vec::new(),
            pushed_routes: IpRangeSet::new(),
            included: profile.included_subnets()?,
            excluded: profile.excluded_subnets()?,
            split_tunneling: profile.split_tunneling,
            app_scope: AppScope::new(profile.selected_apps_handling, &profile.selected_apps, owning_app_id),
            dns_servers: Vec::new(),
            mtu: profile.mtu.unwrap_or(DEFAULT_MTU),
            ipv4_seen: false,
            ipv6_seen: false,
        })
    }

    pub fn add_address(&mut self, address: IpNetwork) {
        self.addresses.push(address);
        self.record_address_family(address.ip());
    }

    pub fn add_route(&mut self, route: IpRange) {
        self.pushed_routes.add(route);
    }

    pub fn add_dns_server(&mut self, server: IpAddr) {
        self.dns_servers.push(server);
        self.record_address_family(server);
    }

    pub fn set_mtu(&mut self, mtu: u16) {
        self.mtu = mtu;
    }

    pub fn record_address_family(&mut self, addr: IpAddr) {
        match AddressFamily::of(&addr) {
            AddressFamily::Ipv4 => self.ipv4_seen = true,
            AddressFamily::Ipv6 => self.ipv6_seen = true,
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn dns_servers(&self) -> &[IpAddr] {
        &self.dns_servers
    }

    pub fn app_scope(&self) -> &AppScope {
        &self.app_scope
    }

    pub fn plan(&self, family: AddressFamily) -> FamilyPlan {
        let (block, seen) = match family {
            AddressFamily::Ipv4 => (self.split_tunneling.contains(SplitTunneling::BLOCK_IPV4), self.ipv4_seen),
            AddressFamily::Ipv6 => (self.split_tunneling.contains(SplitTunneling::BLOCK_IPV6), self.ipv6_seen),
        };
        plan_family(family, block, seen, &self.included, &self.excluded, &self.pushed_routes)
    }

    /// Everything except DNS servers and search domains, which go to the live builder directly.
    pub fn apply(&self, builder: &mut dyn TunBuilder, capabilities: PlatformCapabilities) -> Result<(), EstablishError> {
        for address in &self.addresses {
            builder.add_address(address.ip(), address.prefix())?;
        }

        for family in AddressFamily::ALL {
            let FamilyPlan { routes, bypass } = self.plan(family);
            for route in routes {
                match builder.add_route(route.base(), route.prefix()) {
                    Ok(()) => {}
                    // Some platforms refuse multicast routes; that traffic isn't tunneled then.
                    Err(error) if route.is_multicast() => {
                        tracing::warn!(message_id = "Qm3vTbXe", %route, ?error, "ignoring rejected multicast route");
                    }
                    Err(error) => return Err(EstablishError::RouteRejected { route, error }),
                }
            }
            if bypass && capabilities.family_bypass {
                builder.allow_family(family)?;
            }
        }

        // An empty include-only list applies no scoping at all, so every app is tunneled.
        if capabilities.per_app_scoping && !self.app_scope.apps.is_empty() {
            for app in &self.app_scope.apps {
                let result = match self.app_scope.handling {
                    SelectedAppsHandling::Exclude => builder.add_disallowed_application(app),
                    SelectedAppsHandling::Only => builder.add_allowed_application(app),
                    SelectedAppsHandling::Disabled => Ok(()),
                };
                match result {
                    Ok(()) => {}
                    Err(BuilderError::UnknownApplication(app)) => {
                        tracing::info!(message_id = "u8Wd2NfK", app, "skipping application that is not installed");
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        }

        builder.set_mtu(self.mtu)?;
        Ok(())
    }
}
