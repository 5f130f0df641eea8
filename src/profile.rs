use std::collections::BTreeSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use crate::errors::IpRangeParseError;
use crate::ip_range_set::IpRangeSet;

bitflags! {
    /// Traffic of a blocked family never leaves the device outside the tunnel.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SplitTunneling: u8 {
        const BLOCK_IPV4 = 1;
        const BLOCK_IPV6 = 1 << 1;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ProfileFlags: u32 {
        const SUPPRESS_CERT_REQS = 1;
        const DISABLE_CRL = 1 << 1;
        const DISABLE_OCSP = 1 << 2;
        const STRICT_REVOCATION = 1 << 3;
        const RSA_PSS = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectedAppsHandling {
    #[default]
    Disabled,
    /// Listed apps bypass the tunnel.
    Exclude,
    /// Only listed apps use the tunnel.
    Only,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum VpnType {
    #[default]
    #[strum(serialize = "ikev2-eap")]
    #[serde(rename = "ikev2-eap")]
    Ikev2Eap,
    #[strum(serialize = "ikev2-cert")]
    #[serde(rename = "ikev2-cert")]
    Ikev2Cert,
    #[strum(serialize = "ikev2-cert-eap")]
    #[serde(rename = "ikev2-cert-eap")]
    Ikev2CertEap,
    #[strum(serialize = "ikev2-eap-tls")]
    #[serde(rename = "ikev2-eap-tls")]
    Ikev2EapTls,
    #[strum(serialize = "ikev2-byod-eap")]
    #[serde(rename = "ikev2-byod-eap")]
    Ikev2ByodEap,
}

impl VpnType {
    pub fn identifier(self) -> &'static str {
        self.into()
    }

    pub fn requires_password(self) -> bool {
        matches!(self, Self::Ikev2Eap | Self::Ikev2CertEap | Self::Ikev2ByodEap)
    }

    pub fn requires_certificate(self) -> bool {
        matches!(self, Self::Ikev2Cert | Self::Ikev2CertEap | Self::Ikev2EapTls)
    }
}

/// Connection profile as handed over by the app. Never modified by this crate.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VpnProfile {
    pub name: String,
    pub gateway: String,
    pub port: Option<u16>,
    pub vpn_type: VpnType,
    pub username: Option<String>,
    pub password: Option<String>,
    pub certificate_alias: Option<String>,
    pub local_id: Option<String>,
    pub remote_id: Option<String>,
    pub ike_proposal: Option<String>,
    pub esp_proposal: Option<String>,
    pub mtu: Option<u16>,
    pub nat_keepalive: Option<u32>,
    pub flags: ProfileFlags,
    pub included_subnets: Option<String>,
    pub excluded_subnets: Option<String>,
    pub split_tunneling: SplitTunneling,
    pub selected_apps_handling: SelectedAppsHandling,
    pub selected_apps: BTreeSet<String>,
}

impl VpnProfile {
    pub fn included_subnets(&self) -> Result<IpRangeSet, IpRangeParseError> {
        self.included_subnets.as_deref().unwrap_or_default().parse()
    }

    pub fn excluded_subnets(&self) -> Result<IpRangeSet, IpRangeParseError> {
        self.excluded_subnets.as_deref().unwrap_or_default().parse()
    }

    /// Profiles of password based types can be saved without one, e.g. for always-on VPN.
    pub fn is_missing_password(&self) -> bool {
        self.vpn_type.requires_password() && self.password.is_none()
    }
}
