use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use strum::{EnumIs, IntoStaticStr};

use crate::errors::IpRangeParseError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIs, IntoStaticStr, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub const ALL: [AddressFamily; 2] = [AddressFamily::Ipv4, AddressFamily::Ipv6];

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    pub const fn bits(self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }

    /// The `/0` block of this family.
    pub fn whole_space(self) -> IpRange {
        match self {
            Self::Ipv4 => IpRange { base: Ipv4Addr::UNSPECIFIED.into(), prefix: 0 },
            Self::Ipv6 => IpRange { base: Ipv6Addr::UNSPECIFIED.into(), prefix: 0 },
        }
    }

    pub(crate) fn from_bits(self, bits: u128) -> IpAddr {
        match self {
            // Callers only pass values from the IPv4 space here.
            Self::Ipv4 => Ipv4Addr::from(bits as u32).into(),
            Self::Ipv6 => Ipv6Addr::from(bits).into(),
        }
    }
}

pub(crate) fn addr_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(addr) => u128::from(u32::from(*addr)),
        IpAddr::V6(addr) => u128::from(*addr),
    }
}

/// All-ones in the lowest `host_bits` bits.
pub(crate) fn host_mask(host_bits: u32) -> u128 {
    if host_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    }
}

/// A CIDR block. The base address never has host bits set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpRange {
    base: IpAddr,
    prefix: u8,
}

impl IpRange {
    /// Host bits of `addr` are cleared, so `10.1.2.3/8` becomes `10.0.0.0/8`.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, IpRangeParseError> {
        IpNetwork::new(addr, prefix)
            .map(Self::from)
            .map_err(|_| IpRangeParseError::InvalidPrefix(format!("{addr}/{prefix}")))
    }

    pub fn host(addr: IpAddr) -> Self {
        Self { base: addr, prefix: AddressFamily::of(&addr).bits() }
    }

    pub fn base(&self) -> IpAddr {
        self.base
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.base)
    }

    pub fn is_multicast(&self) -> bool {
        self.base.is_multicast()
    }

    pub(crate) fn first_bits(&self) -> u128 {
        addr_bits(&self.base)
    }

    pub(crate) fn last_bits(&self) -> u128 {
        self.first_bits() | host_mask(u32::from(self.family().bits() - self.prefix))
    }

    pub(crate) fn from_bits(family: AddressFamily, base: u128, prefix: u8) -> Self {
        Self { base: family.from_bits(base), prefix }
    }
}

impl From<IpNetwork> for IpRange {
    fn from(network: IpNetwork) -> Self {
        Self { base: network.network(), prefix: network.prefix() }
    }
}

impl FromStr for IpRange {
    type Err = IpRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr = addr.parse::<IpAddr>().map_err(|_| IpRangeParseError::InvalidAddress(s.to_string()))?;
                let prefix = prefix.parse::<u8>().map_err(|_| IpRangeParseError::InvalidPrefix(s.to_string()))?;
                Self::new(addr, prefix).map_err(|_| IpRangeParseError::InvalidPrefix(s.to_string()))
            }
            None => s.parse::<IpAddr>().map(Self::host).map_err(|_| IpRangeParseError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

impl Serialize for IpRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IpRange {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
