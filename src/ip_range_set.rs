//! Sets of IP addresses with exact union/difference and minimal CIDR decomposition.
//!
//! Each family is stored as sorted, disjoint, non-adjacent inclusive intervals. Because the
//! intervals are maximal, greedily cutting each one into aligned blocks yields the unique
//! minimal CIDR cover of the set.

use std::cmp::{max, min};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::errors::IpRangeParseError;
use crate::ip_range::{AddressFamily, IpRange, addr_bits, host_mask};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Span {
    first: u128,
    last: u128,
}

impl From<IpRange> for Span {
    fn from(range: IpRange) -> Self {
        Self { first: range.first_bits(), last: range.last_bits() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IpRangeSet {
    v4: Vec<Span>,
    v6: Vec<Span>,
}

impl IpRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, range: IpRange) {
        insert(self.spans_mut(range.family()), range.into());
    }

    pub fn add_all(&mut self, other: &IpRangeSet) {
        for family in AddressFamily::ALL {
            for &span in other.spans(family) {
                insert(self.spans_mut(family), span);
            }
        }
    }

    /// Removes every address of `other` from this set.
    pub fn remove(&mut self, other: &IpRangeSet) {
        for family in AddressFamily::ALL {
            for &span in other.spans(family) {
                subtract(self.spans_mut(family), span);
            }
        }
    }

    pub fn remove_range(&mut self, range: IpRange) {
        subtract(self.spans_mut(range.family()), range.into());
    }

    /// Number of maximal contiguous address ranges in the set.
    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Copy of the set restricted to one family.
    pub fn family(&self, family: AddressFamily) -> IpRangeSet {
        let mut set = IpRangeSet::new();
        *set.spans_mut(family) = self.spans(family).to_vec();
        set
    }

    /// Minimal CIDR cover, IPv4 blocks first, each family in ascending address order.
    pub fn subnets(&self) -> Vec<IpRange> {
        let mut subnets = Vec::new();
        for family in AddressFamily::ALL {
            for span in self.spans(family) {
                decompose(family, *span, &mut subnets);
            }
        }
        subnets
    }

    fn spans(&self, family: AddressFamily) -> &[Span] {
        match family {
            AddressFamily::Ipv4 => &self.v4,
            AddressFamily::Ipv6 => &self.v6,
        }
    }

    fn spans_mut(&mut self, family: AddressFamily) -> &mut Vec<Span> {
        match family {
            AddressFamily::Ipv4 => &mut self.v4,
            AddressFamily::Ipv6 => &mut self.v6,
        }
    }

    fn add_interval(&mut self, from: IpAddr, to: IpAddr, item: &str) -> Result<(), IpRangeParseError> {
        let family = AddressFamily::of(&from);
        if family != AddressFamily::of(&to) {
            return Err(IpRangeParseError::MixedFamilies(item.to_string()));
        }
        let span = Span { first: addr_bits(&from), last: addr_bits(&to) };
        if span.first > span.last {
            return Err(IpRangeParseError::Reversed(item.to_string()));
        }
        insert(self.spans_mut(family), span);
        Ok(())
    }
}

fn insert(spans: &mut Vec<Span>, mut new: Span) {
    let mut merged = Vec::with_capacity(spans.len() + 1);
    let mut placed = false;
    for span in spans.drain(..) {
        if span.last.saturating_add(1) < new.first {
            merged.push(span);
        } else if new.last.saturating_add(1) < span.first {
            if !placed {
                merged.push(new);
                placed = true;
            }
            merged.push(span);
        } else {
            // overlapping or adjacent
            new = Span { first: min(span.first, new.first), last: max(span.last, new.last) };
        }
    }
    if !placed {
        merged.push(new);
    }
    *spans = merged;
}

fn subtract(spans: &mut Vec<Span>, cut: Span) {
    let mut remaining = Vec::with_capacity(spans.len() + 1);
    for span in spans.drain(..) {
        if span.last < cut.first || span.first > cut.last {
            remaining.push(span);
            continue;
        }
        if span.first < cut.first {
            remaining.push(Span { first: span.first, last: cut.first - 1 });
        }
        if span.last > cut.last {
            remaining.push(Span { first: cut.last + 1, last: span.last });
        }
    }
    *spans = remaining;
}

fn decompose(family: AddressFamily, span: Span, out: &mut Vec<IpRange>) {
    let bits = u32::from(family.bits());
    let mut start = span.first;
    loop {
        let mut host_bits = start.trailing_zeros().min(bits);
        // `start` is aligned to 2^host_bits, so `start | mask` can't overflow.
        while host_bits > 0 && (start | host_mask(host_bits)) > span.last {
            host_bits -= 1;
        }
        let end = start | host_mask(host_bits);
        out.push(IpRange::from_bits(family, start, (bits - host_bits) as u8));
        if end >= span.last {
            break;
        }
        start = end + 1;
    }
}

impl Extend<IpRange> for IpRangeSet {
    fn extend<I: IntoIterator<Item = IpRange>>(&mut self, iter: I) {
        for range in iter {
            self.add(range);
        }
    }
}

impl FromIterator<IpRange> for IpRangeSet {
    fn from_iter<I: IntoIterator<Item = IpRange>>(iter: I) -> Self {
        let mut set = IpRangeSet::new();
        set.extend(iter);
        set
    }
}

/// Whitespace separated `addr/prefix`, `addr` or `from-to` items. Blank input is the empty set.
impl FromStr for IpRangeSet {
    type Err = IpRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = IpRangeSet::new();
        for item in s.split_whitespace() {
            match item.split_once('-') {
                Some((from, to)) => {
                    let from = from.parse::<IpAddr>().map_err(|_| IpRangeParseError::InvalidAddress(item.to_string()))?;
                    let to = to.parse::<IpAddr>().map_err(|_| IpRangeParseError::InvalidAddress(item.to_string()))?;
                    set.add_interval(from, to, item)?;
                }
                None => set.add(item.parse()?),
            }
        }
        Ok(set)
    }
}

impl fmt::Display for IpRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for subnet in self.subnets() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "{subnet}")?;
        }
        Ok(())
    }
}
