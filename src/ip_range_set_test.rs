use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;

use crate::errors::IpRangeParseError;
use crate::ip_range::IpRange;
use crate::ip_range_set::IpRangeSet;

fn set(s: &str) -> IpRangeSet {
    s.parse().unwrap()
}

fn subnets(set: &IpRangeSet) -> Vec<String> {
    set.subnets().iter().map(ToString::to_string).collect()
}

fn covers(range: &IpRange, addr: IpAddr) -> bool {
    IpNetwork::new(range.base(), range.prefix()).unwrap().contains(addr)
}

fn covered(set: &IpRangeSet, addr: &str) -> bool {
    let addr = addr.parse().unwrap();
    set.subnets().iter().any(|block| covers(block, addr))
}

#[test]
fn empty() {
    let empty = set("  ");
    assert!(empty.is_empty());
    assert_eq!(empty.len(), 0);
    assert!(empty.subnets().is_empty());
    assert_eq!(empty.to_string(), "");
}

#[test]
fn siblings_merge() {
    let merged = set("10.0.0.0/25 10.0.0.128/25");
    assert_eq!(subnets(&merged), ["10.0.0.0/24"]);
    assert_eq!(merged.len(), 1);
}

#[test]
fn subsets_are_absorbed() {
    let merged = set("10.1.2.0/24 10.0.0.0/8 10.200.0.1");
    assert_eq!(subnets(&merged), ["10.0.0.0/8"]);
}

#[test]
fn adjacent_non_siblings_stay_separate_blocks() {
    // contiguous, but 10.0.1.0/24 + 10.0.2.0/24 is not a single CIDR block
    let merged = set("10.0.1.0/24 10.0.2.0/24");
    assert_eq!(merged.len(), 1);
    assert_eq!(subnets(&merged), ["10.0.1.0/24", "10.0.2.0/24"]);
}

#[test]
fn subtract_hole() {
    let mut ranges = set("10.0.0.0/8");
    ranges.remove(&set("10.1.0.0/16"));
    assert_eq!(
        subnets(&ranges),
        [
            "10.0.0.0/16",
            "10.2.0.0/15",
            "10.4.0.0/14",
            "10.8.0.0/13",
            "10.16.0.0/12",
            "10.32.0.0/11",
            "10.64.0.0/10",
            "10.128.0.0/9"
        ]
    );
    assert!(!covered(&ranges, "10.1.2.3"));
    assert!(covered(&ranges, "10.2.0.1"));
}

#[test]
fn subtract_self_is_empty() {
    for s in ["10.0.0.0/8 192.168.0.0/16 fd00::/8", "0.0.0.0/0", "::/0", "1.2.3.4", "::1", ""] {
        let mut ranges = set(s);
        ranges.remove(&set(s));
        assert!(ranges.is_empty(), "{s}");
    }
}

#[test]
fn subtract_empty_is_canonical() {
    let mut ranges = set("10.0.0.128/25 10.0.0.0/25 10.0.0.7 fd00::/9 fd80::/9");
    ranges.remove(&IpRangeSet::new());
    assert_eq!(subnets(&ranges), ["10.0.0.0/24", "fd00::/8"]);
}

#[test]
fn whole_space() {
    let mut v4 = set("0.0.0.0/0");
    assert_eq!(subnets(&v4), ["0.0.0.0/0"]);
    v4.remove(&set("0.0.0.0/1"));
    assert_eq!(subnets(&v4), ["128.0.0.0/1"]);
    v4.remove(&set("255.255.255.255"));
    assert_eq!(subnets(&v4).last().map(String::as_str), Some("255.255.255.254/32"));
    assert_eq!(subnets(&v4).len(), 31);

    let mut v6 = set("::/0");
    assert_eq!(subnets(&v6), ["::/0"]);
    v6.remove(&set("::/1"));
    assert_eq!(subnets(&v6), ["8000::/1"]);
    v6.add("::/1".parse().unwrap());
    assert_eq!(subnets(&v6), ["::/0"]);
}

#[test]
fn single_hosts() {
    let mut hosts = set("192.168.1.1 192.168.1.2");
    assert_eq!(subnets(&hosts), ["192.168.1.1/32", "192.168.1.2/32"]);
    hosts.add("192.168.1.0".parse().unwrap());
    hosts.add("192.168.1.3".parse().unwrap());
    assert_eq!(subnets(&hosts), ["192.168.1.0/30"]);
    hosts.remove_range("192.168.1.2/32".parse().unwrap());
    assert_eq!(subnets(&hosts), ["192.168.1.0/31", "192.168.1.3/32"]);

    let v6 = set("fd00::1/128");
    assert_eq!(subnets(&v6), ["fd00::1/128"]);
}

#[test]
fn interval_items() {
    assert_eq!(subnets(&set("10.0.0.1-10.0.0.6")), ["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31", "10.0.0.6/32"]);
    assert_eq!(subnets(&set("fd00::-fd00::ffff")), ["fd00::/112"]);
    assert!(matches!("10.0.0.1-fd00::1".parse::<IpRangeSet>(), Err(IpRangeParseError::MixedFamilies(_))));
    assert!(matches!("10.0.0.9-10.0.0.1".parse::<IpRangeSet>(), Err(IpRangeParseError::Reversed(_))));
    assert!(matches!("10.0.0.9-nope".parse::<IpRangeSet>(), Err(IpRangeParseError::InvalidAddress(_))));
}

#[test]
fn families_never_interact() {
    let mut ranges = set("0.0.0.0/0 ::/0");
    ranges.remove(&set("::/0"));
    assert_eq!(subnets(&ranges), ["0.0.0.0/0"]);
    ranges.add_all(&set("2001:db8::/32"));
    assert_eq!(subnets(&ranges), ["0.0.0.0/0", "2001:db8::/32"]);
    assert_eq!(subnets(&ranges.family(crate::ip_range::AddressFamily::Ipv6)), ["2001:db8::/32"]);
}

#[test]
fn display_round_trips_through_parse() {
    let ranges = set("10.0.0.0/8 172.16.0.0/12 fd00::/8");
    assert_eq!(ranges.to_string(), "10.0.0.0/8 172.16.0.0/12 fd00::/8");
    assert_eq!(set(&ranges.to_string()), ranges);
}

// Compares random add/remove sequences inside 10.0.0.0/24 against a bitmap model.
#[test]
fn random_sequences_stay_minimal() {
    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };
    for _ in 0..200 {
        let mut ranges = IpRangeSet::new();
        let mut model = [false; 256];
        for _ in 0..12 {
            let prefix = 24 + (next() % 9) as u8;
            let offset = (next() % 256) as u8;
            let range = IpRange::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, offset)), prefix).unwrap();
            let add = next() % 3 != 0;
            for host in 0..=255u8 {
                if covers(&range, IpAddr::V4(Ipv4Addr::new(10, 0, 0, host))) {
                    model[usize::from(host)] = add;
                }
            }
            if add {
                ranges.add(range);
            } else {
                ranges.remove_range(range);
            }
        }

        let blocks = ranges.subnets();
        for host in 0..=255u8 {
            let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, host));
            let covering = blocks.iter().filter(|block| covers(block, addr)).count();
            assert_eq!(covering, usize::from(model[usize::from(host)]), "{addr} in {blocks:?}");
        }
        for pair in blocks.windows(2) {
            assert!(pair[0].base() < pair[1].base());
            // mergeable siblings would share the parent prefix
            let same_parent = pair[0].prefix() == pair[1].prefix()
                && pair[0].prefix() > 0
                && IpRange::new(pair[0].base(), pair[0].prefix() - 1).unwrap() == IpRange::new(pair[1].base(), pair[1].prefix() - 1).unwrap();
            assert!(!same_parent, "{blocks:?} is not minimal");
        }
    }
}
