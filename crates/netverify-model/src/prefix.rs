//! IPv4 addresses, prefixes and destination header spaces.
//!
//! Addresses are plain `u32`s so that the encoder can treat prefix
//! membership as an integer range check.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// An IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ip(u32);

impl Ip {
    pub const MAX: Ip = Ip(u32::MAX);

    pub const fn new(bits: u32) -> Self {
        Ip(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }

    /// Convert a solver integer back into an address, if it is in range.
    pub fn from_i64(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(Ip)
    }
}

impl fmt::Display for Ip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0.to_be_bytes();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

impl FromStr for Ip {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');
        for octet in &mut octets {
            *octet = parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(|| ModelError::InvalidIp(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ModelError::InvalidIp(s.to_string()));
        }
        Ok(Ip(u32::from_be_bytes(octets)))
    }
}

impl TryFrom<String> for Ip {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ip> for String {
    fn from(ip: Ip) -> Self {
        ip.to_string()
    }
}

/// An address with a prefix length. Interface prefixes keep their host
/// bits; [`Prefix::network`] strips them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix {
    address: Ip,
    length: u8,
}

/// Netmask bits for a prefix length in `0..=32`.
pub fn mask(length: u8) -> u32 {
    if length == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(length.min(32)))
    }
}

impl Prefix {
    pub fn new(address: Ip, length: u8) -> Result<Self, ModelError> {
        if length > 32 {
            return Err(ModelError::InvalidPrefix(format!("{address}/{length}")));
        }
        Ok(Self { address, length })
    }

    /// A host prefix (`/32`).
    pub fn host(address: Ip) -> Self {
        Self {
            address,
            length: 32,
        }
    }

    pub fn address(&self) -> Ip {
        self.address
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn network(&self) -> Prefix {
        Prefix {
            address: Ip(self.address.0 & mask(self.length)),
            length: self.length,
        }
    }

    /// First address of the range, inclusive.
    pub fn first(&self) -> Ip {
        Ip(self.address.0 & mask(self.length))
    }

    /// Last address of the range, inclusive.
    pub fn last(&self) -> Ip {
        Ip(self.first().0 | !mask(self.length))
    }

    pub fn contains(&self, ip: Ip) -> bool {
        self.first() <= ip && ip <= self.last()
    }

    /// True when every address of `other` is also in `self`.
    pub fn contains_prefix(&self, other: &Prefix) -> bool {
        other.length >= self.length && self.contains(other.address)
    }

    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.length)
    }
}

impl FromStr for Prefix {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, len)) => {
                let address = addr
                    .parse::<Ip>()
                    .map_err(|_| ModelError::InvalidPrefix(s.to_string()))?;
                let length = len
                    .parse::<u8>()
                    .map_err(|_| ModelError::InvalidPrefix(s.to_string()))?;
                Prefix::new(address, length)
            }
            None => Ok(Prefix::host(
                s.parse::<Ip>()
                    .map_err(|_| ModelError::InvalidPrefix(s.to_string()))?,
            )),
        }
    }
}

impl TryFrom<String> for Prefix {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Prefix> for String {
    fn from(prefix: Prefix) -> Self {
        prefix.to_string()
    }
}

/// Smallest list of prefixes covering exactly the inclusive range `lo..=hi`.
pub fn range_to_prefixes(lo: Ip, hi: Ip) -> Vec<Prefix> {
    let mut out = Vec::new();
    if lo > hi {
        return out;
    }
    let mut start = u64::from(lo.bits());
    let end = u64::from(hi.bits());
    while start <= end {
        let mut length: u8 = 32;
        while length > 0 {
            let size = 1u64 << (32 - u32::from(length - 1));
            if start % size != 0 || start + size - 1 > end {
                break;
            }
            length -= 1;
        }
        out.push(Prefix {
            address: Ip(start as u32),
            length,
        });
        start += 1u64 << (32 - u32::from(length));
    }
    out
}

/// Destination addresses a question is about.
///
/// An empty `dst_ips` list means "any destination".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSpace {
    #[serde(default)]
    pub dst_ips: Vec<Prefix>,
    #[serde(default)]
    pub not_dst_ips: Vec<Prefix>,
}

impl HeaderSpace {
    pub fn new(dst_ips: Vec<Prefix>) -> Self {
        Self {
            dst_ips,
            not_dst_ips: Vec::new(),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.dst_ips.is_empty() && self.not_dst_ips.is_empty()
    }

    pub fn contains(&self, ip: Ip) -> bool {
        let included = self.dst_ips.is_empty() || self.dst_ips.iter().any(|p| p.contains(ip));
        included && !self.not_dst_ips.iter().any(|p| p.contains(ip))
    }

    pub fn clear(&mut self) {
        self.dst_ips.clear();
        self.not_dst_ips.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pfx(s: &str) -> Prefix {
        s.parse().expect("valid prefix literal")
    }

    #[test]
    fn parses_and_prints_dotted_quads() {
        let p = pfx("10.1.2.3/24");
        assert_eq!(p.to_string(), "10.1.2.3/24");
        assert_eq!(p.network().to_string(), "10.1.2.0/24");
        assert_eq!(p.first().to_string(), "10.1.2.0");
        assert_eq!(p.last().to_string(), "10.1.2.255");
        assert_eq!(pfx("1.1.1.1"), Prefix::host("1.1.1.1".parse().expect("ip")));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!("10.0.0".parse::<Ip>().is_err());
        assert!("10.0.0.256".parse::<Ip>().is_err());
        assert!("10.0.0.1.5".parse::<Ip>().is_err());
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("10.0.0.0/x".parse::<Prefix>().is_err());
    }

    #[test]
    fn default_route_covers_everything() {
        let p = pfx("0.0.0.0/0");
        assert_eq!(p.first(), Ip::new(0));
        assert_eq!(p.last(), Ip::MAX);
        assert!(p.contains_prefix(&pfx("192.168.0.0/16")));
    }

    #[test]
    fn header_space_exclusions_win() {
        let hs = HeaderSpace {
            dst_ips: vec![pfx("10.0.0.0/24")],
            not_dst_ips: vec![pfx("10.0.0.1/32")],
        };
        assert!(hs.contains("10.0.0.2".parse().expect("ip")));
        assert!(!hs.contains("10.0.0.1".parse().expect("ip")));
        assert!(!hs.contains("10.0.1.1".parse().expect("ip")));
        assert!(HeaderSpace::default().contains(Ip::MAX));
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&pfx("192.168.1.0/24")).expect("serialize");
        assert_eq!(json, "\"192.168.1.0/24\"");
        let back: Prefix = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, pfx("192.168.1.0/24"));
        assert!(serde_json::from_str::<Ip>("\"300.1.1.1\"").is_err());
    }

    #[test]
    fn range_cover_of_unaligned_span() {
        let cover = range_to_prefixes("10.0.0.1".parse().expect("ip"), "10.0.0.6".parse().expect("ip"));
        let printed: Vec<String> = cover.iter().map(ToString::to_string).collect();
        assert_eq!(
            printed,
            vec!["10.0.0.1/32", "10.0.0.2/31", "10.0.0.4/31", "10.0.0.6/32"]
        );
        assert_eq!(range_to_prefixes(Ip::new(0), Ip::MAX), vec![pfx("0.0.0.0/0")]);
    }

    proptest! {
        #[test]
        fn contains_matches_range_bounds(addr in any::<u32>(), len in 0u8..=32, other in any::<u32>()) {
            let p = Prefix::new(Ip::new(addr), len).expect("length in range");
            let other = Ip::new(other);
            prop_assert_eq!(p.contains(other), p.first() <= other && other <= p.last());
            prop_assert!(p.contains(p.address()));
            prop_assert_eq!(p.network().network(), p.network());
        }

        #[test]
        fn range_cover_is_exact_and_disjoint(a in any::<u32>(), b in any::<u32>()) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let cover = range_to_prefixes(Ip::new(lo), Ip::new(hi));
            prop_assert!(!cover.is_empty());
            prop_assert_eq!(cover[0].first(), Ip::new(lo));
            prop_assert_eq!(cover[cover.len() - 1].last(), Ip::new(hi));
            for pair in cover.windows(2) {
                prop_assert_eq!(u64::from(pair[0].last().bits()) + 1, u64::from(pair[1].first().bits()));
            }
            prop_assert!(cover.len() <= 62);
        }
    }
}
