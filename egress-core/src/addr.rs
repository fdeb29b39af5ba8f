//! Host and endpoint address value types with their textual forms.
//!
//! IPv6 hosts are always bracketed in text, so `<host>:<port>` stays
//! unambiguous: the port is whatever follows the last `:` outside the
//! brackets.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Address family of a host address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Bit used in balancer family masks: bit 0 selects IPv4, bit 1 IPv6.
    pub const fn bit(self) -> u8 {
        match self {
            Family::V4 => 1 << 0,
            Family::V6 => 1 << 1,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::V4 => "inet",
            Family::V6 => "inet6",
        })
    }
}

/// A host address: four octets or sixteen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl HostAddr {
    pub fn family(&self) -> Family {
        match self {
            HostAddr::V4(_) => Family::V4,
            HostAddr::V6(_) => Family::V6,
        }
    }

    pub fn to_ip(self) -> IpAddr {
        match self {
            HostAddr::V4(ip) => IpAddr::V4(ip),
            HostAddr::V6(ip) => IpAddr::V6(ip),
        }
    }
}

impl From<IpAddr> for HostAddr {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(ip) => HostAddr::V4(ip),
            IpAddr::V6(ip) => HostAddr::V6(ip),
        }
    }
}

impl FromStr for HostAddr {
    type Err = Error;

    /// Leading whitespace is skipped. `[...]` selects IPv6; anything else
    /// must be a dotted quad.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_start();
        if let Some(inner) = trimmed.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(|| Error::parse(s))?;
            let ip: Ipv6Addr = inner.parse().map_err(|_| Error::parse(s))?;
            Ok(HostAddr::V6(ip))
        } else {
            let ip: Ipv4Addr = trimmed.parse().map_err(|_| Error::parse(s))?;
            Ok(HostAddr::V4(ip))
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAddr::V4(ip) => write!(f, "{ip}"),
            HostAddr::V6(ip) => fmt_v6(ip, f),
        }
    }
}

/// Bracketed IPv6 form: lowercase hex, no leading zeros per group, `::`
/// over the longest all-zero run (length >= 1, earliest run wins ties).
fn fmt_v6(ip: &Ipv6Addr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let groups = ip.segments();

    let mut best: Option<(usize, usize)> = None;
    let mut run: Option<(usize, usize)> = None;
    for (i, group) in groups.iter().enumerate() {
        if *group == 0 {
            let (pos, len) = run.map_or((i, 0), |r| r);
            run = Some((pos, len + 1));
            if best.map_or(true, |(_, best_len)| len + 1 > best_len) {
                best = Some((pos, len + 1));
            }
        } else {
            run = None;
        }
    }

    f.write_str("[")?;
    match best {
        Some((pos, len)) => {
            for (i, group) in groups.iter().take(pos).enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{group:x}")?;
            }
            f.write_str("::")?;
            for (i, group) in groups.iter().enumerate().skip(pos + len) {
                if i > pos + len {
                    f.write_str(":")?;
                }
                write!(f, "{group:x}")?;
            }
        }
        None => {
            for (i, group) in groups.iter().enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{group:x}")?;
            }
        }
    }
    f.write_str("]")
}

/// A host address plus TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: HostAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: HostAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn family(&self) -> Family {
        self.host.family()
    }

    pub fn to_socket_addr(self) -> SocketAddr {
        SocketAddr::new(self.host.to_ip(), self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().into(),
            port: addr.port(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Splits on the last `:` outside brackets. Port 0 is rejected; these
    /// endpoints name listen and dispatch targets, not wildcard binds.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim_start();
        let (host_str, port_str) = if trimmed.starts_with('[') {
            let end = trimmed.find(']').ok_or_else(|| Error::parse(s))?;
            let port = trimmed[end + 1..]
                .strip_prefix(':')
                .ok_or_else(|| Error::parse(s))?;
            (&trimmed[..=end], port)
        } else {
            trimmed.rsplit_once(':').ok_or_else(|| Error::parse(s))?
        };

        let port: u16 = port_str.parse().map_err(|_| Error::parse(s))?;
        if port == 0 {
            return Err(Error::parse(s));
        }
        let host: HostAddr = host_str.parse().map_err(|_| Error::parse(s))?;
        Ok(Endpoint { host, port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_quad() {
        assert_eq!(
            "192.168.7.1".parse::<HostAddr>().unwrap(),
            HostAddr::V4(Ipv4Addr::new(192, 168, 7, 1))
        );
    }

    #[test]
    fn parses_bracketed_ipv6() {
        assert_eq!(
            "[2001:db8::1]".parse::<HostAddr>().unwrap(),
            HostAddr::V6("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn skips_leading_whitespace() {
        assert!("  10.0.0.1".parse::<HostAddr>().is_ok());
        assert!(" \t[::1]".parse::<HostAddr>().is_ok());
    }

    #[test]
    fn rejects_unbracketed_ipv6() {
        assert!("2001:db8::1".parse::<HostAddr>().is_err());
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "[", "[::1", "256.0.0.1", "1.2.3", "[g::1]", "example.com"] {
            assert!(bad.parse::<HostAddr>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn formats_ipv4() {
        assert_eq!(HostAddr::V4(Ipv4Addr::new(127, 0, 0, 1)).to_string(), "127.0.0.1");
    }

    #[test]
    fn formats_ipv6_with_compression() {
        let cases = [
            ("::", "[::]"),
            ("::1", "[::1]"),
            ("1::", "[1::]"),
            ("2001:db8::1", "[2001:db8::1]"),
            // A single zero group still compresses.
            ("1:0:2:3:4:5:6:7", "[1::2:3:4:5:6:7]"),
            // The longest run wins even when a shorter one comes first.
            ("1:0:0:2:0:0:0:3", "[1:0:0:2::3]"),
            // Equal-length runs compress at the earliest position.
            ("1:0:0:2:3:0:0:4", "[1::2:3:0:0:4]"),
            ("fe80::204:61ff:fe9d:f156", "[fe80::204:61ff:fe9d:f156]"),
        ];
        for (input, expected) in cases {
            let host = HostAddr::V6(input.parse().unwrap());
            assert_eq!(host.to_string(), expected, "{input}");
        }
    }

    #[test]
    fn endpoint_splits_on_last_colon() {
        let ep: Endpoint = "[::1]:1080".parse().unwrap();
        assert_eq!(ep.host, HostAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(ep.port, 1080);

        let ep: Endpoint = "127.0.0.1:65535".parse().unwrap();
        assert_eq!(ep.port, 65535);
    }

    #[test]
    fn endpoint_rejects_port_zero_and_malformed() {
        for bad in [
            "127.0.0.1:0",
            "127.0.0.1",
            "127.0.0.1:",
            "127.0.0.1:70000",
            "[::1]1080",
            "[::1]",
            ":1080",
        ] {
            assert!(bad.parse::<Endpoint>().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn endpoint_display_round_trips() {
        for text in ["127.0.0.1:1080", "[::1]:1080", "[2001:db8::5]:443"] {
            let ep: Endpoint = text.parse().unwrap();
            assert_eq!(ep.to_string(), text);
        }
    }

    #[test]
    fn family_bits_are_distinct() {
        assert_eq!(Family::V4.bit(), 0b01);
        assert_eq!(Family::V6.bit(), 0b10);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_host() -> impl Strategy<Value = HostAddr> {
        prop_oneof![
            any::<[u8; 4]>().prop_map(|o| HostAddr::V4(Ipv4Addr::from(o))),
            any::<[u8; 16]>().prop_map(|o| HostAddr::V6(Ipv6Addr::from(o))),
        ]
    }

    proptest! {
        #[test]
        fn host_text_round_trips(host in arb_host()) {
            let text = host.to_string();
            let parsed: HostAddr = text.parse().unwrap();
            prop_assert_eq!(host, parsed);
        }

        #[test]
        fn endpoint_text_round_trips(host in arb_host(), port in 1u16..=65535) {
            let endpoint = Endpoint::new(host, port);
            let parsed: Endpoint = endpoint.to_string().parse().unwrap();
            prop_assert_eq!(endpoint, parsed);
        }

        #[test]
        fn formatted_v6_never_has_leading_zeros(octets in any::<[u8; 16]>()) {
            let text = HostAddr::V6(Ipv6Addr::from(octets)).to_string();
            let inner = &text[1..text.len() - 1];
            for group in inner.split(':').filter(|g| !g.is_empty()) {
                prop_assert!(group.len() == 1 || !group.starts_with('0'), "{}", text);
                prop_assert!(group.len() <= 4, "{}", text);
            }
        }
    }
}
