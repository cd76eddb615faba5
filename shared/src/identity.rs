//! Server identities that can be compared across discovery backends
//!
//! Every backend reports servers in its own terms: a platform account, a
//! peer-directory player id, or a plain `host:port`. `ServerIdentity` folds
//! those into one closed sum type so the browser can de-duplicate results
//! without knowing which backend produced them.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Port assumed when a direct address omits one
pub const DEFAULT_PORT: u16 = 2456;

/// Fieldless tag of a [`ServerIdentity`] variant
///
/// Backends advertise per-kind rate limits with this instead of a full identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    None,
    SteamUser,
    PlatformUser,
    Direct,
}

/// Identifies a joinable server regardless of which backend found it
///
/// Equality and hashing are per-variant: two identities are only equal when
/// they carry the same tag and the same payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerIdentity {
    #[default]
    None,
    SteamUser {
        steam_id: u64,
    },
    PlatformUser {
        remote_player_id: Option<String>,
    },
    Direct(DirectAddress),
}

impl ServerIdentity {
    pub fn steam_user(steam_id: u64) -> Self {
        ServerIdentity::SteamUser { steam_id }
    }

    pub fn platform_user(remote_player_id: impl Into<String>) -> Self {
        ServerIdentity::PlatformUser {
            remote_player_id: Some(remote_player_id.into()),
        }
    }

    /// Parses a free-form `host[:port]` string into a direct identity
    pub fn direct(address: &str) -> Self {
        ServerIdentity::Direct(DirectAddress::parse(address))
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            ServerIdentity::None => IdentityKind::None,
            ServerIdentity::SteamUser { .. } => IdentityKind::SteamUser,
            ServerIdentity::PlatformUser { .. } => IdentityKind::PlatformUser,
            ServerIdentity::Direct(_) => IdentityKind::Direct,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ServerIdentity::None => false,
            ServerIdentity::SteamUser { steam_id } => is_valid_steam_id(*steam_id),
            ServerIdentity::PlatformUser { remote_player_id } => remote_player_id
                .as_deref()
                .map_or(false, |id| !id.is_empty()),
            ServerIdentity::Direct(address) => address.is_valid(),
        }
    }

    /// Human readable label for the kind of data this identity points at
    pub fn data_name(&self) -> &'static str {
        match self {
            ServerIdentity::None => "None",
            ServerIdentity::SteamUser { .. } => "Steam user",
            ServerIdentity::PlatformUser { .. } => "PlayFab user",
            ServerIdentity::Direct(_) => "Dedicated",
        }
    }

    pub fn as_direct(&self) -> Option<&DirectAddress> {
        match self {
            ServerIdentity::Direct(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_direct_mut(&mut self) -> Option<&mut DirectAddress> {
        match self {
            ServerIdentity::Direct(address) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerIdentity::None => write!(f, "None"),
            ServerIdentity::SteamUser { steam_id } => write!(f, "{}", steam_id),
            ServerIdentity::PlatformUser { remote_player_id } => {
                write!(f, "{}", remote_player_id.as_deref().unwrap_or("null"))
            }
            ServerIdentity::Direct(address) => write!(f, "{}", address),
        }
    }
}

impl FromStr for ServerIdentity {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ServerIdentity::direct(s))
    }
}

/// Checks the universe, account type and account id packed into a 64-bit Steam id
pub fn is_valid_steam_id(steam_id: u64) -> bool {
    let universe = steam_id >> 56;
    let account_type = (steam_id >> 52) & 0xF;
    let account_id = steam_id & 0xFFFF_FFFF;

    (1..=4).contains(&universe) && (1..=10).contains(&account_type) && account_id != 0
}

/// A dedicated server reached by host name or IP literal
///
/// Only `(host, port)` take part in equality and hashing. The resolved socket
/// address is a cache hint filled in once a host name has been looked up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectAddress {
    host: String,
    port: u16,
    #[serde(skip)]
    resolved: Option<SocketAddr>,
    is_url: bool,
}

impl DirectAddress {
    /// Parses `host`, `host:port`, `[ipv6]` or `[ipv6]:port`
    ///
    /// Never fails: unusable input produces an empty host and port 0, which
    /// reports as invalid.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Self::default();
        }

        if let Some(rest) = input.strip_prefix('[') {
            let Some((inside, tail)) = rest.split_once(']') else {
                return Self::default();
            };
            let port = if tail.is_empty() {
                DEFAULT_PORT
            } else {
                match tail.strip_prefix(':').and_then(|p| p.parse::<u16>().ok()) {
                    Some(port) => port,
                    None => return Self::default(),
                }
            };

            if let Ok(ip) = inside.parse::<Ipv6Addr>() {
                if !ip.is_unspecified() {
                    return Self::from_ip(IpAddr::V6(ip), port);
                }
            }
            return Self::from_host_text(inside, port);
        }

        // A bare IPv6 literal is unambiguous as long as no port is attached
        if let Ok(ip) = input.parse::<Ipv6Addr>() {
            if ip.is_unspecified() {
                return Self::default();
            }
            return Self::from_ip(IpAddr::V6(ip), DEFAULT_PORT);
        }

        match input.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self::from_host_text(host, port),
                Err(_) => Self::default(),
            },
            None => Self::from_host_text(input, DEFAULT_PORT),
        }
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip(), addr.port())
    }

    fn from_ip(ip: IpAddr, port: u16) -> Self {
        let ip = canonical_ip(ip);
        Self {
            host: ip.to_string(),
            port,
            resolved: Some(SocketAddr::new(ip, port)),
            is_url: false,
        }
    }

    fn from_host_text(host: &str, port: u16) -> Self {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Self::from_ip(IpAddr::V4(ip), port);
        }
        if !is_plausible_hostname(host) {
            return Self::default();
        }
        Self {
            host: host.to_ascii_lowercase(),
            port,
            resolved: None,
            is_url: true,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when the host is a name that needs resolving rather than an IP literal
    pub fn is_url(&self) -> bool {
        self.is_url
    }

    pub fn resolved(&self) -> Option<SocketAddr> {
        self.resolved
    }

    /// Records the outcome of a host name lookup
    pub fn set_resolved(&mut self, ip: IpAddr) {
        self.resolved = Some(SocketAddr::new(canonical_ip(ip), self.port));
    }

    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

impl PartialEq for DirectAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for DirectAddress {}

impl Hash for DirectAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for DirectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn is_plausible_hostname(host: &str) -> bool {
    !host.is_empty()
        && !host
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | '[' | ']' | '/' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;

    fn hash_of(identity: &ServerIdentity) -> u64 {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        hasher.finish()
    }

    const VALID_STEAM_ID: u64 = 76561197960287930;

    #[test]
    fn test_parse_ipv4_with_port() {
        let address = DirectAddress::parse("127.0.0.1:2456");
        assert_eq!(address.host(), "127.0.0.1");
        assert_eq!(address.port(), 2456);
        assert!(!address.is_url());
        assert_eq!(address.resolved(), Some("127.0.0.1:2456".parse().unwrap()));
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let address = DirectAddress::parse("[::1]:9000");
        assert_eq!(address.host(), "::1");
        assert_eq!(address.port(), 9000);
        assert_eq!(address.to_string(), "[::1]:9000");
    }

    #[test]
    fn test_parse_hostname_defaults_port() {
        let address = DirectAddress::parse("myserver.example");
        assert_eq!(address.host(), "myserver.example");
        assert_eq!(address.port(), DEFAULT_PORT);
        assert!(address.is_url());
        assert!(address.resolved().is_none());
        assert!(address.is_valid());
    }

    #[test]
    fn test_parse_ipv4_mapped_ipv6_canonicalises() {
        let address = DirectAddress::parse("[::ffff:10.0.0.7]:3000");
        assert_eq!(address.host(), "10.0.0.7");
        assert_eq!(address.to_string(), "10.0.0.7:3000");
    }

    #[test]
    fn test_parse_unspecified_ipv6_is_invalid() {
        let address = DirectAddress::parse("[::]:2456");
        assert!(!address.is_valid());
        assert_eq!(address.host(), "");
        assert_eq!(address.port(), 0);
    }

    #[test]
    fn test_parse_rejects_out_of_range_port() {
        let address = DirectAddress::parse("example.org:70000");
        assert!(!address.is_valid());
        assert_eq!(address.port(), 0);
    }

    #[test]
    fn test_parse_garbage_never_panics() {
        for input in ["", "   ", "[", "[::1", "[::1]x", "a b:1", ":", "host:", "[]:80"] {
            let address = DirectAddress::parse(input);
            assert!(!address.is_valid(), "{:?} should be invalid", input);
        }
    }

    #[test]
    fn test_hostname_is_case_insensitive() {
        let a = ServerIdentity::direct("Valhalla.Example:2456");
        let b = ServerIdentity::direct("valhalla.example");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_resolved_address_is_not_identity() {
        let a = ServerIdentity::direct("play.example:2456");
        let mut b = a.clone();
        b.as_direct_mut()
            .unwrap()
            .set_resolved("10.1.2.3".parse().unwrap());

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_display_round_trip() {
        for input in ["127.0.0.1:2456", "[2001:db8::5]:7777", "host.example:1234"] {
            let identity = ServerIdentity::direct(input);
            assert_eq!(identity.to_string(), input);
            assert_eq!(ServerIdentity::direct(&identity.to_string()), identity);
        }
    }

    #[test]
    fn test_variants_never_compare_equal() {
        let identities = vec![
            ServerIdentity::None,
            ServerIdentity::steam_user(VALID_STEAM_ID),
            ServerIdentity::platform_user("2456"),
            ServerIdentity::direct("127.0.0.1:2456"),
        ];

        for (i, a) in identities.iter().enumerate() {
            for (j, b) in identities.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
        }
    }

    #[test]
    fn test_equality_agrees_with_hash() {
        let identities = vec![
            ServerIdentity::steam_user(VALID_STEAM_ID),
            ServerIdentity::steam_user(VALID_STEAM_ID),
            ServerIdentity::platform_user("abc"),
            ServerIdentity::platform_user("abc"),
            ServerIdentity::direct("[::1]:9000"),
            ServerIdentity::direct("[0:0:0:0:0:0:0:1]:9000"),
        ];

        for a in &identities {
            assert_eq!(a, a);
            for b in &identities {
                assert_eq!(a == b, b == a);
                if a == b {
                    assert_eq!(hash_of(a), hash_of(b));
                }
            }
        }

        let unique: HashSet<_> = identities.into_iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_validity_per_variant() {
        assert!(!ServerIdentity::None.is_valid());
        assert!(ServerIdentity::steam_user(VALID_STEAM_ID).is_valid());
        assert!(!ServerIdentity::steam_user(0).is_valid());
        assert!(ServerIdentity::platform_user("player").is_valid());
        assert!(!ServerIdentity::PlatformUser {
            remote_player_id: None
        }
        .is_valid());
        assert!(!ServerIdentity::direct("").is_valid());
        assert!(!ServerIdentity::direct("host:0").is_valid());
    }

    #[test]
    fn test_data_names() {
        assert_eq!(
            ServerIdentity::steam_user(VALID_STEAM_ID).data_name(),
            "Steam user"
        );
        assert_eq!(ServerIdentity::platform_user("x").data_name(), "PlayFab user");
        assert_eq!(ServerIdentity::direct("a.b").data_name(), "Dedicated");
    }

    #[test]
    fn test_from_str_is_infallible() {
        let identity: ServerIdentity = "10.0.0.1".parse().unwrap();
        assert_eq!(identity.kind(), IdentityKind::Direct);
        assert_eq!(identity.to_string(), "10.0.0.1:2456");
    }
}
