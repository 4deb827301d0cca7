//! `host:port` parsing for bind and target addresses

use std::fmt;

use crate::error::AddressError;

/// Host used when a bind address omits it (`":9000"`)
pub const ANY_HOST: &str = "0.0.0.0";

/// Split `host:port`, accepting bracketed IPv6 hosts (`[::1]:80`).
///
/// An unbracketed string with several colons is a bare IPv6 host and so
/// has no port.
fn split_host_port(s: &str) -> Result<(&str, u16), AddressError> {
    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        (host, port)
    } else if s.matches(':').count() > 1 {
        return Err(AddressError::MissingPort(s.to_string()));
    } else {
        s.rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| AddressError::InvalidPort(s.to_string()))?;
    Ok((host, port))
}

fn join_host_port(f: &mut fmt::Formatter<'_>, host: &str, port: u16) -> fmt::Result {
    if host.contains(':') {
        write!(f, "[{}]:{}", host, port)
    } else {
        write!(f, "{}:{}", host, port)
    }
}

/// Local listen address of a forward
///
/// Port zero is the "disabled" sentinel: such a forward never listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddr {
    pub host: String,
    pub port: u16,
}

impl BindAddr {
    /// Parse a bind spec; an empty host means all interfaces.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let (host, port) = split_host_port(s.trim())?;
        let host = if host.is_empty() { ANY_HOST } else { host };
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.port == 0
    }
}

impl fmt::Display for BindAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join_host_port(f, &self.host, self.port)
    }
}

/// Remote endpoint reached through the SSH session, or the SSH endpoint itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    pub host: String,
    pub port: u16,
}

impl RemoteAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` target; the host is required.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let (host, port) = split_host_port(s)?;
        if host.is_empty() {
            return Err(AddressError::MissingHost(s.to_string()));
        }
        Ok(Self::new(host, port))
    }

    /// Parse `host[:port]`, filling in `default_port` when absent.
    pub fn parse_with_default_port(s: &str, default_port: u16) -> Result<Self, AddressError> {
        let s = s.trim();
        match Self::parse(s) {
            Ok(addr) => Ok(addr),
            Err(AddressError::MissingPort(_)) if !s.is_empty() => {
                let host = s.trim_start_matches('[').trim_end_matches(']');
                Ok(Self::new(host, default_port))
            }
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        join_host_port(f, &self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr_parse() {
        let addr = BindAddr::parse("127.0.0.1:9000").unwrap();
        assert_eq!(addr.host, "127.0.0.1");
        assert_eq!(addr.port, 9000);
        assert!(!addr.is_disabled());
    }

    #[test]
    fn test_bind_addr_empty_host_is_any() {
        let addr = BindAddr::parse(":8080").unwrap();
        assert_eq!(addr.host, ANY_HOST);
        assert_eq!(addr.to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_bind_addr_zero_port_is_disabled() {
        assert!(BindAddr::parse(":0").unwrap().is_disabled());
    }

    #[test]
    fn test_bind_addr_malformed() {
        assert!(matches!(
            BindAddr::parse("localhost"),
            Err(AddressError::MissingPort(_))
        ));
        assert!(matches!(
            BindAddr::parse("localhost:http"),
            Err(AddressError::InvalidPort(_))
        ));
        assert!(matches!(
            BindAddr::parse("localhost:70000"),
            Err(AddressError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_ipv6_round_trip() {
        let addr = RemoteAddr::parse("[::1]:22").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:22");
    }

    #[test]
    fn test_remote_requires_host() {
        assert!(matches!(
            RemoteAddr::parse(":80"),
            Err(AddressError::MissingHost(_))
        ));
    }

    #[test]
    fn test_default_port() {
        let addr = RemoteAddr::parse_with_default_port("bastion.example.com", 22).unwrap();
        assert_eq!(addr, RemoteAddr::new("bastion.example.com", 22));

        let addr = RemoteAddr::parse_with_default_port("bastion:2222", 22).unwrap();
        assert_eq!(addr.port, 2222);

        assert!(RemoteAddr::parse_with_default_port("", 22).is_err());
    }

    #[test]
    fn test_bare_ipv6_takes_default_port() {
        let addr = RemoteAddr::parse_with_default_port("::1", 22).unwrap();
        assert_eq!(addr, RemoteAddr::new("::1", 22));
        assert_eq!(addr.to_string(), "[::1]:22");

        let addr = RemoteAddr::parse_with_default_port("[fe80::1]", 22).unwrap();
        assert_eq!(addr, RemoteAddr::new("fe80::1", 22));

        assert!(matches!(
            RemoteAddr::parse("fe80::1"),
            Err(AddressError::MissingPort(_))
        ));
    }
}
