//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mac_addr::MacAddr;

/// A face URI: `scheme://host[:port][/path]`.
///
/// Parsing and formatting round-trip: `format(parse(s)) == s` for every
/// canonical URI and `parse(format(u)) == u` for every valid `FaceUri`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct FaceUri {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Scheme {
    Tcp4,
    Tcp6,
    Udp4,
    Udp6,
    Unix,
    Fd,
    Ether,
    Dev,
}

#[derive(Debug, Eq, PartialEq)]
pub enum FaceUriError {
    Malformed(String),
    UnsupportedScheme(String),
    InvalidAuthority(String),
}

static URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)://([^/]*)(/[^?]*)?$").unwrap());
static V6_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([a-fA-F0-9:]+)\](?::(\d+))?$").unwrap());
static ETHER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[((?:[a-fA-F0-9]{1,2}:){5}[a-fA-F0-9]{1,2})\]$").unwrap()
});
static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:\[\]]+)(?::(\d+))?$").unwrap());

// ===== impl FaceUri =====

impl FaceUri {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn from_tcp(addr: SocketAddr) -> FaceUri {
        FaceUri {
            scheme: if addr.is_ipv6() { Scheme::Tcp6 } else { Scheme::Tcp4 },
            host: addr.ip().to_string(),
            port: Some(addr.port()),
            path: String::new(),
        }
    }

    pub fn from_udp(addr: SocketAddr) -> FaceUri {
        FaceUri {
            scheme: if addr.is_ipv6() { Scheme::Udp6 } else { Scheme::Udp4 },
            host: addr.ip().to_string(),
            port: Some(addr.port()),
            path: String::new(),
        }
    }

    pub fn from_unix(path: &str) -> FaceUri {
        FaceUri {
            scheme: Scheme::Unix,
            host: String::new(),
            port: None,
            path: path.to_owned(),
        }
    }

    pub fn from_fd(fd: i32) -> FaceUri {
        FaceUri {
            scheme: Scheme::Fd,
            host: fd.to_string(),
            port: None,
            path: String::new(),
        }
    }

    pub fn from_ether(addr: MacAddr) -> FaceUri {
        FaceUri {
            scheme: Scheme::Ether,
            host: addr.to_string(),
            port: None,
            path: String::new(),
        }
    }

    pub fn from_dev(ifname: &str) -> FaceUri {
        FaceUri {
            scheme: Scheme::Dev,
            host: ifname.to_owned(),
            port: None,
            path: String::new(),
        }
    }

    fn host_is_bracketed(&self) -> bool {
        matches!(self.scheme, Scheme::Tcp6 | Scheme::Udp6 | Scheme::Ether)
    }

    // Scheme-specific authority validation.
    fn check(self) -> Result<FaceUri, FaceUriError> {
        let bad =
            |uri: &FaceUri| FaceUriError::InvalidAuthority(uri.to_string());
        match self.scheme {
            Scheme::Tcp4 | Scheme::Tcp6 | Scheme::Udp4 | Scheme::Udp6 => {
                if self.host.is_empty() || self.port.is_none() {
                    return Err(bad(&self));
                }
            }
            Scheme::Unix => {
                if !self.host.is_empty() || self.path.is_empty() {
                    return Err(bad(&self));
                }
            }
            Scheme::Fd => {
                if self.host.parse::<i32>().is_err() {
                    return Err(bad(&self));
                }
            }
            Scheme::Ether => {
                if MacAddr::from_str(&self.host).is_err() {
                    return Err(bad(&self));
                }
            }
            Scheme::Dev => {
                if self.host.is_empty() {
                    return Err(bad(&self));
                }
            }
        }
        Ok(self)
    }
}

impl std::fmt::Display for FaceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if self.host_is_bracketed() {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "{}", self.path)
    }
}

impl FromStr for FaceUri {
    type Err = FaceUriError;

    fn from_str(s: &str) -> Result<FaceUri, FaceUriError> {
        let captures = URI_RE
            .captures(s)
            .ok_or_else(|| FaceUriError::Malformed(s.to_owned()))?;
        let scheme: Scheme = captures[1].parse()?;
        let authority = &captures[2];
        let path =
            captures.get(3).map(|m| m.as_str()).unwrap_or("").to_owned();

        let mut host = String::new();
        let mut port = None;
        if !authority.is_empty() {
            let m = V6_RE
                .captures(authority)
                .or_else(|| ETHER_RE.captures(authority))
                .or_else(|| HOST_RE.captures(authority))
                .ok_or_else(|| {
                    FaceUriError::InvalidAuthority(authority.to_owned())
                })?;
            host = m[1].to_owned();
            port = match m.get(2) {
                Some(digits) => Some(digits.as_str().parse().map_err(
                    |_| FaceUriError::InvalidAuthority(authority.to_owned()),
                )?),
                None => None,
            };
        }

        FaceUri { scheme, host, port, path }.check()
    }
}

// ===== impl Scheme =====

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self {
            Scheme::Tcp4 => "tcp4",
            Scheme::Tcp6 => "tcp6",
            Scheme::Udp4 => "udp4",
            Scheme::Udp6 => "udp6",
            Scheme::Unix => "unix",
            Scheme::Fd => "fd",
            Scheme::Ether => "ether",
            Scheme::Dev => "dev",
        };
        write!(f, "{scheme}")
    }
}

impl FromStr for Scheme {
    type Err = FaceUriError;

    fn from_str(s: &str) -> Result<Scheme, FaceUriError> {
        match s {
            "tcp4" => Ok(Scheme::Tcp4),
            "tcp6" => Ok(Scheme::Tcp6),
            "udp4" => Ok(Scheme::Udp4),
            "udp6" => Ok(Scheme::Udp6),
            "unix" => Ok(Scheme::Unix),
            "fd" => Ok(Scheme::Fd),
            "ether" => Ok(Scheme::Ether),
            "dev" => Ok(Scheme::Dev),
            _ => Err(FaceUriError::UnsupportedScheme(s.to_owned())),
        }
    }
}

// ===== impl FaceUriError =====

impl std::fmt::Display for FaceUriError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaceUriError::Malformed(uri) => {
                write!(f, "malformed URI: {uri}")
            }
            FaceUriError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported URI scheme: {scheme}")
            }
            FaceUriError::InvalidAuthority(authority) => {
                write!(f, "invalid URI authority: {authority}")
            }
        }
    }
}

impl std::error::Error for FaceUriError {}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format_round_trip() {
        for uri in [
            "tcp4://192.0.2.1:6363",
            "tcp6://[2001:db8::1]:6363",
            "udp4://224.0.23.170:56363",
            "udp6://[ff02::1234]:56363",
            "unix:///run/nomen.sock",
            "fd://4",
            "ether://[01:00:5e:00:17:aa]",
            "dev://eth0",
        ] {
            let parsed: FaceUri = uri.parse().unwrap();
            assert_eq!(parsed.to_string(), uri, "round-trip of {uri}");
            assert_eq!(parsed.to_string().parse::<FaceUri>().unwrap(), parsed);
        }
    }

    #[test]
    fn parse_from_endpoints() {
        let uri = FaceUri::from_udp("192.0.2.1:56363".parse().unwrap());
        assert_eq!(uri.to_string(), "udp4://192.0.2.1:56363");
        let uri = FaceUri::from_tcp("[2001:db8::2]:6363".parse().unwrap());
        assert_eq!(uri.to_string(), "tcp6://[2001:db8::2]:6363");
        assert_eq!(uri.to_string().parse::<FaceUri>().unwrap(), uri);
    }

    #[test]
    fn reject_malformed() {
        for uri in [
            "",
            "tcp4",
            "tcp4://",
            "tcp4://192.0.2.1",
            "tcp4://192.0.2.1:99999",
            "coap://192.0.2.1:1",
            "ether://[01:00:5e]",
            "fd://x",
            "unix://host/run/x.sock",
            "dev://",
        ] {
            assert!(uri.parse::<FaceUri>().is_err(), "should reject {uri}");
        }
    }
}
