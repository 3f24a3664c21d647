//
// Copyright (c) The Nomen Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// 48-bit MAC address (IEEE EUI-48 format).
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MacAddr([u8; 6]);

#[derive(Debug, Eq, PartialEq)]
pub struct MacAddrParseError(pub String);

/// EtherType assigned to NDN.
pub const ETHERTYPE_NDN: u16 = 0x8624;

/// Default Ethernet multicast group for NDN.
pub const NDN_MULTICAST_ETHER: MacAddr =
    MacAddr([0x01, 0x00, 0x5E, 0x00, 0x17, 0xAA]);

/// Default IPv4 multicast group for NDN over UDP.
pub const NDN_MULTICAST_IPV4: (&str, u16) = ("224.0.23.170", 56363);

/// Default IPv6 multicast group for NDN over UDP.
pub const NDN_MULTICAST_IPV6: (&str, u16) = ("FF02::1234", 56363);

// ===== impl MacAddr =====

impl MacAddr {
    pub const LENGTH: usize = 6;
    pub const BROADCAST: Self = Self([0xff; 6]);

    pub fn as_bytes(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddr::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        MacAddr(bytes)
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5],
        ))
    }
}

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    // Accepts hexadecimal notation with colons or hyphens as separators.
    fn from_str(s: &str) -> Result<MacAddr, MacAddrParseError> {
        let err = || MacAddrParseError(s.to_owned());
        let mut bytes = [0; 6];
        let mut octets = s.split(['-', ':']);
        for byte in bytes.iter_mut() {
            let octet = octets.next().ok_or_else(err)?;
            if octet.is_empty() || octet.len() > 2 {
                return Err(err());
            }
            *byte = u8::from_str_radix(octet, 16).map_err(|_| err())?;
        }
        if octets.next().is_some() {
            return Err(err());
        }
        Ok(MacAddr(bytes))
    }
}

// ===== impl MacAddrParseError =====

impl std::fmt::Display for MacAddrParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid Ethernet address: {}", self.0)
    }
}

impl std::error::Error for MacAddrParseError {}

// ===== tests =====
