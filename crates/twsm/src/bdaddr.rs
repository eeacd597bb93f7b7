// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bluetooth device address.

use std::fmt;
use std::str::FromStr;

/// Length of a Bluetooth device address on the wire.
pub const BDADDR_LEN: usize = 6;

/// A 48-bit Bluetooth device address, most significant octet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BdAddr([u8; BDADDR_LEN]);

impl BdAddr {
    /// All-zero address, used for unset slots.
    pub const ZERO: BdAddr = BdAddr([0; BDADDR_LEN]);

    pub const fn new(octets: [u8; BDADDR_LEN]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; BDADDR_LEN] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; BDADDR_LEN]
    }

    /// Lower address part (24 bits).
    pub fn lap(&self) -> u32 {
        u32::from(self.0[3]) << 16 | u32::from(self.0[4]) << 8 | u32::from(self.0[5])
    }

    /// Upper address part.
    pub fn uap(&self) -> u8 {
        self.0[2]
    }

    /// Non-significant address part.
    pub fn nap(&self) -> u16 {
        u16::from(self.0[0]) << 8 | u16::from(self.0[1])
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

/// Error returned when parsing a textual address fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBdAddrError(String);

impl fmt::Display for ParseBdAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid Bluetooth address: {}", self.0)
    }
}

impl std::error::Error for ParseBdAddrError {}

impl FromStr for BdAddr {
    type Err = ParseBdAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; BDADDR_LEN];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| ParseBdAddrError(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParseBdAddrError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseBdAddrError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseBdAddrError(s.to_string()));
        }
        Ok(Self(octets))
    }
}
