// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local handles and the wire identifiers that replace them on the link.

use std::fmt;

/// A handle to a local object (stream sink, service record) that only has
/// meaning on the device that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalHandle(u32);

impl LocalHandle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:04x}", self.0)
    }
}

/// Transport-independent identifier valid on both devices: an L2CAP channel
/// id or an RFCOMM server channel. Zero is never a valid identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(u16);

impl WireId {
    pub const INVALID: WireId = WireId(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A handle-typed member as it appears in a snapshot.
///
/// The sender holds `Local` handles. The marshal callback substitutes the
/// wire id and the receiver keeps `Wire` until commit resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandleRef {
    #[default]
    Unset,
    Local(LocalHandle),
    Wire(WireId),
}

impl HandleRef {
    pub fn local(&self) -> Option<LocalHandle> {
        match self {
            Self::Local(h) => Some(*h),
            _ => None,
        }
    }

    pub fn wire(&self) -> Option<WireId> {
        match self {
            Self::Wire(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// Maps local handles to wire identifiers while marshalling.
pub trait WireIdResolver {
    fn wire_id(&self, handle: LocalHandle) -> Option<WireId>;
}

impl<F> WireIdResolver for F
where
    F: Fn(LocalHandle) -> Option<WireId>,
{
    fn wire_id(&self, handle: LocalHandle) -> Option<WireId> {
        self(handle)
    }
}
