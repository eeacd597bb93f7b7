// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema-driven marshalling engine.
//!
//! A [`TypeRegistry`] describes every marshallable type of one subsystem.
//! The [`Marshaller`] walks a [`Value`] tree against those descriptors and
//! writes bytes into caller buffers of any size; the [`Unmarshaller`] rebuilds
//! the tree from the same bytes fed in arbitrary slices. Both sides can stop
//! at any byte and resume on the next call, and the stream is identical
//! however it was chunked.
//!
//! # Wire layout
//!
//! | Element | Implicit | Tagged |
//! |---------|----------|--------|
//! | root | - | type id octet |
//! | leaf | `size` bytes from the copy callback | same |
//! | pointer member | presence octet, then pointee | same |
//! | union | active arm only | arm octet, then arm |
//! | dynamic array | elements only | `u16` LE count, then elements |
//!
//! Union arms and dynamic counts are recomputed on both ends from the
//! members that precede them, so the implicit layout carries no schema.

pub mod codec;
pub mod common;
mod descriptor;
mod error;
mod handle;
mod marshaller;
mod registry;
mod unmarshaller;
mod value;


pub use descriptor::{
    CopyCallbacks, CopyContext, DynamicKind, MarshalCopyFn, MemberDescriptor, SiblingFn,
    TypeDescriptor, TypeKind, UnmarshalCopyFn,
};
pub use error::MarshalError;
pub use handle::{HandleRef, LocalHandle, WireId, WireIdResolver};
pub use marshaller::{MarshalCursor, Marshaller};
pub use registry::TypeRegistry;
pub use unmarshaller::{PartialBuild, Unmarshaller};
pub use value::{array_of, pointer_to, Fields, MarshalObject, Value};

use std::fmt;
use std::str::FromStr;

/// Index of a type in its subsystem registry.
pub type TypeId = u8;

/// Registry capacity: every index must fit a [`TypeId`].
pub const MAX_MARSHAL_TYPES: usize = 255;

/// Stream layout selector. Both ends must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "yaml-config",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum WireFormat {
    /// No envelope; identical registries are the schema.
    #[default]
    Implicit,
    /// Root type, union arms and dynamic counts travel on the wire and are
    /// checked on receipt.
    Tagged,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implicit => write!(f, "implicit"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "implicit" => Ok(Self::Implicit),
            "tagged" => Ok(Self::Tagged),
            other => Err(format!("unknown wire format '{}'", other)),
        }
    }
}
