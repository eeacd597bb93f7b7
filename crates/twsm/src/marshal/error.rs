// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors for marshal and unmarshal operations.

use super::handle::LocalHandle;
use super::TypeId;
use std::fmt;

/// Errors raised by the registry, the marshaller and the unmarshaller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// Type index outside the registry.
    UnknownType(TypeId),
    /// Descriptor table breaks a structural rule.
    InvalidDescriptor {
        type_name: &'static str,
        reason: &'static str,
    },
    /// Value does not have the shape the descriptor requires.
    Shape {
        type_name: &'static str,
        expected: &'static str,
    },
    /// Discriminant state that maps to no union arm.
    NoActiveArm {
        type_name: &'static str,
        discriminant: u32,
    },
    /// Union arm in the value (or on the wire) disagrees with the one
    /// computed from sibling state.
    ArmMismatch {
        type_name: &'static str,
        expected: usize,
        found: usize,
    },
    /// Array length disagrees with the count computed from sibling state.
    LengthMismatch {
        type_name: &'static str,
        expected: usize,
        found: usize,
    },
    /// Local handle without a wire identifier.
    UnresolvedHandle(LocalHandle),
    /// Pointer presence octet other than 0 or 1.
    InvalidPresence(u8),
    /// Leaf bytes that the copy callback cannot decode.
    InvalidLeaf {
        type_name: &'static str,
        reason: &'static str,
    },
    /// Stream announces a root type other than the expected one.
    RootTypeMismatch { expected: TypeId, found: TypeId },
    /// Dynamic count does not fit the tagged count field.
    CountOverflow(usize),
    /// Marshal resumed with a different root type.
    RootChanged { expected: TypeId, found: TypeId },
    /// Operation on a context that already completed.
    Finished,
}

impl MarshalError {
    /// True when the error means the received stream cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::UnknownType(_)
                | Self::NoActiveArm { .. }
                | Self::ArmMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::InvalidPresence(_)
                | Self::InvalidLeaf { .. }
                | Self::RootTypeMismatch { .. }
        )
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(ty) => write!(f, "unknown marshal type {}", ty),
            Self::InvalidDescriptor { type_name, reason } => {
                write!(f, "invalid descriptor for {}: {}", type_name, reason)
            }
            Self::Shape {
                type_name,
                expected,
            } => write!(f, "value for {} is not {}", type_name, expected),
            Self::NoActiveArm {
                type_name,
                discriminant,
            } => write!(f, "{}: no union arm for discriminant {}", type_name, discriminant),
            Self::ArmMismatch {
                type_name,
                expected,
                found,
            } => write!(
                f,
                "{}: union arm {} does not match computed arm {}",
                type_name, found, expected
            ),
            Self::LengthMismatch {
                type_name,
                expected,
                found,
            } => write!(
                f,
                "{}: array holds {} elements, expected {}",
                type_name, found, expected
            ),
            Self::UnresolvedHandle(h) => write!(f, "no wire id for local handle {}", h),
            Self::InvalidPresence(b) => write!(f, "invalid pointer presence octet 0x{:02x}", b),
            Self::InvalidLeaf { type_name, reason } => write!(f, "{}: {}", type_name, reason),
            Self::RootTypeMismatch { expected, found } => {
                write!(f, "root type {} received, expected {}", found, expected)
            }
            Self::CountOverflow(n) => write!(f, "dynamic count {} exceeds u16", n),
            Self::RootChanged { expected, found } => {
                write!(f, "marshal resumed with root type {} instead of {}", found, expected)
            }
            Self::Finished => write!(f, "context already complete"),
        }
    }
}

impl std::error::Error for MarshalError {}
