// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type and member descriptors.
//!
//! Descriptors are plain `const` data so a subsystem's whole registry can
//! live in a `static` table.

use super::error::MarshalError;
use super::handle::{LocalHandle, WireId, WireIdResolver};
use super::value::Value;
use super::TypeId;

/// Context handed to custom copy callbacks.
#[derive(Clone, Copy, Default)]
pub struct CopyContext<'a> {
    resolver: Option<&'a dyn WireIdResolver>,
}

impl<'a> CopyContext<'a> {
    pub fn new(resolver: Option<&'a dyn WireIdResolver>) -> Self {
        Self { resolver }
    }

    /// Wire identifier for a local handle.
    pub fn wire_id(&self, handle: LocalHandle) -> Result<WireId, MarshalError> {
        self.resolver
            .and_then(|r| r.wire_id(handle))
            .ok_or(MarshalError::UnresolvedHandle(handle))
    }
}

/// Writes exactly `dest.len()` bytes for a leaf value.
pub type MarshalCopyFn = fn(&Value, &mut [u8], &CopyContext<'_>) -> Result<(), MarshalError>;

/// Rebuilds a leaf value from its wire bytes.
pub type UnmarshalCopyFn = fn(&[u8]) -> Result<Value, MarshalError>;

/// Computes a union arm or a dynamic element count from the members that
/// precede the dynamic member. Only that prefix is visible, so the sender
/// and the receiver always see the same inputs.
pub type SiblingFn = fn(&[Value]) -> Result<usize, MarshalError>;

/// Copy callbacks of a leaf type.
#[derive(Clone, Copy)]
pub struct CopyCallbacks {
    pub marshal: MarshalCopyFn,
    pub unmarshal: UnmarshalCopyFn,
}

/// Run-time part of a dynamic struct.
#[derive(Clone, Copy)]
pub enum DynamicKind {
    /// Last member is a union; the callback returns the active arm.
    TaggedUnion(SiblingFn),
    /// One member is a dynamic array; the callback returns its length.
    Array(SiblingFn),
}

/// Type kind enumeration.
#[derive(Clone, Copy)]
pub enum TypeKind {
    Leaf(CopyCallbacks),
    Struct,
    Union,
    Dynamic(DynamicKind),
}

/// One member of a struct or one arm of a union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: &'static str,
    pub type_id: TypeId,
    /// Static element count; `0` means the owner's dynamic callback decides.
    pub array_elements: usize,
    pub is_pointer: bool,
    /// Informational: the pointee may have more than one owner.
    pub is_shared: bool,
}

impl MemberDescriptor {
    pub const fn new(name: &'static str, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            array_elements: 1,
            is_pointer: false,
            is_shared: false,
        }
    }

    pub const fn array(name: &'static str, type_id: TypeId, elements: usize) -> Self {
        Self {
            array_elements: elements,
            ..Self::new(name, type_id)
        }
    }

    pub const fn pointer(name: &'static str, type_id: TypeId) -> Self {
        Self {
            is_pointer: true,
            ..Self::new(name, type_id)
        }
    }

    /// Inline array whose length comes from the owner; must be last.
    pub const fn dynamic_array(name: &'static str, type_id: TypeId) -> Self {
        Self::array(name, type_id, 0)
    }

    /// Pointer to an array whose length comes from the owner.
    pub const fn dynamic_pointer(name: &'static str, type_id: TypeId) -> Self {
        Self {
            array_elements: 0,
            is_pointer: true,
            ..Self::new(name, type_id)
        }
    }

    pub const fn shared(self) -> Self {
        Self {
            is_shared: true,
            ..self
        }
    }

    pub const fn is_dynamic(&self) -> bool {
        self.array_elements == 0
    }

    /// Whether the member's value is held in a `Value::Array`.
    pub const fn is_array(&self) -> bool {
        self.array_elements != 1
    }
}

/// Layout of one marshallable type.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    pub name: &'static str,
    /// Wire size of a leaf. Zero for aggregates, whose size depends on members.
    pub size: usize,
    pub members: &'static [MemberDescriptor],
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub const fn leaf(name: &'static str, size: usize, callbacks: CopyCallbacks) -> Self {
        Self {
            name,
            size,
            members: &[],
            kind: TypeKind::Leaf(callbacks),
        }
    }

    pub const fn structure(name: &'static str, members: &'static [MemberDescriptor]) -> Self {
        Self {
            name,
            size: 0,
            members,
            kind: TypeKind::Struct,
        }
    }

    pub const fn union(name: &'static str, arms: &'static [MemberDescriptor]) -> Self {
        Self {
            name,
            size: 0,
            members: arms,
            kind: TypeKind::Union,
        }
    }

    /// Struct whose last member is a union selected by `arm`.
    pub const fn with_union(
        name: &'static str,
        members: &'static [MemberDescriptor],
        arm: SiblingFn,
    ) -> Self {
        Self {
            name,
            size: 0,
            members,
            kind: TypeKind::Dynamic(DynamicKind::TaggedUnion(arm)),
        }
    }

    /// Struct with one dynamic array member sized by `elements`.
    pub const fn with_dynamic_array(
        name: &'static str,
        members: &'static [MemberDescriptor],
        elements: SiblingFn,
    ) -> Self {
        Self {
            name,
            size: 0,
            members,
            kind: TypeKind::Dynamic(DynamicKind::Array(elements)),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TypeKind::Leaf(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, TypeKind::Dynamic(_))
    }

    pub fn dynamic_kind(&self) -> Option<DynamicKind> {
        match self.kind {
            TypeKind::Dynamic(kind) => Some(kind),
            _ => None,
        }
    }

    /// Struct or dynamic struct.
    pub fn is_struct_like(&self) -> bool {
        matches!(self.kind, TypeKind::Struct | TypeKind::Dynamic(_))
    }

    pub fn copy_callbacks(&self) -> Option<CopyCallbacks> {
        match self.kind {
            TypeKind::Leaf(cbs) => Some(cbs),
            _ => None,
        }
    }

    /// Active arm of the union held by the last member, from its siblings.
    pub(crate) fn union_arm(&self, prefix: &[Value]) -> Result<usize, MarshalError> {
        match self.kind {
            TypeKind::Dynamic(DynamicKind::TaggedUnion(arm)) => arm(prefix),
            _ => Err(MarshalError::InvalidDescriptor {
                type_name: self.name,
                reason: "union member outside a tagged-union struct",
            }),
        }
    }

    /// Element count of the dynamic array member, from its siblings.
    pub(crate) fn dynamic_elements(&self, prefix: &[Value]) -> Result<usize, MarshalError> {
        match self.kind {
            TypeKind::Dynamic(DynamicKind::Array(elements)) => elements(prefix),
            _ => Err(MarshalError::InvalidDescriptor {
                type_name: self.name,
                reason: "dynamic array outside a dynamic-array struct",
            }),
        }
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            TypeKind::Leaf(_) => "leaf",
            TypeKind::Struct => "struct",
            TypeKind::Union => "union",
            TypeKind::Dynamic(DynamicKind::TaggedUnion(_)) => "tagged-union struct",
            TypeKind::Dynamic(DynamicKind::Array(_)) => "dynamic-array struct",
        };
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("size", &self.size)
            .field("members", &self.members)
            .finish()
    }
}
