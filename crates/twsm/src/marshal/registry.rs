// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-subsystem type descriptor registry.

use super::descriptor::{DynamicKind, MemberDescriptor, TypeDescriptor, TypeKind};
use super::error::MarshalError;
use super::value::Value;
use super::{TypeId, WireFormat, MAX_MARSHAL_TYPES};

/// Read-only table of type descriptors indexed by [`TypeId`].
#[derive(Debug)]
pub struct TypeRegistry {
    name: &'static str,
    types: &'static [TypeDescriptor],
}

impl TypeRegistry {
    pub const fn new(name: &'static str, types: &'static [TypeDescriptor]) -> Self {
        Self { name, types }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Descriptor for `ty`. An unknown index means the two ends were built
    /// from different tables.
    pub fn get(&self, ty: TypeId) -> Result<&TypeDescriptor, MarshalError> {
        self.types
            .get(usize::from(ty))
            .ok_or(MarshalError::UnknownType(ty))
    }

    pub fn index_of(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .and_then(|i| TypeId::try_from(i).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (i as TypeId, t))
    }

    /// Check every structural rule of the table.
    pub fn validate(&self) -> Result<(), MarshalError> {
        if self.types.len() > MAX_MARSHAL_TYPES {
            return Err(MarshalError::InvalidDescriptor {
                type_name: self.name,
                reason: "more than 255 types",
            });
        }
        for desc in self.types {
            self.validate_type(desc)?;
        }
        Ok(())
    }

    fn validate_type(&self, desc: &TypeDescriptor) -> Result<(), MarshalError> {
        let invalid = |reason| MarshalError::InvalidDescriptor {
            type_name: desc.name,
            reason,
        };

        match desc.kind {
            TypeKind::Leaf(_) => {
                if desc.size == 0 {
                    return Err(invalid("leaf with zero size"));
                }
                if !desc.members.is_empty() {
                    return Err(invalid("leaf with members"));
                }
                return Ok(());
            }
            _ if desc.members.is_empty() => return Err(invalid("aggregate without members")),
            _ => {}
        }

        for member in desc.members {
            let member_ty = self
                .get(member.type_id)
                .map_err(|_| invalid("member type out of range"))?;
            if member_ty.is_union() && !matches!(desc.kind, TypeKind::Dynamic(DynamicKind::TaggedUnion(_))) {
                return Err(invalid("union member outside a tagged-union struct"));
            }
            if member.is_dynamic() && !matches!(desc.kind, TypeKind::Dynamic(DynamicKind::Array(_))) {
                return Err(invalid("dynamic member outside a dynamic-array struct"));
            }
        }

        match desc.kind {
            TypeKind::Union => {
                if desc.members.iter().any(MemberDescriptor::is_array) {
                    return Err(invalid("union arm declared as an array"));
                }
                if desc.members.len() > usize::from(u8::MAX) {
                    return Err(invalid("union with more than 255 arms"));
                }
            }
            TypeKind::Dynamic(DynamicKind::TaggedUnion(_)) => {
                let last = desc.members[desc.members.len() - 1];
                let last_is_union = self.get(last.type_id).map(TypeDescriptor::is_union)?;
                if !last_is_union || last.is_array() || last.is_pointer {
                    return Err(invalid("last member must be a plain union"));
                }
                let unions = desc
                    .members
                    .iter()
                    .filter(|m| self.get(m.type_id).map(TypeDescriptor::is_union).unwrap_or(false))
                    .count();
                if unions != 1 {
                    return Err(invalid("exactly one union member expected"));
                }
            }
            TypeKind::Dynamic(DynamicKind::Array(_)) => {
                let dynamic: Vec<(usize, &MemberDescriptor)> = desc
                    .members
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.is_dynamic())
                    .collect();
                match dynamic.as_slice() {
                    [(index, member)] => {
                        if !member.is_pointer && *index != desc.members.len() - 1 {
                            return Err(invalid("inline dynamic array must be the last member"));
                        }
                    }
                    _ => return Err(invalid("exactly one dynamic member expected")),
                }
            }
            TypeKind::Struct | TypeKind::Leaf(_) => {}
        }
        Ok(())
    }

    /// Wire size of `ty` when it holds no pointer or dynamic content.
    pub fn fixed_size(&self, ty: TypeId) -> Result<Option<usize>, MarshalError> {
        let desc = self.get(ty)?;
        match desc.kind {
            TypeKind::Leaf(_) => Ok(Some(desc.size)),
            TypeKind::Struct => {
                let mut total = 0usize;
                for member in desc.members {
                    if member.is_pointer || member.is_dynamic() {
                        return Ok(None);
                    }
                    match self.fixed_size(member.type_id)? {
                        Some(size) => total += size * member.array_elements,
                        None => return Ok(None),
                    }
                }
                Ok(Some(total))
            }
            TypeKind::Union | TypeKind::Dynamic(_) => Ok(None),
        }
    }

    /// Exact number of bytes `value` occupies on the wire as type `ty`.
    pub fn wire_size(&self, ty: TypeId, value: &Value, format: WireFormat) -> Result<usize, MarshalError> {
        let header = if format == WireFormat::Tagged { 1 } else { 0 };
        Ok(header + self.element_size(ty, false, value, format)?)
    }

    fn element_size(
        &self,
        ty: TypeId,
        is_pointer: bool,
        value: &Value,
        format: WireFormat,
    ) -> Result<usize, MarshalError> {
        let desc = self.get(ty)?;
        let shape = |expected| MarshalError::Shape {
            type_name: desc.name,
            expected,
        };

        let value = if is_pointer {
            match value {
                Value::Pointer(None) => return Ok(1),
                Value::Pointer(Some(inner)) => return Ok(1 + self.element_size(ty, false, inner, format)?),
                _ => return Err(shape("a pointer")),
            }
        } else {
            value
        };

        match desc.kind {
            TypeKind::Leaf(_) => Ok(desc.size),
            TypeKind::Union => match value {
                Value::Union(arm, inner) => {
                    let arm_desc = desc.members.get(*arm).ok_or(MarshalError::NoActiveArm {
                        type_name: desc.name,
                        discriminant: *arm as u32,
                    })?;
                    let tag = if format == WireFormat::Tagged { 1 } else { 0 };
                    Ok(tag + self.element_size(arm_desc.type_id, arm_desc.is_pointer, inner, format)?)
                }
                _ => Err(shape("a union")),
            },
            TypeKind::Struct | TypeKind::Dynamic(_) => {
                let members = value.members().ok_or_else(|| shape("a struct"))?;
                if members.len() != desc.members.len() {
                    return Err(shape("a struct with the declared member count"));
                }
                let mut total = 0;
                for (member, slot) in desc.members.iter().zip(members) {
                    total += self.member_size(member, slot, format)?;
                }
                Ok(total)
            }
        }
    }

    fn member_size(
        &self,
        member: &MemberDescriptor,
        slot: &Value,
        format: WireFormat,
    ) -> Result<usize, MarshalError> {
        if !member.is_array() {
            return self.element_size(member.type_id, member.is_pointer, slot, format);
        }
        let count_field = if member.is_dynamic() && format == WireFormat::Tagged { 2 } else { 0 };
        let (presence, elements, element_is_pointer) = if member.is_dynamic() && member.is_pointer {
            match slot {
                Value::Pointer(None) => return Ok(1),
                Value::Pointer(Some(inner)) => (1, inner.as_ref(), false),
                _ => {
                    return Err(MarshalError::Shape {
                        type_name: member.name,
                        expected: "a pointer to an array",
                    })
                }
            }
        } else {
            (0, slot, member.is_pointer)
        };
        let elements = elements.elements().ok_or(MarshalError::Shape {
            type_name: member.name,
            expected: "an array",
        })?;
        let mut total = presence + count_field;
        for element in elements {
            total += self.element_size(member.type_id, element_is_pointer, element, format)?;
        }
        Ok(total)
    }
}
