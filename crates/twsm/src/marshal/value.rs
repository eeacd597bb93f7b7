// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph values walked by the marshaller and built by the unmarshaller.

use super::error::MarshalError;
use super::handle::HandleRef;
use crate::bdaddr::BdAddr;

/// One node of a marshallable object graph.
///
/// Struct members appear in descriptor order. A member with
/// `array_elements != 1` holds a `Value::Array`, a pointer member holds a
/// `Value::Pointer`, and a union member holds `Value::Union(arm, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    // Leaves
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    Addr(BdAddr),
    Handle(HandleRef),

    // Composites
    Struct(Vec<Value>),
    Union(usize, Box<Value>),
    Array(Vec<Value>),
    Pointer(Option<Box<Value>>),
}

impl Value {
    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::Addr(_) => "address",
            Self::Handle(_) => "handle",
            Self::Struct(_) => "struct",
            Self::Union(..) => "union",
            Self::Array(_) => "array",
            Self::Pointer(_) => "pointer",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Self::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Self::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_addr(&self) -> Option<BdAddr> {
        match self {
            Self::Addr(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<HandleRef> {
        match self {
            Self::Handle(v) => Some(*v),
            _ => None,
        }
    }

    /// Struct members, if this is a struct.
    pub fn members(&self) -> Option<&[Value]> {
        match self {
            Self::Struct(m) => Some(m),
            _ => None,
        }
    }

    /// Array elements, if this is an array.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Self::Array(e) => Some(e),
            _ => None,
        }
    }

    /// Struct member by position.
    pub fn member(&self, index: usize) -> Option<&Value> {
        self.members().and_then(|m| m.get(index))
    }

    /// Pointee of a non-null pointer.
    pub fn pointee(&self) -> Option<&Value> {
        match self {
            Self::Pointer(Some(v)) => Some(v),
            _ => None,
        }
    }

    pub fn union_arm(&self) -> Option<usize> {
        match self {
            Self::Union(arm, _) => Some(*arm),
            _ => None,
        }
    }

    pub fn union_value(&self) -> Option<&Value> {
        match self {
            Self::Union(_, v) => Some(v),
            _ => None,
        }
    }

    /// Peel pointer and union wrappers down to the payload they carry.
    pub(crate) fn payload(&self) -> &Value {
        let mut v = self;
        loop {
            match v {
                Self::Pointer(Some(inner)) | Self::Union(_, inner) => v = inner,
                _ => return v,
            }
        }
    }

    pub fn union(arm: usize, value: Value) -> Self {
        Self::Union(arm, Box::new(value))
    }

    pub fn pointer(value: Option<Value>) -> Self {
        Self::Pointer(value.map(Box::new))
    }

    /// Byte buffer as an array of `u8` leaves.
    pub fn bytes(data: &[u8]) -> Self {
        Self::Array(data.iter().map(|b| Self::U8(*b)).collect())
    }

    /// Split a struct into a field reader, checking the member count.
    pub fn into_fields(self, type_name: &'static str, count: usize) -> Result<Fields, MarshalError> {
        match self {
            Self::Struct(members) if members.len() == count => Ok(Fields {
                type_name,
                iter: members.into_iter(),
            }),
            _ => Err(MarshalError::Shape {
                type_name,
                expected: "a struct with the declared member count",
            }),
        }
    }
}

/// Sequential reader over the members of a struct value.
#[derive(Debug)]
pub struct Fields {
    type_name: &'static str,
    iter: std::vec::IntoIter<Value>,
}

impl Fields {
    fn shape(&self, expected: &'static str) -> MarshalError {
        MarshalError::Shape {
            type_name: self.type_name,
            expected,
        }
    }

    pub fn next_value(&mut self) -> Result<Value, MarshalError> {
        self.iter.next().ok_or_else(|| self.shape("a complete struct"))
    }

    pub fn take<T: MarshalObject>(&mut self) -> Result<T, MarshalError> {
        T::from_value(self.next_value()?)
    }

    /// Member declared as a pointer.
    pub fn pointer<T: MarshalObject>(&mut self) -> Result<Option<T>, MarshalError> {
        match self.next_value()? {
            Value::Pointer(None) => Ok(None),
            Value::Pointer(Some(v)) => T::from_value(*v).map(Some),
            _ => Err(self.shape("a pointer")),
        }
    }

    /// Member declared as an array.
    pub fn array<T: MarshalObject>(&mut self) -> Result<Vec<T>, MarshalError> {
        match self.next_value()? {
            Value::Array(elements) => elements.into_iter().map(T::from_value).collect(),
            _ => Err(self.shape("an array")),
        }
    }

    /// Member declared as a pointer to an array.
    pub fn pointer_array<T: MarshalObject>(&mut self) -> Result<Option<Vec<T>>, MarshalError> {
        match self.next_value()? {
            Value::Pointer(None) => Ok(None),
            Value::Pointer(Some(v)) => match *v {
                Value::Array(elements) => elements
                    .into_iter()
                    .map(T::from_value)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Some),
                _ => Err(self.shape("a pointer to an array")),
            },
            _ => Err(self.shape("a pointer")),
        }
    }

    /// Member declared as a union: active arm and its payload.
    pub fn union(&mut self) -> Result<(usize, Value), MarshalError> {
        match self.next_value()? {
            Value::Union(arm, v) => Ok((arm, *v)),
            _ => Err(self.shape("a union")),
        }
    }
}

/// Conversion between a typed domain object and its marshallable value.
pub trait MarshalObject: Sized {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, MarshalError>;
}

macro_rules! impl_leaf_object {
    ($ty:ty, $variant:ident, $name:expr) => {
        impl MarshalObject for $ty {
            fn to_value(&self) -> Value {
                Value::$variant(*self)
            }

            fn from_value(value: Value) -> Result<Self, MarshalError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    _ => Err(MarshalError::Shape {
                        type_name: $name,
                        expected: $name,
                    }),
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_leaf_object!(bool, Bool, "bool");
impl_leaf_object!(u8, U8, "u8");
impl_leaf_object!(u16, U16, "u16");
impl_leaf_object!(u32, U32, "u32");
impl_leaf_object!(BdAddr, Addr, "bdaddr");
impl_leaf_object!(HandleRef, Handle, "handle");

/// Pointer member value for an optional object.
pub fn pointer_to<T: MarshalObject>(object: Option<&T>) -> Value {
    Value::Pointer(object.map(|o| Box::new(o.to_value())))
}

/// Array member value for a slice of objects.
pub fn array_of<T: MarshalObject>(objects: &[T]) -> Value {
    Value::Array(objects.iter().map(MarshalObject::to_value).collect())
}
