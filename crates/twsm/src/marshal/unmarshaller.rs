// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resumable unmarshaller.
//!
//! Objects under construction live on a stack of build frames. Every fixed
//! field (leaf bytes, presence octet, arm octet, count) is read through one
//! accumulator, so a slice may end anywhere and the next call picks up at
//! the same byte.

use super::descriptor::TypeKind;
use super::error::MarshalError;
use super::registry::TypeRegistry;
use super::value::Value;
use super::{TypeId, WireFormat};

/// Upper bound for capacity reserved from a received count.
const MAX_PREALLOC: usize = 256;

/// How a finished container is wrapped before it reaches its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Wrap {
    pointer: bool,
    arm: Option<usize>,
}

impl Wrap {
    fn apply(self, value: Value) -> Value {
        let value = if self.pointer {
            Value::Pointer(Some(Box::new(value)))
        } else {
            value
        };
        match self.arm {
            Some(arm) => Value::Union(arm, Box::new(value)),
            None => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BuildFrame {
    Members {
        ty: TypeId,
        built: Vec<Value>,
        wrap: Wrap,
    },
    Elements {
        ty: TypeId,
        is_pointer: bool,
        count: usize,
        built: Vec<Value>,
        wrap: Wrap,
    },
}

impl BuildFrame {
    fn built(&self) -> &[Value] {
        match self {
            Self::Members { built, .. } | Self::Elements { built, .. } => built,
        }
    }

    fn built_mut(&mut self) -> &mut Vec<Value> {
        match self {
            Self::Members { built, .. } | Self::Elements { built, .. } => built,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Members { built, wrap, .. } => wrap.apply(Value::Struct(built)),
            Self::Elements { built, wrap, .. } => wrap.apply(Value::Array(built)),
        }
    }
}

/// Envelope fields already read for the element being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct ElementCursor {
    arm: Option<usize>,
    present: Option<bool>,
    count: Option<usize>,
}

/// Objects built so far, kept by [`Unmarshaller::destroy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialBuild {
    format: WireFormat,
    root_type: TypeId,
    header_done: bool,
    stack: Vec<BuildFrame>,
    cursor: ElementCursor,
    partial: Vec<u8>,
    total: usize,
}

impl PartialBuild {
    pub fn root_type(&self) -> TypeId {
        self.root_type
    }

    /// Nesting depth of the object under construction.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn total_consumed(&self) -> usize {
        self.total
    }
}

/// Unmarshal context for one root object.
pub struct Unmarshaller<'r> {
    registry: &'r TypeRegistry,
    state: PartialBuild,
    result: Option<Value>,
    finished: bool,
    consumed: usize,
}

impl<'r> Unmarshaller<'r> {
    /// Start decoding an object of `root_type`.
    pub fn begin(registry: &'r TypeRegistry, root_type: TypeId) -> Self {
        Self::resume(
            registry,
            PartialBuild {
                format: WireFormat::Implicit,
                root_type,
                header_done: false,
                stack: Vec::new(),
                cursor: ElementCursor::default(),
                partial: Vec::new(),
                total: 0,
            },
        )
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.state.format = format;
        self
    }

    pub fn resume(registry: &'r TypeRegistry, state: PartialBuild) -> Self {
        Self {
            registry,
            state,
            result: None,
            finished: false,
            consumed: 0,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.state.format
    }

    /// Bytes taken from the last slice.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes taken since `begin`.
    pub fn total_consumed(&self) -> usize {
        self.state.total
    }

    pub fn is_complete(&self) -> bool {
        self.finished
    }

    /// Release the context, keeping the objects built so far when asked to.
    pub fn destroy(self, keep_partial: bool) -> Option<PartialBuild> {
        keep_partial.then_some(self.state)
    }

    /// Consume bytes. Returns the root object and its type once complete;
    /// bytes after the end of the object are left unconsumed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<(Value, TypeId)>, MarshalError> {
        if self.finished {
            return Err(MarshalError::Finished);
        }
        let mut pos = 0;
        let result = self.decode(bytes, &mut pos);
        self.consumed = pos;
        self.state.total += pos;

        match result {
            Ok(Some(value)) => {
                self.finished = true;
                log::debug!(
                    "[unmarshal] {} root {} complete, {} bytes",
                    self.registry.name(),
                    self.state.root_type,
                    self.state.total
                );
                Ok(Some((value, self.state.root_type)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                if e.is_corruption() {
                    log::error!(
                        "[unmarshal] {} stream corrupt at byte {}: {}",
                        self.registry.name(),
                        self.state.total,
                        e
                    );
                }
                Err(e)
            }
        }
    }

    fn decode(&mut self, input: &[u8], pos: &mut usize) -> Result<Option<Value>, MarshalError> {
        loop {
            if let Some(value) = self.result.take() {
                return Ok(Some(value));
            }
            if !self.step(input, pos)? {
                return Ok(None);
            }
        }
    }

    /// Accumulate `n` bytes; `None` when the slice ran out first.
    fn read(&mut self, input: &[u8], pos: &mut usize, n: usize) -> Option<Vec<u8>> {
        let partial = &mut self.state.partial;
        let take = (n - partial.len()).min(input.len() - *pos);
        partial.extend_from_slice(&input[*pos..*pos + take]);
        *pos += take;
        (partial.len() == n).then(|| std::mem::take(partial))
    }

    fn read_presence(&mut self, input: &[u8], pos: &mut usize) -> Result<Option<bool>, MarshalError> {
        if let Some(present) = self.state.cursor.present {
            return Ok(Some(present));
        }
        let Some(octet) = self.read(input, pos, 1) else {
            return Ok(None);
        };
        let present = match octet[0] {
            0 => false,
            1 => true,
            other => return Err(MarshalError::InvalidPresence(other)),
        };
        self.state.cursor.present = Some(present);
        Ok(Some(present))
    }

    fn top_built(&self) -> &[Value] {
        self.state.stack.last().map(BuildFrame::built).unwrap_or(&[])
    }

    /// Decode one field or open one frame. Returns `false` when the slice
    /// is exhausted.
    fn step(&mut self, input: &[u8], pos: &mut usize) -> Result<bool, MarshalError> {
        let top = self.state.stack.last().map(|frame| match frame {
            BuildFrame::Members { ty, .. } => (*ty, None),
            BuildFrame::Elements { ty, is_pointer, .. } => (*ty, Some(*is_pointer)),
        });

        match top {
            None => {
                if self.state.format == WireFormat::Tagged && !self.state.header_done {
                    let Some(octet) = self.read(input, pos, 1) else {
                        return Ok(false);
                    };
                    if octet[0] != self.state.root_type {
                        return Err(MarshalError::RootTypeMismatch {
                            expected: self.state.root_type,
                            found: octet[0],
                        });
                    }
                    self.state.header_done = true;
                }
                let root_type = self.state.root_type;
                self.step_element(input, pos, root_type, false, None)
            }
            Some((ty, None)) => self.step_member(input, pos, ty),
            Some((ty, Some(is_pointer))) => self.step_element(input, pos, ty, is_pointer, None),
        }
    }

    fn step_member(&mut self, input: &[u8], pos: &mut usize, owner_ty: TypeId) -> Result<bool, MarshalError> {
        let registry = self.registry;
        let tagged = self.state.format == WireFormat::Tagged;
        let owner = registry.get(owner_ty)?;
        let index = self.top_built().len();
        let md = owner.members.get(index).ok_or(MarshalError::InvalidDescriptor {
            type_name: owner.name,
            reason: "member index past the declared members",
        })?;
        let member_desc = registry.get(md.type_id)?;

        if member_desc.is_union() {
            let expected = owner.union_arm(self.top_built())?;
            let arm = match (tagged, self.state.cursor.arm) {
                (false, _) => expected,
                (true, Some(arm)) => arm,
                (true, None) => {
                    let Some(octet) = self.read(input, pos, 1) else {
                        return Ok(false);
                    };
                    let found = usize::from(octet[0]);
                    if found != expected {
                        return Err(MarshalError::ArmMismatch {
                            type_name: member_desc.name,
                            expected,
                            found,
                        });
                    }
                    self.state.cursor.arm = Some(found);
                    found
                }
            };
            let arm_md = member_desc.members.get(arm).ok_or(MarshalError::NoActiveArm {
                type_name: member_desc.name,
                discriminant: arm as u32,
            })?;
            return self.step_element(input, pos, arm_md.type_id, arm_md.is_pointer, Some(arm));
        }

        if !md.is_array() {
            return self.step_element(input, pos, md.type_id, md.is_pointer, None);
        }

        let mut wrap = Wrap::default();
        let (count, element_is_pointer) = if md.is_dynamic() {
            let count = owner.dynamic_elements(self.top_built())?;
            if md.is_pointer {
                match self.read_presence(input, pos)? {
                    None => return Ok(false),
                    Some(false) => {
                        self.deliver(Value::Pointer(None))?;
                        return Ok(true);
                    }
                    Some(true) => wrap.pointer = true,
                }
            }
            if tagged && self.state.cursor.count.is_none() {
                let Some(raw) = self.read(input, pos, 2) else {
                    return Ok(false);
                };
                let found = usize::from(u16::from_le_bytes([raw[0], raw[1]]));
                if found != count {
                    return Err(MarshalError::LengthMismatch {
                        type_name: md.name,
                        expected: count,
                        found,
                    });
                }
                self.state.cursor.count = Some(found);
            }
            (count, false)
        } else {
            (md.array_elements, md.is_pointer)
        };

        if count == 0 {
            self.deliver(wrap.apply(Value::Array(Vec::new())))?;
            return Ok(true);
        }
        self.push(BuildFrame::Elements {
            ty: md.type_id,
            is_pointer: element_is_pointer,
            count,
            built: Vec::with_capacity(count.min(MAX_PREALLOC)),
            wrap,
        })?;
        Ok(true)
    }

    fn step_element(
        &mut self,
        input: &[u8],
        pos: &mut usize,
        ty: TypeId,
        is_pointer: bool,
        arm: Option<usize>,
    ) -> Result<bool, MarshalError> {
        let mut wrap = Wrap { pointer: false, arm };
        if is_pointer {
            match self.read_presence(input, pos)? {
                None => return Ok(false),
                Some(false) => {
                    self.deliver(wrap.apply(Value::Pointer(None)))?;
                    return Ok(true);
                }
                Some(true) => wrap.pointer = true,
            }
        }

        let registry = self.registry;
        let desc = registry.get(ty)?;
        match desc.kind {
            TypeKind::Leaf(callbacks) => {
                let Some(bytes) = self.read(input, pos, desc.size) else {
                    return Ok(false);
                };
                let value = (callbacks.unmarshal)(&bytes)?;
                self.deliver(wrap.apply(value))?;
                Ok(true)
            }
            TypeKind::Struct | TypeKind::Dynamic(_) => {
                self.push(BuildFrame::Members {
                    ty,
                    built: Vec::with_capacity(desc.members.len()),
                    wrap,
                })?;
                Ok(true)
            }
            TypeKind::Union => Err(MarshalError::InvalidDescriptor {
                type_name: desc.name,
                reason: "union outside a tagged-union member",
            }),
        }
    }

    fn push(&mut self, frame: BuildFrame) -> Result<(), MarshalError> {
        self.state.cursor = ElementCursor::default();
        self.state.stack.push(frame);
        self.collapse()
    }

    fn deliver(&mut self, value: Value) -> Result<(), MarshalError> {
        self.state.cursor = ElementCursor::default();
        match self.state.stack.last_mut() {
            Some(frame) => frame.built_mut().push(value),
            None => self.result = Some(value),
        }
        self.collapse()
    }

    /// Pop every frame that has all of its children.
    fn collapse(&mut self) -> Result<(), MarshalError> {
        loop {
            let complete = match self.state.stack.last() {
                Some(BuildFrame::Members { ty, built, .. }) => {
                    built.len() >= self.registry.get(*ty)?.members.len()
                }
                Some(BuildFrame::Elements { count, built, .. }) => built.len() >= *count,
                None => return Ok(()),
            };
            if !complete {
                return Ok(());
            }
            let Some(frame) = self.state.stack.pop() else {
                return Ok(());
            };
            let value = frame.into_value();
            match self.state.stack.last_mut() {
                Some(parent) => parent.built_mut().push(value),
                None => {
                    self.result = Some(value);
                    return Ok(());
                }
            }
        }
    }
}

impl std::fmt::Debug for Unmarshaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unmarshaller")
            .field("registry", &self.registry.name())
            .field("root_type", &self.state.root_type)
            .field("depth", &self.state.stack.len())
            .field("finished", &self.finished)
            .finish()
    }
}
