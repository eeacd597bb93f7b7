// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resumable marshaller.
//!
//! The walk is a stack of frames holding member or element indices only, so
//! the context never borrows the object graph: the caller passes the same
//! root on every call and the current position is re-derived from it. Each
//! step appends the bytes of one state change to a staging buffer, which is
//! then flushed into whatever room the caller's buffer has left. A leaf can
//! therefore be split across two buffers and any non-empty buffer makes
//! progress.

use super::descriptor::{CopyContext, MemberDescriptor, TypeDescriptor, TypeKind};
use super::error::MarshalError;
use super::handle::WireIdResolver;
use super::registry::TypeRegistry;
use super::value::Value;
use super::{TypeId, WireFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    /// Members of a struct, `next` is the member being written.
    Members { ty: TypeId, next: usize },
    /// Elements of an array member.
    Elements {
        ty: TypeId,
        is_pointer: bool,
        count: usize,
        next: usize,
    },
}

impl Frame {
    fn next(&self) -> usize {
        match self {
            Self::Members { next, .. } | Self::Elements { next, .. } => *next,
        }
    }

    fn advance(&mut self) {
        match self {
            Self::Members { next, .. } | Self::Elements { next, .. } => *next += 1,
        }
    }
}

/// Suspended marshal walk, kept by [`Marshaller::destroy`] and resumed by
/// [`Marshaller::resume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalCursor {
    format: WireFormat,
    root_type: Option<TypeId>,
    stack: Vec<Frame>,
    pending: Vec<u8>,
    pending_pos: usize,
    started: bool,
    done: bool,
    total: usize,
}

impl MarshalCursor {
    /// Bytes already handed to the caller.
    pub fn total_produced(&self) -> usize {
        self.total
    }

    pub fn root_type(&self) -> Option<TypeId> {
        self.root_type
    }
}

/// Marshal context for one root object.
pub struct Marshaller<'r> {
    registry: &'r TypeRegistry,
    cursor: MarshalCursor,
    produced: usize,
    remaining: usize,
}

impl<'r> Marshaller<'r> {
    pub fn begin(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            cursor: MarshalCursor {
                format: WireFormat::Implicit,
                root_type: None,
                stack: Vec::new(),
                pending: Vec::new(),
                pending_pos: 0,
                started: false,
                done: false,
                total: 0,
            },
            produced: 0,
            remaining: 0,
        }
    }

    /// Select the wire layout. Only meaningful before the first call.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.cursor.format = format;
        self
    }

    pub fn resume(registry: &'r TypeRegistry, cursor: MarshalCursor) -> Self {
        Self {
            registry,
            cursor,
            produced: 0,
            remaining: 0,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.cursor.format
    }

    /// Bytes written into the buffer of the last call.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Unused bytes of the buffer of the last call.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Bytes written since `begin`.
    pub fn total_produced(&self) -> usize {
        self.cursor.total
    }

    pub fn is_complete(&self) -> bool {
        self.cursor.done && self.cursor.pending_pos == self.cursor.pending.len()
    }

    /// Release the context, keeping the suspended walk when asked to.
    pub fn destroy(self, keep_partial: bool) -> Option<MarshalCursor> {
        keep_partial.then_some(self.cursor)
    }

    /// Marshal `root` into `buf`. Returns `true` once the whole object has
    /// been written; `false` means the buffer is full and the call must be
    /// repeated with a fresh buffer and the same root.
    pub fn marshal(
        &mut self,
        buf: &mut [u8],
        root: &Value,
        root_type: TypeId,
    ) -> Result<bool, MarshalError> {
        self.run(buf, root, root_type, CopyContext::default())
    }

    /// Same as [`marshal`](Self::marshal), resolving local handles through
    /// `resolver`.
    pub fn marshal_with_resolver(
        &mut self,
        buf: &mut [u8],
        root: &Value,
        root_type: TypeId,
        resolver: &dyn WireIdResolver,
    ) -> Result<bool, MarshalError> {
        self.run(buf, root, root_type, CopyContext::new(Some(resolver)))
    }

    fn run(
        &mut self,
        buf: &mut [u8],
        root: &Value,
        root_type: TypeId,
        ctx: CopyContext<'_>,
    ) -> Result<bool, MarshalError> {
        match self.cursor.root_type {
            Some(expected) if expected != root_type => {
                return Err(MarshalError::RootChanged {
                    expected,
                    found: root_type,
                })
            }
            Some(_) => {}
            None => self.cursor.root_type = Some(root_type),
        }
        if self.is_complete() && self.cursor.started {
            return Err(MarshalError::Finished);
        }

        self.produced = 0;
        let result = self.fill(buf, root, root_type, &ctx);
        self.remaining = buf.len() - self.produced;
        self.cursor.total += self.produced;
        result?;

        let complete = self.is_complete();
        if complete {
            log::debug!(
                "[marshal] {} root {} complete, {} bytes",
                self.registry.name(),
                root_type,
                self.cursor.total
            );
        }
        Ok(complete)
    }

    fn fill(
        &mut self,
        buf: &mut [u8],
        root: &Value,
        root_type: TypeId,
        ctx: &CopyContext<'_>,
    ) -> Result<(), MarshalError> {
        loop {
            self.flush(buf);
            if self.cursor.pending_pos < self.cursor.pending.len() {
                return Ok(());
            }
            self.cursor.pending.clear();
            self.cursor.pending_pos = 0;
            if self.cursor.done {
                return Ok(());
            }
            self.step(root, root_type, ctx)?;
        }
    }

    fn flush(&mut self, buf: &mut [u8]) {
        let cursor = &mut self.cursor;
        let available = buf.len() - self.produced;
        let n = available.min(cursor.pending.len() - cursor.pending_pos);
        buf[self.produced..self.produced + n]
            .copy_from_slice(&cursor.pending[cursor.pending_pos..cursor.pending_pos + n]);
        cursor.pending_pos += n;
        self.produced += n;
    }

    /// Advance the walk by one state change.
    fn step(
        &mut self,
        root: &Value,
        root_type: TypeId,
        ctx: &CopyContext<'_>,
    ) -> Result<(), MarshalError> {
        if !self.cursor.started {
            self.cursor.started = true;
            if self.cursor.format == WireFormat::Tagged {
                self.cursor.pending.push(root_type);
            }
            if !self.emit_element(root, root_type, false, ctx)? {
                self.cursor.done = true;
            }
            return Ok(());
        }

        let registry = self.registry;
        let container = self.container(root)?;
        let Some(top) = self.cursor.stack.last().cloned() else {
            self.cursor.done = true;
            return Ok(());
        };

        let pushed = match top {
            Frame::Members { ty, next } => {
                let desc = registry.get(ty)?;
                let members = container.members().ok_or(MarshalError::Shape {
                    type_name: desc.name,
                    expected: "a struct",
                })?;
                match desc.members.get(next) {
                    None => {
                        self.finish_frame();
                        return Ok(());
                    }
                    Some(md) => {
                        let slot = members.get(next).ok_or(MarshalError::Shape {
                            type_name: desc.name,
                            expected: "a struct with the declared member count",
                        })?;
                        self.emit_member(desc, md, slot, &members[..next], ctx)?
                    }
                }
            }
            Frame::Elements {
                ty,
                is_pointer,
                count,
                next,
            } => {
                if next == count {
                    self.finish_frame();
                    return Ok(());
                }
                let element = container.elements().and_then(|e| e.get(next)).ok_or(
                    MarshalError::Shape {
                        type_name: registry.get(ty)?.name,
                        expected: "an array with the expected length",
                    },
                )?;
                self.emit_element(element, ty, is_pointer, ctx)?
            }
        };

        if !pushed {
            if let Some(frame) = self.cursor.stack.last_mut() {
                frame.advance();
            }
        }
        Ok(())
    }

    /// Value whose children the top frame walks.
    fn container<'v>(&self, root: &'v Value) -> Result<&'v Value, MarshalError> {
        let mut current = root.payload();
        let frames = &self.cursor.stack;
        for parent in frames.iter().take(frames.len().saturating_sub(1)) {
            let children = match parent {
                Frame::Members { .. } => current.members(),
                Frame::Elements { .. } => current.elements(),
            };
            current = children
                .and_then(|c| c.get(parent.next()))
                .map(Value::payload)
                .ok_or(MarshalError::Shape {
                    type_name: "root",
                    expected: "the graph being marshalled",
                })?;
        }
        Ok(current)
    }

    fn finish_frame(&mut self) {
        self.cursor.stack.pop();
        match self.cursor.stack.last_mut() {
            Some(parent) => parent.advance(),
            None => self.cursor.done = true,
        }
    }

    fn push_presence(&mut self, present: bool) {
        self.cursor.pending.push(u8::from(present));
    }

    /// Stage one element. Returns whether a frame was pushed for it.
    fn emit_element(
        &mut self,
        value: &Value,
        ty: TypeId,
        is_pointer: bool,
        ctx: &CopyContext<'_>,
    ) -> Result<bool, MarshalError> {
        let desc = self.registry.get(ty)?;
        let value = if is_pointer {
            match value {
                Value::Pointer(None) => {
                    self.push_presence(false);
                    return Ok(false);
                }
                Value::Pointer(Some(inner)) => {
                    self.push_presence(true);
                    inner.as_ref()
                }
                _ => {
                    return Err(MarshalError::Shape {
                        type_name: desc.name,
                        expected: "a pointer",
                    })
                }
            }
        } else {
            value
        };

        match desc.kind {
            TypeKind::Leaf(callbacks) => {
                let start = self.cursor.pending.len();
                self.cursor.pending.resize(start + desc.size, 0);
                if let Err(e) = (callbacks.marshal)(value, &mut self.cursor.pending[start..], ctx) {
                    self.cursor.pending.truncate(start);
                    return Err(e);
                }
                Ok(false)
            }
            TypeKind::Struct | TypeKind::Dynamic(_) => {
                match value.members() {
                    Some(members) if members.len() == desc.members.len() => {}
                    _ => {
                        return Err(MarshalError::Shape {
                            type_name: desc.name,
                            expected: "a struct with the declared member count",
                        })
                    }
                }
                self.cursor.stack.push(Frame::Members { ty, next: 0 });
                Ok(true)
            }
            TypeKind::Union => Err(MarshalError::InvalidDescriptor {
                type_name: desc.name,
                reason: "union outside a tagged-union member",
            }),
        }
    }

    /// Stage one struct member. `prefix` holds the members before it.
    fn emit_member(
        &mut self,
        owner: &TypeDescriptor,
        md: &MemberDescriptor,
        slot: &Value,
        prefix: &[Value],
        ctx: &CopyContext<'_>,
    ) -> Result<bool, MarshalError> {
        let tagged = self.cursor.format == WireFormat::Tagged;
        let member_desc = self.registry.get(md.type_id)?;

        if member_desc.is_union() {
            let arm = owner.union_arm(prefix)?;
            let (found, inner) = match slot {
                Value::Union(found, inner) => (*found, inner.as_ref()),
                _ => {
                    return Err(MarshalError::Shape {
                        type_name: member_desc.name,
                        expected: "a union",
                    })
                }
            };
            if found != arm {
                return Err(MarshalError::ArmMismatch {
                    type_name: member_desc.name,
                    expected: arm,
                    found,
                });
            }
            let arm_md = member_desc.members.get(arm).ok_or(MarshalError::NoActiveArm {
                type_name: member_desc.name,
                discriminant: arm as u32,
            })?;
            if tagged {
                let tag = u8::try_from(arm).map_err(|_| MarshalError::NoActiveArm {
                    type_name: member_desc.name,
                    discriminant: arm as u32,
                })?;
                self.cursor.pending.push(tag);
            }
            return self.emit_element(inner, arm_md.type_id, arm_md.is_pointer, ctx);
        }

        if !md.is_array() {
            return self.emit_element(slot, md.type_id, md.is_pointer, ctx);
        }

        let (elements, element_is_pointer) = if md.is_dynamic() {
            let count = owner.dynamic_elements(prefix)?;
            let array = if md.is_pointer {
                match slot {
                    Value::Pointer(None) => {
                        self.push_presence(false);
                        return Ok(false);
                    }
                    Value::Pointer(Some(inner)) => inner.as_ref(),
                    _ => {
                        return Err(MarshalError::Shape {
                            type_name: md.name,
                            expected: "a pointer to an array",
                        })
                    }
                }
            } else {
                slot
            };
            let elements = array.elements().ok_or(MarshalError::Shape {
                type_name: md.name,
                expected: "an array",
            })?;
            if elements.len() != count {
                return Err(MarshalError::LengthMismatch {
                    type_name: md.name,
                    expected: count,
                    found: elements.len(),
                });
            }
            if md.is_pointer {
                self.push_presence(true);
            }
            if tagged {
                let n = u16::try_from(count).map_err(|_| MarshalError::CountOverflow(count))?;
                self.cursor.pending.extend_from_slice(&n.to_le_bytes());
            }
            (elements, false)
        } else {
            let elements = slot.elements().ok_or(MarshalError::Shape {
                type_name: md.name,
                expected: "an array",
            })?;
            if elements.len() != md.array_elements {
                return Err(MarshalError::LengthMismatch {
                    type_name: md.name,
                    expected: md.array_elements,
                    found: elements.len(),
                });
            }
            (elements, md.is_pointer)
        };

        if elements.is_empty() {
            return Ok(false);
        }
        self.cursor.stack.push(Frame::Elements {
            ty: md.type_id,
            is_pointer: element_is_pointer,
            count: elements.len(),
            next: 0,
        });
        Ok(true)
    }
}

impl std::fmt::Debug for Marshaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marshaller")
            .field("registry", &self.registry.name())
            .field("cursor", &self.cursor)
            .field("produced", &self.produced)
            .finish()
    }
}
