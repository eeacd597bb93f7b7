// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bidirectional registry between local handles and wire identifiers.
//!
//! The map is the one structure shared by every adapter. It may only be
//! written while the controller holds the commit window open.

use super::{ChannelKind, TransportError};
use crate::marshal::{LocalHandle, WireId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Stream map shared by the controller and the adapters.
pub type SharedStreamMap = Arc<RwLock<StreamMap>>;

#[derive(Debug, Default)]
pub struct StreamMap {
    by_handle: HashMap<LocalHandle, (ChannelKind, WireId)>,
    by_wire: HashMap<(ChannelKind, WireId), LocalHandle>,
    window_open: bool,
}

impl StreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStreamMap {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn open_commit_window(&mut self) {
        self.window_open = true;
    }

    pub fn close_commit_window(&mut self) {
        self.window_open = false;
    }

    pub fn is_window_open(&self) -> bool {
        self.window_open
    }

    /// Record that `handle` carries `wire_id`.
    pub fn bind(&mut self, handle: LocalHandle, kind: ChannelKind, wire_id: WireId) -> Result<(), TransportError> {
        if !self.window_open {
            return Err(TransportError::WindowClosed);
        }
        if self.by_handle.contains_key(&handle) {
            return Err(TransportError::HandleInUse(handle));
        }
        if self.by_wire.contains_key(&(kind, wire_id)) {
            return Err(TransportError::DuplicateWireId { kind, wire_id });
        }
        self.by_handle.insert(handle, (kind, wire_id));
        self.by_wire.insert((kind, wire_id), handle);
        Ok(())
    }

    /// Drop the binding of `handle`.
    pub fn unbind(&mut self, handle: LocalHandle) -> Result<(ChannelKind, WireId), TransportError> {
        if !self.window_open {
            return Err(TransportError::WindowClosed);
        }
        let binding = self
            .by_handle
            .remove(&handle)
            .ok_or(TransportError::NotBound(handle))?;
        self.by_wire.remove(&binding);
        Ok(binding)
    }

    pub fn handle(&self, kind: ChannelKind, wire_id: WireId) -> Option<LocalHandle> {
        self.by_wire.get(&(kind, wire_id)).copied()
    }

    pub fn wire_id(&self, handle: LocalHandle) -> Option<(ChannelKind, WireId)> {
        self.by_handle.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}
