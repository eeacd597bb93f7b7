// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Profile state tables and their handover adapters.
//!
//! Each profile module holds the live connection table (`*Profile`), the
//! marshal registry describing its snapshot and the `*Handover` adapter
//! plugged into the [`HandoverController`](crate::handover::HandoverController).

/// Declare a one-octet enumeration carried as a `uint8` leaf.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $type_name:literal {
            $($(#[$vmeta:meta])* $variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<u8> for $name {
            type Error = $crate::marshal::MarshalError;

            fn try_from(v: u8) -> core::result::Result<Self, Self::Error> {
                match v {
                    $(x if x == $value => Ok(Self::$variant),)+
                    _ => Err($crate::marshal::MarshalError::InvalidLeaf {
                        type_name: $type_name,
                        reason: "value outside the enumeration",
                    }),
                }
            }
        }

        impl $crate::marshal::MarshalObject for $name {
            fn to_value(&self) -> $crate::marshal::Value {
                $crate::marshal::Value::U8(*self as u8)
            }

            fn from_value(
                value: $crate::marshal::Value,
            ) -> core::result::Result<Self, $crate::marshal::MarshalError> {
                let raw = <u8 as $crate::marshal::MarshalObject>::from_value(value)?;
                Self::try_from(raw)
            }
        }
    };
}

/// Implement `MarshalObject` for a struct carried member by member, in the
/// listed order. Fields after `local` stay on the device and are rebuilt
/// as their default.
macro_rules! marshal_struct {
    (
        $name:ty : $type_name:literal {
            $($field:ident),+ $(,)?
        } $(local { $($local:ident),+ $(,)? })?
    ) => {
        impl $crate::marshal::MarshalObject for $name {
            fn to_value(&self) -> $crate::marshal::Value {
                $crate::marshal::Value::Struct(vec![
                    $($crate::marshal::MarshalObject::to_value(&self.$field)),+
                ])
            }

            fn from_value(
                value: $crate::marshal::Value,
            ) -> core::result::Result<Self, $crate::marshal::MarshalError> {
                let count = [$(stringify!($field)),+].len();
                let mut f = value.into_fields($type_name, count)?;
                Ok(Self {
                    $($field: f.take()?,)+
                    $($($local: Default::default(),)+)?
                })
            }
        }
    };
}

pub mod a2dp;
pub mod avrcp;
pub mod hfp;

use crate::bdaddr::BdAddr;
use crate::config::{HandoverConfig, RuntimeConfig};
use crate::error::{Error, Result};
use crate::handover::{
    CommitJournal, HandoverController, InboundSnapshot, OutboundSnapshot, Progress,
};
use crate::marshal::{HandleRef, LocalHandle, TypeId, TypeRegistry, Value, WireFormat};
use crate::transport::{
    ChannelKind, HandoverPolicy, SharedStreamMap, SharedTransport, StreamMap, StreamTransport,
    TaskId, TransportError,
};
use std::sync::Arc;

/// Device-wide collaborators shared by every adapter of one device.
#[derive(Clone)]
pub struct DeviceContext {
    pub transport: SharedTransport,
    pub stream_map: SharedStreamMap,
    pub config: RuntimeConfig,
}

impl DeviceContext {
    pub fn new(transport: SharedTransport, stream_map: SharedStreamMap, config: RuntimeConfig) -> Self {
        Self {
            transport,
            stream_map,
            config,
        }
    }

    /// Run `f` with the transport and the stream map locked, in that order.
    pub fn with_links<R>(
        &self,
        f: impl FnOnce(&mut dyn StreamTransport, &mut StreamMap) -> R,
    ) -> R {
        let mut transport = self.transport.lock();
        let mut map = self.stream_map.write();
        f(&mut *transport, &mut map)
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Transient state an adapter keeps for one attempt.
///
/// `T` is the rebuilt snapshot, `S` what the commit saves of a table slot.
#[derive(Debug)]
pub(crate) struct Exchange<T, S> {
    config: Option<Arc<HandoverConfig>>,
    pub outbound: Option<OutboundSnapshot>,
    pub inbound: Option<InboundSnapshot>,
    pub received: Option<T>,
    pub journal: CommitJournal<S>,
}

impl<T, S> Exchange<T, S> {
    pub fn new() -> Self {
        Self {
            config: None,
            outbound: None,
            inbound: None,
            received: None,
            journal: CommitJournal::new(),
        }
    }

    /// Pin the configuration of the attempt that passed veto.
    pub fn begin(&mut self, config: &Arc<HandoverConfig>) {
        self.config = Some(Arc::clone(config));
    }

    /// Wire layout of the current attempt. Without a pinned configuration
    /// the live one is pinned on first use.
    pub fn wire_format(&mut self, live: &RuntimeConfig) -> WireFormat {
        self.config.get_or_insert_with(|| live.get()).wire_format
    }

    /// Feed `buf` to the inbound snapshot, decoding the object once it is
    /// rebuilt.
    pub fn feed(
        &mut self,
        live: &RuntimeConfig,
        registry: &'static TypeRegistry,
        root_type: TypeId,
        peer: &BdAddr,
        buf: &[u8],
        decode: impl FnOnce(Value) -> Result<T>,
    ) -> Result<Progress> {
        let format = self.wire_format(live);
        let inbound = self
            .inbound
            .get_or_insert_with(|| InboundSnapshot::new(registry, format, root_type, *peer));
        let progress = inbound.feed(buf)?;
        if let Some(value) = inbound.take_object() {
            self.received = Some(decode(value)?);
        }
        Ok(progress)
    }

    /// Object to commit. `None` when nothing was sent for this profile; an
    /// error when the snapshot was started but never finished.
    pub fn take_received(&mut self, profile: &'static str) -> Result<Option<T>> {
        match self.received.take() {
            Some(obj) => Ok(Some(obj)),
            None if self.inbound.is_some() => Err(Error::profile(
                profile,
                "commit before the snapshot was complete",
            )),
            None => Ok(None),
        }
    }

    /// Drop everything but the journal.
    pub fn reset(&mut self) {
        self.config = None;
        self.outbound = None;
        self.inbound = None;
        self.received = None;
    }
}

/// Log a veto reason; true when there is one.
pub(crate) fn veto_logged(profile: &'static str, reason: Option<&'static str>) -> bool {
    match reason {
        Some(reason) => {
            log::info!("[{}] veto: {}", profile, reason);
            true
        }
        None => false,
    }
}

/// Profile tables of one device.
#[derive(Debug, Clone)]
pub struct ProfileTables {
    pub a2dp: a2dp::SharedA2dp,
    pub avrcp: avrcp::SharedAvrcp,
    pub hfp: hfp::SharedHfp,
}

impl ProfileTables {
    /// Register one adapter per table with `controller`: A2DP, AVRCP, then
    /// HFP. Adapters share the controller's stream map and configuration.
    pub fn register(&self, controller: &mut HandoverController, transport: SharedTransport) -> Result<()> {
        let ctx = DeviceContext::new(transport, controller.stream_map(), controller.config().clone());
        controller.register(Box::new(a2dp::A2dpHandover::new(self.a2dp.clone(), ctx.clone())))?;
        controller.register(Box::new(avrcp::AvrcpHandover::new(self.avrcp.clone(), ctx.clone())))?;
        controller.register(Box::new(hfp::HfpHandover::new(self.hfp.clone(), ctx)))?;
        Ok(())
    }
}

/// Resolve a received sink on the link to `peer` and attach it to `task`.
///
/// Route, stream-map binding and policy all go through `journal`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn stitch_sink<S>(
    profile: &'static str,
    journal: &mut CommitJournal<S>,
    transport: &mut dyn StreamTransport,
    map: &mut StreamMap,
    peer: &BdAddr,
    kind: ChannelKind,
    sink: HandleRef,
    task: TaskId,
    policy: HandoverPolicy,
) -> Result<LocalHandle> {
    let wire_id = sink
        .wire()
        .filter(|id| id.is_valid())
        .ok_or_else(|| Error::profile(profile, "sink without a wire id"))?;
    let handle = transport
        .resolve(peer, kind, wire_id)
        .ok_or(TransportError::Unresolved { kind, wire_id })?;
    journal.route(transport, handle, Some(task))?;
    journal.bind(map, handle, kind, wire_id)?;
    journal.set_policy(transport, handle, policy)?;
    log::debug!("[{}] {} {} -> {} ({})", profile, kind, wire_id, handle, task);
    Ok(handle)
}
