// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HFP snapshot types.
//!
//! The link's service record travels through the `RfcommChannel` leaf: the
//! sender resolves the record to its server channel and the receiver maps
//! the channel back to its own record at commit.

use super::{AudioParams, HfpLink, IndicatorIndexes, LinkFlags, TaskFlags, NUM_INDICATORS};
use crate::marshal::common::{BOOL, COMMON_TYPE_COUNT, RFCOMM_CHANNEL, UINT16, UINT32, UINT8};
use crate::marshal::{
    pointer_to, MarshalError, MarshalObject, MemberDescriptor as M, TypeDescriptor, TypeRegistry,
    Value,
};
use crate::type_table;

crate::type_ids! { COMMON_TYPE_COUNT;
    TASK_FLAGS,
    LINK_FLAGS,
    INDICATOR_INDEXES,
    AUDIO_PARAMS,
    HFP_LINK,
    /// Root object: server channel, link and task flags.
    HFP_MARSHALLED_OBJ,
}

static TASK_FLAGS_MEMBERS: [M; 3] = [
    M::new("hf_supported_features", UINT16),
    M::new("codec_negotiation", BOOL),
    M::new("wbs_codecs", UINT8),
];

static LINK_FLAGS_MEMBERS: [M; 5] = [
    M::new("slc_state", UINT8),
    M::new("priority", UINT8),
    M::new("at_cmd_resp_pending", BOOL),
    M::new("in_band_ring", BOOL),
    M::new("ag_profile_version", UINT16),
];

static INDICATOR_INDEXES_MEMBERS: [M; 4] = [
    M::array("indicator_idxs", UINT8, NUM_INDICATORS),
    M::new("num_extra_indicator_idxs", UINT16),
    M::dynamic_pointer("extra_indicator_idxs", UINT8),
    M::new("num_indicators", UINT16),
];

static AUDIO_PARAMS_MEMBERS: [M; 4] = [
    M::new("bandwidth", UINT32),
    M::new("max_latency", UINT16),
    M::new("voice_settings", UINT16),
    M::new("retx_effort", UINT8),
];

static HFP_LINK_MEMBERS: [M; 10] = [
    M::new("service", RFCOMM_CHANNEL),
    M::new("bitfields", LINK_FLAGS),
    M::new("ag_supported_features", UINT16),
    M::new("ag_supported_indicators", INDICATOR_INDEXES),
    M::new("ag_supported_hf_indicators", UINT16),
    M::new("audio_params", AUDIO_PARAMS),
    M::new("audio_packet_type", UINT16),
    M::new("audio_packet_type_to_try", UINT16),
    M::new("ag_codec_modes", UINT16),
    M::new("qce_codec_mode_id", UINT16),
];

static HFP_MARSHALLED_OBJ_MEMBERS: [M; 3] = [
    M::new("channel", UINT8),
    M::pointer("link", HFP_LINK),
    M::new("bitfields", TASK_FLAGS),
];

fn extra_indicator_count(prefix: &[Value]) -> Result<usize, MarshalError> {
    prefix
        .get(1)
        .and_then(Value::as_u16)
        .map(usize::from)
        .ok_or(MarshalError::Shape {
            type_name: "hfp_indicator_indexes",
            expected: "a uint16 element count",
        })
}

static TYPES: &[TypeDescriptor] = &type_table![
    TypeDescriptor::structure("hfp_task_bitfields", &TASK_FLAGS_MEMBERS),
    TypeDescriptor::structure("hfp_link_bitfields", &LINK_FLAGS_MEMBERS),
    TypeDescriptor::with_dynamic_array(
        "hfp_indicator_indexes",
        &INDICATOR_INDEXES_MEMBERS,
        extra_indicator_count
    ),
    TypeDescriptor::structure("hfp_audio_params", &AUDIO_PARAMS_MEMBERS),
    TypeDescriptor::structure("hfp_link_data", &HFP_LINK_MEMBERS),
    TypeDescriptor::structure("hfp_marshalled_obj", &HFP_MARSHALLED_OBJ_MEMBERS),
];

pub static REGISTRY: TypeRegistry = TypeRegistry::new("hfp", TYPES);

/// Root of the HFP snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HfpMarshalledObj {
    /// RFCOMM server channel of the link's sink.
    pub channel: u8,
    pub link: Option<HfpLink>,
    pub flags: TaskFlags,
}

impl MarshalObject for HfpMarshalledObj {
    fn to_value(&self) -> Value {
        Value::Struct(vec![
            self.channel.into(),
            pointer_to(self.link.as_ref()),
            self.flags.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("hfp_marshalled_obj", 3)?;
        Ok(Self {
            channel: f.take()?,
            link: f.pointer()?,
            flags: f.take()?,
        })
    }
}

marshal_struct! {
    TaskFlags: "hfp_task_bitfields" { hf_supported_features, codec_negotiation, wbs_codecs }
}

marshal_struct! {
    LinkFlags: "hfp_link_bitfields" {
        slc_state,
        priority,
        at_cmd_resp_pending,
        in_band_ring,
        ag_profile_version,
    }
}

impl MarshalObject for IndicatorIndexes {
    fn to_value(&self) -> Value {
        let extra = self.extra_indicator_idxs.as_deref();
        Value::Struct(vec![
            Value::bytes(&self.indicator_idxs),
            Value::U16(extra.map_or(0, <[u8]>::len) as u16),
            Value::pointer(extra.map(Value::bytes)),
            self.num_indicators.into(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("hfp_indicator_indexes", 4)?;
        let indicator_idxs: Vec<u8> = f.array()?;
        let indicator_idxs = <[u8; NUM_INDICATORS]>::try_from(indicator_idxs).map_err(|_| {
            MarshalError::Shape {
                type_name: "hfp_indicator_indexes",
                expected: "seven indicator indexes",
            }
        })?;
        let _extra_count: u16 = f.take()?;
        Ok(Self {
            indicator_idxs,
            extra_indicator_idxs: f.pointer_array()?,
            num_indicators: f.take()?,
        })
    }
}

marshal_struct! {
    AudioParams: "hfp_audio_params" { bandwidth, max_latency, voice_settings, retx_effort }
}

// The address and the sink belong to the receiving device.
marshal_struct! {
    HfpLink: "hfp_link_data" {
        service,
        flags,
        ag_supported_features,
        ag_supported_indicators,
        ag_supported_hf_indicators,
        audio_params,
        audio_packet_type,
        audio_packet_type_to_try,
        ag_codec_modes,
        qce_codec_mode_id,
    } local { addr, sink }
}
