// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Copy callbacks for the common leaf types.
//!
//! Integers travel little-endian. Handle leaves travel as their wire
//! identifier and stay unresolved on the receiving side.

use super::descriptor::{CopyCallbacks, CopyContext};
use super::error::MarshalError;
use super::handle::{HandleRef, WireId};
use super::value::Value;
use crate::bdaddr::{BdAddr, BDADDR_LEN};

fn shape(type_name: &'static str, expected: &'static str) -> MarshalError {
    MarshalError::Shape {
        type_name,
        expected,
    }
}

fn marshal_bool(v: &Value, dest: &mut [u8], _: &CopyContext<'_>) -> Result<(), MarshalError> {
    let b = v.as_bool().ok_or_else(|| shape("bool", "a bool"))?;
    dest[0] = u8::from(b);
    Ok(())
}

fn unmarshal_bool(src: &[u8]) -> Result<Value, MarshalError> {
    match src[0] {
        0 => Ok(Value::Bool(false)),
        1 => Ok(Value::Bool(true)),
        _ => Err(MarshalError::InvalidLeaf {
            type_name: "bool",
            reason: "octet is neither 0 nor 1",
        }),
    }
}

fn marshal_u8(v: &Value, dest: &mut [u8], _: &CopyContext<'_>) -> Result<(), MarshalError> {
    dest[0] = v.as_u8().ok_or_else(|| shape("uint8", "a u8"))?;
    Ok(())
}

fn unmarshal_u8(src: &[u8]) -> Result<Value, MarshalError> {
    Ok(Value::U8(src[0]))
}

fn marshal_u16(v: &Value, dest: &mut [u8], _: &CopyContext<'_>) -> Result<(), MarshalError> {
    let n = v.as_u16().ok_or_else(|| shape("uint16", "a u16"))?;
    dest.copy_from_slice(&n.to_le_bytes());
    Ok(())
}

fn unmarshal_u16(src: &[u8]) -> Result<Value, MarshalError> {
    Ok(Value::U16(u16::from_le_bytes([src[0], src[1]])))
}

fn marshal_u32(v: &Value, dest: &mut [u8], _: &CopyContext<'_>) -> Result<(), MarshalError> {
    let n = v.as_u32().ok_or_else(|| shape("uint32", "a u32"))?;
    dest.copy_from_slice(&n.to_le_bytes());
    Ok(())
}

fn unmarshal_u32(src: &[u8]) -> Result<Value, MarshalError> {
    Ok(Value::U32(u32::from_le_bytes([src[0], src[1], src[2], src[3]])))
}

fn marshal_bdaddr(v: &Value, dest: &mut [u8], _: &CopyContext<'_>) -> Result<(), MarshalError> {
    let addr = v.as_addr().ok_or_else(|| shape("bdaddr", "an address"))?;
    dest.copy_from_slice(&addr.octets());
    Ok(())
}

fn unmarshal_bdaddr(src: &[u8]) -> Result<Value, MarshalError> {
    let mut octets = [0u8; BDADDR_LEN];
    octets.copy_from_slice(&src[..BDADDR_LEN]);
    Ok(Value::Addr(BdAddr::new(octets)))
}

/// Wire id for a handle member, zero when unset.
fn handle_wire_id(
    type_name: &'static str,
    v: &Value,
    ctx: &CopyContext<'_>,
) -> Result<u16, MarshalError> {
    match v.as_handle().ok_or_else(|| shape(type_name, "a handle"))? {
        HandleRef::Unset => Ok(0),
        HandleRef::Local(h) => ctx.wire_id(h).map(WireId::raw),
        HandleRef::Wire(id) => Ok(id.raw()),
    }
}

fn handle_from_wire(raw: u16) -> Value {
    if raw == 0 {
        Value::Handle(HandleRef::Unset)
    } else {
        Value::Handle(HandleRef::Wire(WireId::new(raw)))
    }
}

fn marshal_l2cap_sink(v: &Value, dest: &mut [u8], ctx: &CopyContext<'_>) -> Result<(), MarshalError> {
    let cid = handle_wire_id("L2capSink", v, ctx)?;
    dest.copy_from_slice(&cid.to_le_bytes());
    Ok(())
}

fn unmarshal_l2cap_sink(src: &[u8]) -> Result<Value, MarshalError> {
    Ok(handle_from_wire(u16::from_le_bytes([src[0], src[1]])))
}

fn marshal_rfcomm_channel(
    v: &Value,
    dest: &mut [u8],
    ctx: &CopyContext<'_>,
) -> Result<(), MarshalError> {
    let channel = handle_wire_id("RfcommChannel", v, ctx)?;
    dest[0] = u8::try_from(channel).map_err(|_| MarshalError::InvalidLeaf {
        type_name: "RfcommChannel",
        reason: "server channel does not fit one octet",
    })?;
    Ok(())
}

fn unmarshal_rfcomm_channel(src: &[u8]) -> Result<Value, MarshalError> {
    Ok(handle_from_wire(u16::from(src[0])))
}

pub const BOOL: CopyCallbacks = CopyCallbacks {
    marshal: marshal_bool,
    unmarshal: unmarshal_bool,
};

pub const U8: CopyCallbacks = CopyCallbacks {
    marshal: marshal_u8,
    unmarshal: unmarshal_u8,
};

pub const U16: CopyCallbacks = CopyCallbacks {
    marshal: marshal_u16,
    unmarshal: unmarshal_u16,
};

pub const U32: CopyCallbacks = CopyCallbacks {
    marshal: marshal_u32,
    unmarshal: unmarshal_u32,
};

pub const BDADDR: CopyCallbacks = CopyCallbacks {
    marshal: marshal_bdaddr,
    unmarshal: unmarshal_bdaddr,
};

/// Stream sink replaced by its L2CAP channel id (two octets).
pub const L2CAP_SINK: CopyCallbacks = CopyCallbacks {
    marshal: marshal_l2cap_sink,
    unmarshal: unmarshal_l2cap_sink,
};

/// Local reference replaced by its RFCOMM server channel (one octet).
pub const RFCOMM_CHANNEL: CopyCallbacks = CopyCallbacks {
    marshal: marshal_rfcomm_channel,
    unmarshal: unmarshal_rfcomm_channel,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::handle::LocalHandle;

    fn encode(cbs: CopyCallbacks, v: &Value, size: usize, ctx: &CopyContext<'_>) -> Vec<u8> {
        let mut out = vec![0u8; size];
        (cbs.marshal)(v, &mut out, ctx).expect("marshal leaf");
        out
    }

    #[test]
    fn test_integers_little_endian() {
        let ctx = CopyContext::default();
        assert_eq!(encode(U16, &Value::U16(0x1234), 2, &ctx), vec![0x34, 0x12]);
        assert_eq!(
            encode(U32, &Value::U32(0xdeadbeef), 4, &ctx),
            vec![0xef, 0xbe, 0xad, 0xde]
        );
        assert_eq!((U16.unmarshal)(&[0x34, 0x12]), Ok(Value::U16(0x1234)));
    }

    #[test]
    fn test_bool_rejects_other_octets() {
        assert_eq!((BOOL.unmarshal)(&[1]), Ok(Value::Bool(true)));
        assert!((BOOL.unmarshal)(&[2]).unwrap_err().is_corruption());
    }

    #[test]
    fn test_leaf_shape_mismatch() {
        let mut out = [0u8; 2];
        let err = (U16.marshal)(&Value::U8(1), &mut out, &CopyContext::default()).unwrap_err();
        assert!(matches!(err, MarshalError::Shape { .. }));
    }

    #[test]
    fn test_sink_becomes_cid() {
        let resolver = |h: LocalHandle| (h.raw() == 9).then_some(WireId::new(0x0041));
        let ctx = CopyContext::new(Some(&resolver));
        let sink = Value::Handle(HandleRef::Local(LocalHandle::new(9)));
        let bytes = encode(L2CAP_SINK, &sink, 2, &ctx);
        assert_eq!(bytes, vec![0x41, 0x00]);
        assert_eq!(
            (L2CAP_SINK.unmarshal)(&bytes),
            Ok(Value::Handle(HandleRef::Wire(WireId::new(0x41))))
        );
    }

    #[test]
    fn test_unset_handle_is_zero() {
        let ctx = CopyContext::default();
        let bytes = encode(L2CAP_SINK, &Value::Handle(HandleRef::Unset), 2, &ctx);
        assert_eq!(bytes, vec![0, 0]);
        assert_eq!(
            (L2CAP_SINK.unmarshal)(&bytes),
            Ok(Value::Handle(HandleRef::Unset))
        );
    }

    #[test]
    fn test_unresolved_sink_fails() {
        let ctx = CopyContext::default();
        let mut out = [0u8; 2];
        let sink = Value::Handle(HandleRef::Local(LocalHandle::new(3)));
        assert_eq!(
            (L2CAP_SINK.marshal)(&sink, &mut out, &ctx),
            Err(MarshalError::UnresolvedHandle(LocalHandle::new(3)))
        );
    }

    #[test]
    fn test_rfcomm_channel_single_octet() {
        let ctx = CopyContext::default();
        let v = Value::Handle(HandleRef::Wire(WireId::new(5)));
        assert_eq!(encode(RFCOMM_CHANNEL, &v, 1, &ctx), vec![5]);

        let wide = Value::Handle(HandleRef::Wire(WireId::new(0x100)));
        let mut out = [0u8; 1];
        assert!((RFCOMM_CHANNEL.marshal)(&wide, &mut out, &ctx).is_err());
    }
}
