// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Leaf types shared by every subsystem registry.
//!
//! Every subsystem table starts with these entries, in this order, so the
//! indices below are valid in any registry built with [`type_table!`].
//!
//! [`type_table!`]: crate::type_table

use super::codec;
use super::descriptor::TypeDescriptor;
use super::TypeId;

crate::type_ids! { 0;
    BOOL,
    UINT8,
    UINT16,
    UINT32,
    BDADDR,
    /// Stream sink, marshalled as its L2CAP channel id.
    L2CAP_SINK,
    /// Local RFCOMM reference, marshalled as its server channel.
    RFCOMM_CHANNEL,
}

/// First index available to subsystem types.
pub const COMMON_TYPE_COUNT: TypeId = 7;

pub const BOOL_DESC: TypeDescriptor = TypeDescriptor::leaf("bool", 1, codec::BOOL);
pub const UINT8_DESC: TypeDescriptor = TypeDescriptor::leaf("uint8", 1, codec::U8);
pub const UINT16_DESC: TypeDescriptor = TypeDescriptor::leaf("uint16", 2, codec::U16);
pub const UINT32_DESC: TypeDescriptor = TypeDescriptor::leaf("uint32", 4, codec::U32);
pub const BDADDR_DESC: TypeDescriptor = TypeDescriptor::leaf("bdaddr", 6, codec::BDADDR);
pub const L2CAP_SINK_DESC: TypeDescriptor = TypeDescriptor::leaf("L2capSink", 2, codec::L2CAP_SINK);
pub const RFCOMM_CHANNEL_DESC: TypeDescriptor =
    TypeDescriptor::leaf("RfcommChannel", 1, codec::RFCOMM_CHANNEL);

/// Build a subsystem type table: the common leaves followed by `$desc...`.
///
/// Subsystem ids are declared with [`type_ids!`](crate::type_ids) starting
/// at [`COMMON_TYPE_COUNT`], in the same order as the descriptors here.
#[macro_export]
macro_rules! type_table {
    ($($desc:expr),* $(,)?) => {
        [
            $crate::marshal::common::BOOL_DESC,
            $crate::marshal::common::UINT8_DESC,
            $crate::marshal::common::UINT16_DESC,
            $crate::marshal::common::UINT32_DESC,
            $crate::marshal::common::BDADDR_DESC,
            $crate::marshal::common::L2CAP_SINK_DESC,
            $crate::marshal::common::RFCOMM_CHANNEL_DESC,
            $($desc),*
        ]
    };
}

/// Declare sequential [`TypeId`](crate::marshal::TypeId) constants.
///
/// ```
/// twsm::type_ids! { twsm::marshal::common::COMMON_TYPE_COUNT;
///     SESSION,
///     SESSION_LINK,
/// }
/// assert_eq!(SESSION_LINK, SESSION + 1);
/// ```
#[macro_export]
macro_rules! type_ids {
    (@step $n:expr;) => {};
    (@step $n:expr; $(#[$meta:meta])* $name:ident $(, $($rest:tt)*)?) => {
        $(#[$meta])*
        pub const $name: $crate::marshal::TypeId = $n;
        $crate::type_ids!(@step $n + 1; $($($rest)*)?);
    };
    ($start:expr; $($rest:tt)*) => {
        $crate::type_ids!(@step $start; $($rest)*);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::registry::TypeRegistry;

    static COMMON: &[TypeDescriptor] = &crate::type_table![];

    #[test]
    fn test_ids_match_table_order() {
        let registry = TypeRegistry::new("common", COMMON);
        for (id, name) in [
            (BOOL, "bool"),
            (UINT8, "uint8"),
            (UINT16, "uint16"),
            (UINT32, "uint32"),
            (BDADDR, "bdaddr"),
            (L2CAP_SINK, "L2capSink"),
            (RFCOMM_CHANNEL, "RfcommChannel"),
        ] {
            assert_eq!(registry.index_of(name), Some(id), "{}", name);
        }
        assert_eq!(usize::from(COMMON_TYPE_COUNT), registry.len());
    }
}
