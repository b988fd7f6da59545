//! Decoding netkit attributes for display
//!
//! This is a display path, not a validator: attributes that are missing or
//! have the wrong width are skipped, and values outside the known set are
//! shown as "unknown".

use serde::Serialize;
use std::fmt;

use super::{NetkitMode, NetkitPolicy};
use crate::netlink::message::{parse_ifinfo_payload, AttrTable, MessageError};
use crate::netlink::structures::{
    IfInfoMsg, IFLA_NETKIT_MODE, IFLA_NETKIT_PEER_INFO, IFLA_NETKIT_POLICY, IFLA_NETKIT_PRIMARY,
};

/// Label for a value outside the known set
pub const UNKNOWN: &str = "unknown";

/// Labels decoded from a netkit `IFLA_INFO_DATA` table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetkitInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    /// "primary" or "peer"
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<&'static str>,
}

impl NetkitInfo {
    /// Rendered `(key, label)` pairs in display order
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, &'static str)> {
        [("mode", self.mode), ("type", self.role), ("policy", self.policy)]
            .into_iter()
            .filter_map(|(key, label)| label.map(|label| (key, label)))
            .collect()
    }

    /// Object with one string member per decoded field
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.fields()
            .into_iter()
            .map(|(key, label)| (key.to_string(), serde_json::json!(label)))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

/// Same shape as `ip -d link show`: `" mode l2  type primary  policy forward "`
impl fmt::Display for NetkitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, label) in self.fields() {
            write!(f, " {key} {label} ")?;
        }
        Ok(())
    }
}

#[must_use]
pub fn mode_label(value: u32) -> &'static str {
    NetkitMode::from_wire(value).map_or(UNKNOWN, NetkitMode::label)
}

#[must_use]
pub fn policy_label(value: u32) -> &'static str {
    NetkitPolicy::from_wire(value).map_or(UNKNOWN, NetkitPolicy::label)
}

#[must_use]
pub const fn role_label(primary: u8) -> &'static str {
    if primary != 0 {
        "primary"
    } else {
        "peer"
    }
}

/// Decode the three displayable netkit attributes. Never fails.
#[must_use]
pub fn decode_info(tb: Option<&AttrTable>) -> NetkitInfo {
    let Some(tb) = tb else {
        return NetkitInfo::default();
    };

    NetkitInfo {
        mode: get_u32(tb, IFLA_NETKIT_MODE).map(mode_label),
        role: get_u8(tb, IFLA_NETKIT_PRIMARY).map(role_label),
        policy: get_u32(tb, IFLA_NETKIT_POLICY).map(policy_label),
    }
}

/// The peer's `ifinfomsg` and attributes, if the table carries a peer container
pub fn peer_info(tb: &AttrTable) -> Result<Option<(IfInfoMsg, AttrTable)>, MessageError> {
    tb.get(&IFLA_NETKIT_PEER_INFO)
        .map(|payload| parse_ifinfo_payload(payload))
        .transpose()
}

fn get_u32(tb: &AttrTable, rta_type: u16) -> Option<u32> {
    let bytes: [u8; 4] = tb.get(&rta_type)?.as_slice().try_into().ok()?;
    Some(u32::from_ne_bytes(bytes))
}

fn get_u8(tb: &AttrTable, rta_type: u16) -> Option<u8> {
    match tb.get(&rta_type)?.as_slice() {
        [value] => Some(*value),
        _ => None,
    }
}
