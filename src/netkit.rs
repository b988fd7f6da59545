//! Netkit link options
//!
//! A netkit device is created as a pair: the primary device and its peer.
//! Both are described in one `RTM_NEWLINK` request; the peer's own
//! definition is nested inside the primary's `IFLA_INFO_DATA` as
//! `IFLA_NETKIT_PEER_INFO`.
//!
//! # Architecture
//!
//! - `options`: the option grammar parser (build direction)
//! - `info`: decoding a dumped attribute table for display (print direction)
//!
//! # Educational Notes
//!
//! ## Attribute Layout
//!
//! ```text
//! IFLA_LINKINFO
//! ├── IFLA_INFO_KIND   "netkit"
//! └── IFLA_INFO_DATA
//!     ├── IFLA_NETKIT_MODE         u32   (primary only)
//!     ├── IFLA_NETKIT_POLICY       u32   (primary)
//!     ├── IFLA_NETKIT_PEER_POLICY  u32   (peer)
//!     └── IFLA_NETKIT_PEER_INFO
//!         ├── ifinfomsg            16 bytes, peer identity
//!         └── IFLA_IFNAME, IFLA_MTU, ...  (from the device grammar)
//! ```

pub mod info;
pub mod options;

pub use info::{decode_info, peer_info, NetkitInfo};
pub use options::{parse_opt, NetkitOptions, PeerRecord};

use serde::Serialize;
use thiserror::Error;

use crate::link::LinkGrammarError;
use crate::netlink::message::MessageError;
use crate::netlink::structures::{NETKIT_DROP, NETKIT_L2, NETKIT_L3, NETKIT_PASS};

/// Link kind handled by this module
pub const KIND: &str = "netkit";

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Forwarding mode of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetkitMode {
    L2,
    L3,
}

impl NetkitMode {
    /// Parse the argument of `mode`; only the exact literals are accepted
    pub fn from_arg(value: &str) -> Result<Self, NetkitError> {
        match value {
            "l3" => Ok(Self::L3),
            "l2" => Ok(Self::L2),
            _ => Err(NetkitError::InvalidArgument {
                option: "mode",
                value: value.to_string(),
                expected: "\"l3\" or \"l2\"",
            }),
        }
    }

    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            NETKIT_L2 => Some(Self::L2),
            NETKIT_L3 => Some(Self::L3),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> u32 {
        match self {
            Self::L2 => NETKIT_L2,
            Self::L3 => NETKIT_L3,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::L3 => "l3",
        }
    }
}

/// Default verdict for traffic when no BPF program is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetkitPolicy {
    Forward,
    Blackhole,
}

impl NetkitPolicy {
    /// Parse a policy token; abbreviations that reached here are rejected
    pub fn from_arg(value: &str) -> Result<Self, NetkitError> {
        match value {
            "forward" => Ok(Self::Forward),
            "blackhole" => Ok(Self::Blackhole),
            _ => Err(NetkitError::InvalidArgument {
                option: "policy",
                value: value.to_string(),
                expected: "\"forward\" or \"blackhole\"",
            }),
        }
    }

    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            NETKIT_PASS => Some(Self::Forward),
            NETKIT_DROP => Some(Self::Blackhole),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> u32 {
        match self {
            Self::Forward => NETKIT_PASS,
            Self::Blackhole => NETKIT_DROP,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Blackhole => "blackhole",
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Coarse classification of a `NetkitError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DuplicateOption,
    UnknownOption,
    InvalidArgument,
    DelegatedGrammarFailure,
}

/// Errors from parsing netkit options. All of them abort the parse; the
/// request being built must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetkitError {
    #[error("duplicate \"{option}\": \"{value}\" is the second value.")]
    DuplicateOption { option: &'static str, value: String },

    #[error("{kind}: unknown option \"{token}\"?")]
    UnknownOption { kind: String, token: String },

    /// The peer's device grammar named a link kind
    #[error("peer type \"{0}\" cannot be given, it is implied by the primary device")]
    PeerType(String),

    #[error("argument \"{value}\" of \"{option}\" must be either {expected}")]
    InvalidArgument {
        option: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("command line is not complete after \"{option}\", try option \"help\"")]
    IncompleteCommand { option: &'static str },

    #[error(transparent)]
    Delegated(#[from] LinkGrammarError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

impl NetkitError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateOption { .. } => ErrorKind::DuplicateOption,
            Self::UnknownOption { .. } | Self::PeerType(_) => ErrorKind::UnknownOption,
            Self::InvalidArgument { .. }
            | Self::IncompleteCommand { .. }
            | Self::Message(_) => ErrorKind::InvalidArgument,
            Self::Delegated(_) => ErrorKind::DelegatedGrammarFailure,
        }
    }

    /// Should the caller print `usage()` along with this error?
    #[must_use]
    pub const fn shows_usage(&self) -> bool {
        matches!(self, Self::UnknownOption { .. })
    }
}

// ============================================================================
// HELP TEXT
// ============================================================================

/// Usage text for the netkit options; scripts scrape this, keep it stable
#[must_use]
pub fn usage(kind: &str) -> String {
    format!(
        "Usage: ... {kind} [ mode MODE ] [ POLICY ] [ peer [ POLICY <options> ] ]\n\
         \n\
         MODE: l3 | l2\n\
         POLICY: forward | blackhole\n\
         (first values are the defaults if nothing is specified)\n\
         \n\
         To get <options> type 'ip link add help'.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_text() {
        let text = usage(KIND);
        assert!(text.starts_with(
            "Usage: ... netkit [ mode MODE ] [ POLICY ] [ peer [ POLICY <options> ] ]\n\n"
        ));
        assert!(text.contains("\nMODE: l3 | l2\n"));
        assert!(text.contains("\nPOLICY: forward | blackhole\n"));
        assert!(text.ends_with("\n\nTo get <options> type 'ip link add help'.\n"));
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(NetkitMode::L2.to_wire(), 0);
        assert_eq!(NetkitMode::L3.to_wire(), 1);
        assert_eq!(NetkitPolicy::Forward.to_wire(), 0);
        assert_eq!(NetkitPolicy::Blackhole.to_wire(), 2);
        assert_eq!(NetkitMode::from_wire(7), None);
        assert_eq!(NetkitPolicy::from_wire(1), None);
    }

    #[test]
    fn test_error_kinds() {
        let unknown = NetkitError::UnknownOption {
            kind: KIND.to_string(),
            token: "bogus".to_string(),
        };
        assert_eq!(unknown.kind(), ErrorKind::UnknownOption);
        assert!(unknown.shows_usage());
        assert_eq!(unknown.to_string(), "netkit: unknown option \"bogus\"?");

        let peer_type = NetkitError::PeerType("veth".to_string());
        assert_eq!(peer_type.kind(), ErrorKind::UnknownOption);
        assert!(!peer_type.shows_usage());

        let delegated = NetkitError::from(LinkGrammarError::Incomplete { option: "mtu" });
        assert_eq!(delegated.kind(), ErrorKind::DelegatedGrammarFailure);
        assert_eq!(
            delegated.to_string(),
            LinkGrammarError::Incomplete { option: "mtu" }.to_string()
        );
    }
}
