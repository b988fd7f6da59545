//! Netlink `RTM_NEWLINK` message plumbing
//!
//! This module provides the byte-level building blocks for link requests:
//! the kernel structures and the request buffer that attributes are
//! appended to. It never talks to a socket; shipping the finished message
//! to the kernel is the caller's business.
//!
//! # Architecture
//!
//! - `structures`: Binary structures matching kernel layout (repr(C)) and constants
//! - `message`: Request construction, nested attributes, attribute parsing
//!
//! # Educational Notes
//!
//! ## Host Byte Order
//!
//! Netlink is a local protocol between user space and the kernel of the
//! same machine, so headers and integer attributes use host byte order.
//! Only payloads that are themselves network data (addresses, ports) are
//! big-endian, and link requests carry none of those.

// ============================================================================
// SUBMODULE DECLARATIONS
// ============================================================================

pub mod message; // Request construction and attribute parsing
pub mod structures; // Binary protocol structures

// ============================================================================
// PUBLIC RE-EXPORTS
// ============================================================================

pub use message::{
    parse_attributes,    // TLV run → attribute table
    parse_link_message,  // Whole link message → header, ifinfomsg, attributes
    AttrTable,           // Attribute type → payload bytes
    LinkRequest,         // In-progress request buffer
    MessageError,        // Error type for message operations
    NestHandle,          // Open nested attribute
    RequestConfig,       // Size bound and sequence number
};
pub use structures::{IfIdentity, IfInfoMsg};
