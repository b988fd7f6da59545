//! Netlink message construction and parsing
//!
//! This module owns the in-progress `RTM_NEWLINK` request buffer and the
//! routines that append attributes to it, plus the reverse direction:
//! splitting a received link message back into its header, `ifinfomsg`
//! and attribute table.
//!
//! # Educational Notes
//!
//! ## Message Format
//!
//! A link request is a netlink header followed by an interface info
//! header and a run of TLV attributes:
//! ```text
//! ┌─────────────────────────────┐
//! │ NlMsgHdr (16 bytes)         │  ← nlmsg_len covers everything below
//! ├─────────────────────────────┤
//! │ IfInfoMsg (16 bytes)        │  ← index / flags / change
//! ├─────────────────────────────┤
//! │ RtAttr + payload + padding  │  ← repeated, 4-byte aligned
//! └─────────────────────────────┘
//! ```
//!
//! ## Nested Attributes
//!
//! A nested attribute is an `RtAttr` whose payload is itself a run of
//! attributes. Its length is unknown when it is opened, so we remember
//! where the header lives (`NestHandle`) and patch `rta_len` once every
//! child has been appended:
//! ```text
//! begin_nest()          end_nest()
//!     │                     │
//!     ▼                     ▼
//!   [hdr ?][child][child]   → [hdr N][child][child]
//! ```

use crate::netlink::structures::*;
use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors that can occur during message operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Appending would grow the request past its size bound
    #[error("message exceeded bound of {max_len} (needed {needed} bytes)")]
    Overflow { max_len: usize, needed: usize },

    /// An attribute grew beyond what `rta_len` can express
    #[error("attribute {rta_type} is {len} bytes, larger than an attribute can hold")]
    AttributeTooLong { rta_type: u16, len: usize },

    /// Received data does not describe a well-formed message
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Attribute type → raw payload bytes
pub type AttrTable = HashMap<u16, Vec<u8>>;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Knobs for a new link request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfig {
    /// Upper bound on the encoded message size
    pub max_len: usize,
    /// Sequence number placed in the netlink header
    pub seq: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            seq: 0,
        }
    }
}

// ============================================================================
// MESSAGE CONSTRUCTION
// ============================================================================

/// Handle to an open nested attribute.
///
/// Not `Clone`: a nest is closed exactly once, by value.
#[derive(Debug, PartialEq, Eq)]
pub struct NestHandle {
    offset: usize,
    rta_type: u16,
}

impl NestHandle {
    /// Byte offset of the nest's `RtAttr` header within the message
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Byte offset of the first byte after the nest header
    #[must_use]
    pub const fn payload_offset(&self) -> usize {
        self.offset + RtAttr::SIZE
    }
}

/// An in-progress link request: netlink header, `ifinfomsg`, attributes.
///
/// `nlmsg_len` in the header is kept in sync with the buffer after every
/// append, so `as_bytes()` is always a complete message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    buf: Vec<u8>,
    max_len: usize,
}

impl LinkRequest {
    /// Offset of the `ifinfomsg` that follows the netlink header
    pub const IFINFO_OFFSET: usize = NlMsgHdr::SIZE;

    /// Start an `RTM_NEWLINK` create request
    #[must_use]
    pub fn new_link(config: RequestConfig) -> Self {
        Self::new(
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_CREATE | NLM_F_EXCL | NLM_F_ACK,
            config,
        )
    }

    #[must_use]
    pub fn new(nlmsg_type: u16, nlmsg_flags: u16, config: RequestConfig) -> Self {
        let total = nlmsg_space(IfInfoMsg::SIZE);
        let mut buf = vec![0u8; total];

        let nlh = NlMsgHdr {
            nlmsg_len: nlmsg_length(IfInfoMsg::SIZE),
            nlmsg_type,
            nlmsg_flags,
            nlmsg_seq: config.seq,
            nlmsg_pid: 0, // Kernel assigns
        };
        nlh.write_to(&mut buf[..NlMsgHdr::SIZE]);

        let ifi = IfInfoMsg {
            ifi_family: AF_UNSPEC,
            ..IfInfoMsg::default()
        };
        ifi.write_to(&mut buf[Self::IFINFO_OFFSET..]);

        Self {
            buf,
            max_len: config.max_len,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn header(&self) -> NlMsgHdr {
        NlMsgHdr::read_from(&self.buf).unwrap_or_default()
    }

    /// The primary `ifinfomsg`
    #[must_use]
    pub fn ifinfo(&self) -> IfInfoMsg {
        IfInfoMsg::read_from(&self.buf[Self::IFINFO_OFFSET..]).unwrap_or_default()
    }

    pub fn set_ifinfo(&mut self, ifi: &IfInfoMsg) {
        let end = Self::IFINFO_OFFSET + IfInfoMsg::SIZE;
        ifi.write_to(&mut self.buf[Self::IFINFO_OFFSET..end]);
    }

    /// Index, flags and change mask of the primary `ifinfomsg`
    #[must_use]
    pub fn identity(&self) -> IfIdentity {
        self.ifinfo().identity()
    }

    pub fn set_identity(&mut self, identity: IfIdentity) {
        let mut ifi = self.ifinfo();
        ifi.set_identity(identity);
        self.set_ifinfo(&ifi);
    }

    /// Overwrite the identity of an `ifinfomsg` embedded at `offset`,
    /// e.g. the one reserved at the start of a peer container
    pub fn write_identity_at(
        &mut self,
        offset: usize,
        identity: IfIdentity,
    ) -> Result<(), MessageError> {
        let end = offset + IfInfoMsg::SIZE;
        let msg_len = self.buf.len();
        let slot = self.buf.get_mut(offset..end).ok_or_else(|| {
            MessageError::Malformed(format!(
                "no ifinfomsg at offset {offset} (message is {msg_len} bytes)"
            ))
        })?;

        let mut ifi = IfInfoMsg::read_from(slot).unwrap_or_default();
        ifi.set_identity(identity);
        ifi.write_to(slot);
        Ok(())
    }

    /// Append one attribute with an arbitrary payload
    pub fn add_attr(&mut self, rta_type: u16, payload: &[u8]) -> Result<(), MessageError> {
        if RtAttr::SIZE + payload.len() > usize::from(u16::MAX) {
            return Err(MessageError::AttributeTooLong {
                rta_type,
                len: RtAttr::SIZE + payload.len(),
            });
        }

        let start = nlmsg_align(self.buf.len());
        let needed = start + rta_space(payload.len());
        if needed > self.max_len {
            return Err(MessageError::Overflow {
                max_len: self.max_len,
                needed,
            });
        }

        self.buf.resize(start, 0);
        let rta = RtAttr {
            rta_len: rta_length(payload.len()),
            rta_type,
        };
        let mut hdr = [0u8; RtAttr::SIZE];
        rta.write_to(&mut hdr);
        self.buf.extend_from_slice(&hdr);
        self.buf.extend_from_slice(payload);
        self.buf.resize(needed, 0);

        self.sync_len();
        trace!(rta_type, len = payload.len(), "appended attribute");
        Ok(())
    }

    pub fn add_attr_u8(&mut self, rta_type: u16, value: u8) -> Result<(), MessageError> {
        self.add_attr(rta_type, &[value])
    }

    pub fn add_attr_u32(&mut self, rta_type: u16, value: u32) -> Result<(), MessageError> {
        self.add_attr(rta_type, &value.to_ne_bytes())
    }

    /// Append a NUL-terminated string attribute
    pub fn add_attr_str(&mut self, rta_type: u16, value: &str) -> Result<(), MessageError> {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.add_attr(rta_type, &payload)
    }

    /// Open a nested attribute; its length is patched by `end_nest`
    pub fn begin_nest(&mut self, rta_type: u16) -> Result<NestHandle, MessageError> {
        let offset = nlmsg_align(self.buf.len());
        self.add_attr(rta_type, &[])?;
        trace!(rta_type, offset, "opened nest");
        Ok(NestHandle { offset, rta_type })
    }

    /// Reserve `len` zeroed bytes at the tail, returning their offset
    pub fn reserve(&mut self, len: usize) -> Result<usize, MessageError> {
        let offset = nlmsg_align(self.buf.len());
        let needed = offset + nlmsg_align(len);
        if needed > self.max_len {
            return Err(MessageError::Overflow {
                max_len: self.max_len,
                needed,
            });
        }
        self.buf.resize(needed, 0);
        self.sync_len();
        Ok(offset)
    }

    /// Close a nest: its length becomes everything appended since it opened
    pub fn end_nest(&mut self, nest: NestHandle) -> Result<u16, MessageError> {
        let len = self.buf.len() - nest.offset;
        let rta_len = u16::try_from(len).map_err(|_| MessageError::AttributeTooLong {
            rta_type: nest.rta_type,
            len,
        })?;

        let rta = RtAttr {
            rta_len,
            rta_type: nest.rta_type,
        };
        rta.write_to(&mut self.buf[nest.offset..nest.offset + RtAttr::SIZE]);
        trace!(rta_type = nest.rta_type, rta_len, "closed nest");
        Ok(rta_len)
    }

    /// Attributes following the primary `ifinfomsg`
    pub fn attributes(&self) -> Result<AttrTable, MessageError> {
        parse_attributes(&self.buf[nlmsg_space(IfInfoMsg::SIZE)..])
    }

    fn sync_len(&mut self) {
        let len = self.buf.len() as u32;
        self.buf[0..4].copy_from_slice(&len.to_ne_bytes());
    }
}

// ============================================================================
// MESSAGE PARSING
// ============================================================================

/// A decoded link message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub header: NlMsgHdr,
    pub ifinfo: IfInfoMsg,
    pub attributes: AttrTable,
}

/// Parse one `RTM_*LINK` message from the start of `data`
pub fn parse_link_message(data: &[u8]) -> Result<LinkMessage, MessageError> {
    let header = NlMsgHdr::read_from(data).ok_or_else(|| {
        MessageError::Malformed(format!(
            "buffer of {} bytes is too small for a netlink header",
            data.len()
        ))
    })?;

    let msg_len = header.nlmsg_len as usize;
    if msg_len < NlMsgHdr::SIZE {
        return Err(MessageError::Malformed(format!(
            "invalid message length: {} (minimum is {})",
            msg_len,
            NlMsgHdr::SIZE
        )));
    }
    if msg_len > data.len() {
        return Err(MessageError::Malformed(format!(
            "message length {} exceeds buffer size {}",
            msg_len,
            data.len()
        )));
    }

    let (ifinfo, attributes) = parse_ifinfo_payload(&data[NlMsgHdr::SIZE..msg_len])?;
    Ok(LinkMessage {
        header,
        ifinfo,
        attributes,
    })
}

/// Split an `ifinfomsg`-prefixed payload into the header and its attributes.
///
/// Used for whole link messages and for a netkit peer container alike.
pub fn parse_ifinfo_payload(data: &[u8]) -> Result<(IfInfoMsg, AttrTable), MessageError> {
    let ifinfo = IfInfoMsg::read_from(data).ok_or_else(|| {
        MessageError::Malformed(format!(
            "payload of {} bytes is too small for ifinfomsg",
            data.len()
        ))
    })?;
    let attributes = parse_attributes(&data[nlmsg_align(IfInfoMsg::SIZE)..])?;
    Ok((ifinfo, attributes))
}

/// Parse routing attributes (TLV run) into a table.
///
/// ```text
/// ┌────────────────┐
/// │ RtAttr header  │ ← 4 bytes (rta_len: u16, rta_type: u16)
/// ├────────────────┤
/// │ Payload        │ ← rta_len - 4 bytes
/// ├────────────────┤
/// │ Padding        │ ← 0-3 bytes (align to 4-byte boundary)
/// └────────────────┘
/// ```
///
/// A later attribute with the same type replaces an earlier one, as the
/// kernel's own table parser does.
pub fn parse_attributes(data: &[u8]) -> Result<AttrTable, MessageError> {
    let mut attrs = HashMap::new();
    let mut offset = 0;

    while let Some(rta) = RtAttr::read_from(&data[offset..]) {
        let attr_len = rta.rta_len as usize;

        // Too short to be an attribute: end of the run
        if attr_len < RtAttr::SIZE {
            break;
        }

        if offset + attr_len > data.len() {
            return Err(MessageError::Malformed(format!(
                "attribute length {} exceeds buffer (offset={}, buffer={})",
                attr_len,
                offset,
                data.len()
            )));
        }

        let payload = data[offset + RtAttr::SIZE..offset + attr_len].to_vec();
        attrs.insert(rta.rta_type, payload);

        offset += rta_align(attr_len);
        if offset >= data.len() {
            break;
        }
    }

    Ok(attrs)
}

/// Parse the attribute run nested inside `attrs[rta_type]`, if present
pub fn parse_nested(attrs: &AttrTable, rta_type: u16) -> Result<Option<AttrTable>, MessageError> {
    attrs
        .get(&rta_type)
        .map(|payload| parse_attributes(payload))
        .transpose()
}

// ============================================================================
// TESTS
// ============================================================================
