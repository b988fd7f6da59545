//! Binary structures for the netlink `RTM_NEWLINK` protocol
//!
//! These structures use `#[repr(C)]` to match kernel layout exactly.
//! Netlink headers and attribute payloads are always in host byte order,
//! so every encoder here uses `to_ne_bytes` / `from_ne_bytes`.

// NETLINK MESSAGE HEADER

/// Netlink message header (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NlMsgHdr {
    pub nlmsg_len: u32,
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Serialize into the first `SIZE` bytes of `out`
    pub fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.nlmsg_len.to_ne_bytes());
        out[4..6].copy_from_slice(&self.nlmsg_type.to_ne_bytes());
        out[6..8].copy_from_slice(&self.nlmsg_flags.to_ne_bytes());
        out[8..12].copy_from_slice(&self.nlmsg_seq.to_ne_bytes());
        out[12..16].copy_from_slice(&self.nlmsg_pid.to_ne_bytes());
    }

    /// Read a header from the start of `data`, `None` if it is too short
    #[must_use]
    pub fn read_from(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            nlmsg_len: read_u32(&data[0..4]),
            nlmsg_type: read_u16(&data[4..6]),
            nlmsg_flags: read_u16(&data[6..8]),
            nlmsg_seq: read_u32(&data[8..12]),
            nlmsg_pid: read_u32(&data[12..16]),
        })
    }
}

// INTERFACE INFO HEADER

/// Interface info message (16 bytes), the fixed payload of every
/// `RTM_*LINK` request and of a netkit peer container
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub ifi_pad: u8,
    pub ifi_type: u16,
    pub ifi_index: i32,
    pub ifi_flags: u32,
    pub ifi_change: u32,
}

impl IfInfoMsg {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn write_to(&self, out: &mut [u8]) {
        out[0] = self.ifi_family;
        out[1] = self.ifi_pad;
        out[2..4].copy_from_slice(&self.ifi_type.to_ne_bytes());
        out[4..8].copy_from_slice(&self.ifi_index.to_ne_bytes());
        out[8..12].copy_from_slice(&self.ifi_flags.to_ne_bytes());
        out[12..16].copy_from_slice(&self.ifi_change.to_ne_bytes());
    }

    #[must_use]
    pub fn read_from(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            ifi_family: data[0],
            ifi_pad: data[1],
            ifi_type: read_u16(&data[2..4]),
            ifi_index: i32::from_ne_bytes([data[4], data[5], data[6], data[7]]),
            ifi_flags: read_u32(&data[8..12]),
            ifi_change: read_u32(&data[12..16]),
        })
    }

    /// The index/flags/change triple carried by this header
    #[must_use]
    pub const fn identity(&self) -> IfIdentity {
        IfIdentity {
            index: self.ifi_index,
            flags: self.ifi_flags,
            change: self.ifi_change,
        }
    }

    pub fn set_identity(&mut self, identity: IfIdentity) {
        self.ifi_index = identity.index;
        self.ifi_flags = identity.flags;
        self.ifi_change = identity.change;
    }
}

/// Interface identity snapshot: the part of `ifinfomsg` that names an
/// interface and the flag bits a request wants to change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IfIdentity {
    pub index: i32,
    pub flags: u32,
    pub change: u32,
}

impl IfIdentity {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.index == 0 && self.flags == 0 && self.change == 0
    }

    /// Overlay identity bits from `other` on top of `self`.
    ///
    /// Flag bits named in `other.change` take `other`'s value, the rest
    /// keep ours. Change masks are OR-ed, a non-zero index replaces ours.
    #[must_use]
    pub const fn merged_with(self, other: IfIdentity) -> IfIdentity {
        IfIdentity {
            index: if other.index != 0 { other.index } else { self.index },
            flags: (self.flags & !other.change) | (other.flags & other.change),
            change: self.change | other.change,
        }
    }
}

// ROUTING ATTRIBUTE HEADER

/// Routing attribute header (4 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtAttr {
    pub rta_len: u16,
    pub rta_type: u16,
}

impl RtAttr {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn write_to(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.rta_len.to_ne_bytes());
        out[2..4].copy_from_slice(&self.rta_type.to_ne_bytes());
    }

    #[must_use]
    pub fn read_from(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            rta_len: read_u16(&data[0..2]),
            rta_type: read_u16(&data[2..4]),
        })
    }
}

// CONSTANTS

// Netlink message types
pub const RTM_NEWLINK: u16 = 16;

// Netlink flags
pub const NLM_F_REQUEST: u16 = 1;
pub const NLM_F_ACK: u16 = 4;

// Flags for NEW requests
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;

/// Address family used by link requests
pub const AF_UNSPEC: u8 = libc::AF_UNSPEC as u8;

/// Interface is administratively up
pub const IFF_UP: u32 = libc::IFF_UP as u32;

// Link attributes (IFLA_*)
pub const IFLA_IFNAME: u16 = 3;
pub const IFLA_MTU: u16 = 4;
pub const IFLA_TXQLEN: u16 = 13;
pub const IFLA_LINKINFO: u16 = 18;

// Nested inside IFLA_LINKINFO
pub const IFLA_INFO_KIND: u16 = 1;
pub const IFLA_INFO_DATA: u16 = 2;

// Nested inside IFLA_INFO_DATA for kind "netkit"
pub const IFLA_NETKIT_PEER_INFO: u16 = 1;
pub const IFLA_NETKIT_PRIMARY: u16 = 2;
pub const IFLA_NETKIT_POLICY: u16 = 3;
pub const IFLA_NETKIT_PEER_POLICY: u16 = 4;
pub const IFLA_NETKIT_MODE: u16 = 5;

// Netkit modes
pub const NETKIT_L2: u32 = 0;
pub const NETKIT_L3: u32 = 1;

// Netkit policies (BPF verdict style)
pub const NETKIT_PASS: u32 = 0;
pub const NETKIT_DROP: u32 = 2;

/// Request size `ip` uses for link requests
pub const DEFAULT_MAX_LEN: usize = 1024;

// HELPER FUNCTIONS

/// Align length to 4-byte boundary
#[must_use]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Calculate Netlink message length
#[must_use]
pub const fn nlmsg_length(payload_len: usize) -> u32 {
    (NlMsgHdr::SIZE + payload_len) as u32
}

/// Calculate space needed for Netlink message
#[must_use]
pub const fn nlmsg_space(payload_len: usize) -> usize {
    nlmsg_align(NlMsgHdr::SIZE + payload_len)
}

/// Align attribute length to 4-byte boundary
#[must_use]
pub const fn rta_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Calculate attribute length
#[must_use]
pub const fn rta_length(payload_len: usize) -> u16 {
    (RtAttr::SIZE + payload_len) as u16
}

/// Calculate space needed for attribute
#[must_use]
pub const fn rta_space(payload_len: usize) -> usize {
    rta_align(RtAttr::SIZE + payload_len)
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_ne_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// TESTS

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<NlMsgHdr>(), 16);
        assert_eq!(std::mem::size_of::<IfInfoMsg>(), 16);
        assert_eq!(std::mem::size_of::<RtAttr>(), 4);
    }

    #[test]
    fn test_alignment() {
        assert_eq!(nlmsg_align(0), 0);
        assert_eq!(nlmsg_align(1), 4);
        assert_eq!(nlmsg_align(3), 4);
        assert_eq!(nlmsg_align(4), 4);
        assert_eq!(nlmsg_align(5), 8);
        assert_eq!(rta_align(6), 8);
        assert_eq!(rta_space(1), 8);
        assert_eq!(rta_length(4), 8);
        assert_eq!(nlmsg_space(IfInfoMsg::SIZE), 32);
    }

    #[test]
    fn test_ifinfo_layout() {
        let ifi = IfInfoMsg {
            ifi_family: AF_UNSPEC,
            ifi_pad: 0,
            ifi_type: 0,
            ifi_index: 7,
            ifi_flags: IFF_UP,
            ifi_change: IFF_UP,
        };
        let mut buf = [0u8; IfInfoMsg::SIZE];
        ifi.write_to(&mut buf);

        assert_eq!(&buf[4..8], &7i32.to_ne_bytes());
        assert_eq!(IfInfoMsg::read_from(&buf), Some(ifi));
        assert_eq!(IfInfoMsg::read_from(&buf[..15]), None);
    }

    #[test]
    fn test_identity_merge() {
        let base = IfIdentity { index: 4, flags: 0, change: 0 };
        let overlay = IfIdentity { index: 0, flags: IFF_UP, change: IFF_UP };

        let merged = base.merged_with(overlay);
        assert_eq!(merged, IfIdentity { index: 4, flags: IFF_UP, change: IFF_UP });
        assert_eq!(base.merged_with(IfIdentity::default()), base);
        assert!(IfIdentity::default().is_empty());
    }

    #[test]
    fn test_identity_merge_clears_changed_flags() {
        let up = IfIdentity { index: 4, flags: IFF_UP, change: IFF_UP };
        let down = IfIdentity { index: 0, flags: 0, change: IFF_UP };

        assert_eq!(up.merged_with(down), IfIdentity { index: 4, flags: 0, change: IFF_UP });

        // Bits outside the change mask are left alone
        let stray = IfIdentity { index: 0, flags: IFF_UP, change: 0 };
        assert_eq!(IfIdentity::default().merged_with(stray), IfIdentity::default());
    }
}
