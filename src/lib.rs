// ============================================================================
// NETKIT LINK LIBRARY
// ============================================================================
// This library builds and interprets the netlink request that creates a
// netkit device pair. It turns an `ip link add ... type netkit ...` style
// option list into a nested attribute tree, and turns a dumped attribute
// table back into display labels.
//
// === KEY FEATURES ===
// 1. Netkit option grammar: mode, policy per side, peer definition
// 2. Nested attribute construction with lengths finalized at close time
// 3. Peer identity propagation through the nested ifinfomsg
// 4. Display decoding (text and JSON) of dumped netkit attributes
//
// === WHAT IS NOT HERE ===
// Sending the message. The request is built in memory; the socket layer
// that ships it to the kernel lives elsewhere.

// === MODULE DECLARATIONS ===
// Byte-level netlink structures and the request buffer
pub mod netlink;

// Generic device grammar and the delegation boundary used for the peer
pub mod link;

// Netkit option parser and attribute decoder
pub mod netkit;

// === RE-EXPORTS ===
pub use link::{
    build_link_request, BuildError, BuiltLink, DelegatedParse, DeviceGrammar, LinkGrammar,
    LinkGrammarError,
};
pub use netkit::{
    decode_info, parse_opt, usage, ErrorKind, NetkitError, NetkitInfo, NetkitMode,
    NetkitOptions, NetkitPolicy, PeerRecord,
};
pub use netlink::{AttrTable, IfIdentity, LinkRequest, MessageError, RequestConfig};

#[cfg(test)]
mod tests;
