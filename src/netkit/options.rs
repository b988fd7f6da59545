//! Netkit option grammar parser
//!
//! ```text
//! [ mode { l3 | l2 } ] [ forward | blackhole ] [ peer [ forward | blackhole ] [ <options> ] ]
//! ```
//!
//! The same `forward` / `blackhole` keywords address either side of the
//! pair; which one is decided by whether `peer` has already been consumed.
//! The first token after `peer` that is not a netkit keyword starts the
//! peer's own device definition, which is handed to a `LinkGrammar` and
//! written into a nested `IFLA_NETKIT_PEER_INFO` container.
//!
//! # Identity Handling
//!
//! The delegated grammar writes identity changes (`up`, `index`) into the
//! primary `ifinfomsg`, because that is the only header it knows about.
//! So for the duration of the parse the primary identity is cleared, and
//! restored afterwards; anything the peer grammar wrote there is moved
//! into the peer's own `ifinfomsg`.

use serde::Serialize;
use tracing::debug;

use super::{NetkitError, NetkitMode, NetkitPolicy};
use crate::link::{matches, LinkGrammar};
use crate::netlink::message::{LinkRequest, NestHandle};
use crate::netlink::structures::{
    IfIdentity, IfInfoMsg, IFLA_NETKIT_MODE, IFLA_NETKIT_PEER_INFO, IFLA_NETKIT_PEER_POLICY,
    IFLA_NETKIT_POLICY,
};

/// What the parser wrote, in typed form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetkitOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<NetkitMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<NetkitPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_policy: Option<NetkitPolicy>,
    /// Present only when a peer device definition was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<PeerRecord>,
}

/// The nested peer container that was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerRecord {
    /// Identity placed in the peer's `ifinfomsg`
    pub identity: IfIdentity,
    /// Tokens consumed by the delegated device grammar
    pub tokens_consumed: usize,
}

/// Peer container opened but not yet closed
#[derive(Debug)]
struct PendingPeer {
    nest: NestHandle,
    ifinfo_offset: usize,
    tokens_consumed: usize,
}

/// Per-invocation parse state
#[derive(Debug)]
struct ParseContext<'a> {
    kind: &'a str,
    seen_mode: bool,
    seen_peer: bool,
    peer: Option<PendingPeer>,
    options: NetkitOptions,
}

/// Parse netkit options from `args` into `req`.
///
/// `req` must be positioned inside the open `IFLA_INFO_DATA` nest. On
/// success every token has been consumed, either here or by `grammar` for
/// the peer definition. The primary identity of `req` reads the same on
/// return as on entry, whether the parse succeeded or not.
pub fn parse_opt(
    kind: &str,
    args: &[&str],
    req: &mut LinkRequest,
    grammar: &mut dyn LinkGrammar,
) -> Result<NetkitOptions, NetkitError> {
    let saved = req.identity();
    req.set_identity(IfIdentity::default());

    let mut ctx = ParseContext::new(kind);
    let result = ctx
        .run(args, req, grammar)
        .and_then(|()| ctx.finish(req, saved));

    req.set_identity(saved);
    debug!(ok = result.is_ok(), "restored primary identity");
    result
}

impl<'a> ParseContext<'a> {
    fn new(kind: &'a str) -> Self {
        Self {
            kind,
            seen_mode: false,
            seen_peer: false,
            peer: None,
            options: NetkitOptions::default(),
        }
    }

    fn run(
        &mut self,
        args: &[&str],
        req: &mut LinkRequest,
        grammar: &mut dyn LinkGrammar,
    ) -> Result<(), NetkitError> {
        let mut idx = 0;

        while idx < args.len() {
            let token = args[idx];

            if matches(token, "mode") {
                idx += 1;
                let value = *args
                    .get(idx)
                    .ok_or(NetkitError::IncompleteCommand { option: "mode" })?;
                if self.seen_mode {
                    return Err(NetkitError::DuplicateOption {
                        option: "mode",
                        value: value.to_string(),
                    });
                }
                self.seen_mode = true;

                let mode = NetkitMode::from_arg(value)?;
                req.add_attr_u32(IFLA_NETKIT_MODE, mode.to_wire())?;
                self.options.mode = Some(mode);
            } else if matches(token, "forward") || matches(token, "blackhole") {
                let policy = NetkitPolicy::from_arg(token)?;
                let (rta_type, slot) = if self.seen_peer {
                    (IFLA_NETKIT_PEER_POLICY, &mut self.options.peer_policy)
                } else {
                    (IFLA_NETKIT_POLICY, &mut self.options.policy)
                };
                debug!(policy = policy.label(), peer = self.seen_peer, "policy");
                req.add_attr_u32(rta_type, policy.to_wire())?;
                *slot = Some(policy);
            } else if matches(token, "peer") {
                if self.seen_peer {
                    return Err(NetkitError::DuplicateOption {
                        option: "peer",
                        value: args.get(idx + 1).copied().unwrap_or_default().to_string(),
                    });
                }
                self.seen_peer = true;
            } else if self.seen_peer {
                // Rest of the line is the peer's device definition
                return self.delegate_peer(&args[idx..], req, grammar);
            } else {
                return Err(NetkitError::UnknownOption {
                    kind: self.kind.to_string(),
                    token: token.to_string(),
                });
            }
            idx += 1;
        }

        Ok(())
    }

    fn delegate_peer(
        &mut self,
        args: &[&str],
        req: &mut LinkRequest,
        grammar: &mut dyn LinkGrammar,
    ) -> Result<(), NetkitError> {
        let nest = req.begin_nest(IFLA_NETKIT_PEER_INFO)?;
        let ifinfo_offset = req.reserve(IfInfoMsg::SIZE)?;
        debug!(tokens = args.len(), "delegating peer definition");

        let parsed = grammar.parse(args, req)?;
        if let Some(kind) = parsed.kind {
            return Err(NetkitError::PeerType(kind));
        }

        self.peer = Some(PendingPeer {
            nest,
            ifinfo_offset,
            tokens_consumed: parsed.consumed,
        });
        Ok(())
    }

    /// Close the peer container, if one was opened
    fn finish(
        &mut self,
        req: &mut LinkRequest,
        saved: IfIdentity,
    ) -> Result<NetkitOptions, NetkitError> {
        if let Some(pending) = self.peer.take() {
            let identity = saved.merged_with(req.identity());
            req.write_identity_at(pending.ifinfo_offset, identity)?;
            req.end_nest(pending.nest)?;

            self.options.peer = Some(PeerRecord {
                identity,
                tokens_consumed: pending.tokens_consumed,
            });
        }
        Ok(std::mem::take(&mut self.options))
    }
}
