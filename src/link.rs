// ============================================================================
// LINK DEVICE GRAMMAR
// ============================================================================
// The general `ip link add` style grammar: name, mtu, queue length, admin
// state and finally `type KIND`. The netkit option parser hands the peer's
// definition to whatever implements `LinkGrammar`, and `build_link_request`
// drives the same grammar for the primary device.
//
// === ARGUMENT MATCHING ===
// Keywords may be abbreviated the way `ip` allows: a token selects a keyword
// when it is a non-empty prefix of it ("m" → "mode", "bl" → "blackhole").
// Keywords are therefore tried in a fixed order and the first match wins.

use thiserror::Error;
use tracing::debug;

use crate::netkit::{self, NetkitError, NetkitOptions};
use crate::netlink::message::{LinkRequest, MessageError, RequestConfig};
use crate::netlink::structures::{
    IfIdentity, IFF_UP, IFLA_IFNAME, IFLA_INFO_DATA, IFLA_INFO_KIND, IFLA_LINKINFO, IFLA_MTU,
    IFLA_TXQLEN,
};

/// Longest interface name the kernel accepts, including the NUL
pub const IFNAMSIZ: usize = 16;

/// Does `token` select `keyword`? True when it is a non-empty prefix of it.
#[must_use]
pub fn matches(token: &str, keyword: &str) -> bool {
    !token.is_empty() && keyword.starts_with(token)
}

// ============================================================================
// DELEGATION BOUNDARY
// ============================================================================

/// Errors reported by a device grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkGrammarError {
    #[error("duplicate \"{option}\": \"{value}\" is the second value.")]
    Duplicate { option: &'static str, value: String },

    #[error("argument \"{value}\" is wrong: {reason}")]
    InvalidArgument { value: String, reason: &'static str },

    #[error("command line is not complete after \"{option}\", try option \"help\"")]
    Incomplete { option: &'static str },

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// What a device grammar consumed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegatedParse {
    /// Number of tokens consumed from the slice handed in
    pub consumed: usize,
    /// Device kind named by a `type KIND` pair, if one was seen
    pub kind: Option<String>,
}

/// A full device-definition grammar.
///
/// Implementations append attributes for the device being defined to
/// `req` (at its current tail, which may be inside an open nest) and may
/// adjust the identity of the primary `ifinfomsg`.
pub trait LinkGrammar {
    fn parse(
        &mut self,
        args: &[&str],
        req: &mut LinkRequest,
    ) -> Result<DelegatedParse, LinkGrammarError>;
}

// ============================================================================
// BUILT-IN DEVICE GRAMMAR
// ============================================================================

/// The subset of `ip link add` needed to describe a device:
///
/// `[ name ] NAME [ mtu MTU ] [ txqueuelen QLEN ] [ index IDX ] [ up | down ] [ type KIND ]`
///
/// Parsing stops after `type KIND`; everything that follows belongs to the
/// kind-specific parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceGrammar;

impl LinkGrammar for DeviceGrammar {
    fn parse(
        &mut self,
        args: &[&str],
        req: &mut LinkRequest,
    ) -> Result<DelegatedParse, LinkGrammarError> {
        let mut seen_name = false;
        let mut seen_mtu = false;
        let mut seen_qlen = false;
        let mut idx = 0;

        while idx < args.len() {
            let token = args[idx];

            if token == "type" {
                let kind = next_arg(args, &mut idx, "type")?;
                return Ok(DelegatedParse {
                    consumed: idx + 1,
                    kind: Some(kind.to_string()),
                });
            } else if token == "up" || token == "down" {
                let mut identity = req.identity();
                if token == "up" {
                    identity.flags |= IFF_UP;
                } else {
                    identity.flags &= !IFF_UP;
                }
                identity.change |= IFF_UP;
                req.set_identity(identity);
            } else if matches(token, "mtu") {
                let value = next_arg(args, &mut idx, "mtu")?;
                if seen_mtu {
                    return Err(duplicate("mtu", value));
                }
                seen_mtu = true;
                let mtu = parse_u32(value, "Invalid \"mtu\" value")?;
                req.add_attr_u32(IFLA_MTU, mtu)?;
            } else if matches(token, "txqueuelen") || token == "txqlen" || token == "qlen" {
                let value = next_arg(args, &mut idx, "txqueuelen")?;
                if seen_qlen {
                    return Err(duplicate("txqueuelen", value));
                }
                seen_qlen = true;
                let qlen = parse_u32(value, "Invalid \"txqueuelen\" value")?;
                req.add_attr_u32(IFLA_TXQLEN, qlen)?;
            } else if matches(token, "index") {
                let value = next_arg(args, &mut idx, "index")?;
                let index = value
                    .parse::<i32>()
                    .ok()
                    .filter(|index| *index > 0)
                    .ok_or_else(|| invalid(value, "Invalid \"index\" value"))?;
                let mut identity = req.identity();
                identity.index = index;
                req.set_identity(identity);
            } else {
                // `name NAME`, `dev NAME`, or a bare NAME
                let name = if matches(token, "name") || matches(token, "dev") {
                    next_arg(args, &mut idx, "name")?
                } else {
                    token
                };
                if seen_name {
                    return Err(duplicate("name", name));
                }
                seen_name = true;
                check_ifname(name)?;
                req.add_attr_str(IFLA_IFNAME, name)?;
            }
            idx += 1;
        }

        Ok(DelegatedParse {
            consumed: args.len(),
            kind: None,
        })
    }
}

fn next_arg<'a>(
    args: &[&'a str],
    idx: &mut usize,
    option: &'static str,
) -> Result<&'a str, LinkGrammarError> {
    *idx += 1;
    args.get(*idx)
        .copied()
        .ok_or(LinkGrammarError::Incomplete { option })
}

fn duplicate(option: &'static str, value: &str) -> LinkGrammarError {
    LinkGrammarError::Duplicate {
        option,
        value: value.to_string(),
    }
}

fn invalid(value: &str, reason: &'static str) -> LinkGrammarError {
    LinkGrammarError::InvalidArgument {
        value: value.to_string(),
        reason,
    }
}

fn parse_u32(value: &str, reason: &'static str) -> Result<u32, LinkGrammarError> {
    value.parse::<u32>().map_err(|_| invalid(value, reason))
}

/// Same rules the kernel applies to interface names
fn check_ifname(name: &str) -> Result<(), LinkGrammarError> {
    let valid = !name.is_empty()
        && name.len() < IFNAMSIZ
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace());
    if valid {
        Ok(())
    } else {
        Err(invalid(name, "not a valid ifname"))
    }
}

// ============================================================================
// FULL REQUEST BUILDER
// ============================================================================

/// Errors from building a whole `ip link add` request
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Grammar(#[from] LinkGrammarError),

    #[error(transparent)]
    Netkit(#[from] NetkitError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("not enough information: \"type\" argument is required")]
    MissingType,

    #[error("unsupported link kind \"{0}\"")]
    UnsupportedKind(String),
}

/// A finished request plus what the netkit parser made of its options
#[derive(Debug)]
pub struct BuiltLink {
    pub request: LinkRequest,
    pub netkit: NetkitOptions,
}

/// Build an `RTM_NEWLINK` request from an `ip link add` style command line.
///
/// The primary device is parsed with `DeviceGrammar`; once it reports
/// `type netkit` the remaining tokens go to the netkit option parser inside
/// `IFLA_LINKINFO` / `IFLA_INFO_DATA`, with `DeviceGrammar` again used for
/// the peer.
pub fn build_link_request(
    args: &[&str],
    config: RequestConfig,
    identity: Option<IfIdentity>,
) -> Result<BuiltLink, BuildError> {
    let mut request = LinkRequest::new_link(config);
    if let Some(identity) = identity {
        request.set_identity(identity);
    }

    let mut grammar = DeviceGrammar;
    let parsed = grammar.parse(args, &mut request)?;
    let kind = parsed.kind.ok_or(BuildError::MissingType)?;
    if kind != netkit::KIND {
        return Err(BuildError::UnsupportedKind(kind));
    }

    let linkinfo = request.begin_nest(IFLA_LINKINFO)?;
    request.add_attr_str(IFLA_INFO_KIND, &kind)?;

    let rest = &args[parsed.consumed..];
    let mut options = NetkitOptions::default();
    if !rest.is_empty() {
        let data = request.begin_nest(IFLA_INFO_DATA)?;
        options = netkit::parse_opt(&kind, rest, &mut request, &mut grammar)?;
        request.end_nest(data)?;
    }
    request.end_nest(linkinfo)?;

    debug!(len = request.len(), "built link request");
    Ok(BuiltLink {
        request,
        netkit: options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::message::parse_nested;

    fn request() -> LinkRequest {
        LinkRequest::new_link(RequestConfig::default())
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches("m", "mode"));
        assert!(matches("mode", "mode"));
        assert!(matches("bl", "blackhole"));
        assert!(!matches("", "mode"));
        assert!(!matches("modes", "mode"));
        assert!(!matches("mtu", "mode"));
    }

    #[test]
    fn test_device_grammar_stops_at_type() {
        let mut req = request();
        let parsed = DeviceGrammar
            .parse(&["name", "nk0", "mtu", "1400", "type", "netkit", "mode", "l2"], &mut req)
            .expect("valid");

        assert_eq!(parsed.consumed, 6);
        assert_eq!(parsed.kind.as_deref(), Some("netkit"));

        let attrs = req.attributes().expect("parse back");
        assert_eq!(attrs[&IFLA_IFNAME], b"nk0\0".to_vec());
        assert_eq!(attrs[&IFLA_MTU], 1400u32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_device_grammar_bare_name_and_flags() {
        let mut req = request();
        let parsed = DeviceGrammar
            .parse(&["nk1", "up", "index", "12"], &mut req)
            .expect("valid");

        assert_eq!(parsed, DelegatedParse { consumed: 4, kind: None });
        assert_eq!(
            req.identity(),
            IfIdentity {
                index: 12,
                flags: IFF_UP,
                change: IFF_UP
            }
        );
    }

    #[test]
    fn test_device_grammar_errors() {
        let mut req = request();
        assert_eq!(
            DeviceGrammar.parse(&["nk0", "nk1"], &mut req).unwrap_err(),
            LinkGrammarError::Duplicate {
                option: "name",
                value: "nk1".to_string()
            }
        );
        assert_eq!(
            DeviceGrammar.parse(&["mtu"], &mut request()).unwrap_err(),
            LinkGrammarError::Incomplete { option: "mtu" }
        );
        assert!(matches!(
            DeviceGrammar.parse(&["mtu", "big"], &mut request()),
            Err(LinkGrammarError::InvalidArgument { .. })
        ));
        assert!(matches!(
            DeviceGrammar.parse(&["name", "much-too-long-name"], &mut request()),
            Err(LinkGrammarError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_build_requires_netkit_type() {
        assert!(matches!(
            build_link_request(&["nk0"], RequestConfig::default(), None),
            Err(BuildError::MissingType)
        ));
        assert!(matches!(
            build_link_request(&["nk0", "type", "veth"], RequestConfig::default(), None),
            Err(BuildError::UnsupportedKind(kind)) if kind == "veth"
        ));
    }

    #[test]
    fn test_build_without_netkit_options_has_no_data_nest() {
        let built = build_link_request(&["nk0", "type", "netkit"], RequestConfig::default(), None)
            .expect("valid");

        let attrs = built.request.attributes().expect("parse back");
        let info = parse_nested(&attrs, IFLA_LINKINFO)
            .expect("nested parse")
            .expect("linkinfo present");
        assert_eq!(info[&IFLA_INFO_KIND], b"netkit\0".to_vec());
        assert!(!info.contains_key(&IFLA_INFO_DATA));
        assert_eq!(built.netkit, NetkitOptions::default());
    }
}
