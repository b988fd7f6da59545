// End-to-end tests for the netkit link library
// Each test builds a complete RTM_NEWLINK request from an `ip link add`
// style command line, then parses the bytes back the way a dump would be
// read and checks what the kernel would see.

use crate::netkit::peer_info;
use crate::netlink::message::{parse_link_message, parse_nested};
use crate::netlink::structures::*;
use crate::*;

// ============================================================================
// Helpers
// ============================================================================

fn build(args: &[&str]) -> BuiltLink {
    build_link_request(args, RequestConfig::default(), None).expect("valid command line")
}

/// Walk IFLA_LINKINFO → IFLA_INFO_DATA of a built request
fn info_data(request: &LinkRequest) -> AttrTable {
    let msg = parse_link_message(request.as_bytes()).expect("well formed message");
    let linkinfo = parse_nested(&msg.attributes, IFLA_LINKINFO)
        .expect("linkinfo parses")
        .expect("linkinfo present");
    assert_eq!(linkinfo[&IFLA_INFO_KIND], b"netkit\0".to_vec());
    parse_nested(&linkinfo, IFLA_INFO_DATA)
        .expect("info data parses")
        .expect("info data present")
}

// ============================================================================
// Tests for build_link_request()
// ============================================================================
mod test_build_link_request {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_pair_definition() {
        let primary = IfIdentity {
            index: 0,
            flags: IFF_UP,
            change: IFF_UP,
        };
        let built = build_link_request(
            &[
                "nk0", "type", "netkit", "mode", "l2", "forward", "peer", "blackhole", "name",
                "nk1", "mtu", "1400",
            ],
            RequestConfig::default(),
            Some(primary),
        )
        .expect("valid command line");

        // Primary identity reads exactly as it was handed in
        assert_eq!(built.request.identity(), primary);

        let data = info_data(&built.request);
        assert_eq!(data[&IFLA_NETKIT_MODE], NETKIT_L2.to_ne_bytes().to_vec());
        assert_eq!(data[&IFLA_NETKIT_POLICY], NETKIT_PASS.to_ne_bytes().to_vec());
        assert_eq!(data[&IFLA_NETKIT_PEER_POLICY], NETKIT_DROP.to_ne_bytes().to_vec());

        let (peer_ifi, peer_attrs) = peer_info(&data)
            .expect("peer payload parses")
            .expect("peer present");
        assert_eq!(peer_ifi.identity(), primary);
        assert_eq!(peer_attrs[&IFLA_IFNAME], b"nk1\0".to_vec());
        assert_eq!(peer_attrs[&IFLA_MTU], 1400u32.to_ne_bytes().to_vec());

        assert_eq!(
            built.netkit,
            NetkitOptions {
                mode: Some(NetkitMode::L2),
                policy: Some(NetkitPolicy::Forward),
                peer_policy: Some(NetkitPolicy::Blackhole),
                peer: Some(PeerRecord {
                    identity: primary,
                    tokens_consumed: 4,
                }),
            }
        );
    }

    #[test]
    fn test_peer_up_goes_to_peer_header_only() {
        let built = build(&["nk0", "type", "netkit", "peer", "nk1", "up"]);

        assert!(built.request.identity().is_empty());
        let data = info_data(&built.request);
        let (peer_ifi, _) = peer_info(&data)
            .expect("peer payload parses")
            .expect("peer present");
        assert_eq!(
            peer_ifi.identity(),
            IfIdentity {
                index: 0,
                flags: IFF_UP,
                change: IFF_UP
            }
        );
    }

    #[test]
    fn test_peer_down_on_up_primary() {
        let primary = IfIdentity {
            index: 0,
            flags: IFF_UP,
            change: IFF_UP,
        };
        let built = build_link_request(
            &["nk0", "type", "netkit", "peer", "nk1", "down"],
            RequestConfig::default(),
            Some(primary),
        )
        .expect("valid command line");

        assert_eq!(built.request.identity(), primary);
        let data = info_data(&built.request);
        let (peer_ifi, _) = peer_info(&data)
            .expect("peer payload parses")
            .expect("peer present");
        let peer = peer_ifi.identity();
        assert_eq!(peer.flags & IFF_UP, 0);
        assert_eq!(peer.change & IFF_UP, IFF_UP);
    }

    #[test]
    fn test_no_peer_no_container() {
        let built = build(&["nk0", "type", "netkit", "mode", "l3", "peer", "forward"]);

        let data = info_data(&built.request);
        assert!(!data.contains_key(&IFLA_NETKIT_PEER_INFO));
        assert_eq!(built.netkit.peer, None);
        assert_eq!(built.netkit.peer_policy, Some(NetkitPolicy::Forward));
    }

    #[test]
    fn test_nest_lengths_reach_message_end() {
        let built = build(&["nk0", "type", "netkit", "blackhole", "peer", "nk1", "mtu", "9000"]);
        let bytes = built.request.as_bytes();

        // IFLA_LINKINFO is the last top-level attribute; it must end the message
        let msg = parse_link_message(bytes).expect("well formed message");
        assert_eq!(msg.header.nlmsg_len as usize, bytes.len());
        let mut offset = nlmsg_space(IfInfoMsg::SIZE);
        let mut last = None;
        while offset < bytes.len() {
            let rta = RtAttr::read_from(&bytes[offset..]).expect("attribute header");
            last = Some((offset, rta));
            offset += rta_align(rta.rta_len as usize);
        }
        let (linkinfo_offset, linkinfo) = last.expect("at least one attribute");
        assert_eq!(linkinfo.rta_type, IFLA_LINKINFO);
        assert_eq!(linkinfo_offset + linkinfo.rta_len as usize, bytes.len());
    }

    #[test]
    fn test_peer_type_is_rejected() {
        let err = build_link_request(
            &["nk0", "type", "netkit", "peer", "nk1", "type", "veth"],
            RequestConfig::default(),
            None,
        )
        .unwrap_err();

        match err {
            BuildError::Netkit(err) => {
                assert_eq!(err, NetkitError::PeerType("veth".to_string()));
                assert_eq!(err.kind(), ErrorKind::UnknownOption);
            }
            other => panic!("expected netkit error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_option_asks_for_usage() {
        let err = build_link_request(
            &["nk0", "type", "netkit", "bogus"],
            RequestConfig::default(),
            None,
        )
        .unwrap_err();

        match err {
            BuildError::Netkit(err) => {
                assert!(err.shows_usage());
                assert_eq!(err.to_string(), "netkit: unknown option \"bogus\"?");
            }
            other => panic!("expected netkit error, got {other:?}"),
        }
    }

    #[test]
    fn test_size_bound_enforced() {
        let result = build_link_request(
            &["nk0", "type", "netkit", "mode", "l2", "peer", "nk1", "mtu", "1400"],
            RequestConfig {
                max_len: 64,
                seq: 0,
            },
            None,
        );
        assert!(result.is_err());
    }
}

// ============================================================================
// Tests for encode → decode of the display labels
// ============================================================================
mod test_label_round_trip {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_mode_policy_combinations() {
        let cases = [
            ("l2", "forward"),
            ("l2", "blackhole"),
            ("l3", "forward"),
            ("l3", "blackhole"),
        ];

        for (mode, policy) in cases {
            let built = build(&["nk0", "type", "netkit", "mode", mode, policy]);
            let data = info_data(&built.request);
            let info = decode_info(Some(&data));

            assert_eq!(info.mode, Some(mode));
            assert_eq!(info.policy, Some(policy));
            assert_eq!(info.role, None);
            assert_eq!(info.to_string(), format!(" mode {mode}  policy {policy} "));
        }
    }

    #[test]
    fn test_out_of_range_values_are_unknown() {
        let built = build(&["nk0", "type", "netkit", "mode", "l2", "forward"]);
        let mut data = info_data(&built.request);
        data.insert(IFLA_NETKIT_MODE, 2u32.to_ne_bytes().to_vec());
        data.insert(IFLA_NETKIT_POLICY, 7u32.to_ne_bytes().to_vec());

        let info = decode_info(Some(&data));
        assert_eq!(info.mode, Some("unknown"));
        assert_eq!(info.policy, Some("unknown"));
    }
}
