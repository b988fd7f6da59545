// ============================================================================
// netkit-link - command line front end
// ============================================================================
//
// Builds the RTM_NEWLINK request for a netkit pair from an `ip link add`
// style command line, then reads the encoded bytes back and prints what a
// link dump would show for the primary device.
//
//   netkit-link -- nk0 type netkit mode l2 peer blackhole name nk1
//   netkit-link --json --hex -- nk0 up type netkit peer nk1
//
// Nothing is sent to the kernel.
//
// Logging goes to stderr; set NETKIT_LOG (e.g. NETKIT_LOG=debug) to see
// the token routing.
// ============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netkit_link::netkit::{self, peer_info};
use netkit_link::netlink::message::{parse_link_message, parse_nested};
use netkit_link::netlink::structures::{
    DEFAULT_MAX_LEN, IFLA_IFNAME, IFLA_INFO_DATA, IFLA_LINKINFO,
};
use netkit_link::netlink::IfInfoMsg;
use netkit_link::{
    build_link_request, decode_info, usage, AttrTable, BuildError, IfIdentity, NetkitInfo,
    RequestConfig,
};

#[derive(Parser, Debug)]
#[command(name = "netkit-link", version, long_about = None)]
#[command(about = "Build the netlink request for a netkit device pair")]
struct Args {
    /// Print the netkit option usage and exit
    #[arg(long)]
    usage: bool,

    /// Print the decoded result as JSON
    #[arg(short, long)]
    json: bool,

    /// Dump the encoded request as hex
    #[arg(long)]
    hex: bool,

    /// Upper bound on the encoded request size
    #[arg(long, env = "NETKIT_MAX_LEN", default_value_t = DEFAULT_MAX_LEN)]
    max_len: usize,

    /// Netlink sequence number
    #[arg(long, default_value_t = 0)]
    seq: u32,

    /// Interface index placed in the primary ifinfomsg
    #[arg(long)]
    index: Option<i32>,

    /// `ip link add` arguments, e.g. `nk0 type netkit mode l2 peer nk1`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("NETKIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    if args.usage {
        print!("{}", usage(netkit::KIND));
        return Ok(());
    }

    let tokens: Vec<&str> = args.tokens.iter().map(String::as_str).collect();
    let config = RequestConfig {
        max_len: args.max_len,
        seq: args.seq,
    };
    let identity = args.index.map(|index| IfIdentity {
        index,
        ..IfIdentity::default()
    });

    let built = match build_link_request(&tokens, config, identity) {
        Ok(built) => built,
        Err(BuildError::Netkit(err)) if err.shows_usage() => {
            eprint!("{}", usage(netkit::KIND));
            return Err(err).context("invalid netkit options");
        }
        Err(err) => return Err(err).context("cannot build link request"),
    };

    let bytes = built.request.as_bytes();
    if args.hex {
        println!("{}", pretty_hex::pretty_hex(&bytes));
    }

    // Read the request back the way a dump of the new link would be read
    let msg = parse_link_message(bytes).context("built request does not parse")?;
    let linkinfo = parse_nested(&msg.attributes, IFLA_LINKINFO)?
        .context("request has no IFLA_LINKINFO")?;
    let data = parse_nested(&linkinfo, IFLA_INFO_DATA)?;
    let info = decode_info(data.as_ref());
    let peer = match data.as_ref() {
        Some(data) => peer_info(data)?,
        None => None,
    };

    if args.json {
        let output = serde_json::json!({
            "length": bytes.len(),
            "name": msg.attributes.get(&IFLA_IFNAME).map(|name| c_string(name)),
            "info": info,
            "options": built.netkit,
            "peer": peer.as_ref().map(|(ifi, attrs)| serde_json::json!({
                "identity": ifi.identity(),
                "name": attrs.get(&IFLA_IFNAME).map(|name| c_string(name)),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text(&msg.attributes, &info, peer.as_ref());
        println!("{} bytes", bytes.len());
    }

    Ok(())
}

fn print_text(attrs: &AttrTable, info: &NetkitInfo, peer: Option<&(IfInfoMsg, AttrTable)>) {
    let name = attrs
        .get(&IFLA_IFNAME)
        .map_or_else(|| "(unnamed)".to_string(), |name| c_string(name));
    println!("{name}: netkit{info}");

    if let Some((ifi, peer_attrs)) = peer {
        let peer_name = peer_attrs
            .get(&IFLA_IFNAME)
            .map_or_else(|| "(unnamed)".to_string(), |name| c_string(name));
        let identity = ifi.identity();
        println!(
            "  peer {peer_name}: index {} flags {:#x} change {:#x}",
            identity.index, identity.flags, identity.change
        );
    }
}

/// NUL-terminated attribute payload as text
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
