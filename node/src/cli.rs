//! # CLI Interface
//!
//! Defines the command-line argument structure for `snowdrift-node` using
//! `clap` derive. Supports four subcommands: `run`, `sim`, `status`, and
//! `version`.

use clap::{Parser, Subcommand};

use snowdrift_consensus::NodeId;

/// Snowdrift reconciliation daemon.
///
/// Runs an Avalanche-style preconsensus node: accepts targets for
/// reconciliation, polls its peers over HTTP, answers their polls in turn,
/// and exposes decision state and Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "snowdrift-node",
    about = "Snowdrift reconciliation daemon",
    version,
    propagate_version = true
)]
pub struct SnowdriftCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the reconciliation daemon.
    Run(RunArgs),
    /// Run an in-process multi-node convergence simulation and exit.
    Sim(SimArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Identifier this node presents to its peers.
    #[arg(long, env = "SNOWDRIFT_NODE_ID", default_value_t = 0)]
    pub node_id: u64,

    /// Address for the poll/status HTTP listener.
    #[arg(long, env = "SNOWDRIFT_LISTEN_ADDR", default_value = "0.0.0.0:7740")]
    pub listen_addr: String,

    /// Address for the Prometheus metrics listener.
    #[arg(long, env = "SNOWDRIFT_METRICS_ADDR", default_value = "0.0.0.0:7742")]
    pub metrics_addr: String,

    /// Peer to poll, as `id=host:port`. Repeat the flag for each peer.
    #[arg(long = "peer", value_parser = parse_peer)]
    pub peers: Vec<PeerSpec>,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "SNOWDRIFT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "SNOWDRIFT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `sim` subcommand.
#[derive(Parser, Debug)]
pub struct SimArgs {
    /// Number of in-process nodes.
    #[arg(long, default_value_t = 16)]
    pub nodes: usize,

    /// Number of targets injected into every node.
    #[arg(long, default_value_t = 100)]
    pub targets: usize,

    /// Safety cap on poll cycles per node before the run is abandoned.
    #[arg(long, default_value_t = 100_000)]
    pub max_cycles: usize,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "SNOWDRIFT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:7740")]
    pub url: String,
}

/// A peer endpoint as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    /// Peer identifier used for poll correlation.
    pub id: NodeId,
    /// `host:port` the peer's poll listener is reachable at.
    pub addr: String,
}

/// Parses `id=host:port` into a [`PeerSpec`].
fn parse_peer(s: &str) -> Result<PeerSpec, String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=host:port, got `{}`", s))?;
    let id: u64 = id
        .parse()
        .map_err(|e| format!("bad peer id in `{}`: {}", s, e))?;
    if addr.is_empty() {
        return Err(format!("empty peer address in `{}`", s));
    }
    Ok(PeerSpec {
        id: NodeId(id),
        addr: addr.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        SnowdriftCli::command().debug_assert();
    }

    #[test]
    fn peer_spec_parses() {
        let spec = parse_peer("3=10.0.0.5:7740").unwrap();
        assert_eq!(spec.id, NodeId(3));
        assert_eq!(spec.addr, "10.0.0.5:7740");
    }

    #[test]
    fn malformed_peer_specs_are_rejected() {
        assert!(parse_peer("10.0.0.5:7740").is_err());
        assert!(parse_peer("x=10.0.0.5:7740").is_err());
        assert!(parse_peer("3=").is_err());
    }

    #[test]
    fn run_args_accept_repeated_peers() {
        let cli = SnowdriftCli::try_parse_from([
            "snowdrift-node",
            "run",
            "--node-id",
            "1",
            "--peer",
            "2=127.0.0.1:7741",
            "--peer",
            "3=127.0.0.1:7742",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.node_id, 1);
                assert_eq!(args.peers.len(), 2);
                assert_eq!(args.peers[1].id, NodeId(3));
            }
            _ => panic!("expected run subcommand"),
        }
    }
}
