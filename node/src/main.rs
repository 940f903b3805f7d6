// Copyright (c) 2026 Snowdrift Developers. MIT License.
// See LICENSE for details.

//! # Snowdrift Reconciliation Daemon
//!
//! Entry point for the `snowdrift-node` binary. Parses CLI arguments,
//! initializes logging and metrics, starts the poll scheduler and outbound
//! poll pump, and serves the HTTP poll/status API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the reconciliation daemon
//! - `sim`     — run an in-process convergence simulation and exit
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod sim;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use snowdrift_consensus::{
    NodeId, OutboundPoll, PollScheduler, Processor, SchedulerConfig, StaticDirectory, Status,
    SystemClock,
};

use api::PollRequest;
use cli::{Commands, SnowdriftCli};
use logging::LogFormat;
use metrics::{NodeMetrics, SharedMetrics};
use transport::{HttpPollTransport, PollTransport};

/// Outbound poll channel capacity. The scheduler drops polls when the pump
/// falls this far behind; the protocol re-offers undecided targets on every
/// tick, so the drops cost nothing but latency.
const POLL_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SnowdriftCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Sim(args) => run_sim(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — Full daemon startup sequence
// ---------------------------------------------------------------------------

/// Starts the full daemon: poll scheduler, outbound pump, poll/status API,
/// and metrics endpoint.
///
/// Startup sequence:
/// 1. Initialize logging
/// 2. Build the peer directory from `--peer` flags
/// 3. Create the processor
/// 4. Start the poll scheduler
/// 5. Spawn the outbound poll pump
/// 6. Serve the poll/status API and the metrics endpoint
/// 7. Await shutdown and stop the scheduler cleanly
async fn run_node(args: cli::RunArgs) -> Result<()> {
    // --- 1. Logging ---
    let log_filter = format!(
        "snowdrift_node={level},snowdrift_consensus={level},tower_http=warn",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    info!(
        node_id = args.node_id,
        listen_addr = %args.listen_addr,
        metrics_addr = %args.metrics_addr,
        peers = args.peers.len(),
        "starting snowdrift-node"
    );

    // --- 2. Peer directory ---
    let peer_addrs: HashMap<NodeId, String> = args
        .peers
        .iter()
        .map(|p| (p.id, p.addr.clone()))
        .collect();
    let directory = Arc::new(StaticDirectory::new(peer_addrs.keys().copied()));
    if peer_addrs.is_empty() {
        warn!("no peers configured; targets will never finalize");
    }

    // --- 3. Processor ---
    let processor = Arc::new(Processor::new(directory, Arc::new(SystemClock)));

    // --- 4. Poll scheduler ---
    let (poll_tx, poll_rx) = mpsc::channel(POLL_CHANNEL_CAPACITY);
    let scheduler = Arc::new(PollScheduler::new(
        Arc::clone(&processor),
        poll_tx,
        SchedulerConfig::default(),
    ));
    scheduler.start();

    // --- 5. Outbound poll pump ---
    let node_metrics: SharedMetrics = Arc::new(NodeMetrics::new());
    let transport: Arc<dyn PollTransport> = Arc::new(HttpPollTransport::new());
    let pump_handle = tokio::spawn(run_poll_pump(
        Arc::clone(&processor),
        poll_rx,
        transport,
        peer_addrs,
        Arc::clone(&node_metrics),
    ));

    // --- 6. HTTP servers ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_id: NodeId(args.node_id),
        processor: Arc::clone(&processor),
        metrics: Arc::clone(&node_metrics),
    };

    let api_router = api::create_router(app_state);
    let api_listener = tokio::net::TcpListener::bind(&args.listen_addr)
        .await
        .with_context(|| format!("failed to bind poll listener on {}", args.listen_addr))?;
    info!("poll/status API listening on {}", args.listen_addr);

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_addr))?;
    info!("metrics listening on {}", args.metrics_addr);

    // --- 7. Await shutdown ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Graceful shutdown: stop issuing polls, then drop the pump.
    scheduler.stop().await;
    pump_handle.abort();

    info!("snowdrift-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Outbound poll pump
// ---------------------------------------------------------------------------

/// Consumes the scheduler's poll channel: delivers each poll to its peer,
/// feeds the response back into the processor, and keeps the metrics
/// gauges honest.
async fn run_poll_pump(
    processor: Arc<Processor>,
    mut polls: mpsc::Receiver<OutboundPoll>,
    transport: Arc<dyn PollTransport>,
    peer_addrs: HashMap<NodeId, String>,
    metrics: SharedMetrics,
) {
    while let Some(poll) = polls.recv().await {
        let Some(addr) = peer_addrs.get(&poll.node) else {
            warn!(node = %poll.node, "no address for peer, dropping poll");
            continue;
        };

        let request = PollRequest {
            round: poll.round,
            invs: poll.invs.clone(),
        };
        metrics.polls_sent_total.inc();
        let started = std::time::Instant::now();

        match transport.send_poll(addr, &request).await {
            Ok(response) => {
                metrics
                    .poll_latency_seconds
                    .observe(started.elapsed().as_secs_f64());

                let mut updates = Vec::new();
                if processor.register_votes(poll.node, &response, &mut updates) {
                    metrics.responses_ok_total.inc();
                    processor.advance_round();

                    for update in &updates {
                        metrics.status_updates_total.inc();
                        match update.status {
                            Status::Finalized | Status::Invalid => info!(
                                hash = %update.hash,
                                status = ?update.status,
                                "decision finalized"
                            ),
                            Status::Accepted | Status::Rejected => debug!(
                                hash = %update.hash,
                                status = ?update.status,
                                "decision moved"
                            ),
                        }
                    }
                } else {
                    metrics.responses_dropped_total.inc();
                    debug!(node = %poll.node, round = poll.round, "response rejected");
                }

                metrics
                    .targets_tracked
                    .set(processor.target_count() as i64);
                metrics
                    .targets_finalized
                    .set(processor.finalized_count() as i64);
                metrics
                    .known_peers
                    .set(processor.known_peer_ids().len() as i64);
            }
            Err(e) => {
                metrics.responses_dropped_total.inc();
                debug!(node = %poll.node, error = %e, "poll delivery failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// sim — In-process convergence run
// ---------------------------------------------------------------------------

/// Runs the in-process simulation and prints a summary to stdout.
fn run_sim(args: cli::SimArgs) -> Result<()> {
    let log_filter = format!("snowdrift_node={level}", level = args.log_level);
    logging::init_logging(&log_filter, LogFormat::Pretty);

    let started = std::time::Instant::now();
    let summary = sim::run(args.nodes, args.targets, args.max_cycles);
    let elapsed = started.elapsed();

    println!();
    println!("Simulation finished in {:.2}s", elapsed.as_secs_f64());
    println!();
    println!("  Nodes            : {}", summary.nodes);
    println!("  Targets per node : {}", summary.targets);
    println!("  Converged nodes  : {}", summary.converged_nodes);
    println!("  Polls issued     : {}", summary.total_polls);
    println!();

    if summary.fully_converged() {
        Ok(())
    } else {
        anyhow::bail!(
            "only {}/{} nodes converged within {} cycles",
            summary.converged_nodes,
            summary.nodes,
            args.max_cycles
        )
    }
}

// ---------------------------------------------------------------------------
// status — Query a running node
// ---------------------------------------------------------------------------

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let (addr, path) = split_url(&args.url)?;
    let path = if path == "/" { "/status".to_string() } else { path };
    let body = http_get(&addr, &path).await?;

    // Pretty-print known fields; dump raw if the body is not the JSON we
    // expect (e.g. an older node).
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => {
            println!("Node Status");
            if let Some(v) = json.get("version").and_then(|v| v.as_str()) {
                println!("  Version     : {}", v);
            }
            if let Some(v) = json.get("node_id").and_then(|v| v.as_u64()) {
                println!("  Node ID     : {}", v);
            }
            if let Some(v) = json.get("round").and_then(|v| v.as_i64()) {
                println!("  Round       : {}", v);
            }
            if let Some(v) = json.get("targets").and_then(|v| v.as_u64()) {
                println!("  Targets     : {}", v);
            }
            if let Some(v) = json.get("finalized").and_then(|v| v.as_u64()) {
                println!("  Finalized   : {}", v);
            }
            if let Some(v) = json.get("in_flight").and_then(|v| v.as_u64()) {
                println!("  In flight   : {}", v);
            }
            if let Some(v) = json.get("known_peers").and_then(|v| v.as_array()) {
                println!("  Known peers : {}", v.len());
            }
        }
        Err(_) => println!("{}", body),
    }

    Ok(())
}

/// Splits `http://host:port[/path]` into `(host:port, path)`. Only plain
/// HTTP; this is an operator convenience, not a general client.
fn split_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported, got `{}`", url))?;

    let (addr, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    if addr.is_empty() {
        anyhow::bail!("missing host in `{}`", url);
    }
    Ok((addr.to_string(), path.to_string()))
}

/// Minimal HTTP GET over a plain TCP stream, same rationale as the poll
/// transport: one tiny request does not justify an HTTP client crate.
async fn http_get(addr: &str, path: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr,
    );
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let text = String::from_utf8_lossy(&raw);

    // Everything after the first blank line is the body.
    Ok(text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| text.to_string()))
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("snowdrift-node {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit    {}", commit);
    }
    if let Some(ts) = option_env!("BUILD_TIMESTAMP") {
        println!("built     {}", ts);
    }
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
