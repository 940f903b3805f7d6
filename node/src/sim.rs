//! # In-Process Convergence Simulation
//!
//! Spins up N reconciliation engines in one process, wires them to answer
//! each other's polls directly (no sockets), injects the same batch of
//! targets into every node, and drives poll cycles until the whole network
//! has finalized everything.
//!
//! This is the quickest way to watch the protocol converge and a useful
//! smoke test for poll/response plumbing without any transport involved.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use snowdrift_consensus::{
    Hash, NodeId, Processor, StaticDirectory, Status, SystemClock,
};

use crate::api::{build_response, SubmittedTarget};

/// One simulated node: an engine plus its finalization tally.
struct SimNode {
    id: NodeId,
    processor: Arc<Processor>,
    finalized: usize,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSummary {
    /// Number of nodes simulated.
    pub nodes: usize,
    /// Targets injected into each node.
    pub targets: usize,
    /// Nodes that finalized every target within the cycle budget.
    pub converged_nodes: usize,
    /// Poll cycles consumed across all nodes.
    pub total_polls: usize,
}

impl SimSummary {
    /// True when every node finalized every target.
    pub fn fully_converged(&self) -> bool {
        self.converged_nodes == self.nodes
    }
}

/// Runs the simulation: `nodes` engines, `targets` injected targets,
/// at most `max_cycles` full network rounds.
pub fn run(nodes: usize, targets: usize, max_cycles: usize) -> SimSummary {
    let clock = Arc::new(SystemClock);

    // Every node sees every other node, nobody polls themselves.
    let mut network: Vec<SimNode> = (0..nodes as u64)
        .map(|id| {
            let peers = (0..nodes as u64).filter(|&p| p != id).map(NodeId);
            let directory = Arc::new(StaticDirectory::new(peers));
            SimNode {
                id: NodeId(id),
                processor: Arc::new(Processor::new(directory, clock.clone())),
                finalized: 0,
            }
        })
        .collect();

    // Inject the same targets everywhere, in a shuffled order so arrival
    // order is not accidentally load-bearing.
    let mut order: Vec<u64> = (0..targets as u64).collect();
    order.shuffle(&mut rand::thread_rng());
    for &t in &order {
        for node in &network {
            node.processor.add_target_to_reconcile(Arc::new(SubmittedTarget::new(
                Hash::from_low_u64(t),
                "tx",
                true,
                1,
            )));
        }
    }

    info!(nodes, targets, "simulation starting");

    let mut total_polls = 0usize;
    for cycle in 0..max_cycles {
        if network.iter().all(|n| n.finalized >= targets) {
            break;
        }

        for i in 0..network.len() {
            if network[i].finalized >= targets {
                continue;
            }

            let Some(poll) = network[i].processor.tick() else {
                continue;
            };
            total_polls += 1;

            // The polled peer answers straight from its own engine.
            let responder = network
                .iter()
                .find(|n| n.id == poll.node)
                .expect("directory only names simulated peers");
            let response = build_response(&responder.processor, poll.round, &poll.invs);

            let mut updates = Vec::new();
            let node = &mut network[i];
            if !node
                .processor
                .register_votes(poll.node, &response, &mut updates)
            {
                warn!(node = %node.id, "simulated response was rejected");
                continue;
            }
            node.processor.advance_round();

            for update in updates {
                match update.status {
                    Status::Finalized | Status::Invalid => {
                        node.finalized += 1;
                        debug!(
                            node = %node.id,
                            hash = %update.hash,
                            status = ?update.status,
                            cycle,
                            "decision finalized"
                        );
                    }
                    Status::Accepted | Status::Rejected => {}
                }
            }
        }
    }

    let converged_nodes = network.iter().filter(|n| n.finalized >= targets).count();
    let summary = SimSummary {
        nodes,
        targets,
        converged_nodes,
        total_polls,
    };
    info!(
        converged = summary.converged_nodes,
        polls = summary.total_polls,
        "simulation finished"
    );
    summary
}
