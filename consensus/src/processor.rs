//! # Reconciliation Processor
//!
//! The [`Processor`] is the registry at the center of the engine: it owns
//! every target under reconciliation, the vote record for each, and the set
//! of polls currently in flight. It builds outbound poll batches, matches
//! responses back to the requests that provoked them, and reports decision
//! transitions to the caller.
//!
//! ## Locking
//!
//! All interior state sits behind a single `parking_lot::Mutex`. The
//! critical sections are short (bit twiddling, map lookups, one sort per
//! poll build) and the workload is coordination, not throughput, so one
//! exclusive lock beats anything cleverer. Public operations never call
//! back into the processor from inside the lock.
//!
//! ## Request correlation
//!
//! Every poll issued by [`tick`](Processor::tick) is recorded under the
//! composite key `(round, peer)`. A response must echo the round it was
//! issued under; the matching record is consumed on first lookup whether or
//! not the rest of the validation passes, so replays of an already-answered
//! poll are rejected without side effect. Stale records are never swept;
//! they are dropped the next time their key is consulted, either by a
//! matching response or by peer selection reusing the slot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;
use crate::config::MAX_ELEMENT_POLL;
use crate::peers::{NodeId, PeerDirectory};
use crate::request::RequestRecord;
use crate::target::{Hash, Target};
use crate::vote_record::VoteRecord;
use crate::wire::{Inv, OutboundPoll, Response, StatusUpdate};

/// Errors surfaced by processor queries.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The queried hash is not under reconciliation.
    #[error("target {0} is not under reconciliation")]
    UnknownTarget(Hash),
}

/// Interior state, guarded as one unit.
#[derive(Default)]
struct State {
    /// Correlation nonce for in-flight polls. Advanced by the integrator,
    /// never by the processor itself.
    round: i64,
    /// Every registered target, including finalized ones.
    targets: HashMap<Hash, Arc<dyn Target>>,
    /// Vote record per registered target. Finalized records are retained
    /// so lookups keep answering; they just stop being polled.
    vote_records: HashMap<Hash, VoteRecord>,
    /// In-flight polls keyed by `(round, peer)`.
    queries: HashMap<(i64, NodeId), RequestRecord>,
    /// Peers that have ever returned a well-formed response. Observational.
    known_peer_ids: HashSet<NodeId>,
}

/// Registry of targets, vote records, and outstanding polls.
pub struct Processor {
    directory: Arc<dyn PeerDirectory>,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Processor {
    /// Creates a processor with its injected collaborators.
    pub fn new(directory: Arc<dyn PeerDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory,
            clock,
            state: Mutex::new(State::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Target registry
    // -----------------------------------------------------------------------

    /// Puts a target under reconciliation.
    ///
    /// Returns true iff the target was newly inserted. Invalid targets and
    /// targets already present (finalized or not) are refused without side
    /// effect. The fresh vote record is seeded with the target's own
    /// `is_accepted()` opinion.
    pub fn add_target_to_reconcile(&self, target: Arc<dyn Target>) -> bool {
        if !target.is_valid() {
            return false;
        }

        let hash = target.hash();
        let mut state = self.state.lock();
        if state.vote_records.contains_key(&hash) {
            return false;
        }

        state
            .vote_records
            .insert(hash, VoteRecord::new(target.is_accepted()));
        state.targets.insert(hash, target);
        debug!(hash = %hash, "target queued for reconciliation");
        true
    }

    /// Current decision bit for a target; false when unknown.
    pub fn is_accepted(&self, hash: &Hash) -> bool {
        self.state
            .lock()
            .vote_records
            .get(hash)
            .map(|r| r.is_accepted())
            .unwrap_or(false)
    }

    /// Effective confidence for a target.
    pub fn confidence(&self, hash: &Hash) -> Result<u16, ProcessorError> {
        self.state
            .lock()
            .vote_records
            .get(hash)
            .map(|r| r.confidence())
            .ok_or(ProcessorError::UnknownTarget(*hash))
    }

    /// Number of targets currently registered (finalized included).
    pub fn target_count(&self) -> usize {
        self.state.lock().vote_records.len()
    }

    /// Number of registered targets whose decision has finalized.
    pub fn finalized_count(&self) -> usize {
        self.state
            .lock()
            .vote_records
            .values()
            .filter(|r| r.has_finalized())
            .count()
    }

    // -----------------------------------------------------------------------
    // Poll building
    // -----------------------------------------------------------------------

    /// Builds the inv batch for the next poll: every live target, heaviest
    /// score first, truncated to the poll size cap. Finalized and invalid
    /// targets are excluded.
    pub fn get_invs_for_next_poll(&self) -> Vec<Inv> {
        Self::build_invs(&self.state.lock())
    }

    /// Picks the peer the next poll should go to, or `None` when the
    /// directory is empty or every peer already has a live request under
    /// the current round.
    ///
    /// Selection is the deterministic stub the protocol requires: lowest id
    /// first, skipping busy peers. An expired in-flight record encountered
    /// during the scan is dropped on the spot, freeing its peer. Anything
    /// smarter (liveness, latency weighting) belongs to the integrator.
    pub fn get_suitable_node_to_query(&self) -> Option<NodeId> {
        let peers = self.directory.peer_ids();
        let now = self.clock.now();
        Self::select_node(&mut self.state.lock(), &peers, now)
    }

    /// One scheduler beat: build the batch, pick a peer, record the
    /// in-flight request, and hand back the poll for the transport to
    /// deliver. Returns `None`, recording nothing, when there is nothing
    /// to poll or nobody to ask.
    pub fn tick(&self) -> Option<OutboundPoll> {
        let peers = self.directory.peer_ids();
        let now = self.clock.now();

        let mut state = self.state.lock();
        let invs = Self::build_invs(&state);
        if invs.is_empty() {
            return None;
        }

        let node = Self::select_node(&mut state, &peers, now)?;
        let round = state.round;
        state
            .queries
            .insert((round, node), RequestRecord::new(now, invs.clone()));

        debug!(%node, round, batch = invs.len(), "poll issued");
        Some(OutboundPoll { round, node, invs })
    }

    // -----------------------------------------------------------------------
    // Response handling
    // -----------------------------------------------------------------------

    /// Feeds a peer's response into the engine.
    ///
    /// Returns true iff the response matched a live in-flight request and
    /// answered it shape-for-shape; every failure mode (no matching
    /// request, expired request, vote count mismatch, hash misalignment)
    /// drops the response with `false` and appends nothing. The matched
    /// request record is consumed either way.
    ///
    /// For each vote that concluded a round, a [`StatusUpdate`] is appended
    /// to `updates` in response order.
    pub fn register_votes(
        &self,
        node: NodeId,
        response: &Response,
        updates: &mut Vec<StatusUpdate>,
    ) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let state = &mut *state;

        let Some(request) = state.queries.remove(&(response.round, node)) else {
            debug!(%node, round = response.round, "response matches no in-flight poll, dropping");
            return false;
        };

        if request.is_expired(now) {
            debug!(%node, round = response.round, "response arrived after expiry, dropping");
            return false;
        }

        if response.votes.len() != request.invs().len() {
            debug!(
                %node,
                round = response.round,
                got = response.votes.len(),
                want = request.invs().len(),
                "vote count does not match the poll, dropping"
            );
            return false;
        }

        let aligned = response
            .votes
            .iter()
            .zip(request.invs())
            .all(|(vote, inv)| vote.hash == inv.target_hash);
        if !aligned {
            debug!(%node, round = response.round, "votes out of order with the poll, dropping");
            return false;
        }

        for vote in &response.votes {
            // The target may have been invalidated since the poll went
            // out; its votes no longer count.
            match state.targets.get(&vote.hash) {
                Some(target) if target.is_valid() => {}
                _ => continue,
            }
            let Some(record) = state.vote_records.get_mut(&vote.hash) else {
                continue;
            };

            if record.register_vote(vote.error) {
                updates.push(StatusUpdate {
                    hash: vote.hash,
                    status: record.status(),
                });
            }
        }

        state.known_peer_ids.insert(node);
        true
    }

    // -----------------------------------------------------------------------
    // Round counter
    // -----------------------------------------------------------------------

    /// Current round counter.
    pub fn round(&self) -> i64 {
        self.state.lock().round
    }

    /// Advances the round counter and returns the new value. When a round
    /// closes is integrator policy: the reference node advances after each
    /// accepted response; batching several parallel polls under one round
    /// is equally legitimate.
    pub fn advance_round(&self) -> i64 {
        let mut state = self.state.lock();
        state.round += 1;
        state.round
    }

    /// Peers that have ever answered a poll correctly, ascending.
    pub fn known_peer_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.state.lock().known_peer_ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of in-flight polls (expired records included until their key
    /// is next consulted).
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    // -----------------------------------------------------------------------
    // Internals (callers hold the lock)
    // -----------------------------------------------------------------------

    fn build_invs(state: &State) -> Vec<Inv> {
        let mut batch: Vec<(i64, Inv)> = Vec::with_capacity(state.vote_records.len());

        for (hash, record) in &state.vote_records {
            if record.has_finalized() {
                continue;
            }
            let Some(target) = state.targets.get(hash) else {
                continue;
            };
            if !target.is_valid() {
                continue;
            }
            batch.push((
                target.score(),
                Inv::new(target.target_type().to_owned(), *hash),
            ));
        }

        // Heaviest first; order among equal scores is unspecified.
        batch.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        batch.truncate(MAX_ELEMENT_POLL);
        batch.into_iter().map(|(_, inv)| inv).collect()
    }

    fn select_node(state: &mut State, peers: &[NodeId], now: u64) -> Option<NodeId> {
        let round = state.round;
        for &id in peers {
            match state.queries.get(&(round, id)) {
                None => return Some(id),
                Some(request) if request.is_expired(now) => {
                    // Lazy expiry: the slot is stale, reclaim it.
                    state.queries.remove(&(round, id));
                    return Some(id);
                }
                Some(_) => continue,
            }
        }
        None
    }
}
