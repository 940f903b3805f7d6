//! End-to-end reconciliation tests.
//!
//! These drive the engine the way an integrator does: targets in through
//! the public API, polls out through `tick`, answers back through
//! `register_votes`, decisions observed only via the status updates the
//! processor appends. No test reaches into internals.
//!
//! Each test builds its own processor with a preset manual clock and a
//! static peer directory, so every run is deterministic.

use std::sync::Arc;

use snowdrift_consensus::config::FINALIZATION_SCORE;
use snowdrift_consensus::{
    Clock, Hash, ManualClock, NodeId, OutboundPoll, Processor, Response, StaticDirectory, Status,
    StatusUpdate, Target, Vote,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Minimal target: fixed hash, fixed score, always valid.
struct Item {
    hash: Hash,
    score: i64,
    accepted: bool,
}

impl Item {
    fn new(n: u64, score: i64, accepted: bool) -> Arc<Self> {
        Arc::new(Self {
            hash: Hash::from_low_u64(n),
            score,
            accepted,
        })
    }
}

impl Target for Item {
    fn hash(&self) -> Hash {
        self.hash
    }
    fn target_type(&self) -> &str {
        "tx"
    }
    fn is_accepted(&self) -> bool {
        self.accepted
    }
    fn is_valid(&self) -> bool {
        true
    }
    fn score(&self) -> i64 {
        self.score
    }
}

struct Harness {
    processor: Processor,
    clock: Arc<ManualClock>,
}

fn setup(peers: &[u64]) -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let directory = Arc::new(StaticDirectory::new(peers.iter().map(|&p| NodeId(p))));
    let processor = Processor::new(directory, Arc::clone(&clock) as Arc<dyn Clock>);
    Harness { processor, clock }
}

impl Harness {
    /// Runs one full poll cycle answering every inv with `error`, returns
    /// the updates that cycle produced.
    fn cycle(&self, error: u32) -> Vec<StatusUpdate> {
        let poll = self.processor.tick().expect("expected a poll this cycle");
        let votes = poll
            .invs
            .iter()
            .map(|inv| Vote::new(error, inv.target_hash))
            .collect();
        let response = Response::new(poll.round, 0, votes);

        let mut updates = Vec::new();
        assert!(
            self.processor.register_votes(poll.node, &response, &mut updates),
            "well-formed response must be accepted"
        );
        self.processor.advance_round();
        updates
    }

    /// Cycles with the same answer until the engine stops polling, which
    /// only happens once everything live has finalized. Returns all
    /// updates in emission order.
    fn cycle_until_quiet(&self, error: u32, max_cycles: usize) -> Vec<StatusUpdate> {
        let mut all = Vec::new();
        for _ in 0..max_cycles {
            if self.processor.get_invs_for_next_poll().is_empty() {
                return all;
            }
            all.extend(self.cycle(error));
        }
        panic!("engine did not settle within {} cycles", max_cycles);
    }
}

// ---------------------------------------------------------------------------
// 1. Finalize-accept
// ---------------------------------------------------------------------------

#[test]
fn finalize_accept_emits_finalized_exactly_once() {
    let h = setup(&[0]);
    let hash = Hash::from_low_u64(65);
    assert!(h.processor.add_target_to_reconcile(Item::new(65, 1, true)));

    let updates = h.cycle_until_quiet(0, 500);

    // The window absorbs six rounds, then every conclusive confirmation
    // reports Accepted until the streak crosses the finalization score.
    let finalized: Vec<_> = updates
        .iter()
        .filter(|u| u.status == Status::Finalized)
        .collect();
    assert_eq!(finalized.len(), 1, "Finalized must be reported exactly once");
    assert_eq!(finalized[0].hash, hash);
    assert_eq!(updates.last().unwrap().status, Status::Finalized);
    assert!(updates[..updates.len() - 1]
        .iter()
        .all(|u| u.status == Status::Accepted));

    // Decision remains queryable after finalization; polling has stopped.
    assert!(h.processor.is_accepted(&hash));
    assert_eq!(h.processor.confidence(&hash), Ok(FINALIZATION_SCORE));
    assert!(h.processor.tick().is_none());
}

// ---------------------------------------------------------------------------
// 2. Finalize-reject from an accepted start
// ---------------------------------------------------------------------------

#[test]
fn finalize_reject_flips_then_invalidates() {
    let h = setup(&[0]);
    let hash = Hash::from_low_u64(65);
    assert!(h.processor.add_target_to_reconcile(Item::new(65, 1, true)));

    // Six no-votes disappear into the balanced window.
    for _ in 0..6 {
        assert!(h.cycle(1).is_empty());
        assert!(h.processor.is_accepted(&hash));
    }

    // The seventh is conclusive and contrary: flip with streak reset.
    let updates = h.cycle(1);
    assert_eq!(
        updates,
        vec![StatusUpdate {
            hash,
            status: Status::Rejected
        }]
    );
    assert!(!h.processor.is_accepted(&hash));
    assert_eq!(h.processor.confidence(&hash), Ok(0));

    // Further no-votes rebuild confidence on the reject side until the
    // decision finalizes as Invalid.
    let updates = h.cycle_until_quiet(1, 500);
    let invalid: Vec<_> = updates
        .iter()
        .filter(|u| u.status == Status::Invalid)
        .collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].hash, hash);
    assert!(!h.processor.is_accepted(&hash));
    assert_eq!(h.processor.confidence(&hash), Ok(FINALIZATION_SCORE));
}

// ---------------------------------------------------------------------------
// 3. Neutral votes stall the window
// ---------------------------------------------------------------------------

#[test]
fn neutral_votes_starve_progress() {
    let h = setup(&[0]);
    let hash = Hash::from_low_u64(65);
    h.processor.add_target_to_reconcile(Item::new(65, 1, false));

    // Flip to accepted, then build the streak to 7.
    for _ in 0..7 {
        h.cycle(0);
    }
    for _ in 0..7 {
        h.cycle(0);
    }
    assert!(h.processor.is_accepted(&hash));
    assert_eq!(h.processor.confidence(&hash), Ok(7));

    // One abstention still leaves seven considered yes slots, so the
    // round stays conclusive.
    let updates = h.cycle(u32::MAX);
    assert_eq!(updates.len(), 1);
    assert_eq!(h.processor.confidence(&hash), Ok(8));

    // A second consecutive abstention drops the considered count below
    // the majority: no update, no progress.
    assert!(h.cycle(u32::MAX).is_empty());
    assert_eq!(h.processor.confidence(&hash), Ok(8));
    assert!(h.processor.is_accepted(&hash), "neutrals never flip state");

    // The two abstain holes ride the window: six yes votes change
    // nothing, the seventh restores the majority.
    for _ in 0..6 {
        assert!(h.cycle(0).is_empty());
        assert_eq!(h.processor.confidence(&hash), Ok(8));
    }
    let updates = h.cycle(0);
    assert_eq!(updates.len(), 1);
    assert_eq!(h.processor.confidence(&hash), Ok(9));
}

// ---------------------------------------------------------------------------
// 4. Poll ordering by score
// ---------------------------------------------------------------------------

#[test]
fn heavier_targets_poll_first() {
    let h = setup(&[0]);
    h.processor.add_target_to_reconcile(Item::new(1, 99, true)); // A
    h.processor.add_target_to_reconcile(Item::new(2, 100, true)); // B

    let invs = h.processor.get_invs_for_next_poll();
    assert_eq!(invs.len(), 2);
    assert_eq!(invs[0].target_hash, Hash::from_low_u64(2));
    assert_eq!(invs[1].target_hash, Hash::from_low_u64(1));
}

// ---------------------------------------------------------------------------
// 5. Request/response correlation
// ---------------------------------------------------------------------------

#[test]
fn responses_correlate_by_round_and_peer() {
    let h = setup(&[0]);
    let hash = Hash::from_low_u64(65);
    h.processor.add_target_to_reconcile(Item::new(65, 1, true));

    let poll: OutboundPoll = h.processor.tick().unwrap();
    assert_eq!(poll.round, 0);
    assert_eq!(poll.node, NodeId(0));
    assert_eq!(poll.invs.len(), 1);

    let response = Response::new(0, 0, vec![Vote::new(0, hash)]);
    let mut updates = Vec::new();

    // First delivery: matched, but one yes vote is absorbed silently.
    assert!(h.processor.register_votes(NodeId(0), &response, &mut updates));
    assert!(updates.is_empty());

    // Replay of the same response: the request record was consumed.
    assert!(!h.processor.register_votes(NodeId(0), &response, &mut updates));

    // A round the processor never issued under: rejected outright.
    let wrong_round = Response::new(1, 0, vec![Vote::new(0, hash)]);
    assert!(!h.processor.register_votes(NodeId(0), &wrong_round, &mut updates));
    assert!(updates.is_empty());
}

// ---------------------------------------------------------------------------
// 6. Expiry
// ---------------------------------------------------------------------------

#[test]
fn responses_after_the_timeout_are_dropped() {
    let h = setup(&[0]);
    h.processor.add_target_to_reconcile(Item::new(65, 1, true));

    let poll = h.processor.tick().unwrap();
    h.clock.advance(61);

    let votes = poll
        .invs
        .iter()
        .map(|inv| Vote::new(0, inv.target_hash))
        .collect();
    let response = Response::new(poll.round, 0, votes);

    let mut updates = Vec::new();
    assert!(!h.processor.register_votes(poll.node, &response, &mut updates));
    assert!(updates.is_empty());
    assert_eq!(h.processor.confidence(&Hash::from_low_u64(65)), Ok(0));
}

// ---------------------------------------------------------------------------
// 7. Two engines reconcile against each other
// ---------------------------------------------------------------------------

#[test]
fn two_processors_converge() {
    // Node 1 polls node 2 and vice versa; both start accepting the same
    // target and answer each other honestly.
    let a = setup(&[2]);
    let b = setup(&[1]);
    let hash = Hash::from_low_u64(7);

    a.processor.add_target_to_reconcile(Item::new(7, 1, true));
    b.processor.add_target_to_reconcile(Item::new(7, 1, true));

    let answer = |responder: &Processor, poll: &OutboundPoll| -> Response {
        let votes = poll
            .invs
            .iter()
            .map(|inv| {
                let error = if responder.is_accepted(&inv.target_hash) { 0 } else { 1 };
                Vote::new(error, inv.target_hash)
            })
            .collect();
        Response::new(poll.round, 0, votes)
    };

    let mut a_updates = Vec::new();
    let mut b_updates = Vec::new();

    for _ in 0..500 {
        if a.processor.finalized_count() == 1 && b.processor.finalized_count() == 1 {
            break;
        }
        if let Some(poll) = a.processor.tick() {
            let resp = answer(&b.processor, &poll);
            assert!(a.processor.register_votes(poll.node, &resp, &mut a_updates));
            a.processor.advance_round();
        }
        if let Some(poll) = b.processor.tick() {
            let resp = answer(&a.processor, &poll);
            assert!(b.processor.register_votes(poll.node, &resp, &mut b_updates));
            b.processor.advance_round();
        }
    }

    for (name, processor, updates) in [
        ("a", &a.processor, &a_updates),
        ("b", &b.processor, &b_updates),
    ] {
        assert!(processor.is_accepted(&hash), "node {} should accept", name);
        assert_eq!(
            processor.confidence(&hash),
            Ok(FINALIZATION_SCORE),
            "node {} should finalize",
            name
        );
        assert_eq!(
            updates.last().map(|u| u.status),
            Some(Status::Finalized),
            "node {} final update",
            name
        );
        assert_eq!(processor.known_peer_ids().len(), 1);
    }
}
