//! # Per-Target Vote Record
//!
//! A [`VoteRecord`] is the sliding-window state machine behind every target
//! under reconciliation. It ingests one vote at a time, decides whether the
//! last eight non-neutral answers form a conclusive majority, and accrues a
//! confidence streak toward finalization.
//!
//! The representation is three small registers and nothing else:
//!
//! ```text
//! votes      u8  — last 8 answers, 1 = yes (neutrals land as 0)
//! consider   u8  — mask of which of those 8 slots were non-neutral
//! confidence u16 — bit 0: current decision; bits 1..: confirming streak
//! ```
//!
//! This layout is shared with every peer on the network. Resist the urge to
//! replace it with an enum; the 8-bit window and the strict `> 6` majority
//! are the protocol.

use crate::config::FINALIZATION_SCORE;
use crate::wire::Status;

/// Sliding-window confidence machine for a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRecord {
    votes: u8,
    consider: u8,
    confidence: u16,
}

impl VoteRecord {
    /// Creates a record seeded with the caller's initial opinion.
    ///
    /// `votes` starts at `0xaa` (alternating yes/no) so the window opens
    /// balanced: no conclusive verdict is reachable before six fresh
    /// same-direction answers have shifted in. `consider` starts empty
    /// because the sentinel slots are filler, not evidence.
    pub fn new(initial_accepted: bool) -> Self {
        Self {
            votes: 0xaa,
            consider: 0,
            confidence: initial_accepted as u16,
        }
    }

    /// Current decision bit. Authoritative for "is this target accepted
    /// right now"; the streak above it only measures how settled we are.
    pub fn is_accepted(&self) -> bool {
        (self.confidence & 0x01) == 1
    }

    /// Effective confidence: the streak of consecutive conclusive rounds
    /// confirming the current decision.
    pub fn confidence(&self) -> u16 {
        self.confidence >> 1
    }

    /// True once the streak has reached the finalization score. Callers
    /// are expected to stop polling a finalized target; the record itself
    /// keeps accepting votes (see [`register_vote`](Self::register_vote)).
    pub fn has_finalized(&self) -> bool {
        self.confidence() >= FINALIZATION_SCORE
    }

    /// Decision state as reported in status updates.
    pub fn status(&self) -> Status {
        match (self.has_finalized(), self.is_accepted()) {
            (false, true) => Status::Accepted,
            (false, false) => Status::Rejected,
            (true, true) => Status::Finalized,
            (true, false) => Status::Invalid,
        }
    }

    /// Ingests one vote and returns `true` iff the round was conclusive,
    /// meaning it either advanced the streak or flipped the decision.
    ///
    /// Error code semantics: `0` is a yes, any positive code a no, and any
    /// code that is negative as an `i32` an abstention. Abstentions shift
    /// the window like every other vote but are masked out of both counts,
    /// which is what lets a run of neutrals starve a majority.
    ///
    /// Finalization is not a terminal state at this level: a conclusive
    /// contrary round after finalization still flips the decision and
    /// resets the streak. Exclusion of finalized targets from polling is
    /// the caller's job and is what makes finality stick in practice.
    pub fn register_vote(&mut self, error: u32) -> bool {
        self.votes = (self.votes << 1) | (error == 0) as u8;
        self.consider = (self.consider << 1) | ((error as i32) >= 0) as u8;

        let yes = (self.votes & self.consider).count_ones() > 6;
        if !yes {
            let no = (!self.votes & self.consider).count_ones() > 6;
            if !no {
                // The round is inconclusive.
                return false;
            }
        }

        // Conclusive and agreeing with the current decision: extend the
        // streak, keeping the decision bit intact.
        if self.is_accepted() == yes {
            self.confidence += 2;
            return true;
        }

        // Conclusive but contrary: install the new decision with an empty
        // streak.
        self.confidence = yes as u16;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Registers one vote and asserts the full observable state afterward.
    fn register_and_check(
        vr: &mut VoteRecord,
        error: u32,
        conclusive: bool,
        accepted: bool,
        finalized: bool,
        confidence: u16,
    ) {
        assert_eq!(vr.register_vote(error), conclusive);
        assert_eq!(vr.is_accepted(), accepted, "decision bit");
        assert_eq!(vr.confidence(), confidence, "effective confidence");
        assert_eq!(vr.has_finalized(), finalized, "finalization");
    }

    #[test]
    fn fresh_record_reflects_initial_opinion() {
        let vr = VoteRecord::new(false);
        assert!(!vr.is_accepted());
        assert_eq!(vr.confidence(), 0);
        assert!(!vr.has_finalized());
        assert_eq!(vr.status(), Status::Rejected);

        let vr = VoteRecord::new(true);
        assert!(vr.is_accepted());
        assert_eq!(vr.confidence(), 0);
        assert!(!vr.has_finalized());
        assert_eq!(vr.status(), Status::Accepted);
    }

    #[test]
    fn full_lifecycle_accept_then_reject() {
        let mut vr = VoteRecord::new(false);

        // The first six yes votes are absorbed by the balanced window.
        for _ in 0..6 {
            register_and_check(&mut vr, 0, false, false, false, 0);
        }

        // The seventh flips the decision and resets the streak.
        register_and_check(&mut vr, 0, true, true, false, 0);

        // Confidence now climbs one per conclusive round up to the
        // finalization score.
        for i in 1..FINALIZATION_SCORE {
            register_and_check(&mut vr, 0, true, true, false, i);
        }
        register_and_check(&mut vr, 0, true, true, true, FINALIZATION_SCORE);
        assert_eq!(vr.status(), Status::Finalized);

        // A lone no inside an all-yes window still leaves seven considered
        // yes slots, so the round stays conclusive-yes.
        register_and_check(&mut vr, 1, true, true, true, FINALIZATION_SCORE + 1);

        // More no votes thin the window below either majority.
        for _ in 0..5 {
            register_and_check(&mut vr, 1, false, true, true, FINALIZATION_SCORE + 1);
        }

        // The seventh consecutive no is conclusive-contrary: the decision
        // flips even though the record had finalized.
        register_and_check(&mut vr, 1, true, false, false, 0);

        // And the streak rebuilds on the other side.
        for i in 1..FINALIZATION_SCORE {
            register_and_check(&mut vr, 1, true, false, false, i);
        }
        register_and_check(&mut vr, 1, true, false, true, FINALIZATION_SCORE);
        assert_eq!(vr.status(), Status::Invalid);
    }

    #[test]
    fn split_window_is_inconclusive() {
        let mut vr = VoteRecord::new(false);

        // Alternate yes/no: neither side can collect more than six of the
        // eight considered slots.
        for i in 0..32u32 {
            assert!(!vr.register_vote(i % 2), "vote {} should be inconclusive", i);
        }
        assert_eq!(vr.confidence(), 0);
        assert!(!vr.is_accepted());
    }

    #[test]
    fn neutrals_starve_the_majority() {
        let mut vr = VoteRecord::new(true);

        // Build a full yes window: 7 to first conclusive, then one more.
        for _ in 0..8 {
            vr.register_vote(0);
        }
        let base = vr.confidence();

        // One neutral leaves seven considered yes slots: still conclusive.
        register_and_check(&mut vr, u32::MAX, true, true, false, base + 1);

        // A second consecutive neutral drops the considered yes count to
        // six, which is below the strict majority.
        register_and_check(&mut vr, u32::MAX, false, true, false, base + 1);

        // Recovery: the neutral holes keep riding the window, so the next
        // six yes votes still only ever see six considered yes slots.
        for _ in 0..6 {
            register_and_check(&mut vr, 0, false, true, false, base + 1);
        }

        // The seventh pushes one hole out of the window and the majority
        // returns.
        register_and_check(&mut vr, 0, true, true, false, base + 2);
    }

    #[test]
    fn neutral_never_flips_state() {
        let mut vr = VoteRecord::new(true);
        for _ in 0..16 {
            vr.register_vote(u32::MAX);
        }
        assert!(vr.is_accepted());
        assert_eq!(vr.confidence(), 0);
    }

    #[test]
    fn positive_error_codes_all_mean_no() {
        let mut a = VoteRecord::new(true);
        let mut b = VoteRecord::new(true);
        for _ in 0..7 {
            a.register_vote(1);
            b.register_vote(0x7fff_ffff);
        }
        assert_eq!(a, b);
        assert!(!a.is_accepted());
    }

    #[test]
    fn decision_bit_always_matches_is_accepted() {
        // Drive a record through a messy vote sequence and confirm the
        // low-bit invariant after every step.
        let mut vr = VoteRecord::new(false);
        let sequence = [0, 0, 1, 0, 0, 0, 0, 0, u32::MAX, 0, 1, 1, 1, 1, 1, 1, 1, 1];
        for &e in &sequence {
            vr.register_vote(e);
            assert_eq!(vr.is_accepted(), (vr.confidence & 1) == 1);
            assert!(!vr.has_finalized() || vr.confidence() >= FINALIZATION_SCORE);
        }
    }
}
