//! # Protocol Constants
//!
//! Every tunable of the reconciliation core lives here. The defaults are
//! wire-facing: peers running the reference daemon expect exactly these
//! values, so treat a change to any of them as a network upgrade, not a
//! refactor.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

/// Effective confidence a vote record must reach before its decision is
/// considered final. With one confidence point per conclusive round, 128
/// conclusive confirmations back every finalized decision.
pub const FINALIZATION_SCORE: u16 = 128;

// ---------------------------------------------------------------------------
// Polling cadence
// ---------------------------------------------------------------------------

/// Interval between scheduler ticks. Each tick issues at most one poll, so
/// this bounds the outbound query rate per node.
pub const QUERY_TIME_STEP: Duration = Duration::from_millis(10);

/// Maximum number of inv entries in a single poll. Batches are truncated,
/// never split; targets that miss the cut ride a later tick.
pub const MAX_ELEMENT_POLL: usize = 4096;

// ---------------------------------------------------------------------------
// Request expiry
// ---------------------------------------------------------------------------

/// How long an in-flight poll may wait for its response. Responses arriving
/// after this window are dropped; the protocol tolerates the loss because
/// future ticks re-poll anything still undecided.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// [`REQUEST_TIMEOUT`] as whole seconds, for arithmetic against the Unix
/// timestamps the clock hands out.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;
