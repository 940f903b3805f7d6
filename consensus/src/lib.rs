// Copyright (c) 2026 Snowdrift Developers. MIT License.
// See LICENSE for details.

//! # Snowdrift Consensus — Core Library
//!
//! An Avalanche-style preconsensus engine: for every item it is asked
//! about (a block, a transaction, any [`Target`]), the engine repeatedly
//! polls remote peers, folds their yes/no/abstain answers into a compact
//! sliding-window vote record, and converges on an accept-or-reject
//! decision that finalizes once 128 consecutive conclusive rounds agree.
//!
//! ## Architecture
//!
//! Leaves first, the way the pieces stack:
//!
//! - **config** — The four wire-facing constants. Change them and you are
//!   on your own network.
//! - **target** — The [`Hash`] identity type and the [`Target`] capability
//!   trait the engine polls about.
//! - **wire** — Invs, votes, responses, status updates: the carriers that
//!   cross the peer boundary.
//! - **vote_record** — The per-target bit machine: eight sliding slots, a
//!   strict majority test, a confidence streak.
//! - **request** — One in-flight poll and its expiry predicate.
//! - **clock / peers** — Injected time and peer enumeration, so expiry and
//!   selection are deterministic under test.
//! - **processor** — The registry tying it all together: poll batches out,
//!   validated responses in, status transitions appended for the caller.
//! - **scheduler** — The 10 ms ticker that drives the processor and feeds
//!   an outbound poll channel.
//!
//! ## What this crate is not
//!
//! No transport, no peer discovery, no persistence, no vote signatures.
//! Peers, time, and candidate targets are all injected; the engine trusts
//! its caller for every one of them and concentrates on getting the
//! reconciliation math right.

pub mod clock;
pub mod config;
pub mod peers;
pub mod processor;
pub mod request;
pub mod scheduler;
pub mod target;
pub mod vote_record;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use peers::{NodeId, PeerDirectory, SharedDirectory, StaticDirectory};
pub use processor::{Processor, ProcessorError};
pub use request::RequestRecord;
pub use scheduler::{PollScheduler, SchedulerConfig};
pub use target::{Hash, Target};
pub use vote_record::VoteRecord;
pub use wire::{Inv, OutboundPoll, Response, Status, StatusUpdate, Vote};
