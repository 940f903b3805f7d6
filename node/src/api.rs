//! # HTTP API
//!
//! Builds the axum router for the node's poll-and-status surface. All
//! handlers share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description                                  |
//! |--------|------------|----------------------------------------------|
//! | GET    | `/health`  | Liveness probe                               |
//! | GET    | `/status`  | Reconciliation summary                       |
//! | POST   | `/poll`    | Answer a peer's poll from our own records    |
//! | POST   | `/submit`  | Put a target under reconciliation            |
//!
//! `/metrics` lives on a separate listener; see `main.rs`.
//!
//! ## Answering polls
//!
//! A poll from a peer may name targets this node has never seen. The node
//! adopts them on the spot with a default-accepted opinion and then answers
//! from its own vote records: yes for targets it currently accepts, no
//! otherwise. Adopting-on-poll is what lets a target ripple through the
//! network from a single submission point.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::trace::TraceLayer;

use snowdrift_consensus::{Hash, Inv, NodeId, Processor, Response, Target, Vote};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Identifier this node presents to peers.
    pub node_id: NodeId,
    /// The reconciliation engine.
    pub processor: Arc<Processor>,
    /// Prometheus handles for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Submitted targets
// ---------------------------------------------------------------------------

/// The node's own concrete [`Target`]: a hash plus the static opinions the
/// submitter attached to it.
///
/// Validity is constant: the reference daemon has no mechanism by which a
/// submitted hash later becomes invalid. Integrators embedding the engine
/// next to a real chain wire their own target types instead.
#[derive(Debug)]
pub struct SubmittedTarget {
    hash: Hash,
    kind: String,
    accepted: bool,
    score: i64,
}

impl SubmittedTarget {
    /// A target submitted through the local API.
    pub fn new(hash: Hash, kind: impl Into<String>, accepted: bool, score: i64) -> Self {
        Self {
            hash,
            kind: kind.into(),
            accepted,
            score,
        }
    }

    /// A target first seen inside a peer's poll: adopted with the
    /// default-accepted opinion.
    pub fn from_inv(inv: &Inv) -> Self {
        Self::new(inv.target_hash, inv.target_type.clone(), true, 1)
    }
}

impl Target for SubmittedTarget {
    fn hash(&self) -> Hash {
        self.hash
    }
    fn target_type(&self) -> &str {
        &self.kind
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

/// Builds this node's answer to a poll: adopt unseen targets, then vote
/// from our own current decisions. Shared by the HTTP handler and the
/// in-process simulator.
pub fn build_response(processor: &Processor, round: i64, invs: &[Inv]) -> Response {
    let votes = invs
        .iter()
        .map(|inv| {
            processor.add_target_to_reconcile(Arc::new(SubmittedTarget::from_inv(inv)));
            let error = if processor.is_accepted(&inv.target_hash) {
                0
            } else {
                1
            };
            Vote::new(error, inv.target_hash)
        })
        .collect();
    Response::new(round, 0, votes)
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with all API routes and request tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/poll", post(poll_handler))
        .route("/submit", post(submit_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /poll` — what a polling peer sends us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    /// The round the poller issued this request under; echoed back so the
    /// poller can correlate our response.
    pub round: i64,
    /// Targets the poller wants an opinion on, in its chosen order.
    pub invs: Vec<Inv>,
}

/// Body of `POST /submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Hash of the target. When omitted, `payload` must be present and the
    /// hash is derived from it.
    pub hash: Option<Hash>,
    /// Arbitrary payload to derive a hash from (SHA-256) when no explicit
    /// hash is given.
    pub payload: Option<String>,
    /// Wire type tag; defaults to `"tx"`.
    pub kind: Option<String>,
    /// Initial opinion; defaults to accepted.
    pub accepted: Option<bool>,
    /// Poll priority; defaults to 1.
    pub score: Option<i64>,
}

/// Reply to `POST /submit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Hash the target was registered under.
    pub hash: Hash,
    /// False when the target was already being reconciled.
    pub added: bool,
}

/// Reply to `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node software version.
    pub version: String,
    /// This node's peer-facing identifier.
    pub node_id: NodeId,
    /// Current poll round.
    pub round: i64,
    /// Targets under reconciliation, finalized included.
    pub targets: usize,
    /// Targets with a finalized decision.
    pub finalized: usize,
    /// Polls awaiting a response.
    pub in_flight: usize,
    /// Peers that have answered at least one poll.
    pub known_peers: Vec<NodeId>,
    /// ISO-8601 timestamp of this snapshot.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe for orchestrators. Intentionally checks
/// nothing beyond "the process serves HTTP"; substance lives in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — reconciliation summary.
async fn status_handler(State(state): State<AppState>) -> Json<NodeStatus> {
    Json(NodeStatus {
        version: state.version.clone(),
        node_id: state.node_id,
        round: state.processor.round(),
        targets: state.processor.target_count(),
        finalized: state.processor.finalized_count(),
        in_flight: state.processor.in_flight_count(),
        known_peers: state.processor.known_peer_ids(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /poll` — answer a peer's poll from our own vote records.
async fn poll_handler(
    State(state): State<AppState>,
    Json(req): Json<PollRequest>,
) -> Json<Response> {
    let response = build_response(&state.processor, req.round, &req.invs);
    state
        .metrics
        .targets_tracked
        .set(state.processor.target_count() as i64);
    tracing::debug!(
        round = req.round,
        invs = req.invs.len(),
        "answered peer poll"
    );
    Json(response)
}

/// `POST /submit` — put a target under reconciliation.
async fn submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> axum::response::Response {
    let hash = match (req.hash, &req.payload) {
        (Some(hash), _) => hash,
        (None, Some(payload)) => {
            let digest: [u8; 32] = Sha256::digest(payload.as_bytes()).into();
            Hash::from_bytes(digest)
        }
        (None, None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "either hash or payload is required" })),
            )
                .into_response();
        }
    };

    let target = SubmittedTarget::new(
        hash,
        req.kind.unwrap_or_else(|| "tx".to_string()),
        req.accepted.unwrap_or(true),
        req.score.unwrap_or(1),
    );
    let added = state.processor.add_target_to_reconcile(Arc::new(target));
    state
        .metrics
        .targets_tracked
        .set(state.processor.target_count() as i64);

    tracing::info!(hash = %hash, added, "target submitted");
    (StatusCode::OK, Json(SubmitResponse { hash, added })).into_response()
}
