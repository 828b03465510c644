//! Query request and response types

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Unique identifier for submitted queries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryId(pub u64);

impl QueryId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Cooperative cancellation signal shared between the orchestrator and the
/// worker streaming a response. Signalling it tells the worker to stop
/// consuming and emitting chunks at the next opportunity.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A submitted query. At most one lives at a time; a superseded request is
/// cancelled through its token, never silently abandoned.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub id: QueryId,
    pub prompt: String,
    pub cancel: CancelToken,
}

/// Errors from the query worker
#[derive(Debug, Error)]
pub enum QueryFault {
    #[error("endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the first response byte")]
    FirstByteTimeout,

    #[error("malformed response stream: {0}")]
    MalformedStream(String),
}

/// Messages from the query worker back to the orchestrator
#[derive(Debug)]
pub enum QueryResponse {
    /// One streamed piece of answer text, in arrival order
    Chunk { id: QueryId, text: String },

    /// The stream ended normally
    Completed { id: QueryId },

    /// The worker observed its cancellation signal and stopped
    Cancelled(QueryId),

    /// The query failed; reported once, never retried automatically
    Error { id: QueryId, fault: QueryFault },
}
