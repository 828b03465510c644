//! Shared helpers for unit and integration tests

use std::sync::{Arc, Mutex};

use flume::Sender;

use crate::document::{LoadedDocument, PageContent};
use crate::query::service::QueryTransport;
use crate::query::{QueryRequest, QueryResponse};

/// Transport double that records started requests and lets the test play
/// the worker's side of the response channel by hand.
#[derive(Clone, Default)]
pub struct ManualTransport {
    inner: Arc<Mutex<Vec<(QueryRequest, Sender<QueryResponse>)>>>,
}

impl ManualTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests the orchestrator has started
    #[must_use]
    pub fn started(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// The `index`-th started request (cancellation token included)
    #[must_use]
    pub fn request(&self, index: usize) -> QueryRequest {
        self.inner.lock().unwrap()[index].0.clone()
    }

    /// Emit a worker response on behalf of the `index`-th request
    pub fn emit(&self, index: usize, response: QueryResponse) {
        let guard = self.inner.lock().unwrap();
        let (_, tx) = &guard[index];
        tx.send(response).expect("response channel closed");
    }
}

impl QueryTransport for ManualTransport {
    fn start(&mut self, request: QueryRequest, tx: Sender<QueryResponse>) {
        self.inner.lock().unwrap().push((request, tx));
    }
}

/// Build an in-memory document from plain page texts
#[must_use]
pub fn document_from_texts(pages: &[&str]) -> LoadedDocument {
    LoadedDocument::from_pages(pages.iter().map(|p| PageContent::text_only(*p)).collect())
}
