//! Query orchestration
//!
//! Owns the lifecycle of the single in-flight question: endpoint protocol,
//! the worker thread streaming the answer back, and the service enforcing
//! at-most-one-in-flight with cooperative cancellation.

pub mod endpoint;
pub mod request;
pub mod service;
pub mod worker;

pub use endpoint::EndpointConfig;
pub use request::{CancelToken, QueryFault, QueryId, QueryRequest, QueryResponse};
pub use service::{HttpTransport, QueryEvent, QueryService, QueryState, QueryTransport};
