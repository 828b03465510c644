// Export modules for use in tests
pub mod conversation;
pub mod document;
pub mod focus;
pub mod prompt;
pub mod query;
pub mod session;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the session facade
pub use session::{AskError, Session, SessionUpdate};
