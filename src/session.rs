//! Reading session facade
//!
//! Wires the tracker, extractor, assembler, orchestrator and conversation
//! log together behind two entry points: viewer events in, questions in,
//! streamed updates out. The focus snapshot for a question is taken
//! atomically at submission time; later navigation does not affect an
//! answer already in flight.

use log::{debug, info};
use thiserror::Error;

use crate::conversation::ConversationLog;
use crate::document::{self, ExtractionError, LoadedDocument};
use crate::focus::{Focus, FocusTracker};
use crate::prompt::{self, AssembleError};
use crate::query::{QueryEvent, QueryId, QueryService};
use crate::settings::Settings;
use crate::viewer::ViewerEvent;

/// Synchronous failures of [`Session::ask`]
#[derive(Debug, Error)]
pub enum AskError {
    #[error("no document focus established yet")]
    NoFocus,

    /// Contract violation; fatal to this request, not retried
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Question too long; the user can shorten and retry
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// Updates for the UI layer, drained on the interactive thread
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    AnswerChunk(String),
    /// The answer is complete and recorded in the conversation log
    AnswerComplete,
    /// One-line error message, rendered as an error rather than answer text
    QueryFailed(String),
}

pub struct Session {
    document: LoadedDocument,
    tracker: FocusTracker,
    log: ConversationLog,
    query: QueryService,
    context_char_budget: usize,
    prompt_char_budget: usize,
    history_turn_limit: usize,
}

impl Session {
    #[must_use]
    pub fn new(document: LoadedDocument, settings: &Settings, query: QueryService) -> Self {
        Self {
            document,
            tracker: FocusTracker::new(),
            log: ConversationLog::new(),
            query,
            context_char_budget: settings.context_char_budget,
            prompt_char_budget: settings.prompt_char_budget,
            history_turn_limit: settings.history_turn_limit,
        }
    }

    /// Feed one navigation event from the viewer integration layer.
    /// Returns the new focus when one was established.
    pub fn handle_viewer_event(&mut self, event: ViewerEvent) -> Option<Focus> {
        let focus = self.tracker.apply(event);
        if let Some(focus) = &focus {
            debug!("focus moved to page {}", focus.page);
        }
        focus
    }

    /// Submit a question grounded in the current focus. Extraction and
    /// assembly problems surface here, synchronously; transport problems
    /// arrive later through [`Session::poll_updates`].
    pub fn ask(&mut self, question: &str) -> Result<QueryId, AskError> {
        let focus = self.tracker.focus().cloned().ok_or(AskError::NoFocus)?;
        let snippet = document::extract(&self.document, &focus, self.context_char_budget)?;
        let turns = self.log.recent_turns(self.history_turn_limit);
        let prompt = prompt::assemble(&snippet, turns, question, self.prompt_char_budget)?;

        info!(
            "asking from page {} with {} context chars, {} history turns",
            focus.page,
            snippet.len(),
            turns.len()
        );
        Ok(self.query.submit(prompt, question.to_string(), focus))
    }

    /// Drain streamed progress without blocking the interactive thread
    pub fn poll_updates(&mut self) -> Vec<SessionUpdate> {
        self.query
            .poll(&mut self.log)
            .into_iter()
            .map(|event| match event {
                QueryEvent::AnswerChunk { text, .. } => SessionUpdate::AnswerChunk(text),
                QueryEvent::Answered { .. } => SessionUpdate::AnswerComplete,
                QueryEvent::Failed { message, .. } => SessionUpdate::QueryFailed(message),
            })
            .collect()
    }

    #[must_use]
    pub fn document(&self) -> &LoadedDocument {
        &self.document
    }

    #[must_use]
    pub fn focus(&self) -> Option<&Focus> {
        self.tracker.focus()
    }

    #[must_use]
    pub fn conversation(&self) -> &ConversationLog {
        &self.log
    }

    #[must_use]
    pub fn has_in_flight_query(&self) -> bool {
        self.query.in_flight_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryResponse, QueryService};
    use crate::test_utils::{ManualTransport, document_from_texts};
    use std::time::Duration;

    fn session(transport: &ManualTransport, pages: &[&str]) -> Session {
        let query = QueryService::with_transport(
            Box::new(transport.clone()),
            Duration::from_secs(30),
        );
        Session::new(document_from_texts(pages), &Settings::default(), query)
    }

    #[test]
    fn asking_without_focus_fails_synchronously() {
        let transport = ManualTransport::new();
        let mut session = session(&transport, &["page text"]);
        assert!(matches!(session.ask("hello?"), Err(AskError::NoFocus)));
        assert_eq!(transport.started(), 0);
    }

    #[test]
    fn ask_uses_the_focus_at_submission_time() {
        let transport = ManualTransport::new();
        let mut session = session(&transport, &["first page", "second page", "third page"]);

        session.handle_viewer_event(ViewerEvent::DocumentOpened { page_count: 3 });
        session.handle_viewer_event(ViewerEvent::Navigated {
            page: 1,
            selection: None,
        });

        let id = session.ask("what is here?").unwrap();
        // Navigation after submission must not affect the in-flight query
        session.handle_viewer_event(ViewerEvent::Navigated {
            page: 2,
            selection: None,
        });

        transport.emit(0, QueryResponse::Chunk {
            id,
            text: "answer".into(),
        });
        transport.emit(0, QueryResponse::Completed { id });
        let updates = session.poll_updates();
        assert_eq!(
            updates,
            vec![
                SessionUpdate::AnswerChunk("answer".into()),
                SessionUpdate::AnswerComplete,
            ]
        );

        let turn = &session.conversation().recent_turns(1)[0];
        assert_eq!(turn.focus.page, 1);
        assert!(transport.request(0).prompt.contains("second page"));
    }

    #[test]
    fn transport_failure_becomes_a_one_line_update() {
        let transport = ManualTransport::new();
        let mut session = session(&transport, &["page text"]);
        session.handle_viewer_event(ViewerEvent::DocumentOpened { page_count: 1 });

        let id = session.ask("q").unwrap();
        transport.emit(0, QueryResponse::Error {
            id,
            fault: crate::query::QueryFault::Status(503),
        });

        assert_eq!(
            session.poll_updates(),
            vec![SessionUpdate::QueryFailed(
                "endpoint returned HTTP 503".into()
            )]
        );
        assert!(session.conversation().is_empty());
    }

    #[test]
    fn selection_reaches_the_prompt() {
        let transport = ManualTransport::new();
        let mut session = session(&transport, &["alpha beta gamma"]);
        session.handle_viewer_event(ViewerEvent::DocumentOpened { page_count: 1 });
        session.handle_viewer_event(ViewerEvent::Navigated {
            page: 0,
            selection: Some("beta".into()),
        });

        session.ask("what does beta mean?").unwrap();
        let prompt = transport.request(0).prompt;
        assert!(prompt.contains(crate::document::SELECTION_MARKER));
        assert!(prompt.contains("beta"));
    }
}
