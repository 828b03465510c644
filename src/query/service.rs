//! Query service - the per-session query slot
//!
//! Holds at most one in-flight query. Submitting a new question cancels the
//! previous one before the new one starts; responses carrying a superseded
//! id are discarded before they can reach the conversation log.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use flume::{Receiver, Sender};
use log::{debug, error, warn};

use crate::conversation::{ConversationLog, ConversationTurn};
use crate::focus::Focus;

use super::endpoint::EndpointConfig;
use super::request::{CancelToken, QueryFault, QueryId, QueryRequest, QueryResponse};
use super::worker::run_query;

/// Observable state of the in-flight query. Terminal outcomes clear the
/// slot rather than lingering here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryState {
    /// Submitted, no data received yet
    Pending,
    /// At least one answer chunk has arrived
    Streaming,
}

/// Seam between the orchestrator and whatever actually talks to the
/// endpoint. The real implementation spawns a worker thread; tests drive
/// the response channel by hand.
pub trait QueryTransport: Send {
    fn start(&mut self, request: QueryRequest, tx: Sender<QueryResponse>);
}

/// Spawns one worker thread per query against the configured endpoint
pub struct HttpTransport {
    config: EndpointConfig,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }
}

impl QueryTransport for HttpTransport {
    fn start(&mut self, request: QueryRequest, tx: Sender<QueryResponse>) {
        let config = self.config.clone();
        std::thread::spawn(move || run_query(&config, request, &tx));
    }
}

struct InFlight {
    id: QueryId,
    cancel: CancelToken,
    state: QueryState,
    question: String,
    focus: Focus,
    asked_at: DateTime<Utc>,
    submitted_at: Instant,
    answer: String,
}

/// Events surfaced to the UI layer. Cancellations are an expected outcome
/// of superseding and deliberately produce no event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryEvent {
    /// One streamed piece of the answer, in arrival order
    AnswerChunk { id: QueryId, text: String },

    /// The query finished; its turn is already in the conversation log
    Answered { id: QueryId },

    /// One-line, user-visible failure. Retry is the user's call.
    Failed { id: QueryId, message: String },
}

pub struct QueryService {
    transport: Box<dyn QueryTransport>,
    response_tx: Sender<QueryResponse>,
    response_rx: Receiver<QueryResponse>,
    first_byte_timeout: Duration,
    next_query_id: u64,
    in_flight: Option<InFlight>,
}

impl QueryService {
    #[must_use]
    pub fn new(config: EndpointConfig, first_byte_timeout: Duration) -> Self {
        Self::with_transport(Box::new(HttpTransport::new(config)), first_byte_timeout)
    }

    #[must_use]
    pub fn with_transport(transport: Box<dyn QueryTransport>, first_byte_timeout: Duration) -> Self {
        let (response_tx, response_rx) = flume::unbounded();
        Self {
            transport,
            response_tx,
            response_rx,
            first_byte_timeout,
            next_query_id: 1,
            in_flight: None,
        }
    }

    /// Submit a new query, superseding (and cancelling) any in-flight one.
    /// The focus snapshot is the one taken at submission time.
    pub fn submit(&mut self, prompt: String, question: String, focus: Focus) -> QueryId {
        if let Some(prev) = self.in_flight.take() {
            debug!("superseding query {:?}", prev.id);
            prev.cancel.cancel();
        }

        let id = QueryId::new(self.next_query_id);
        self.next_query_id += 1;

        let cancel = CancelToken::new();
        self.in_flight = Some(InFlight {
            id,
            cancel: cancel.clone(),
            state: QueryState::Pending,
            question,
            focus,
            asked_at: Utc::now(),
            submitted_at: Instant::now(),
            answer: String::new(),
        });

        self.transport.start(
            QueryRequest { id, prompt, cancel },
            self.response_tx.clone(),
        );
        id
    }

    #[must_use]
    pub fn in_flight_id(&self) -> Option<QueryId> {
        self.in_flight.as_ref().map(|flight| flight.id)
    }

    #[must_use]
    pub fn in_flight_state(&self) -> Option<QueryState> {
        self.in_flight.as_ref().map(|flight| flight.state)
    }

    /// Drain worker responses without blocking. Completed answers are
    /// appended to `log` as one turn each; stale responses are dropped.
    /// The channel is drained before the stall check so a first byte that
    /// arrived just inside the timeout always counts.
    pub fn poll(&mut self, log: &mut ConversationLog) -> Vec<QueryEvent> {
        let mut events = Vec::new();

        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response, log, &mut events);
        }

        if let Some(event) = self.expire_if_stalled(Instant::now()) {
            events.push(event);
        }

        events
    }

    fn handle_response(
        &mut self,
        response: QueryResponse,
        log: &mut ConversationLog,
        events: &mut Vec<QueryEvent>,
    ) {
        match response {
            QueryResponse::Chunk { id, text } => {
                let Some(flight) = self.in_flight.as_mut().filter(|f| f.id == id) else {
                    debug!("discarding chunk from superseded query {id:?}");
                    return;
                };
                flight.state = QueryState::Streaming;
                flight.answer.push_str(&text);
                events.push(QueryEvent::AnswerChunk { id, text });
            }

            QueryResponse::Completed { id } => {
                let Some(flight) = self.in_flight.take_if(|f| f.id == id) else {
                    debug!("discarding completion of superseded query {id:?}");
                    return;
                };
                log.append(ConversationTurn {
                    question: flight.question,
                    answer: flight.answer,
                    asked_at: flight.asked_at,
                    focus: flight.focus,
                });
                events.push(QueryEvent::Answered { id });
            }

            QueryResponse::Cancelled(id) => {
                debug!("query {id:?} acknowledged cancellation");
                if self.in_flight.as_ref().is_some_and(|f| f.id == id) {
                    self.in_flight = None;
                }
            }

            QueryResponse::Error { id, fault } => {
                if self.in_flight.take_if(|f| f.id == id).is_some() {
                    error!("query {id:?} failed: {fault}");
                    events.push(QueryEvent::Failed {
                        id,
                        message: fault.to_string(),
                    });
                } else {
                    debug!("ignoring error from superseded query {id:?}: {fault}");
                }
            }
        }
    }

    /// Bounded wait for the first byte: a query still `Pending` past the
    /// timeout transitions to `Failed` instead of hanging.
    fn expire_if_stalled(&mut self, now: Instant) -> Option<QueryEvent> {
        {
            let flight = self.in_flight.as_ref()?;
            if flight.state != QueryState::Pending
                || now.duration_since(flight.submitted_at) < self.first_byte_timeout
            {
                return None;
            }
        }

        let flight = self.in_flight.take()?;
        flight.cancel.cancel();
        warn!(
            "query {:?} saw no data within {:?}",
            flight.id, self.first_byte_timeout
        );
        Some(QueryEvent::Failed {
            id: flight.id,
            message: QueryFault::FirstByteTimeout.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualTransport;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn service(transport: &ManualTransport) -> QueryService {
        QueryService::with_transport(Box::new(transport.clone()), TIMEOUT)
    }

    #[test]
    fn completed_query_appends_exactly_one_turn() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);
        let mut log = ConversationLog::new();

        let id = service.submit("prompt".into(), "what is this?".into(), Focus::page(2));
        assert_eq!(service.in_flight_state(), Some(QueryState::Pending));

        transport.emit(0, QueryResponse::Chunk {
            id,
            text: "an ".into(),
        });
        transport.emit(0, QueryResponse::Chunk {
            id,
            text: "answer".into(),
        });
        transport.emit(0, QueryResponse::Completed { id });

        let events = service.poll(&mut log);
        assert_eq!(
            events,
            vec![
                QueryEvent::AnswerChunk {
                    id,
                    text: "an ".into()
                },
                QueryEvent::AnswerChunk {
                    id,
                    text: "answer".into()
                },
                QueryEvent::Answered { id },
            ]
        );

        assert_eq!(log.len(), 1);
        let turn = &log.recent_turns(1)[0];
        assert_eq!(turn.question, "what is this?");
        assert_eq!(turn.answer, "an answer");
        assert_eq!(turn.focus, Focus::page(2));
        assert_eq!(service.in_flight_id(), None);
    }

    #[test]
    fn new_submission_supersedes_the_previous_query() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);
        let mut log = ConversationLog::new();

        let q1 = service.submit("p1".into(), "first".into(), Focus::page(0));
        let q2 = service.submit("p2".into(), "second".into(), Focus::page(1));
        assert_ne!(q1, q2);
        assert_eq!(transport.started(), 2);

        // The superseded request saw its cancellation token signalled
        assert!(transport.request(0).cancel.is_cancelled());
        assert!(!transport.request(1).cancel.is_cancelled());
        assert_eq!(service.in_flight_id(), Some(q2));

        // Late chunks from the first worker must not surface or be logged
        transport.emit(0, QueryResponse::Chunk {
            id: q1,
            text: "stale".into(),
        });
        transport.emit(0, QueryResponse::Cancelled(q1));
        transport.emit(1, QueryResponse::Chunk {
            id: q2,
            text: "fresh".into(),
        });
        transport.emit(1, QueryResponse::Completed { id: q2 });

        let events = service.poll(&mut log);
        assert_eq!(
            events,
            vec![
                QueryEvent::AnswerChunk {
                    id: q2,
                    text: "fresh".into()
                },
                QueryEvent::Answered { id: q2 },
            ]
        );

        assert_eq!(log.len(), 1);
        assert_eq!(log.recent_turns(1)[0].question, "second");
    }

    #[test]
    fn cancelled_query_never_reaches_the_log() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);
        let mut log = ConversationLog::new();

        let q1 = service.submit("p1".into(), "first".into(), Focus::page(0));
        transport.emit(0, QueryResponse::Chunk {
            id: q1,
            text: "partial ".into(),
        });
        service.poll(&mut log);

        // Supersede mid-stream; the first answer was partially received
        service.submit("p2".into(), "second".into(), Focus::page(0));
        transport.emit(0, QueryResponse::Chunk {
            id: q1,
            text: "more".into(),
        });
        transport.emit(0, QueryResponse::Completed { id: q1 });

        service.poll(&mut log);
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn at_most_one_query_is_in_flight() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);

        for i in 0..5 {
            service.submit(format!("p{i}"), format!("q{i}"), Focus::page(0));
            // Every request except the newest has been cancelled
            for j in 0..i {
                assert!(transport.request(j).cancel.is_cancelled());
            }
            assert!(!transport.request(i).cancel.is_cancelled());
        }
    }

    #[test]
    fn transport_error_surfaces_as_one_failure_event() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);
        let mut log = ConversationLog::new();

        let id = service.submit("p".into(), "q".into(), Focus::page(0));
        transport.emit(0, QueryResponse::Error {
            id,
            fault: QueryFault::Status(429),
        });

        let events = service.poll(&mut log);
        assert_eq!(
            events,
            vec![QueryEvent::Failed {
                id,
                message: "endpoint returned HTTP 429".into()
            }]
        );
        assert_eq!(log.len(), 0);
        assert_eq!(service.in_flight_id(), None);
    }

    #[test]
    fn pending_query_expires_after_first_byte_timeout() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);

        let id = service.submit("p".into(), "q".into(), Focus::page(0));
        assert!(service.expire_if_stalled(Instant::now()).is_none());

        let later = Instant::now() + TIMEOUT + Duration::from_millis(1);
        let event = service.expire_if_stalled(later);
        assert_eq!(
            event,
            Some(QueryEvent::Failed {
                id,
                message: "timed out waiting for the first response byte".into()
            })
        );
        assert!(transport.request(0).cancel.is_cancelled());
        assert_eq!(service.in_flight_id(), None);
    }

    #[test]
    fn chunk_already_in_the_channel_beats_the_timeout() {
        let transport = ManualTransport::new();
        // Zero timeout: the deadline has always passed by the time poll runs
        let mut service =
            QueryService::with_transport(Box::new(transport.clone()), Duration::ZERO);
        let mut log = ConversationLog::new();

        let id = service.submit("p".into(), "q".into(), Focus::page(0));
        transport.emit(0, QueryResponse::Chunk {
            id,
            text: "first byte".into(),
        });

        let events = service.poll(&mut log);
        assert_eq!(
            events,
            vec![QueryEvent::AnswerChunk {
                id,
                text: "first byte".into()
            }]
        );
        assert_eq!(service.in_flight_state(), Some(QueryState::Streaming));
    }

    #[test]
    fn streaming_query_does_not_expire() {
        let transport = ManualTransport::new();
        let mut service = service(&transport);
        let mut log = ConversationLog::new();

        let id = service.submit("p".into(), "q".into(), Focus::page(0));
        transport.emit(0, QueryResponse::Chunk {
            id,
            text: "x".into(),
        });
        service.poll(&mut log);
        assert_eq!(service.in_flight_state(), Some(QueryState::Streaming));

        let later = Instant::now() + TIMEOUT * 2;
        assert!(service.expire_if_stalled(later).is_none());
    }
}
