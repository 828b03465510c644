//! Query worker - runs one request to completion on its own thread
//!
//! Blocks on network I/O so the interactive thread never does; everything
//! flows back through the response channel. The cancellation token is
//! checked between reads, so a cancelled stream stops promptly without
//! cutting a chunk in half.

use std::io::{BufRead, BufReader};

use flume::Sender;
use log::debug;

use super::endpoint::{EndpointConfig, build_request, sse_chunk_text};
use super::request::{QueryFault, QueryRequest, QueryResponse};

pub fn run_query(config: &EndpointConfig, request: QueryRequest, tx: &Sender<QueryResponse>) {
    let id = request.id;

    if request.cancel.is_cancelled() {
        let _ = tx.send(QueryResponse::Cancelled(id));
        return;
    }

    let client = match reqwest::blocking::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            let _ = tx.send(QueryResponse::Error {
                id,
                fault: e.into(),
            });
            return;
        }
    };

    let response = match client
        .post(config.stream_url())
        .json(&build_request(config, &request.prompt))
        .send()
    {
        Ok(response) => response,
        Err(e) => {
            if request.cancel.is_cancelled() {
                let _ = tx.send(QueryResponse::Cancelled(id));
            } else {
                let fault = if e.is_timeout() {
                    QueryFault::FirstByteTimeout
                } else {
                    e.into()
                };
                let _ = tx.send(QueryResponse::Error { id, fault });
            }
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let _ = tx.send(QueryResponse::Error {
            id,
            fault: QueryFault::Status(status.as_u16()),
        });
        return;
    }

    for line in BufReader::new(response).lines() {
        if request.cancel.is_cancelled() {
            debug!("query {id:?} cancelled mid-stream");
            let _ = tx.send(QueryResponse::Cancelled(id));
            return;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = tx.send(QueryResponse::Error {
                    id,
                    fault: e.into(),
                });
                return;
            }
        };

        match sse_chunk_text(&line) {
            Ok(Some(text)) => {
                let _ = tx.send(QueryResponse::Chunk { id, text });
            }
            Ok(None) => {}
            Err(fault) => {
                let _ = tx.send(QueryResponse::Error { id, fault });
                return;
            }
        }
    }

    if request.cancel.is_cancelled() {
        let _ = tx.send(QueryResponse::Cancelled(id));
    } else {
        let _ = tx.send(QueryResponse::Completed { id });
    }
}
