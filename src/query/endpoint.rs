//! Gemini endpoint protocol
//!
//! Payload construction for `streamGenerateContent` and parsing of its SSE
//! framed response chunks. Both directions are plain data transforms so
//! they stay testable without a network.

use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

use crate::settings::Settings;

use super::request::QueryFault;

/// Immutable endpoint parameters resolved once at startup
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub system_prompt: String,
    pub max_output_tokens: u32,
    pub connect_timeout: Duration,
}

impl EndpointConfig {
    /// Build from settings, resolving the API key from the environment
    /// variable the settings name. Credential material never lives in the
    /// settings file itself.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = std::env::var(&settings.api_key_env_var)
            .map_err(|_| anyhow!("environment variable {} is not set", settings.api_key_env_var))
            .context("cannot authenticate against the LLM endpoint")?;

        Ok(Self {
            base_url: settings.api_endpoint.clone(),
            model: settings.model.clone(),
            api_key,
            system_prompt: settings.system_prompt.clone(),
            max_output_tokens: settings.max_output_tokens,
            connect_timeout: Duration::from_millis(settings.first_byte_timeout_ms),
        })
    }

    /// URL of the streaming generate call (SSE framing)
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateRequest {
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Part,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

/// Shape the assembled prompt into the endpoint's request body. History is
/// already folded into the prompt by the assembler, so a single user turn
/// is sent.
#[must_use]
pub fn build_request(config: &EndpointConfig, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        generation_config: GenerationConfig {
            max_output_tokens: config.max_output_tokens,
        },
        system_instruction: SystemInstruction {
            parts: Part {
                text: config.system_prompt.clone(),
            },
        },
        contents: vec![Content {
            role: "user",
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        }],
    }
}

/// Extract the answer text carried by one SSE line.
///
/// Blank lines, comments and other non-data fields yield `Ok(None)`, as do
/// data events without text parts (e.g. the final chunk carrying only a
/// finish reason). Unparseable JSON is a malformed stream.
pub fn sse_chunk_text(line: &str) -> Result<Option<String>, QueryFault> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| QueryFault::MalformedStream(e.to_string()))?;
    Ok(chunk.text())
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<ChunkCandidate>,
}

#[derive(Debug, Deserialize)]
struct ChunkCandidate {
    #[serde(default)]
    content: Option<ChunkContent>,
}

#[derive(Debug, Deserialize)]
struct ChunkContent {
    #[serde(default)]
    parts: Vec<ChunkPart>,
}

#[derive(Debug, Deserialize)]
struct ChunkPart {
    #[serde(default)]
    text: Option<String>,
}

impl StreamChunk {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let content = candidate.content.as_ref()?;
        let mut out = String::new();
        for part in &content.parts {
            if let Some(text) = &part.text {
                out.push_str(text);
            }
        }
        if out.is_empty() { None } else { Some(out) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> EndpointConfig {
        EndpointConfig {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: "k".to_string(),
            system_prompt: "be helpful".to_string(),
            max_output_tokens: 1024,
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn request_body_matches_the_wire_shape() {
        let body = build_request(&config(), "the assembled prompt");
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "generationConfig": { "max_output_tokens": 1024 },
                "system_instruction": { "parts": { "text": "be helpful" } },
                "contents": [
                    { "role": "user", "parts": [ { "text": "the assembled prompt" } ] }
                ]
            })
        );
    }

    #[test]
    fn stream_url_targets_sse_endpoint() {
        let url = config().stream_url();
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=k"
        );
    }

    #[test]
    fn data_line_yields_its_text() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#;
        assert_eq!(sse_chunk_text(line).unwrap(), Some("hello world".into()));
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert_eq!(sse_chunk_text("").unwrap(), None);
        assert_eq!(sse_chunk_text(": keep-alive").unwrap(), None);
        assert_eq!(sse_chunk_text("event: done").unwrap(), None);
        assert_eq!(sse_chunk_text("data:").unwrap(), None);
        assert_eq!(sse_chunk_text("data: [DONE]").unwrap(), None);
    }

    #[test]
    fn finish_chunk_without_text_is_not_an_error() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(sse_chunk_text(line).unwrap(), None);
    }

    #[test]
    fn broken_json_is_a_malformed_stream() {
        let err = sse_chunk_text("data: {not json").unwrap_err();
        assert!(matches!(err, QueryFault::MalformedStream(_)));
    }
}
