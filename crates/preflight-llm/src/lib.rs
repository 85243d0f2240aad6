#![warn(missing_docs)]
//! # preflight-llm
//!
//! ## Purpose
//! Implements the chat-completion provider boundary for `preflight`.
//!
//! ## Responsibilities
//! - Validate provider endpoint policy (HTTPS only).
//! - Execute completion requests through an injectable transport abstraction.
//! - Recover structured JSON from loosely formatted model output.
//!
//! ## Data flow
//! Call sites build a [`ChatRequest`] -> [`LlmClient::complete_json`] sends it
//! through [`ChatTransport`] -> recovered [`serde_json::Value`] is validated
//! against a call-specific schema by the caller.
//!
//! ## Ownership and lifetimes
//! The client is cheap to clone (`Arc` transport) so pipelines can share one
//! configured instance across sequential calls.
//!
//! ## Error model
//! Endpoint policy violations, transport failures, and JSON recovery failures
//! are surfaced as [`LlmError`]. Callers treat every variant as a degraded
//! mode and fall back to heuristics; no variant may abort a request.
//!
//! ## Security and privacy notes
//! Request content is expected to be pre-masked by the analyzer layer. The
//! transport owns credentials; this crate never logs request bodies or keys.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use url::Url;

/// One chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System prompt establishing the role and output contract.
    pub system: String,
    /// User message content.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Request a JSON-object response format when the provider supports it.
    pub require_json: bool,
}

impl ChatRequest {
    /// Builds a deterministic JSON-mode request, the common case here.
    pub fn json(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens,
            require_json: true,
        }
    }

    /// Overrides the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Abstract transport used to reach the chat-completion provider.
///
/// The transport owns connection details and credentials and returns the
/// assistant message text verbatim.
pub trait ChatTransport: Send + Sync {
    /// Executes one completion request.
    fn complete(
        &self,
        endpoint: &str,
        model: &str,
        request: &ChatRequest,
    ) -> Result<String, LlmError>;
}

/// Configured provider client with validated endpoint policy.
///
/// Absence of a client (`Option<LlmClient>` being `None`) is the first-class
/// "feature disabled" state; construction only happens once credentials are
/// known to exist.
#[derive(Clone)]
pub struct LlmClient {
    endpoint: String,
    model: String,
    transport: Arc<dyn ChatTransport>,
}

impl LlmClient {
    /// Creates a client after validating the endpoint.
    ///
    /// # Errors
    /// Returns [`LlmError::InvalidEndpoint`] for unparseable or non-HTTPS
    /// endpoints.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, LlmError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            model: model.into(),
            transport,
        })
    }

    /// Returns the configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Executes a completion and returns the raw assistant text.
    ///
    /// # Errors
    /// Propagates transport failures unchanged.
    pub fn complete_text(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.transport.complete(&self.endpoint, &self.model, request)
    }

    /// Executes a completion and recovers a JSON value from the output.
    ///
    /// # Errors
    /// Returns [`LlmError::MalformedJson`] when no JSON object can be
    /// recovered even after string-literal repair.
    pub fn complete_json(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        let content = self.complete_text(request)?;
        let trimmed = content.trim();
        let json_text = extract_json_object(trimmed).unwrap_or(trimmed);
        parse_json_lenient(json_text)
    }
}

/// Validates provider endpoint policy.
///
/// # Errors
/// Returns [`LlmError::InvalidEndpoint`] for unparseable URLs or non-HTTPS
/// schemes.
pub fn validate_endpoint(endpoint: &str) -> Result<(), LlmError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| LlmError::InvalidEndpoint(format!("invalid provider url: {error}")))?;

    if parsed.scheme() != "https" {
        return Err(LlmError::InvalidEndpoint(
            "provider endpoint must use https".to_string(),
        ));
    }

    Ok(())
}

/// Slices the outermost `{...}` object from mixed prose output.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last <= first {
        return None;
    }
    Some(&text[first..=last])
}

/// Escapes raw control characters inside JSON string literals.
///
/// JSON forbids raw newlines in string literals; models emit them anyway.
pub fn repair_json_string_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
            continue;
        }

        if escaped {
            out.push(ch);
            escaped = false;
            continue;
        }

        match ch {
            '\\' => {
                out.push(ch);
                escaped = true;
            }
            '"' => {
                out.push(ch);
                in_string = false;
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }

    out
}

/// Parses JSON, retrying once after string-literal repair.
///
/// # Errors
/// Returns [`LlmError::MalformedJson`] when both attempts fail.
pub fn parse_json_lenient(text: &str) -> Result<Value, LlmError> {
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    serde_json::from_str(&repair_json_string_literals(text)).map_err(|_| LlmError::MalformedJson)
}

/// Extracts a finite number from a JSON number or a number-bearing string.
pub fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => first_number_in(text),
        _ => None,
    }
}

fn first_number_in(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            end += 1;
        } else if b == b'.' && !seen_dot {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    // A trailing dot ("12.") still parses; strip it for cleanliness.
    let slice = text[start..end].trim_end_matches('.');
    slice.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Errors produced by the provider boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Endpoint violates provider policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Transport-level failure (network, status, timeout).
    #[error("provider transport failure: {0}")]
    Transport(String),
    /// Output was not recoverable JSON.
    #[error("provider response is not valid JSON")]
    MalformedJson,
    /// Output JSON did not satisfy the call-specific schema.
    #[error("provider response validation failed: {0}")]
    SchemaMismatch(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for endpoint policy and JSON recovery helpers.

    use super::*;

    #[test]
    fn endpoint_policy_requires_https() {
        validate_endpoint("https://provider.test/v1/chat/completions").expect("https passes");
        assert!(validate_endpoint("http://provider.test/v1/chat/completions").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn extracts_object_from_fenced_prose() {
        let text = "Sure, here you go:\n```json\n{\"ok\": true}\n```";
        assert_eq!(extract_json_object(text), Some("{\"ok\": true}"));
        assert_eq!(extract_json_object("no object here"), None);
    }

    #[test]
    fn repairs_raw_newlines_inside_strings() {
        let broken = "{\"body\": \"line one\nline two\"}";
        let value = parse_json_lenient(broken).expect("repaired parse succeeds");
        assert_eq!(value["body"], "line one\nline two");
    }

    #[test]
    fn number_like_accepts_number_bearing_strings() {
        assert_eq!(number_like(&Value::from(12.5)), Some(12.5));
        assert_eq!(number_like(&Value::from("about 16 hours")), Some(16.0));
        assert_eq!(number_like(&Value::from("8.5h")), Some(8.5));
        assert_eq!(number_like(&Value::from("none")), None);
        assert_eq!(number_like(&Value::Null), None);
    }
}
