#![warn(missing_docs)]
//! # preflight-app
//!
//! ## Purpose
//! Service façade wiring configuration, analyzers, and the provider boundary
//! into the request handlers an HTTP layer exposes.
//!
//! ## Responsibilities
//! - Validate request inputs before any pipeline work (input-error taxonomy).
//! - Resolve environment configuration, including the disabled-LLM default.
//! - Generate request correlation ids and redact secrets from log output.
//! - Classify failures into client- and server-attributable categories.
//!
//! ## Data flow
//! Router (external) -> [`Services`] handler -> audit/scope pipeline ->
//! well-formed response JSON even in total-degradation scenarios.
//!
//! ## Ownership and lifetimes
//! `Services` owns cloned configuration and shares extraction/transport
//! backends behind `Arc`, so one instance serves all requests.
//!
//! ## Error model
//! [`AppError`] carries only request-level failures; everything recoverable
//! degrades inside the pipelines. [`classify_app_error`] maps each variant to
//! 4xx- or 5xx-equivalent semantics for the transport layer.
//!
//! ## Security and privacy notes
//! Handlers never log upload bytes or API keys; [`redact_sensitive`] guards
//! ad-hoc log lines that might carry secrets.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use preflight_analyzers::{FileAnalyzer, TextExtractor};
use preflight_audit::{
    AuditError, AuditPipeline, ClientNoteRequest, UploadedFile, draft_client_note,
};
use preflight_core::{AuditConfig, AuditResponse, ClientNoteResponse};
use preflight_llm::LlmClient;
use preflight_scope::{
    PhasePolicy, ScopeAnalysisSummary, ScopeError, ScopeGuardAnalyzer, ScopeGuardResponse,
    ScopeRequest, change_order::ChangeOrderPackResponse, draft_change_order_pack, read_sow_text,
};

/// Build-time application version loaded from the root `VERSION` file.
pub const APP_VERSION: &str = env!("PREFLIGHT_VERSION");

/// Default provider endpoint when none is configured.
pub const DEFAULT_LLM_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model when none is configured.
pub const DEFAULT_LLM_MODEL: &str = "google/gemini-2.5-flash";

/// Returns the app version sourced from the root `VERSION` file.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Environment-derived settings.
///
/// A missing API key is the expected "LLM disabled" state, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvSettings {
    /// Provider API key; `None` disables every LLM pass.
    pub api_key: Option<String>,
    /// Provider model identifier.
    pub model: String,
    /// Provider endpoint URL.
    pub endpoint: String,
    /// Hourly rate used for cost estimates.
    pub hourly_rate_usd: f64,
}

impl EnvSettings {
    /// Reads settings from `PREFLIGHT_*` environment variables.
    pub fn from_env() -> Self {
        let api_key = std::env::var("PREFLIGHT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let model =
            std::env::var("PREFLIGHT_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        let endpoint = std::env::var("PREFLIGHT_LLM_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_LLM_ENDPOINT.to_string());
        let hourly_rate_usd = std::env::var("PREFLIGHT_HOURLY_RATE_USD")
            .ok()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(AuditConfig::default().default_hourly_rate_usd);

        Self {
            api_key,
            model,
            endpoint,
            hourly_rate_usd,
        }
    }
}

/// Shared service state behind every handler.
#[derive(Clone)]
pub struct Services {
    config: AuditConfig,
    extractor: Arc<dyn TextExtractor>,
    analyzer: FileAnalyzer,
    llm: Option<LlmClient>,
    policy: PhasePolicy,
    hourly_rate_usd: f64,
}

impl Services {
    /// Assembles services from configuration and backends.
    pub fn new(
        config: AuditConfig,
        extractor: Arc<dyn TextExtractor>,
        llm: Option<LlmClient>,
    ) -> Self {
        let analyzer = FileAnalyzer::new(config.clone(), extractor.clone());
        let hourly_rate_usd = config.default_hourly_rate_usd;
        Self {
            config,
            extractor,
            analyzer,
            llm,
            policy: PhasePolicy::default(),
            hourly_rate_usd,
        }
    }

    /// Overrides the phase policy cutoffs.
    #[must_use]
    pub fn with_policy(mut self, policy: PhasePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Overrides the hourly rate used for cost estimates.
    #[must_use]
    pub fn with_hourly_rate(mut self, hourly_rate_usd: f64) -> Self {
        self.hourly_rate_usd = hourly_rate_usd;
        self
    }

    /// Replaces the analyzer, e.g. to inject a richer table-audit strategy.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: FileAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Handles the audit endpoint.
    ///
    /// # Errors
    /// Returns [`AppError::Input`] for missing or oversized uploads; pipeline
    /// failures degrade internally and never surface here.
    pub fn handle_audit(&self, files: &[UploadedFile]) -> Result<AuditResponse, AppError> {
        if files.is_empty() {
            return Err(AppError::Input(
                "No files received. Use multipart/form-data with `files`.".to_string(),
            ));
        }

        let pipeline = AuditPipeline::new(
            self.config.clone(),
            self.analyzer.clone(),
            self.llm.clone(),
        )
        .with_hourly_rate(self.hourly_rate_usd);

        let response = pipeline.run(files).map_err(|error| match error {
            AuditError::UploadTooLarge { .. } | AuditError::NoFiles => {
                AppError::Input(error.to_string())
            }
        })?;

        info!(
            files = files.len(),
            overall_score = response.overall.score,
            "audit request completed"
        );
        Ok(response)
    }

    /// Handles the scope classification endpoint.
    ///
    /// # Errors
    /// Returns [`AppError::Input`] for a blank request and [`AppError::Sow`]
    /// for SOW reading problems.
    pub fn handle_scope(
        &self,
        sow_filename: &str,
        sow_bytes: &[u8],
        request_text: &str,
        project_phase: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<ScopeGuardResponse, AppError> {
        let request_text = request_text.trim();
        if request_text.is_empty() {
            return Err(AppError::Input(
                "Missing client request. Use `request` in form data.".to_string(),
            ));
        }

        let sow = read_sow_text(sow_filename, sow_bytes, self.extractor.as_ref())?;
        let analyzer = ScopeGuardAnalyzer::new(self.llm.clone(), self.policy);
        let response = analyzer.analyze(
            &sow.text,
            &ScopeRequest {
                request: request_text.to_string(),
                project_phase: project_phase
                    .map(str::trim)
                    .filter(|phase| !phase.is_empty())
                    .map(str::to_string),
                request_id: request_id.map(str::to_string),
            },
        );

        info!(
            request_id = request_id.unwrap_or(""),
            verdict = ?response.verdict,
            "scope request completed"
        );
        Ok(response)
    }

    /// Handles the change-order-pack endpoint.
    ///
    /// # Errors
    /// Returns [`AppError::Input`] for blank request text or unparseable
    /// analysis JSON, and [`AppError::Sow`] for SOW reading problems.
    pub fn handle_change_order(
        &self,
        sow_filename: &str,
        sow_bytes: &[u8],
        request_text: &str,
        client_name: &str,
        project_phase: Option<&str>,
        analysis_json: &str,
    ) -> Result<ChangeOrderPackResponse, AppError> {
        let request_text = request_text.trim();
        if request_text.is_empty() {
            return Err(AppError::Input(
                "Missing client request. Use `request` in form data.".to_string(),
            ));
        }

        let analysis: ScopeAnalysisSummary =
            serde_json::from_str(analysis_json.trim()).map_err(|error| {
                AppError::Input(format!("Invalid `analysis` JSON: {error}"))
            })?;

        let sow = read_sow_text(sow_filename, sow_bytes, self.extractor.as_ref())?;
        let client_name = if client_name.trim().is_empty() {
            "Client"
        } else {
            client_name.trim()
        };

        Ok(draft_change_order_pack(
            self.llm.as_ref(),
            &sow.text,
            request_text,
            client_name,
            project_phase.map(str::trim).filter(|phase| !phase.is_empty()),
            &analysis,
            self.hourly_rate_usd,
        ))
    }

    /// Handles the client-note drafting endpoint. Never fails: template
    /// fallback covers the no-LLM and failed-LLM paths.
    pub fn handle_client_note(&self, request: &ClientNoteRequest) -> ClientNoteResponse {
        draft_client_note(self.llm.as_ref(), request)
    }
}

/// Builds the provider client from settings and an injected transport.
///
/// Returns `None` (the disabled state) when no API key is configured; an
/// invalid endpoint is a configuration defect and is reported as an error.
pub fn build_llm_client(
    settings: &EnvSettings,
    transport: Arc<dyn preflight_llm::ChatTransport>,
) -> Result<Option<LlmClient>, preflight_llm::LlmError> {
    if settings.api_key.is_none() {
        info!("LLM disabled (missing PREFLIGHT_API_KEY); heuristic-only mode");
        return Ok(None);
    }

    LlmClient::new(settings.endpoint.clone(), settings.model.clone(), transport).map(Some)
}

/// Generates a request correlation id from a timestamp and random suffix.
pub fn new_request_id(now_ms: u64) -> String {
    let suffix: [u8; 4] = rand::random();
    format!("{now_ms:x}-{}", hex::encode(suffix))
}

/// Redacts common secret markers in log-safe output.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for key in ["api_key", "password", "token", "authorization", "bearer"] {
        redacted = redact_key_value(&redacted, key);
    }
    redacted
}

fn redact_key_value(input: &str, key: &str) -> String {
    let lower = input.to_ascii_lowercase();
    if let Some(position) = lower.find(key) {
        let prefix = &input[..position];
        return format!("{prefix}{key}=<redacted>");
    }

    input.to_string()
}

/// Failure attribution for transport-layer status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Caller must fix the request (4xx-equivalent).
    ClientError,
    /// Service-side problem (5xx-equivalent).
    ServerError,
}

/// Classifies an [`AppError`] for the transport layer.
pub fn classify_app_error(error: &AppError) -> FailureClass {
    match error {
        AppError::Input(_) => FailureClass::ClientError,
        AppError::Sow(sow) => match sow {
            ScopeError::UnsupportedSow | ScopeError::EmptySow | ScopeError::ScannedPdf => {
                FailureClass::ClientError
            }
            ScopeError::Extract(_) => FailureClass::ServerError,
        },
    }
}

/// Request-level failures surfaced to the transport layer.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or missing request input.
    #[error("{0}")]
    Input(String),
    /// SOW reading failure.
    #[error(transparent)]
    Sow(#[from] ScopeError),
}

#[cfg(test)]
mod tests {
    //! Unit tests for env settings, ids, redaction, and classification.

    use super::*;

    #[test]
    fn request_ids_embed_timestamp_and_differ() {
        let a = new_request_id(0x10f2c);
        let b = new_request_id(0x10f2c);
        assert!(a.starts_with("10f2c-"));
        assert_ne!(a, b);
    }

    #[test]
    fn redaction_strips_secret_tails() {
        let redacted = redact_sensitive("calling with api_key=sk-123 for tenant");
        assert_eq!(redacted, "calling with api_key=<redacted>");
        assert_eq!(redact_sensitive("plain message"), "plain message");
    }

    #[test]
    fn input_errors_classify_as_client_errors() {
        assert_eq!(
            classify_app_error(&AppError::Input("bad".to_string())),
            FailureClass::ClientError
        );
        assert_eq!(
            classify_app_error(&AppError::Sow(ScopeError::EmptySow)),
            FailureClass::ClientError
        );
        assert_eq!(
            classify_app_error(&AppError::Sow(ScopeError::Extract(
                preflight_analyzers::ExtractError::Extraction("backend down".to_string())
            ))),
            FailureClass::ServerError
        );
    }

    #[test]
    fn version_is_sourced_from_version_file() {
        assert!(!app_version().trim().is_empty());
    }
}
