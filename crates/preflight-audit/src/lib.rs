#![warn(missing_docs)]
//! # preflight-audit
//!
//! ## Purpose
//! Orchestrates the multi-file audit: per-file analysis, optional LLM
//! augmentation, and aggregation into one reproducible verdict.
//!
//! ## Responsibilities
//! - Enforce the upload size cap before any analysis runs.
//! - Run each per-kind analyzer and attach the three-point LLM judgment.
//! - Fold reports into the overall score/color, effort, and cost estimates.
//! - Apply the consultation override for unfixable primary issues.
//! - Draft client-facing notes with a deterministic template fallback.
//!
//! ## Data flow
//! Uploads -> [`preflight_analyzers::FileAnalyzer`] -> per-file LLM pass ->
//! [`AuditPipeline::run`] aggregation -> [`preflight_core::AuditResponse`].
//!
//! ## Ownership and lifetimes
//! Each report is completed before aggregation; the pipeline owns its
//! configuration and shares the analyzer/client by cheap clones.
//!
//! ## Error model
//! Only input errors ([`AuditError`]) surface to the caller. Parsing and LLM
//! failures degrade inside the pipeline: a failed LLM pass attaches a
//! zero-penalty warn finding and heuristics carry the estimate.
//!
//! ## Security and privacy notes
//! Every byte sent to the provider is a masked sample produced by the
//! analyzer layer; raw uploads never leave this process.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{info, warn};

use preflight_analyzers::FileAnalyzer;
use preflight_core::{
    AuditConfig, AuditResponse, ClientNoteResponse, ClientNoteType, Consultation, DiplomatNote,
    FileAuditReport, Finding, OverallAudit, Severity, ThreePointRisk, VerdictColor,
    fixable_error_units, headline_for, ids, rationale_for, total_error_units, worst_color,
};
use preflight_llm::{ChatRequest, LlmClient, LlmError, number_like};

/// One named upload within an audit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Original filename, drives kind dispatch.
    pub filename: String,
    /// Raw upload bytes.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Convenience constructor.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Input errors rejected before the scoring pipeline runs.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Combined upload exceeds the configured cap.
    #[error("upload too large (max {max_mb}MB total)")]
    UploadTooLarge {
        /// Cap in whole megabytes.
        max_mb: u64,
    },
    /// The request carried no files.
    #[error("no files received")]
    NoFiles,
}

/// Multi-file audit orchestrator.
#[derive(Clone)]
pub struct AuditPipeline {
    config: AuditConfig,
    analyzer: FileAnalyzer,
    llm: Option<LlmClient>,
    hourly_rate_usd: f64,
}

impl AuditPipeline {
    /// Creates a pipeline; `llm: None` is the supported degraded mode.
    pub fn new(config: AuditConfig, analyzer: FileAnalyzer, llm: Option<LlmClient>) -> Self {
        let hourly_rate_usd = config.default_hourly_rate_usd;
        Self {
            config,
            analyzer,
            llm,
            hourly_rate_usd,
        }
    }

    /// Overrides the hourly rate used for cost estimates.
    #[must_use]
    pub fn with_hourly_rate(mut self, hourly_rate_usd: f64) -> Self {
        self.hourly_rate_usd = hourly_rate_usd;
        self
    }

    /// Runs the full audit over the uploaded files.
    ///
    /// # Errors
    /// Returns [`AuditError`] only for input problems; every downstream
    /// failure degrades into findings or heuristic fallbacks.
    pub fn run(&self, files: &[UploadedFile]) -> Result<AuditResponse, AuditError> {
        if files.is_empty() {
            return Err(AuditError::NoFiles);
        }

        let total_bytes: u64 = files.iter().map(|file| file.bytes.len() as u64).sum();
        if total_bytes > self.config.max_upload_bytes {
            return Err(AuditError::UploadTooLarge {
                max_mb: self.config.max_upload_bytes / 1024 / 1024,
            });
        }

        let mut reports: Vec<FileAuditReport> = Vec::with_capacity(files.len());
        for file in files {
            let mut report = self.analyzer.analyze(&file.filename, &file.bytes);
            self.augment_with_llm(&mut report);
            reports.push(report);
        }

        // Invariant: reports is non-empty, so min/worst are total.
        let overall_score = reports.iter().map(|r| r.score).min().unwrap_or(0);
        let overall_color = worst_color(reports.iter().map(|r| r.color));

        let total_units: u32 = reports
            .iter()
            .map(|r| total_error_units(&r.findings))
            .sum();
        let heuristic_hours = round1(f64::from(total_units) * self.config.error_units_to_hours);

        let mut estimated_extra_hours = heuristic_hours;
        if let Some(client) = &self.llm {
            match self.hours_estimate(client, heuristic_hours, &reports) {
                Ok(hours) => estimated_extra_hours = hours,
                Err(error) => {
                    warn!(%error, "LLM hours estimate failed; using heuristic fallback");
                }
            }
        }

        // Consultancy floor: never quote near-zero hours for a non-green result.
        if overall_color != VerdictColor::Green && estimated_extra_hours > 0.0 {
            estimated_extra_hours = round_half(estimated_extra_hours)
                .max(self.config.minimum_estimate_hours);
        }

        let mut client_estimate_hours = if estimated_extra_hours > 0.0 {
            round_half(estimated_extra_hours * self.config.client_estimate_multiplier)
        } else {
            0.0
        };

        let mut estimated_extra_cost = round_cents(estimated_extra_hours * self.hourly_rate_usd);
        let mut client_estimate_cost = round_cents(client_estimate_hours * self.hourly_rate_usd);

        let has_unfixable_primary = reports.iter().any(|report| {
            report
                .findings
                .iter()
                .any(|f| f.unfixable && f.id == ids::LOW_CONTEXT)
        });
        let fixable_units: u32 = reports
            .iter()
            .map(|r| fixable_error_units(&r.findings))
            .sum();
        let requires_consultation = has_unfixable_primary && fixable_units == 0;

        let consultation = if requires_consultation {
            let pricing = &self.config.consultation;
            estimated_extra_hours = 0.0;
            client_estimate_hours = 0.0;
            estimated_extra_cost = 0.0;
            client_estimate_cost = 0.0;
            Some(Consultation {
                kind: "rag_architecture".to_string(),
                base_fee: pricing.base_fee,
                hourly_rate: pricing.hourly_rate,
                estimated_hours: pricing.initial_hours,
                total_cost: pricing.base_fee + pricing.hourly_rate * pricing.initial_hours,
                description: pricing.description.clone(),
            })
        } else {
            None
        };

        let generated_clause = if overall_color == VerdictColor::Yellow {
            clause_from_reports(&reports)
        } else {
            None
        };

        Ok(AuditResponse {
            generated_at: now_rfc3339(),
            model: self.llm.as_ref().map(|client| client.model().to_string()),
            overall: OverallAudit {
                score: overall_score,
                color: overall_color,
                headline: headline_for(overall_color).to_string(),
                rationale: rationale_for(overall_color).to_string(),
                estimated_extra_hours,
                estimated_extra_cost,
                client_estimate_hours,
                client_estimate_cost,
                hourly_rate: self.hourly_rate_usd,
                generated_clause,
                requires_consultation,
                consultation,
            },
            files: reports,
        })
    }

    /// Runs the per-file three-point pass, degrading on any failure.
    fn augment_with_llm(&self, report: &mut FileAuditReport) {
        let Some(client) = &self.llm else {
            return;
        };

        let masked_sample = masked_sample_for(report, self.config.llm_sample_max_chars);
        match self.three_point_risk(client, report, &masked_sample) {
            Ok(risk) => {
                if let Some(hours) = risk.structure_consistency.cleanup_hours
                    && hours.is_finite()
                    && hours > 0.0
                {
                    report
                        .stats
                        .insert("llmCleanupHours".to_string(), json!(hours));
                }
                report.llm = Some(risk);
            }
            Err(error) => {
                warn!(filename = %report.filename, %error, "three-point LLM pass failed");
                report.findings.push(Finding::new(
                    ids::LLM_FAILED,
                    Severity::Warn,
                    "LLM Analysis Unavailable",
                    error.to_string(),
                    0,
                    0,
                ));
                report.llm = None;
            }
        }
    }

    fn three_point_risk(
        &self,
        client: &LlmClient,
        report: &FileAuditReport,
        masked_sample: &str,
    ) -> Result<ThreePointRisk, LlmError> {
        let system = [
            "You are a pre-SOW data auditor for an engineering consultancy.",
            "Analyze the provided SAMPLE of a client dataset and return JSON only.",
            "",
            "Return a single JSON object with keys:",
            "- pii_compliance: { risk: low|medium|high|critical, output: string }",
            "- structure_consistency: { quality: clean|mixed|chaotic, output: string, cleanup_hours?: number }",
            "- context_richness: { rag_readiness: high|medium|low, output: string }",
            "- generated_clause?: string|null  (only when risk is yellow-worthy; otherwise null)",
            "",
            "Strict requirements:",
            "- Use exactly these keys (no extras) and double-quoted JSON.",
            "- All `output` fields must be short strings (<= 240 chars).",
            "- If you include cleanup_hours, it must be a number (hours).",
            "",
            "Rules:",
            "- Be conservative. If any emails/SSNs/credit card numbers are present, set pii_compliance.risk=critical.",
            "- If the sample appears non-machine readable or very low text, set context_richness.rag_readiness=low.",
            "- If dates/currency appear inconsistent, set structure_consistency.quality=chaotic or mixed and estimate cleanup_hours.",
            "- Output valid JSON only (no markdown fences).",
        ]
        .join("\n");

        let signals = json!({
            "score": report.score,
            "color": report.color,
            "findings": finding_summaries(&report.findings),
            "stats": report.stats,
        });

        let kind = serde_json::to_string(&report.kind).unwrap_or_default();
        let user = format!(
            "Filename: {}\nType: {}\n\nDeterministic signals (from local scan):\n{}\n\nMasked sample (PII patterns preserved but redacted):\n{}",
            report.filename,
            kind.trim_matches('"'),
            serde_json::to_string_pretty(&signals).unwrap_or_default(),
            masked_sample
        );

        let value = client.complete_json(&ChatRequest::json(system, user, 900))?;
        serde_json::from_value::<ThreePointRisk>(value)
            .map_err(|error| LlmError::SchemaMismatch(error.to_string()))
    }

    /// Asks the provider for an aggregate hour estimate across all files.
    fn hours_estimate(
        &self,
        client: &LlmClient,
        heuristic_hours: f64,
        reports: &[FileAuditReport],
    ) -> Result<f64, LlmError> {
        let system = [
            "You are a pre-SOW data auditor for an engineering consultancy.",
            "Estimate the additional engineering hours needed to make the provided data assets ingestion-ready.",
            "Return JSON only (no markdown, no extra keys).",
            "",
            "Return a single JSON object with key:",
            "- estimated_extra_hours: number",
            "",
            "Rules:",
            "- Base your estimate on the issues described in the findings and summaries.",
            "- If the data looks clean, return 0.",
            "- Estimate realistically for an experienced data engineer using scripted solutions.",
            "- Most batch transformations (date normalization, currency conversion, PII removal) take 0.5-1.5 hours each.",
            "- Do not pad estimates - the system adds its own client buffer.",
            "- Round to a sensible fraction (e.g. 0.5h).",
        ]
        .join("\n");

        let summaries: Vec<Value> = reports
            .iter()
            .map(|report| {
                json!({
                    "filename": report.filename,
                    "kind": report.kind,
                    "score": report.score,
                    "color": report.color,
                    "findings": finding_summaries(&report.findings),
                    "llm": report.llm,
                })
            })
            .collect();

        let user = format!(
            "Heuristic baseline (for calibration only):\n- heuristic_extra_hours: {heuristic_hours}\n\nFiles (summaries):\n{}",
            serde_json::to_string_pretty(&summaries).unwrap_or_default()
        );

        let value = client.complete_json(&ChatRequest::json(system, user, 300))?;
        let estimated = value
            .get("estimated_extra_hours")
            .and_then(number_like)
            .ok_or_else(|| {
                LlmError::SchemaMismatch("estimated_extra_hours missing or not a number".to_string())
            })?;

        let normalized = round_half(estimated.max(0.0));
        info!(estimated, normalized, "LLM hours estimate accepted");
        Ok(normalized)
    }
}

/// Picks the masked sample forwarded to the provider.
fn masked_sample_for(report: &FileAuditReport, max_chars: usize) -> String {
    let from_text = report
        .sample
        .text_preview
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty());

    let sample = match from_text {
        Some(text) => text.to_string(),
        None => report
            .sample
            .rows_preview
            .as_ref()
            .map(|rows| {
                let window: Vec<&Map<String, Value>> = rows.iter().take(20).collect();
                serde_json::to_string_pretty(&window).unwrap_or_default()
            })
            .unwrap_or_default(),
    };

    sample.chars().take(max_chars).collect()
}

fn finding_summaries(findings: &[Finding]) -> Vec<Value> {
    findings
        .iter()
        .map(|f| json!({ "severity": f.severity, "title": f.title }))
        .collect()
}

/// Picks the first non-empty generated clause, preferring yellow files.
fn clause_from_reports(reports: &[FileAuditReport]) -> Option<String> {
    let weight = |color: VerdictColor| match color {
        VerdictColor::Yellow => 0,
        VerdictColor::Red => 1,
        VerdictColor::Green => 2,
    };

    let mut candidates: Vec<&FileAuditReport> = reports
        .iter()
        .filter(|report| {
            report
                .llm
                .as_ref()
                .is_some_and(|llm| llm.generated_clause.is_some())
        })
        .collect();
    candidates.sort_by_key(|report| weight(report.color));

    for report in candidates {
        if let Some(clause) = report.llm.as_ref().and_then(|llm| llm.generated_clause.as_deref())
            && !clause.trim().is_empty()
        {
            return Some(clause.to_string());
        }
    }

    None
}

/// Summary fields needed to draft one client note.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientNoteRequest {
    /// Requested note flavor.
    pub note_type: ClientNoteType,
    /// Overall audit headline.
    pub overall_headline: String,
    /// Overall audit rationale.
    pub overall_rationale: String,
    /// Top issue titles to surface.
    pub top_issues: Vec<String>,
    /// Internal hour estimate.
    pub estimated_extra_hours: f64,
    /// Hourly rate in USD.
    pub hourly_rate_usd: f64,
    /// Consultation block when the audit required one.
    pub consultation: Option<ConsultationSummary>,
}

/// Consultation fields referenced by note drafting.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationSummary {
    /// Client-facing description.
    pub description: String,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Session length in hours.
    pub estimated_hours: f64,
}

/// Drafts a client note, falling back to templates without an LLM.
pub fn draft_client_note(llm: Option<&LlmClient>, request: &ClientNoteRequest) -> ClientNoteResponse {
    if let Some(client) = llm {
        match draft_client_note_llm(client, request) {
            Ok(note) => {
                return ClientNoteResponse {
                    generated_at: now_rfc3339(),
                    model: Some(client.model().to_string()),
                    note_type: request.note_type,
                    diplomat_response: note,
                };
            }
            Err(error) => {
                warn!(%error, "client-note LLM draft failed; falling back to template");
            }
        }
    }

    ClientNoteResponse {
        generated_at: now_rfc3339(),
        model: None,
        note_type: request.note_type,
        diplomat_response: template_client_note(request),
    }
}

fn draft_client_note_llm(
    client: &LlmClient,
    request: &ClientNoteRequest,
) -> Result<DiplomatNote, LlmError> {
    let system = [
        "You are a senior consultant at a premium engineering consultancy writing to a valued client.",
        "Draft a polished, client-ready email based on a data audit summary.",
        "Return JSON only (no markdown, no extra keys).",
        "",
        "Return a single JSON object with keys:",
        "- subject: string (professional, specific, no ALL CAPS or technical jargon)",
        "- body: string",
        "",
        "Voice and tone requirements:",
        "- Write as a trusted advisor, not a vendor.",
        "- Avoid technical jargon (no 'RAG', 'ingestion', 'context density', 'chunking').",
        "- Never use phrases like 'SAFE TO SIGN', 'green light', or 'red flag'.",
        "- Use 'we' language to show partnership and placeholders [Client Name], [Your Name].",
        "",
        "If noteType=confirmation: lead with good news and confirm next steps.",
        "If noteType=needs_changes: explain the items plainly, give two options (client fixes vs. we handle it at the quoted cost), and ask which they prefer.",
        "If noteType=needs_consultation: frame the consultation as designing the right approach, include the exact investment, and offer a call.",
    ]
    .join("\n");

    let note_type = serde_json::to_string(&request.note_type).unwrap_or_default();
    let issues = if request.top_issues.is_empty() {
        "- None - data is ready to use".to_string()
    } else {
        request
            .top_issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let commercials = match &request.consultation {
        Some(consultation) => format!(
            "Recommended next step: Strategy consultation\n- Investment: {}\n- Duration: {}-hour working session",
            format_usd(consultation.total_cost),
            consultation.estimated_hours
        ),
        None => format!(
            "Transformation work (if we handle it):\n- Estimated effort: {} hours\n- Rate: {}/hour\n- Total investment: {}",
            request.estimated_extra_hours,
            format_usd(request.hourly_rate_usd),
            format_usd(round_cents(
                request.estimated_extra_hours * request.hourly_rate_usd
            ))
        ),
    };

    let user = format!(
        "Email type: {note_type}\n\nReview summary (internal - translate to client-friendly language):\n- Status: {}\n- Assessment: {}\n\nIssues found (rephrase in plain language for client):\n{issues}\n\n{commercials}",
        request.overall_headline, request.overall_rationale
    );

    let value =
        client.complete_json(&ChatRequest::json(system, user, 700).with_temperature(0.2))?;
    serde_json::from_value::<DiplomatNote>(value)
        .map_err(|error| LlmError::SchemaMismatch(error.to_string()))
}

fn template_client_note(request: &ClientNoteRequest) -> DiplomatNote {
    match request.note_type {
        ClientNoteType::Confirmation => DiplomatNote {
            subject: "Re: Data assets - ready to proceed".to_string(),
            body: [
                "Hi [Client Name],",
                "",
                "Thanks for sending the data assets over - they look consistent and ready for the next step.",
                "We'll keep progressing and share an update once ingestion/mapping is underway.",
                "",
                "Best,",
                "[Your Name]",
            ]
            .join("\n"),
        },
        ClientNoteType::NeedsConsultation if request.consultation.is_some() => {
            let consultation = request.consultation.as_ref().expect("checked above");
            DiplomatNote {
                subject: "Re: Data assets - architecture discussion".to_string(),
                body: format!(
                    "Hi [Client Name],\n\nThanks for sending the data assets. After reviewing them, we found that the current structure\nisn't well-suited for automated cleanup - the data lacks the contextual richness needed for\neffective retrieval-based workflows.\n\nRather than standard data transformation, we recommend a brief architecture consultation\nto explore the best approach for leveraging this data.\n\nInvestment: {} ({}h consultation)\n\nThis isn't a setback - it's an opportunity to design the right architecture from the start.\nWould you like to schedule a brief call to discuss your data strategy?\n\nBest,\n[Your Name]",
                    format_usd(consultation.total_cost),
                    consultation.estimated_hours
                ),
            }
        }
        _ => {
            let issues: Vec<&String> = request
                .top_issues
                .iter()
                .filter(|issue| !issue.trim().is_empty())
                .take(3)
                .collect();
            let issue_lines = if issues.is_empty() {
                "- Some fields and formats are inconsistent across files/rows.".to_string()
            } else {
                issues
                    .iter()
                    .map(|issue| format!("- {issue}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let cost = round_cents(request.estimated_extra_hours * request.hourly_rate_usd);

            DiplomatNote {
                subject: "Re: Data assets - quick structure fixes needed".to_string(),
                body: format!(
                    "Hi [Client Name],\n\nThanks for sending the data assets - we reviewed the current structure and found a few issues that will affect ingestion.\n\nTop items to address:\n{issue_lines}\n\nYou can either (1) adjust the structure on your side, or (2) we can add the data transformation work to the SOW.\nEstimate: {} hours x {}/hr = {}.\n\nWhich option would you prefer - handle it internally, or add it to the SOW for us to implement?\n\nBest,\n[Your Name]",
                    request.estimated_extra_hours,
                    format_usd(request.hourly_rate_usd),
                    format_usd(cost)
                ),
            }
        }
    }
}

/// Formats a USD amount with thousands separators and cents.
pub fn format_usd(value: f64) -> String {
    let safe = if value.is_finite() { value } else { 0.0 };
    let negative = safe < 0.0;
    let cents = (safe.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}${grouped}.{frac:02}")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    //! Unit tests for aggregation rules and note templates.

    use std::sync::{Arc, Mutex};

    use preflight_analyzers::Utf8TextExtractor;
    use preflight_llm::ChatTransport;

    use super::*;

    /// Transport that replays a scripted sequence of outcomes.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }

        fn always_failing() -> Self {
            Self::new(Vec::new())
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn complete(
            &self,
            _endpoint: &str,
            _model: &str,
            _request: &ChatRequest,
        ) -> Result<String, LlmError> {
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                return Err(LlmError::Transport("scripted outage".to_string()));
            }
            script.remove(0).map_err(LlmError::Transport)
        }
    }

    fn pipeline_without_llm() -> AuditPipeline {
        let config = AuditConfig::default();
        let analyzer = FileAnalyzer::new(config.clone(), Arc::new(Utf8TextExtractor));
        AuditPipeline::new(config, analyzer, None)
    }

    fn pipeline_with(transport: ScriptedTransport) -> AuditPipeline {
        let config = AuditConfig::default();
        let analyzer = FileAnalyzer::new(config.clone(), Arc::new(Utf8TextExtractor));
        let client = LlmClient::new(
            "https://provider.test/v1/chat/completions",
            "test-model",
            Arc::new(transport),
        )
        .expect("valid endpoint");
        AuditPipeline::new(config, analyzer, Some(client))
    }

    fn clean_csv() -> UploadedFile {
        UploadedFile::new(
            "clean.csv",
            &b"name,joined,notes\nalice,2023-01-05,lead engineer on the platform\nbob,2023-02-10,site reliability contact\n"[..],
        )
    }

    fn pii_txt() -> UploadedFile {
        UploadedFile::new("dump.txt", &b"SSN: 123-45-6789 on record"[..])
    }

    #[test]
    fn aggregate_takes_min_score_and_worst_color() {
        let response = pipeline_without_llm()
            .run(&[clean_csv(), pii_txt()])
            .expect("audit runs");

        let min_score = response.files.iter().map(|f| f.score).min().unwrap();
        assert_eq!(response.overall.score, min_score);
        assert_eq!(response.overall.color, VerdictColor::Red);
        assert_eq!(response.overall.headline, "DO NOT SIGN");
        assert_eq!(response.model, None);
    }

    #[test]
    fn oversized_upload_is_rejected_before_analysis() {
        let config = AuditConfig {
            max_upload_bytes: 8,
            ..AuditConfig::default()
        };
        let analyzer = FileAnalyzer::new(config.clone(), Arc::new(Utf8TextExtractor));
        let pipeline = AuditPipeline::new(config, analyzer, None);

        let error = pipeline
            .run(&[UploadedFile::new("big.txt", vec![b'x'; 64])])
            .expect_err("cap should reject");
        assert!(matches!(error, AuditError::UploadTooLarge { .. }));
    }

    #[test]
    fn empty_request_is_a_logic_error() {
        assert!(matches!(
            pipeline_without_llm().run(&[]),
            Err(AuditError::NoFiles)
        ));
    }

    #[test]
    fn llm_outage_degrades_to_heuristics_only() {
        let response = pipeline_with(ScriptedTransport::always_failing())
            .run(&[pii_txt()])
            .expect("audit still completes");

        let report = &response.files[0];
        assert!(report.llm.is_none());
        assert!(report.findings.iter().any(|f| f.id == ids::LLM_FAILED));
        let failed = report
            .findings
            .iter()
            .find(|f| f.id == ids::LLM_FAILED)
            .unwrap();
        assert_eq!(failed.penalty, 0);
        assert_eq!(failed.error_units, 0);
        // Client is configured, so the model name is still reported.
        assert_eq!(response.model.as_deref(), Some("test-model"));
    }

    #[test]
    fn hours_estimate_overrides_heuristic_and_floors_non_green() {
        let three_point = serde_json::json!({
            "pii_compliance": {"risk": "critical", "output": "SSN present"},
            "structure_consistency": {"quality": "mixed", "output": "ok", "cleanup_hours": 2.0},
            "context_richness": {"rag_readiness": "low", "output": "thin"},
            "generated_clause": null,
        })
        .to_string();
        let hours = serde_json::json!({"estimated_extra_hours": 1.2}).to_string();

        let response = pipeline_with(ScriptedTransport::new(vec![Ok(three_point), Ok(hours)]))
            .run(&[pii_txt()])
            .expect("audit runs");

        let report = &response.files[0];
        assert!(report.llm.is_some());
        assert_eq!(report.stats["llmCleanupHours"], 2.0);
        // 1.2h from the model rounds to 1.0h, then floors at the 2h minimum.
        assert_eq!(response.overall.estimated_extra_hours, 2.0);
        assert_eq!(response.overall.client_estimate_hours, 3.0);
        assert_eq!(response.overall.estimated_extra_cost, 300.0);
    }

    #[test]
    fn consultation_override_zeroes_estimates() {
        let response = pipeline_without_llm()
            .run(&[UploadedFile::new("note.txt", &b"just a short note"[..])])
            .expect("audit runs");

        assert!(response.overall.requires_consultation);
        assert_eq!(response.overall.estimated_extra_hours, 0.0);
        assert_eq!(response.overall.client_estimate_hours, 0.0);
        assert_eq!(response.overall.estimated_extra_cost, 0.0);
        let consultation = response.overall.consultation.expect("consultation block");
        assert_eq!(consultation.base_fee, 500.0);
        assert_eq!(consultation.total_cost, 900.0);
    }

    #[test]
    fn note_templates_cover_all_flavors_without_llm() {
        let request = ClientNoteRequest {
            note_type: ClientNoteType::NeedsChanges,
            overall_headline: "SIGN WITH CAVEATS".to_string(),
            overall_rationale: "Moderate cleanup effort.".to_string(),
            top_issues: vec!["Mixed date formats".to_string()],
            estimated_extra_hours: 3.5,
            hourly_rate_usd: 150.0,
            consultation: None,
        };

        let note = draft_client_note(None, &request);
        assert_eq!(note.model, None);
        assert!(note.diplomat_response.body.contains("Mixed date formats"));
        assert!(note.diplomat_response.body.contains("$525.00"));
    }

    #[test]
    fn usd_formatting_groups_thousands() {
        assert_eq!(format_usd(1234.5), "$1,234.50");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(1_000_000.0), "$1,000,000.00");
    }
}
