#![warn(missing_docs)]
//! # preflight-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `preflight` workspace.
//!
//! ## Responsibilities
//! - Represent audit findings, per-file reports, and the aggregate response.
//! - Hold the immutable configuration tables (thresholds, penalties, error
//!   units, consultation pricing) consumed by analyzers and aggregation.
//! - Implement the deterministic scoring arithmetic (score, color, headline).
//!
//! ## Data flow
//! Analyzers emit [`Finding`] values into a [`FileAuditReport`]; the audit
//! aggregator folds reports into an [`AuditResponse`] using the scoring
//! helpers in this crate.
//!
//! ## Ownership and lifetimes
//! Reports and findings own their strings so pipeline stages can hand off
//! completed values without borrow coupling.
//!
//! ## Error model
//! This crate is computation-only; invalid states are prevented by
//! construction (clamped scores, config-sourced penalties) rather than
//! reported as runtime errors.
//!
//! ## Security and privacy notes
//! Sample previews stored in reports are expected to be pre-masked by the
//! analyzer layer; this crate never inspects or transforms preview content.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable finding identifiers used across analyzers and aggregation.
pub mod ids {
    /// PII detected in a sample.
    pub const PII_DETECTED: &str = "pii.detected";
    /// CSV sparse-row quality warning.
    pub const CSV_LOW_QUALITY: &str = "csv.low_quality";
    /// CSV blank/placeholder header warning.
    pub const CSV_HEADER_ISSUES: &str = "csv.header_issues";
    /// CSV duplicate header warning.
    pub const CSV_DUPLICATE_HEADERS: &str = "csv.duplicate_headers";
    /// CSV missing-cell warning.
    pub const CSV_MISSING_CELLS: &str = "csv.missing_cells";
    /// Informational marker that the lightweight table parser ran.
    pub const CSV_TABLE_FALLBACK: &str = "csv.table_fallback";
    /// CSV structural audit failed entirely.
    pub const CSV_PARSE_FAILED: &str = "csv.parse_failed";
    /// PDF text extraction degraded or near-empty.
    pub const PDF_NON_MACHINE_READABLE: &str = "pdf.non_machine_readable";
    /// PDF parsing failed entirely.
    pub const PDF_PARSE_FAILED: &str = "pdf.parse_failed";
    /// Text sample appears corrupted.
    pub const TXT_GARBAGE: &str = "txt.garbage";
    /// Mixed date ordering detected in a sample.
    pub const MIXED_DATES: &str = "structure.mixed_dates";
    /// Multiple currency markers detected in a sample.
    pub const MIXED_CURRENCY: &str = "structure.mixed_currency";
    /// Low retrieval-context density; unfixable by cleanup work.
    pub const LOW_CONTEXT: &str = "rag.low_context";
    /// Unsupported upload kind.
    pub const UNSUPPORTED_FILE: &str = "file.unsupported";
    /// Optional LLM pass failed; heuristics-only report.
    pub const LLM_FAILED: &str = "llm.failed";
}

/// Severity of one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; no risk on its own.
    Info,
    /// Needs attention before ingestion.
    Warn,
    /// Blocks sign-off regardless of numeric score.
    Critical,
}

/// Tri-state audit verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictColor {
    /// Minimal risk.
    Green,
    /// Sign with caveats.
    Yellow,
    /// Do not sign.
    Red,
}

impl VerdictColor {
    /// Rank used by worst-of aggregation; higher is worse.
    fn rank(self) -> u8 {
        match self {
            VerdictColor::Green => 0,
            VerdictColor::Yellow => 1,
            VerdictColor::Red => 2,
        }
    }
}

/// Returns the worst color across reports; `Green` for an empty iterator.
pub fn worst_color<I: IntoIterator<Item = VerdictColor>>(colors: I) -> VerdictColor {
    colors
        .into_iter()
        .max_by_key(|color| color.rank())
        .unwrap_or(VerdictColor::Green)
}

/// One detected issue with its scoring impact.
///
/// Penalty and error-unit magnitudes always come from [`AuditConfig`] tables;
/// findings are immutable once pushed into a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Stable dotted key, e.g. `pii.detected`.
    pub id: String,
    /// Finding severity.
    pub severity: Severity,
    /// Short display title.
    pub title: String,
    /// Human-readable detail; may embed counts and masked examples.
    pub detail: String,
    /// Score deduction.
    pub penalty: u32,
    /// Effort-estimation units, independent of penalty.
    pub error_units: u32,
    /// True when no cleanup work can remediate the issue.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unfixable: bool,
    /// Guidance text, present only for unfixable findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl Finding {
    /// Constructs a fixable finding.
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        detail: impl Into<String>,
        penalty: u32,
        error_units: u32,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            title: title.into(),
            detail: detail.into(),
            penalty,
            error_units,
            unfixable: false,
            remediation: None,
        }
    }

    /// Marks the finding unfixable and attaches remediation guidance.
    #[must_use]
    pub fn unfixable(mut self, remediation: impl Into<String>) -> Self {
        self.unfixable = true;
        self.remediation = Some(remediation.into());
        self
    }
}

/// Supported upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Comma-separated tabular data.
    Csv,
    /// PDF document.
    Pdf,
    /// Plain text.
    Txt,
    /// Anything else; audited as unsupported.
    Unknown,
}

impl FileKind {
    /// Derives the kind from a filename extension (case-insensitive).
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            FileKind::Csv
        } else if lower.ends_with(".pdf") {
            FileKind::Pdf
        } else if lower.ends_with(".txt") {
            FileKind::Txt
        } else {
            FileKind::Unknown
        }
    }
}

/// Masked preview attached to each per-file report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePreview {
    /// Masked text excerpt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_preview: Option<String>,
    /// Masked tabular rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_preview: Option<Vec<Map<String, Value>>>,
}

/// Secondary three-point risk judgment returned by the LLM pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreePointRisk {
    /// PII/compliance judgment.
    pub pii_compliance: RiskJudgment,
    /// Structural consistency judgment with optional cleanup-hour estimate.
    pub structure_consistency: StructureJudgment,
    /// Retrieval-context richness judgment.
    pub context_richness: ContextJudgment,
    /// Optional caveat clause for yellow-grade audits.
    #[serde(default)]
    pub generated_clause: Option<String>,
}

/// LLM risk grade for PII/compliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskJudgment {
    /// Grade on the closed low..critical scale.
    pub risk: RiskGrade,
    /// Short explanation.
    pub output: String,
}

/// LLM structural consistency judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureJudgment {
    /// Grade on the closed clean/mixed/chaotic scale.
    pub quality: StructureQuality,
    /// Short explanation.
    pub output: String,
    /// Estimated cleanup hours; display only, never feeds scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_hours: Option<f64>,
}

/// LLM retrieval-readiness judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextJudgment {
    /// Grade on the closed high/medium/low scale.
    pub rag_readiness: RagReadiness,
    /// Short explanation.
    pub output: String,
}

/// Closed risk scale for [`RiskJudgment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskGrade {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

/// Closed quality scale for [`StructureJudgment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureQuality {
    /// Consistent structure.
    Clean,
    /// Partially consistent.
    Mixed,
    /// Needs significant normalization.
    Chaotic,
}

/// Closed readiness scale for [`ContextJudgment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RagReadiness {
    /// Rich context.
    High,
    /// Usable context.
    Medium,
    /// Thin context; retrieval answers will suffer.
    Low,
}

/// Completed audit of one uploaded file.
///
/// A report is fully computed by its analyzer before aggregation; the only
/// post-construction attachment is the optional `llm` judgment and the
/// derived `llmCleanupHours` stat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAuditReport {
    /// Original upload filename.
    pub filename: String,
    /// Derived file kind.
    pub kind: FileKind,
    /// Upload size in bytes.
    pub size_bytes: u64,
    /// Kind-specific numeric stats plus the content fingerprint.
    pub stats: Map<String, Value>,
    /// Ordered findings.
    pub findings: Vec<Finding>,
    /// Clamped 0-100 score.
    pub score: u8,
    /// Derived verdict color.
    pub color: VerdictColor,
    /// Masked sample previews.
    pub sample: SamplePreview,
    /// Secondary LLM judgment; `null` when the pass is disabled or failed.
    #[serde(default)]
    pub llm: Option<ThreePointRisk>,
}

/// Fixed-fee consultation offer for unfixable primary issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    /// Consultation type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Base fee in USD.
    pub base_fee: f64,
    /// Hourly rate in USD.
    pub hourly_rate: f64,
    /// Estimated initial hours.
    pub estimated_hours: f64,
    /// Total cost in USD.
    pub total_cost: f64,
    /// Client-facing description.
    pub description: String,
}

/// Aggregate verdict across all files in one audit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallAudit {
    /// Minimum score across files.
    pub score: u8,
    /// Worst color across files.
    pub color: VerdictColor,
    /// Short outcome headline.
    pub headline: String,
    /// One-sentence rationale.
    pub rationale: String,
    /// Internal realistic effort estimate in hours.
    pub estimated_extra_hours: f64,
    /// Internal cost for the estimate.
    pub estimated_extra_cost: f64,
    /// Client-facing buffered estimate in hours.
    pub client_estimate_hours: f64,
    /// Client-facing cost for the buffered estimate.
    pub client_estimate_cost: f64,
    /// Hourly rate applied to both costs.
    pub hourly_rate: f64,
    /// Caveat clause; only surfaced for yellow overall verdicts.
    pub generated_clause: Option<String>,
    /// True when the primary issue cannot be fixed by cleanup work.
    pub requires_consultation: bool,
    /// Consultation offer replacing hour/cost estimates when required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consultation: Option<Consultation>,
}

/// Full response for one audit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Model identifier, `null` when the LLM pass is disabled.
    pub model: Option<String>,
    /// Aggregate verdict.
    pub overall: OverallAudit,
    /// Per-file reports in upload order.
    pub files: Vec<FileAuditReport>,
}

/// Client-note flavors for the drafting endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientNoteType {
    /// Data is ready; confirm and proceed.
    Confirmation,
    /// Structure fixes needed before ingestion.
    NeedsChanges,
    /// Unfixable primary issue; propose a consultation.
    NeedsConsultation,
}

/// Drafted client-facing email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomatNote {
    /// Email subject line.
    pub subject: String,
    /// Email body.
    pub body: String,
}

/// Response for the client-note drafting endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientNoteResponse {
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Model identifier, `null` when drafted from the template.
    pub model: Option<String>,
    /// Requested note flavor.
    pub note_type: ClientNoteType,
    /// Drafted email.
    pub diplomat_response: DiplomatNote,
}

/// Ratio thresholds that trigger findings.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// Empty-row ratio above which CSV rows count as sparse.
    pub sparse_row_ratio: f64,
    /// Missing-cell ratio above which a CSV warns.
    pub missing_cell_ratio: f64,
    /// Garbage-character ratio above which text counts as unreadable.
    pub garbage_ratio: f64,
    /// Minimum extracted PDF text length before warning.
    pub pdf_min_text_len: usize,
    /// PDF text length below which the warning escalates to critical.
    pub pdf_critical_text_len: usize,
    /// Minimum word count for PDF context density.
    pub min_word_count_pdf: usize,
    /// Minimum word count for TXT context density.
    pub min_word_count_txt: usize,
    /// Minimum letters / non-whitespace ratio for context density.
    pub min_alpha_ratio: f64,
}

/// Score deductions per finding id.
#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyTable {
    /// `pii.detected`.
    pub pii_detected: u32,
    /// `csv.low_quality`.
    pub csv_sparse_rows: u32,
    /// `csv.header_issues`.
    pub csv_header_issues: u32,
    /// `csv.duplicate_headers`.
    pub csv_duplicate_headers: u32,
    /// `csv.missing_cells`.
    pub csv_missing_cells: u32,
    /// `csv.parse_failed`.
    pub csv_parse_failed: u32,
    /// `pdf.non_machine_readable` at critical severity, and `pdf.parse_failed`.
    pub pdf_non_readable_critical: u32,
    /// `pdf.non_machine_readable` at warn severity.
    pub pdf_non_readable_warn: u32,
    /// `txt.garbage`.
    pub txt_garbage: u32,
    /// `structure.mixed_dates`.
    pub mixed_date_formats: u32,
    /// `structure.mixed_currency`.
    pub mixed_currency: u32,
    /// `rag.low_context` for PDFs.
    pub low_context_pdf: u32,
    /// `rag.low_context` for TXT.
    pub low_context_txt: u32,
    /// `file.unsupported`.
    pub unsupported_file: u32,
}

/// Effort-estimation units per finding id.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorUnitTable {
    /// `pii.detected` - scrubbing script plus validation.
    pub pii_detected: u32,
    /// Cap for ratio-derived `csv.low_quality` units.
    pub csv_sparse_rows_max: u32,
    /// Base units for `csv.header_issues`; one more per bad header.
    pub csv_header_issues_base: u32,
    /// Base units for `csv.duplicate_headers`; one more per duplicate.
    pub csv_duplicate_headers_base: u32,
    /// Cap for ratio-derived `csv.missing_cells` units.
    pub csv_missing_cells_max: u32,
    /// `csv.parse_failed` - format debugging.
    pub csv_parse_failed: u32,
    /// `pdf.non_machine_readable` / `pdf.parse_failed` - OCR work.
    pub pdf_non_readable: u32,
    /// `txt.garbage` - encoding fixes.
    pub txt_garbage: u32,
    /// `structure.mixed_dates` - one transformation.
    pub mixed_date_formats: u32,
    /// `structure.mixed_currency` - one normalization.
    pub mixed_currency: u32,
    /// `rag.low_context` - unfixable, flag only.
    pub low_context: u32,
    /// `file.unsupported` - format conversion.
    pub unsupported_file: u32,
}

/// Fixed-fee consultation pricing for unfixable assets.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsultationPricing {
    /// Base fee in USD.
    pub base_fee: f64,
    /// Hourly rate in USD.
    pub hourly_rate: f64,
    /// Initial consultation hours.
    pub initial_hours: f64,
    /// Client-facing description.
    pub description: String,
}

/// Score bands for the color verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBands {
    /// Minimum score for a green verdict.
    pub green_min: u8,
    /// Minimum score for a yellow verdict; below is red.
    pub yellow_min: u8,
}

/// Immutable audit configuration.
///
/// Constructed once at process start and passed explicitly; tests override
/// individual fields through struct update syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditConfig {
    /// Maximum total upload size in bytes.
    pub max_upload_bytes: u64,
    /// Maximum characters forwarded to the LLM sample analysis.
    pub llm_sample_max_chars: usize,
    /// Maximum characters for text previews in the response.
    pub text_preview_max_chars: usize,
    /// Rows sampled from a CSV for analysis.
    pub csv_sample_rows: usize,
    /// Rows included in the masked preview.
    pub masked_preview_rows: usize,
    /// Default hourly rate in USD for cost estimation.
    pub default_hourly_rate_usd: f64,
    /// Multiplier converting error units to estimated hours.
    pub error_units_to_hours: f64,
    /// Client-estimate buffer multiplier for scope creep.
    pub client_estimate_multiplier: f64,
    /// Minimum estimate hours quoted for non-green audits.
    pub minimum_estimate_hours: f64,
    /// PDF sample window in characters.
    pub pdf_preview_chars: usize,
    /// TXT sample window in characters.
    pub txt_preview_chars: usize,
    /// Ratio/length thresholds.
    pub thresholds: Thresholds,
    /// Penalty table.
    pub penalties: PenaltyTable,
    /// Error-unit table.
    pub error_units: ErrorUnitTable,
    /// Consultation pricing.
    pub consultation: ConsultationPricing,
    /// Score bands for the color verdict.
    pub bands: ScoreBands,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 30 * 1024 * 1024,
            llm_sample_max_chars: 10_000,
            text_preview_max_chars: 5_000,
            csv_sample_rows: 50,
            masked_preview_rows: 10,
            default_hourly_rate_usd: 150.0,
            error_units_to_hours: 0.25,
            client_estimate_multiplier: 1.5,
            minimum_estimate_hours: 2.0,
            pdf_preview_chars: 8_000,
            txt_preview_chars: 8_000,
            thresholds: Thresholds {
                sparse_row_ratio: 0.2,
                missing_cell_ratio: 0.3,
                garbage_ratio: 0.22,
                pdf_min_text_len: 200,
                pdf_critical_text_len: 60,
                min_word_count_pdf: 120,
                min_word_count_txt: 200,
                min_alpha_ratio: 0.22,
            },
            penalties: PenaltyTable {
                pii_detected: 45,
                csv_sparse_rows: 18,
                csv_header_issues: 10,
                csv_duplicate_headers: 6,
                csv_missing_cells: 12,
                csv_parse_failed: 40,
                pdf_non_readable_critical: 35,
                pdf_non_readable_warn: 18,
                txt_garbage: 15,
                mixed_date_formats: 8,
                mixed_currency: 6,
                low_context_pdf: 10,
                low_context_txt: 8,
                unsupported_file: 20,
            },
            error_units: ErrorUnitTable {
                pii_detected: 6,
                csv_sparse_rows_max: 16,
                csv_header_issues_base: 4,
                csv_duplicate_headers_base: 3,
                csv_missing_cells_max: 12,
                csv_parse_failed: 16,
                pdf_non_readable: 20,
                txt_garbage: 6,
                mixed_date_formats: 3,
                mixed_currency: 2,
                low_context: 0,
                unsupported_file: 8,
            },
            consultation: ConsultationPricing {
                base_fee: 500.0,
                hourly_rate: 200.0,
                initial_hours: 2.0,
                description: "Retrieval Architecture Consultation".to_string(),
            },
            bands: ScoreBands {
                green_min: 80,
                yellow_min: 50,
            },
        }
    }
}

/// Clamps a raw score into the 0-100 range.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

/// Computes the clamped score from the finding penalties.
pub fn score_from_findings(findings: &[Finding]) -> u8 {
    let penalty: i64 = findings.iter().map(|f| i64::from(f.penalty)).sum();
    clamp_score(100 - penalty)
}

/// Returns `true` when any finding carries critical severity.
pub fn has_critical(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity == Severity::Critical)
}

/// Derives the verdict color from score and critical override.
///
/// A single critical finding forces red regardless of the numeric score.
pub fn color_from(score: u8, critical: bool, bands: &ScoreBands) -> VerdictColor {
    if critical || score < bands.yellow_min {
        VerdictColor::Red
    } else if score < bands.green_min {
        VerdictColor::Yellow
    } else {
        VerdictColor::Green
    }
}

/// Headline string for an overall color.
pub fn headline_for(color: VerdictColor) -> &'static str {
    match color {
        VerdictColor::Green => "SAFE TO SIGN",
        VerdictColor::Yellow => "SIGN WITH CAVEATS",
        VerdictColor::Red => "DO NOT SIGN",
    }
}

/// One-sentence rationale for an overall color.
pub fn rationale_for(color: VerdictColor) -> &'static str {
    match color {
        VerdictColor::Green => "Audit indicates minimal risk and high asset readiness.",
        VerdictColor::Yellow => {
            "Audit indicates moderate risk or cleanup effort; sign with caveats."
        }
        VerdictColor::Red => {
            "Audit indicates critical risk or significant cleanup; standardize before signing."
        }
    }
}

/// Sums error units across all findings.
pub fn total_error_units(findings: &[Finding]) -> u32 {
    findings.iter().map(|f| f.error_units).sum()
}

/// Sums error units across fixable findings only.
pub fn fixable_error_units(findings: &[Finding]) -> u32 {
    findings
        .iter()
        .filter(|f| !f.unfixable)
        .map(|f| f.error_units)
        .sum()
}
