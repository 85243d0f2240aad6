#![warn(missing_docs)]
//! # preflight-analyzers
//!
//! ## Purpose
//! Runs the per-kind audit pipelines that turn uploaded bytes into complete
//! [`FileAuditReport`] values.
//!
//! ## Responsibilities
//! - Define the extraction boundary traits for PDF text and CSV table audits.
//! - Provide deterministic built-in backends for CI and unit tests.
//! - Compose PII scanning, structural heuristics, and kind-specific stats
//!   into ordered findings with config-sourced penalties.
//! - Guarantee that response previews only ever contain masked content.
//!
//! ## Data flow
//! Upload bytes -> extraction backend -> threshold checks + PII scan +
//! structure signals -> findings -> score/color -> masked previews ->
//! complete immutable report handed to aggregation.
//!
//! ## Ownership and lifetimes
//! The analyzer shares its extraction backends behind `Arc` so one configured
//! instance serves every file in a request without borrow coupling.
//!
//! ## Error model
//! Malformed content never escapes as an error: parse failures become a
//! single critical finding with fixed penalty and the pipeline completes.
//! Only the dispatcher labels unsupported kinds, and it does so with a
//! finding rather than an error.
//!
//! ## Security and privacy notes
//! Raw sample text exists only inside one analyzer invocation. Every preview
//! placed on a report is masked first; this is a hard contract of the
//! response boundary.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use preflight_core::{
    AuditConfig, FileAuditReport, FileKind, Finding, SamplePreview, Severity, color_from,
    has_critical, ids, score_from_findings,
};
use preflight_heuristics::{
    analyze_text_structure, compute_context_richness, compute_readability,
};
use preflight_pii::{PiiScan, mask_text, masked_examples, scan_pii};

const LOW_CONTEXT_REMEDIATION: &str = "This issue reflects the inherent nature of the source \
content. To improve retrieval readiness, the client should provide more descriptive \
documentation or supplementary context files that explain the data semantics.";

/// Text extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Plain text content.
    pub text: String,
    /// Page count when the backend knows it.
    pub pages: Option<usize>,
}

/// External text-extraction capability for PDF documents.
///
/// The concrete parser is an external collaborator; the pipeline only needs
/// plain text, optionally bounded to the first N pages.
pub trait TextExtractor: Send + Sync {
    /// Extracts plain text from document bytes.
    fn extract_text(
        &self,
        bytes: &[u8],
        max_pages: Option<usize>,
    ) -> Result<ExtractedText, ExtractError>;
}

/// Deterministic extractor that decodes bytes as UTF-8 text.
///
/// Used for CI and unit tests where no real document parser is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8TextExtractor;

impl TextExtractor for Utf8TextExtractor {
    fn extract_text(
        &self,
        bytes: &[u8],
        _max_pages: Option<usize>,
    ) -> Result<ExtractedText, ExtractError> {
        Ok(ExtractedText {
            text: String::from_utf8_lossy(bytes).into_owned(),
            pages: Some(1),
        })
    }
}

/// Structural audit of one tabular upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStats {
    /// Data rows inspected (header excluded).
    pub row_count: usize,
    /// Header column count.
    pub column_count: usize,
    /// Blank or placeholder header names.
    pub header_issues: Vec<String>,
    /// Headers appearing more than once.
    pub duplicate_headers: Vec<String>,
    /// Fully empty rows / inspected rows; 1.0 when no rows parsed.
    pub missing_row_ratio: f64,
    /// Empty cells / inspected cells; 1.0 when no rows parsed.
    pub missing_cell_ratio: f64,
    /// Sampled rows keyed by header.
    pub sample_rows: Vec<Map<String, Value>>,
}

/// Strategy interface for CSV structural audits.
///
/// Richer external profilers and the built-in lightweight parser are
/// interchangeable behind this trait; the pipeline flags which one ran.
pub trait TableAudit: Send + Sync {
    /// Audits raw CSV bytes.
    fn audit(&self, bytes: &[u8]) -> Result<TableStats, ExtractError>;
}

/// Built-in lightweight CSV audit.
///
/// Handles quoted fields and CRLF input, inspects up to `max_rows` data rows,
/// and keeps the first `sample_rows` rows for previews.
#[derive(Debug, Clone, Copy)]
pub struct SimpleTableAudit {
    /// Data-row inspection cap.
    pub max_rows: usize,
    /// Sampled rows retained for previews.
    pub sample_rows: usize,
}

impl Default for SimpleTableAudit {
    fn default() -> Self {
        Self {
            max_rows: 5_000,
            sample_rows: 50,
        }
    }
}

impl TableAudit for SimpleTableAudit {
    fn audit(&self, bytes: &[u8]) -> Result<TableStats, ExtractError> {
        let raw = String::from_utf8_lossy(bytes);
        let mut lines = raw
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty());

        let Some(header_line) = lines.next() else {
            return Ok(TableStats {
                missing_row_ratio: 1.0,
                missing_cell_ratio: 1.0,
                ..TableStats::default()
            });
        };

        let headers = split_record(header_line);
        let column_count = headers.len();

        let mut header_issues = Vec::new();
        for header in &headers {
            let trimmed = header.trim();
            if trimmed.is_empty() {
                header_issues.push("(blank)".to_string());
            } else if trimmed.starts_with("Unnamed:") {
                header_issues.push(trimmed.to_string());
            }
        }

        let mut duplicate_headers = Vec::new();
        for (index, header) in headers.iter().enumerate() {
            if headers[..index].contains(header) {
                if !duplicate_headers.contains(header) {
                    duplicate_headers.push(header.clone());
                }
            }
        }

        let mut row_count = 0usize;
        let mut empty_rows = 0usize;
        let mut missing_cells = 0usize;
        let mut sample_rows: Vec<Map<String, Value>> = Vec::new();

        for line in lines.take(self.max_rows) {
            let cells = split_record(line);
            row_count += 1;

            let mut filled = 0usize;
            let mut row = Map::new();
            for (index, header) in headers.iter().enumerate() {
                let value = cells.get(index).map(String::as_str).unwrap_or("");
                if value.trim().is_empty() {
                    missing_cells += 1;
                } else {
                    filled += 1;
                }
                if sample_rows.len() < self.sample_rows {
                    row.insert(header.clone(), Value::String(value.to_string()));
                }
            }
            if filled == 0 {
                empty_rows += 1;
            }
            if sample_rows.len() < self.sample_rows {
                sample_rows.push(row);
            }
        }

        let (missing_row_ratio, missing_cell_ratio) = if row_count == 0 {
            (1.0, 1.0)
        } else {
            let total_cells = (row_count * column_count.max(1)).max(1);
            (
                empty_rows as f64 / row_count as f64,
                missing_cells as f64 / total_cells as f64,
            )
        };

        Ok(TableStats {
            row_count,
            column_count,
            header_issues,
            duplicate_headers,
            missing_row_ratio,
            missing_cell_ratio,
            sample_rows,
        })
    }
}

/// Splits one CSV record, honoring double-quoted fields and `""` escapes.
fn split_record(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                cells.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    cells.push(current);
    cells
}

/// Per-kind audit pipelines over one shared configuration.
#[derive(Clone)]
pub struct FileAnalyzer {
    config: AuditConfig,
    pdf_extractor: Arc<dyn TextExtractor>,
    table_primary: Option<Arc<dyn TableAudit>>,
    table_fallback: Arc<dyn TableAudit>,
}

impl FileAnalyzer {
    /// Creates an analyzer with the built-in lightweight table audit.
    pub fn new(config: AuditConfig, pdf_extractor: Arc<dyn TextExtractor>) -> Self {
        let fallback = SimpleTableAudit {
            max_rows: 5_000,
            sample_rows: config.csv_sample_rows,
        };
        Self {
            config,
            pdf_extractor,
            table_primary: None,
            table_fallback: Arc::new(fallback),
        }
    }

    /// Injects a richer primary table-audit strategy.
    #[must_use]
    pub fn with_table_primary(mut self, primary: Arc<dyn TableAudit>) -> Self {
        self.table_primary = Some(primary);
        self
    }

    /// Audits one upload, dispatching on the filename extension.
    pub fn analyze(&self, filename: &str, bytes: &[u8]) -> FileAuditReport {
        match FileKind::from_filename(filename) {
            FileKind::Csv => self.analyze_csv(filename, bytes),
            FileKind::Pdf => self.analyze_pdf(filename, bytes),
            FileKind::Txt => self.analyze_txt(filename, bytes),
            FileKind::Unknown => self.analyze_unsupported(filename, bytes),
        }
    }

    /// Audits a CSV upload.
    ///
    /// The primary strategy is attempted first when configured; any failure
    /// falls back to the lightweight parser with an informational finding.
    /// Total parse failure degrades to one critical finding, never an error.
    pub fn analyze_csv(&self, filename: &str, bytes: &[u8]) -> FileAuditReport {
        let mut findings = Vec::new();

        let table = match &self.table_primary {
            Some(primary) => match primary.audit(bytes) {
                Ok(stats) => Some(stats),
                Err(error) => {
                    warn!(filename, %error, "primary table audit failed; using fallback parser");
                    self.run_table_fallback(&mut findings, bytes)
                }
            },
            None => self.run_table_fallback(&mut findings, bytes),
        };

        let mut stats_map = Map::new();
        stats_map.insert("contentSha256".to_string(), json!(fingerprint(bytes)));
        let mut sample_text = String::new();
        let mut sample_rows: Vec<Map<String, Value>> = Vec::new();

        match table {
            Some(stats) => {
                self.push_table_findings(&mut findings, &stats);
                sample_text =
                    serde_json::to_string_pretty(&stats.sample_rows).unwrap_or_default();
                sample_rows = stats.sample_rows.clone();

                stats_map.insert("rowCount".to_string(), json!(stats.row_count));
                stats_map.insert("columnCount".to_string(), json!(stats.column_count));
                stats_map.insert(
                    "missingRowRatio".to_string(),
                    json!(stats.missing_row_ratio),
                );
                stats_map.insert(
                    "missingCellRatio".to_string(),
                    json!(stats.missing_cell_ratio),
                );
                stats_map.insert("headerIssues".to_string(), json!(stats.header_issues));
                stats_map.insert(
                    "duplicateHeaders".to_string(),
                    json!(stats.duplicate_headers),
                );
            }
            None => {
                findings.push(Finding::new(
                    ids::CSV_PARSE_FAILED,
                    Severity::Critical,
                    "CSV Structural Audit Failed",
                    "Unable to parse the file as tabular data.",
                    self.config.penalties.csv_parse_failed,
                    self.config.error_units.csv_parse_failed,
                ));
            }
        }

        let pii = scan_pii(&sample_text);
        self.push_pii_finding(&mut findings, &pii);
        self.push_structure_findings(&mut findings, &sample_text);

        let score = score_from_findings(&findings);
        let color = color_from(score, has_critical(&findings), &self.config.bands);

        let masked_sample = mask_text(&sample_text, &pii);
        let rows_preview: Vec<Map<String, Value>> = sample_rows
            .iter()
            .take(self.config.masked_preview_rows)
            .map(|row| mask_row(row, &pii))
            .collect();

        FileAuditReport {
            filename: filename.to_string(),
            kind: FileKind::Csv,
            size_bytes: bytes.len() as u64,
            stats: stats_map,
            findings,
            score,
            color,
            sample: SamplePreview {
                text_preview: Some(truncate_chars(
                    &masked_sample,
                    self.config.text_preview_max_chars,
                )),
                rows_preview: Some(rows_preview),
            },
            llm: None,
        }
    }

    /// Audits a PDF upload through the injected text extractor.
    pub fn analyze_pdf(&self, filename: &str, bytes: &[u8]) -> FileAuditReport {
        let mut stats_map = Map::new();
        stats_map.insert("contentSha256".to_string(), json!(fingerprint(bytes)));

        let extracted = match self.pdf_extractor.extract_text(bytes, Some(5)) {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(filename, %error, "pdf text extraction failed");
                let findings = vec![Finding::new(
                    ids::PDF_PARSE_FAILED,
                    Severity::Critical,
                    "PDF Parsing Failed",
                    error.to_string(),
                    self.config.penalties.pdf_non_readable_critical,
                    self.config.error_units.pdf_non_readable,
                )];
                let score = score_from_findings(&findings);
                let color = color_from(score, true, &self.config.bands);
                return FileAuditReport {
                    filename: filename.to_string(),
                    kind: FileKind::Pdf,
                    size_bytes: bytes.len() as u64,
                    stats: stats_map,
                    findings,
                    score,
                    color,
                    sample: SamplePreview::default(),
                    llm: None,
                };
            }
        };

        let text = extracted.text.trim().to_string();
        let preview = truncate_chars(&text, self.config.pdf_preview_chars);

        let mut findings = Vec::new();
        let readability = compute_readability(&preview);
        let context = compute_context_richness(&preview);
        let thresholds = &self.config.thresholds;

        if readability.text_length < thresholds.pdf_min_text_len
            || readability.garbage_ratio > thresholds.garbage_ratio
        {
            let near_empty = readability.text_length < thresholds.pdf_critical_text_len;
            findings.push(Finding::new(
                ids::PDF_NON_MACHINE_READABLE,
                if near_empty {
                    Severity::Critical
                } else {
                    Severity::Warn
                },
                "Non-Machine Readable PDF",
                if near_empty {
                    "Text extraction is near-empty. Likely scanned/images-only and requires OCR."
                } else {
                    "Text extraction appears degraded (garbage characters / low signal)."
                },
                if near_empty {
                    self.config.penalties.pdf_non_readable_critical
                } else {
                    self.config.penalties.pdf_non_readable_warn
                },
                self.config.error_units.pdf_non_readable,
            ));
        }

        let pii = scan_pii(&preview);
        self.push_pii_finding(&mut findings, &pii);
        self.push_structure_findings(&mut findings, &preview);

        if context.word_count < thresholds.min_word_count_pdf
            || context.alpha_ratio < thresholds.min_alpha_ratio
        {
            findings.push(
                Finding::new(
                    ids::LOW_CONTEXT,
                    Severity::Warn,
                    "RAG Readiness: Low Context Density",
                    "The sample is thin or mostly numeric; retrieval answers may lack usable \
                     context.",
                    self.config.penalties.low_context_pdf,
                    self.config.error_units.low_context,
                )
                .unfixable(LOW_CONTEXT_REMEDIATION),
            );
        }

        if let Some(pages) = extracted.pages {
            stats_map.insert("pages".to_string(), json!(pages));
        }
        stats_map.insert("textLength".to_string(), json!(text.chars().count()));
        stats_map.insert("garbageRatio".to_string(), json!(readability.garbage_ratio));

        let score = score_from_findings(&findings);
        let color = color_from(score, has_critical(&findings), &self.config.bands);
        let masked_preview = mask_text(&preview, &pii);

        FileAuditReport {
            filename: filename.to_string(),
            kind: FileKind::Pdf,
            size_bytes: bytes.len() as u64,
            stats: stats_map,
            findings,
            score,
            color,
            sample: SamplePreview {
                text_preview: Some(truncate_chars(
                    &masked_preview,
                    self.config.text_preview_max_chars,
                )),
                rows_preview: None,
            },
            llm: None,
        }
    }

    /// Audits a plain-text upload.
    pub fn analyze_txt(&self, filename: &str, bytes: &[u8]) -> FileAuditReport {
        let text = String::from_utf8_lossy(bytes);
        let preview = truncate_chars(&text, self.config.txt_preview_chars);

        let mut findings = Vec::new();
        let readability = compute_readability(&preview);
        let context = compute_context_richness(&preview);
        let thresholds = &self.config.thresholds;

        if readability.garbage_ratio > thresholds.garbage_ratio {
            findings.push(Finding::new(
                ids::TXT_GARBAGE,
                Severity::Warn,
                "Non-Machine Readable Text",
                "Text appears corrupted (high garbage-character ratio).",
                self.config.penalties.txt_garbage,
                self.config.error_units.txt_garbage,
            ));
        }

        let pii = scan_pii(&preview);
        self.push_pii_finding(&mut findings, &pii);
        self.push_structure_findings(&mut findings, &preview);

        if context.word_count < thresholds.min_word_count_txt
            || context.alpha_ratio < thresholds.min_alpha_ratio
        {
            findings.push(
                Finding::new(
                    ids::LOW_CONTEXT,
                    Severity::Warn,
                    "RAG Readiness: Low Context Density",
                    "Sample text is short; retrieval answers may lack context.",
                    self.config.penalties.low_context_txt,
                    self.config.error_units.low_context,
                )
                .unfixable(LOW_CONTEXT_REMEDIATION),
            );
        }

        let mut stats_map = Map::new();
        stats_map.insert("contentSha256".to_string(), json!(fingerprint(bytes)));
        stats_map.insert("textLength".to_string(), json!(text.chars().count()));
        stats_map.insert("garbageRatio".to_string(), json!(readability.garbage_ratio));

        let score = score_from_findings(&findings);
        let color = color_from(score, has_critical(&findings), &self.config.bands);
        let masked_preview = mask_text(&preview, &pii);

        FileAuditReport {
            filename: filename.to_string(),
            kind: FileKind::Txt,
            size_bytes: bytes.len() as u64,
            stats: stats_map,
            findings,
            score,
            color,
            sample: SamplePreview {
                text_preview: Some(truncate_chars(
                    &masked_preview,
                    self.config.text_preview_max_chars,
                )),
                rows_preview: None,
            },
            llm: None,
        }
    }

    /// Reports an unsupported upload kind with a single finding.
    pub fn analyze_unsupported(&self, filename: &str, bytes: &[u8]) -> FileAuditReport {
        let findings = vec![Finding::new(
            ids::UNSUPPORTED_FILE,
            Severity::Warn,
            "Unsupported File Type",
            "Supported types: CSV, PDF, TXT.",
            self.config.penalties.unsupported_file,
            self.config.error_units.unsupported_file,
        )];

        let mut stats_map = Map::new();
        stats_map.insert("contentSha256".to_string(), json!(fingerprint(bytes)));

        let score = score_from_findings(&findings);
        let color = color_from(score, has_critical(&findings), &self.config.bands);

        FileAuditReport {
            filename: filename.to_string(),
            kind: FileKind::Unknown,
            size_bytes: bytes.len() as u64,
            stats: stats_map,
            findings,
            score,
            color,
            sample: SamplePreview::default(),
            llm: None,
        }
    }

    /// Runs the lightweight parser, flagging the degraded analysis on success.
    fn run_table_fallback(&self, findings: &mut Vec<Finding>, bytes: &[u8]) -> Option<TableStats> {
        match self.table_fallback.audit(bytes) {
            Ok(stats) => {
                findings.push(Finding::new(
                    ids::CSV_TABLE_FALLBACK,
                    Severity::Info,
                    "Lightweight Table Parser",
                    "Using the lightweight CSV parser for this audit. Enable the full structural \
                     profiler for deeper checks.",
                    0,
                    0,
                ));
                Some(stats)
            }
            Err(error) => {
                warn!(%error, "fallback table audit failed");
                None
            }
        }
    }

    fn push_table_findings(&self, findings: &mut Vec<Finding>, stats: &TableStats) {
        let thresholds = &self.config.thresholds;

        if stats.missing_row_ratio > thresholds.sparse_row_ratio {
            findings.push(Finding::new(
                ids::CSV_LOW_QUALITY,
                Severity::Warn,
                "Low Quality: Sparse Rows",
                format!(
                    "~{}% of sampled rows are empty.",
                    percent(stats.missing_row_ratio)
                ),
                self.config.penalties.csv_sparse_rows,
                ratio_units(
                    stats.missing_row_ratio,
                    self.config.error_units.csv_sparse_rows_max,
                ),
            ));
        }

        if !stats.header_issues.is_empty() {
            findings.push(Finding::new(
                ids::CSV_HEADER_ISSUES,
                Severity::Warn,
                "Headers: Inconsistent",
                format!(
                    "Found suspicious headers: {}.",
                    join_first(&stats.header_issues, 4)
                ),
                self.config.penalties.csv_header_issues,
                self.config.error_units.csv_header_issues_base + stats.header_issues.len() as u32,
            ));
        }

        if !stats.duplicate_headers.is_empty() {
            findings.push(Finding::new(
                ids::CSV_DUPLICATE_HEADERS,
                Severity::Warn,
                "Headers: Duplicate Columns",
                format!(
                    "Duplicate headers detected: {}.",
                    join_first(&stats.duplicate_headers, 4)
                ),
                self.config.penalties.csv_duplicate_headers,
                self.config.error_units.csv_duplicate_headers_base
                    + stats.duplicate_headers.len() as u32,
            ));
        }

        if stats.missing_cell_ratio > thresholds.missing_cell_ratio {
            findings.push(Finding::new(
                ids::CSV_MISSING_CELLS,
                Severity::Warn,
                "Missing Values: High",
                format!(
                    "~{}% of sampled cells are empty.",
                    percent(stats.missing_cell_ratio)
                ),
                self.config.penalties.csv_missing_cells,
                ratio_units(
                    stats.missing_cell_ratio,
                    self.config.error_units.csv_missing_cells_max,
                ),
            ));
        }
    }

    fn push_pii_finding(&self, findings: &mut Vec<Finding>, pii: &PiiScan) {
        if pii.is_empty() {
            return;
        }

        let examples = masked_examples(pii);
        let shown: Vec<&str> = examples.iter().take(3).map(String::as_str).collect();
        findings.push(Finding::new(
            ids::PII_DETECTED,
            Severity::Critical,
            "CRITICAL ALERT: PII Detected",
            format!(
                "Requires scrubbing. Emails: {}, SSNs: {}, Credit cards: {}. Examples: {}",
                pii.emails.len(),
                pii.ssns.len(),
                pii.credit_cards.len(),
                shown.join(", ")
            ),
            self.config.penalties.pii_detected,
            self.config.error_units.pii_detected,
        ));
    }

    fn push_structure_findings(&self, findings: &mut Vec<Finding>, sample: &str) {
        let signals = analyze_text_structure(sample);

        if signals.mixed_date_formats {
            findings.push(Finding::new(
                ids::MIXED_DATES,
                Severity::Warn,
                "Formatting: Mixed Date Formats",
                "Detected multiple date patterns (DD/MM vs MM/DD) in the sample.",
                self.config.penalties.mixed_date_formats,
                self.config.error_units.mixed_date_formats,
            ));
        }

        if signals.currency_markers.len() > 1 {
            findings.push(Finding::new(
                ids::MIXED_CURRENCY,
                Severity::Warn,
                "Formatting: Inconsistent Currency",
                format!(
                    "Detected multiple currency markers: {}.",
                    signals.currency_markers.join(", ")
                ),
                self.config.penalties.mixed_currency,
                self.config.error_units.mixed_currency,
            ));
        }
    }
}

fn mask_row(row: &Map<String, Value>, pii: &PiiScan) -> Map<String, Value> {
    row.iter()
        .map(|(key, value)| {
            let masked = match value {
                Value::String(text) => Value::String(mask_text(text, pii)),
                other => other.clone(),
            };
            (key.clone(), masked)
        })
        .collect()
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn percent(ratio: f64) -> i64 {
    (ratio * 100.0).round() as i64
}

fn ratio_units(ratio: f64, max: u32) -> u32 {
    ((ratio * 100.0).ceil() as u32).min(max)
}

fn join_first(values: &[String], count: usize) -> String {
    values
        .iter()
        .take(count)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncates to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Errors produced by extraction backends.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Document text extraction failed.
    #[error("text extraction failed: {0}")]
    Extraction(String),
    /// Tabular parse failed.
    #[error("table parse failed: {0}")]
    Table(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for the table parser and the per-kind pipelines.

    use super::*;

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract_text(
            &self,
            _bytes: &[u8],
            _max_pages: Option<usize>,
        ) -> Result<ExtractedText, ExtractError> {
            Err(ExtractError::Extraction("corrupt xref table".to_string()))
        }
    }

    fn analyzer() -> FileAnalyzer {
        FileAnalyzer::new(AuditConfig::default(), Arc::new(Utf8TextExtractor))
    }

    #[test]
    fn simple_table_audit_counts_headers_and_missing_cells() {
        let csv = b"name,amount,name,Unnamed: 3\nalice,10,x,\n,,,\nbob,,y,\n";
        let stats = SimpleTableAudit::default().audit(csv).expect("audit runs");

        assert_eq!(stats.row_count, 3);
        assert_eq!(stats.column_count, 4);
        assert_eq!(stats.duplicate_headers, vec!["name"]);
        assert_eq!(stats.header_issues, vec!["Unnamed: 3"]);
        assert!((stats.missing_row_ratio - 1.0 / 3.0).abs() < 1e-9);
        // 6 of 12 cells are blank.
        assert!((stats.missing_cell_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn split_record_honors_quoted_commas() {
        assert_eq!(
            split_record(r#"a,"b,c","d ""e""""#),
            vec!["a", "b,c", r#"d "e""#]
        );
    }

    #[test]
    fn clean_csv_scores_green() {
        let csv = b"name,joined,notes\nalice,2023-01-05,lead engineer on the platform\nbob,2023-02-10,site reliability contact\n";
        let report = analyzer().analyze("clean.csv", csv);

        assert!(report.score >= 80, "score was {}", report.score);
        assert_eq!(report.color, preflight_core::VerdictColor::Green);
        assert!(!has_critical(&report.findings));
    }

    #[test]
    fn pii_in_text_forces_red() {
        let text = b"SSN: 123-45-6789 and card 4242 4242 4242 4242 on file";
        let report = analyzer().analyze("dump.txt", text);

        assert!(report.findings.iter().any(|f| f.id == ids::PII_DETECTED));
        assert_eq!(report.color, preflight_core::VerdictColor::Red);

        let preview = report.sample.text_preview.expect("preview present");
        assert!(!preview.contains("123-45-6789"));
        assert!(!preview.contains("4242 4242 4242 4242"));
    }

    #[test]
    fn csv_preview_rows_are_masked() {
        let csv = b"contact,notes\nbob@corp.io,prefers email\n";
        let report = analyzer().analyze("contacts.csv", csv);

        let rows = report.sample.rows_preview.expect("rows preview present");
        assert_eq!(rows[0]["contact"], "b***@corp.io");
    }

    struct FailingTableAudit;

    impl TableAudit for FailingTableAudit {
        fn audit(&self, _bytes: &[u8]) -> Result<TableStats, ExtractError> {
            Err(ExtractError::Table("profiler backend offline".to_string()))
        }
    }

    #[test]
    fn failed_primary_table_audit_falls_back_with_info_finding() {
        let analyzer = analyzer().with_table_primary(Arc::new(FailingTableAudit));
        let csv = b"name,notes\nalice,lead engineer on the platform\n";
        let report = analyzer.analyze("clean.csv", csv);

        let fallback = report
            .findings
            .iter()
            .find(|f| f.id == ids::CSV_TABLE_FALLBACK)
            .expect("fallback finding present");
        assert_eq!(fallback.severity, Severity::Info);
        assert_eq!(fallback.penalty, 0);
        // The fallback parser still produced structural stats.
        assert_eq!(report.stats["rowCount"], 1);
    }

    #[test]
    fn pdf_extraction_failure_degrades_to_critical_finding() {
        let analyzer =
            FileAnalyzer::new(AuditConfig::default(), Arc::new(FailingExtractor));
        let report = analyzer.analyze("scan.pdf", b"%PDF-1.4 garbage");

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].id, ids::PDF_PARSE_FAILED);
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert_eq!(report.color, preflight_core::VerdictColor::Red);
    }

    #[test]
    fn short_txt_flags_unfixable_low_context() {
        let report = analyzer().analyze("note.txt", b"just a short note");
        let low = report
            .findings
            .iter()
            .find(|f| f.id == ids::LOW_CONTEXT)
            .expect("low-context finding present");
        assert!(low.unfixable);
        assert!(low.remediation.is_some());
        assert_eq!(low.error_units, 0);
    }

    #[test]
    fn unsupported_kind_gets_single_finding() {
        let report = analyzer().analyze("image.png", b"\x89PNG");
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].id, ids::UNSUPPORTED_FILE);
        assert_eq!(report.score, 80);
    }
}
