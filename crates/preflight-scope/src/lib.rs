#![warn(missing_docs)]
//! # preflight-scope
//!
//! ## Purpose
//! Classifies one client request against a signed Statement of Work and
//! recommends the next operational action.
//!
//! ## Responsibilities
//! - Read SOW text (TXT directly, PDF through the extraction boundary).
//! - Extract deliverable/exclusion clauses via heading-based segmentation.
//! - Run the LLM classification pass with defensive result normalization.
//! - Apply the deterministic phase policy that owns verdict and engagement.
//! - Re-validate clause citations for specificity.
//! - Draft the client-facing email, and fall back to a complete heuristic
//!   path when no provider is available.
//! - Draft change-order packs with a full template fallback.
//!
//! ## Data flow
//! SOW bytes -> [`sow::read_sow_text`] -> [`extract::extract_sow_context`] ->
//! [`classify::ScopeGuardAnalyzer`] (LLM signal + [`policy`] overlay) ->
//! [`ScopeGuardResponse`].
//!
//! ## Ownership and lifetimes
//! All intermediate results are owned values so the fallback path can reuse
//! the extraction output after an LLM failure.
//!
//! ## Error model
//! Only SOW input problems surface as [`ScopeError`]. LLM failures of any
//! kind degrade to the heuristic fallback; the response is always complete.
//!
//! ## Security and privacy notes
//! Stage-B email drafting receives the finalized internal assessment but the
//! prompt forbids leaking verdicts or confidence language to the client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use preflight_analyzers::ExtractError;
use preflight_core::DiplomatNote;

pub mod change_order;
pub mod classify;
pub mod extract;
pub mod normalize;
pub mod policy;
pub mod sow;

pub use change_order::{
    ChangeOrderPack, ChangeOrderPackResponse, ScopeAnalysisSummary, draft_change_order_pack,
};
pub use classify::{ScopeGuardAnalyzer, ScopeRequest};
pub use extract::{ExtractedSow, extract_sow_context};
pub use policy::{Engagement, PhasePolicy, ProjectPhase, Relatedness};
pub use sow::{SowKind, SowText, read_sow_text};

/// Traffic-light scope verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeVerdict {
    /// Covered by the current SOW; proceed.
    InScope,
    /// Ambiguous; requires manager review.
    GreyArea,
    /// Requires a change order or a separate project.
    OutOfScope,
}

/// Request classification bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeBucket {
    /// Promised functionality is not working as described.
    BugDefect,
    /// Question about how an in-scope feature works.
    Clarification,
    /// New feature or deliverable.
    ChangeRequest,
}

/// T-shirt sizing for effort estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TshirtSize {
    /// Roughly two hours.
    Small,
    /// Roughly one day.
    Medium,
    /// Twenty hours or more.
    Large,
}

/// Effort estimate attached to a scope verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeEstimate {
    /// T-shirt size.
    pub size: TshirtSize,
    /// Engineering hours.
    pub hours: f64,
    /// Engineering-impact rationale.
    pub rationale: String,
}

/// Verbatim SOW excerpt justifying a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseCitation {
    /// Section label when known.
    pub section: Option<String>,
    /// Verbatim quote.
    pub quote: String,
}

/// Deliverables and exclusions extracted from the SOW.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeExtraction {
    /// In-scope clauses.
    #[serde(default)]
    pub deliverables: Vec<String>,
    /// Out-of-scope clauses.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// Full response for one scope classification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeGuardResponse {
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Model identifier, `null` on the heuristic fallback path.
    pub model: Option<String>,
    /// Policy-derived verdict.
    pub verdict: ScopeVerdict,
    /// Request bucket.
    pub bucket: ScopeBucket,
    /// Effort estimate.
    pub estimate: ScopeEstimate,
    /// Supporting SOW citation.
    pub clause_citation: ClauseCitation,
    /// Client-facing email draft.
    pub diplomat_response: DiplomatNote,
    /// Extracted SOW context.
    pub extracted: ScopeExtraction,
}

/// SOW input errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Filename extension is neither PDF nor TXT.
    #[error("unsupported SOW file; supported types: PDF, TXT")]
    UnsupportedSow,
    /// TXT upload held no content.
    #[error("SOW text file is empty")]
    EmptySow,
    /// PDF extraction produced near-empty text.
    #[error(
        "PDF text extraction is near-empty; this looks scanned/images-only - export to text or \
         run OCR and upload a TXT"
    )]
    ScannedPdf,
    /// Extraction backend failure.
    #[error(transparent)]
    Extract(#[from] ExtractError),
}
