//! Change-order pack drafting with a full template fallback.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use preflight_llm::{ChatRequest, LlmClient, LlmError};

use crate::classify::now_rfc3339;
use crate::{ClauseCitation, ScopeBucket, ScopeEstimate, ScopeVerdict};

/// Scope section of a change-order pack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeOrderScope {
    /// Work included in the addendum.
    #[serde(default)]
    pub inclusions: Vec<String>,
    /// Work explicitly excluded.
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// Assumptions the estimate rests on.
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// Timeline section of a change-order pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOrderTimeline {
    /// Duration phrasing, e.g. "1-2 weeks".
    pub duration: String,
    /// Milestone bullets.
    #[serde(default)]
    pub milestones: Vec<String>,
}

/// Commercials section of a change-order pack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrderCommercials {
    /// Engineering hours, whole.
    pub engineering_hours: f64,
    /// Hourly rate in USD.
    pub hourly_rate_usd: f64,
    /// Total in USD.
    pub total_usd: f64,
}

/// Signature block of a change-order pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrderSignature {
    /// Client signature line.
    pub client_line: String,
    /// Consultancy signature line.
    pub consultant_line: String,
}

/// One-page SOW addendum ready for client review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrderPack {
    /// Client display name.
    pub client: String,
    /// Project phase at drafting time.
    pub project_phase: Option<String>,
    /// Addendum title.
    pub title: String,
    /// Two-to-three sentence summary.
    pub summary: String,
    /// Scope section.
    pub scope: ChangeOrderScope,
    /// Commercials, taken verbatim from the computed estimate.
    pub estimate: ChangeOrderCommercials,
    /// Timeline section.
    pub timeline: ChangeOrderTimeline,
    /// Supporting SOW citation from the prior analysis.
    pub clause_citation: ClauseCitation,
    /// Open questions for the client.
    #[serde(default)]
    pub next_questions: Vec<String>,
    /// Signature block.
    pub signature: ChangeOrderSignature,
}

/// Response wrapper for the change-order endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrderPackResponse {
    /// RFC 3339 generation timestamp.
    pub generated_at: String,
    /// Model identifier, `null` on the template fallback path.
    pub model: Option<String>,
    /// Drafted pack.
    pub pack: ChangeOrderPack,
}

/// Previously computed scope analysis supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeAnalysisSummary {
    /// Scope verdict.
    pub verdict: ScopeVerdict,
    /// Request bucket.
    pub bucket: ScopeBucket,
    /// Effort estimate.
    pub estimate: ScopeEstimate,
    /// Supporting citation.
    pub clause_citation: ClauseCitation,
}

/// LLM draft payload; commercials and citation are never model-authored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackDraftWire {
    title: String,
    summary: String,
    #[serde(default)]
    scope: ChangeOrderScope,
    timeline: ChangeOrderTimeline,
    #[serde(default)]
    next_questions: Vec<String>,
    signature: ChangeOrderSignature,
}

/// Drafts a change-order pack, falling back to templates without an LLM.
pub fn draft_change_order_pack(
    llm: Option<&LlmClient>,
    sow_text: &str,
    request: &str,
    client_name: &str,
    project_phase: Option<&str>,
    analysis: &ScopeAnalysisSummary,
    hourly_rate_usd: f64,
) -> ChangeOrderPackResponse {
    let engineering_hours = analysis.estimate.hours.max(0.0).round();
    let estimate = ChangeOrderCommercials {
        engineering_hours,
        hourly_rate_usd,
        total_usd: (engineering_hours * hourly_rate_usd).round(),
    };

    if let Some(client) = llm {
        match draft_with_llm(client, sow_text, request, client_name, project_phase, analysis, estimate)
        {
            Ok(draft) => {
                let timeline = if draft.timeline.milestones.is_empty() {
                    ChangeOrderTimeline {
                        duration: draft.timeline.duration,
                        milestones: default_milestones(),
                    }
                } else {
                    draft.timeline
                };

                return ChangeOrderPackResponse {
                    generated_at: now_rfc3339(),
                    model: Some(client.model().to_string()),
                    pack: ChangeOrderPack {
                        client: client_name.to_string(),
                        project_phase: project_phase.map(str::to_string),
                        title: draft.title,
                        summary: draft.summary,
                        scope: draft.scope,
                        estimate,
                        timeline,
                        clause_citation: analysis.clause_citation.clone(),
                        next_questions: draft.next_questions,
                        signature: draft.signature,
                    },
                };
            }
            Err(error) => {
                warn!(%error, "change-order LLM draft failed; falling back to template");
            }
        }
    }

    ChangeOrderPackResponse {
        generated_at: now_rfc3339(),
        model: None,
        pack: fallback_pack(client_name, project_phase, request, analysis, estimate),
    }
}

fn draft_with_llm(
    client: &LlmClient,
    sow_text: &str,
    request: &str,
    client_name: &str,
    project_phase: Option<&str>,
    analysis: &ScopeAnalysisSummary,
    estimate: ChangeOrderCommercials,
) -> Result<PackDraftWire, LlmError> {
    let schema = json!({
        "title": "string",
        "summary": "string (2-3 sentences)",
        "scope": {
            "inclusions": ["bullet strings"],
            "exclusions": ["bullet strings"],
            "assumptions": ["bullet strings"],
        },
        "timeline": {
            "duration": "string (e.g., 1-2 weeks)",
            "milestones": ["bullet strings"],
        },
        "nextQuestions": ["bullet strings"],
        "signature": {
            "clientLine": "string",
            "consultantLine": "string",
        },
    });

    let system = [
        "You are the consultancy's senior commercial counsel and deal desk lead.".to_string(),
        "Draft a one-page SOW addendum (change order pack) that a client can review and sign."
            .to_string(),
        "Return JSON only (no markdown, no extra keys).".to_string(),
        String::new(),
        "Tone: crisp, professional, non-adversarial. Avoid legalese. This is a draft for review (not legal advice).".to_string(),
        String::new(),
        "Output schema (keys must match exactly):".to_string(),
        serde_json::to_string_pretty(&schema).unwrap_or_default(),
        String::new(),
        "Constraints:".to_string(),
        "- Keep it approximately one page when rendered: short bullets, no long paragraphs."
            .to_string(),
        "- Use the provided estimate numbers exactly; do not invent pricing.".to_string(),
        "- Reference the provided clauseCitation in scope positioning (but do not paste large SOW sections).".to_string(),
        "- If key information is missing, use placeholders (e.g., [Client Name], [Effective Date]).".to_string(),
        "- Prefer 3-6 bullets per list. Keep milestones <= 4 items.".to_string(),
    ]
    .join("\n");

    let internal = json!({
        "verdict": analysis.verdict,
        "bucket": analysis.bucket,
        "estimate": analysis.estimate,
        "clauseCitation": analysis.clause_citation,
    });

    let user = format!(
        "Client: {client_name}\nProject phase: {}\n\nIncoming client request:\n{}\n\nScope analysis (internal):\n{}\n\nCommercials (use exactly):\n{}\n\nOriginal SOW (verbatim; use only as reference):\n{}",
        project_phase.unwrap_or("(not provided)"),
        clip(request, 6_000),
        serde_json::to_string_pretty(&internal).unwrap_or_default(),
        serde_json::to_string_pretty(&json!(estimate)).unwrap_or_default(),
        clip(sow_text, 80_000)
    );

    let value = client
        .complete_json(&ChatRequest::json(system, user, 1_200).with_temperature(0.2))?;
    let draft: PackDraftWire = serde_json::from_value(value)
        .map_err(|error| LlmError::SchemaMismatch(error.to_string()))?;

    if draft.title.trim().is_empty()
        || draft.summary.trim().is_empty()
        || draft.timeline.duration.trim().is_empty()
    {
        return Err(LlmError::SchemaMismatch(
            "pack draft must carry title, summary, and duration".to_string(),
        ));
    }

    Ok(draft)
}

fn fallback_pack(
    client_name: &str,
    project_phase: Option<&str>,
    request: &str,
    analysis: &ScopeAnalysisSummary,
    estimate: ChangeOrderCommercials,
) -> ChangeOrderPack {
    ChangeOrderPack {
        client: client_name.to_string(),
        project_phase: project_phase.map(str::to_string),
        title: title_from_request(request, 60),
        summary: "This addendum covers a client-requested change that is not included in the \
                  current SOW. It outlines the proposed scope, estimate, and timeline for \
                  approval."
            .to_string(),
        scope: ChangeOrderScope {
            inclusions: vec![
                "Implement the requested change as described in the client request".to_string(),
                "Update affected API/UI flows and validations".to_string(),
                "Add automated tests + regression coverage".to_string(),
                "Coordinate deployment and post-release verification".to_string(),
            ],
            exclusions: vec![
                "Does not include unrelated feature requests discovered during implementation"
                    .to_string(),
                "Third-party vendor contracts or paid tooling not included unless approved"
                    .to_string(),
            ],
            assumptions: vec![
                "Client provides timely access to required systems and stakeholders".to_string(),
                "Acceptance criteria confirmed before build starts".to_string(),
            ],
        },
        estimate,
        timeline: ChangeOrderTimeline {
            duration: duration_from_hours(estimate.engineering_hours),
            milestones: default_milestones(),
        },
        clause_citation: analysis.clause_citation.clone(),
        next_questions: vec![
            "Who is the primary approver for this change order?".to_string(),
            "Are there any deadline constraints or release windows we should plan around?"
                .to_string(),
            "What edge cases or permissions rules should be considered?".to_string(),
        ],
        signature: ChangeOrderSignature {
            client_line: "Client Authorized Signer: __________________  Date: __________"
                .to_string(),
            consultant_line: "Consultancy Authorized Signer: _____________  Date: __________"
                .to_string(),
        },
    }
}

/// Builds a title from the first request line, truncated politely.
fn title_from_request(request: &str, max_len: usize) -> String {
    let first_line = request
        .trim()
        .lines()
        .next()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    if first_line.is_empty() {
        return "Change Order".to_string();
    }
    if first_line.chars().count() <= max_len {
        return format!("Change Order: {first_line}");
    }
    let clipped: String = first_line.chars().take(max_len.saturating_sub(3)).collect();
    format!("Change Order: {}...", clipped.trim_end())
}

fn duration_from_hours(hours: f64) -> String {
    if hours <= 4.0 {
        "1-2 business days"
    } else if hours <= 10.0 {
        "2-4 business days"
    } else if hours <= 20.0 {
        "1-2 weeks"
    } else if hours <= 40.0 {
        "2-3 weeks"
    } else {
        "3-5 weeks"
    }
    .to_string()
}

fn default_milestones() -> Vec<String> {
    vec![
        "Confirm scope + acceptance criteria".to_string(),
        "Implement + QA".to_string(),
        "UAT support + rollout".to_string(),
    ]
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    //! Unit tests for pack drafting and template fallbacks.

    use crate::TshirtSize;

    use super::*;

    fn analysis() -> ScopeAnalysisSummary {
        ScopeAnalysisSummary {
            verdict: ScopeVerdict::OutOfScope,
            bucket: ScopeBucket::ChangeRequest,
            estimate: ScopeEstimate {
                size: TshirtSize::Medium,
                hours: 12.0,
                rationale: "New endpoint plus UI.".to_string(),
            },
            clause_citation: ClauseCitation {
                section: None,
                quote: "CSV export of any report".to_string(),
            },
        }
    }

    #[test]
    fn template_pack_is_complete_without_llm() {
        let response = draft_change_order_pack(
            None,
            "1. Scope...",
            "Add CSV export to the reporting page",
            "Acme Corp",
            Some("Development"),
            &analysis(),
            150.0,
        );

        assert_eq!(response.model, None);
        let pack = response.pack;
        assert_eq!(pack.title, "Change Order: Add CSV export to the reporting page");
        assert_eq!(pack.estimate.engineering_hours, 12.0);
        assert_eq!(pack.estimate.total_usd, 1_800.0);
        assert_eq!(pack.timeline.duration, "1-2 weeks");
        assert_eq!(pack.timeline.milestones.len(), 3);
        assert_eq!(pack.clause_citation.quote, "CSV export of any report");
        assert!(!pack.scope.inclusions.is_empty());
        assert!(!pack.signature.client_line.is_empty());
    }

    #[test]
    fn long_titles_are_clipped() {
        let request = "Please add a very long and extremely detailed export capability that \
                       covers every report in the system plus scheduling";
        let title = title_from_request(request, 60);
        assert!(title.starts_with("Change Order: "));
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 60 + "Change Order: ".len());
    }

    #[test]
    fn duration_bands_follow_hours() {
        assert_eq!(duration_from_hours(2.0), "1-2 business days");
        assert_eq!(duration_from_hours(8.0), "2-4 business days");
        assert_eq!(duration_from_hours(20.0), "1-2 weeks");
        assert_eq!(duration_from_hours(40.0), "2-3 weeks");
        assert_eq!(duration_from_hours(80.0), "3-5 weeks");
    }
}
