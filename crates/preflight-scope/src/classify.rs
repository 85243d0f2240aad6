//! Scope classification: LLM signal, policy overlay, citation re-validation,
//! diplomat drafting, and the complete heuristic fallback.

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use preflight_core::DiplomatNote;
use preflight_llm::{ChatRequest, LlmClient, LlmError, number_like};

use crate::extract::{ExtractedSow, extract_sow_context};
use crate::normalize::{
    default_estimate, normalize_bucket, normalize_phase, normalize_relatedness, normalize_tshirt,
    normalize_verdict, size_from_hours,
};
use crate::policy::{Engagement, PhasePolicy, Relatedness};
use crate::{
    ClauseCitation, ScopeBucket, ScopeEstimate, ScopeExtraction, ScopeGuardResponse, ScopeVerdict,
    TshirtSize,
};

/// One classification request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeRequest {
    /// Incoming client request text.
    pub request: String,
    /// Caller-supplied project phase, free-form.
    pub project_phase: Option<String>,
    /// Correlation id for logs.
    pub request_id: Option<String>,
}

/// Classifier over one optional provider client and the phase policy.
#[derive(Clone)]
pub struct ScopeGuardAnalyzer {
    llm: Option<LlmClient>,
    policy: PhasePolicy,
}

impl ScopeGuardAnalyzer {
    /// Creates an analyzer; `llm: None` selects the heuristic-only path.
    pub fn new(llm: Option<LlmClient>, policy: PhasePolicy) -> Self {
        Self { llm, policy }
    }

    /// Classifies one request against SOW text.
    ///
    /// Always returns a complete response: LLM failures of any kind degrade
    /// to the heuristic fallback path.
    pub fn analyze(&self, sow_text: &str, request: &ScopeRequest) -> ScopeGuardResponse {
        let extracted = extract_sow_context(sow_text);

        if let Some(client) = &self.llm {
            match self.run_llm_analysis(client, &extracted, request) {
                Ok(classified) => {
                    return ScopeGuardResponse {
                        generated_at: now_rfc3339(),
                        model: Some(client.model().to_string()),
                        verdict: classified.verdict,
                        bucket: classified.bucket,
                        estimate: classified.estimate,
                        clause_citation: classified.clause_citation,
                        diplomat_response: classified.diplomat_response,
                        extracted: classified.extracted,
                    };
                }
                Err(error) => {
                    warn!(
                        request_id = request.request_id.as_deref().unwrap_or(""),
                        %error,
                        "scope LLM analysis failed; falling back to heuristics"
                    );
                }
            }
        }

        let fallback = fallback_analysis(&request.request, &extracted);
        ScopeGuardResponse {
            generated_at: now_rfc3339(),
            model: None,
            verdict: fallback.verdict,
            bucket: fallback.bucket,
            estimate: fallback.estimate,
            clause_citation: fallback.clause_citation,
            diplomat_response: fallback.diplomat_response,
            extracted: fallback.extracted,
        }
    }

    fn run_llm_analysis(
        &self,
        client: &LlmClient,
        extracted: &ExtractedSow,
        request: &ScopeRequest,
    ) -> Result<Classified, LlmError> {
        let value = client.complete_json(
            &ChatRequest::json(
                stage_a_system_prompt(),
                stage_a_user_prompt(extracted, request),
                1_200,
            )
            .with_temperature(0.1),
        )?;

        let (stage_a, coerced) = parse_stage_a(&value)?;
        if coerced {
            warn!(
                request_id = request.request_id.as_deref().unwrap_or(""),
                "stage-A response coerced onto the expected schema"
            );
        }

        let phase = normalize_phase(request.project_phase.as_deref());
        let raw_hours = stage_a.estimate.hours;
        let estimated_hours = if raw_hours.is_finite() && raw_hours > 0.0 {
            raw_hours.round()
        } else {
            default_estimate(stage_a.estimate.size).hours
        };
        let derived_size = size_from_hours(estimated_hours);

        let outcome = self
            .policy
            .apply(phase, stage_a.bucket, stage_a.relatedness, estimated_hours);

        let merged_extracted = merge_extraction(stage_a.extracted.as_ref(), extracted);

        let clause_citation =
            if is_vague_clause_citation(&stage_a.clause_citation.quote, &request.request) {
                pick_citation(&request.request, &merged_extracted, outcome.verdict)
            } else {
                stage_a.clause_citation.clone()
            };

        let triage_questions = if stage_a.triage_questions.is_empty() {
            bug_triage_defaults()
        } else {
            stage_a.triage_questions.clone()
        };

        let diplomat_response = if stage_a.bucket == ScopeBucket::BugDefect
            && outcome.engagement == Engagement::Investigate
        {
            bug_diplomat_note(&request.request, &triage_questions)
        } else {
            self.stage_b_diplomat(
                client,
                phase_label(phase),
                &stage_a,
                outcome.verdict,
                outcome.engagement,
                estimated_hours,
                &clause_citation,
            )?
        };

        info!(
            request_id = request.request_id.as_deref().unwrap_or(""),
            model = client.model(),
            policy_verdict = ?outcome.verdict,
            policy_engagement = ?outcome.engagement,
            estimated_hours,
            "scope LLM analysis ok"
        );

        Ok(Classified {
            verdict: outcome.verdict,
            bucket: stage_a.bucket,
            estimate: ScopeEstimate {
                size: derived_size,
                hours: estimated_hours,
                rationale: stage_a.estimate.rationale.clone(),
            },
            clause_citation,
            diplomat_response,
            extracted: merged_extracted,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn stage_b_diplomat(
        &self,
        client: &LlmClient,
        phase: &str,
        stage_a: &StageA,
        verdict: ScopeVerdict,
        engagement: Engagement,
        estimated_hours: f64,
        clause_citation: &ClauseCitation,
    ) -> Result<DiplomatNote, LlmError> {
        let assessment = json!({
            "verdict": verdict,
            "engagement": engagement,
            "bucket": stage_a.bucket,
            "relatedness": stage_a.relatedness,
            "estimate": {
                "size": size_from_hours(estimated_hours),
                "hours": estimated_hours,
                "rationale": stage_a.estimate.rationale,
            },
            "clauseCitation": clause_citation,
        });

        let user = format!(
            "Project phase: {phase}\nInternal assessment JSON (do not copy verbatim):\n{}",
            serde_json::to_string_pretty(&assessment).unwrap_or_default()
        );

        let value = client.complete_json(
            &ChatRequest::json(stage_b_system_prompt(), user, 700).with_temperature(0.2),
        )?;

        let note: DiplomatNote = serde_json::from_value(value)
            .map_err(|error| LlmError::SchemaMismatch(error.to_string()))?;
        if note.subject.trim().is_empty() || note.body.trim().is_empty() {
            return Err(LlmError::SchemaMismatch(
                "diplomat subject/body must be non-empty".to_string(),
            ));
        }
        Ok(note)
    }
}

/// Finalized classification prior to response assembly.
struct Classified {
    verdict: ScopeVerdict,
    bucket: ScopeBucket,
    estimate: ScopeEstimate,
    clause_citation: ClauseCitation,
    diplomat_response: DiplomatNote,
    extracted: ScopeExtraction,
}

/// Raw stage-A signal after normalization.
#[derive(Debug, Clone, PartialEq)]
struct StageA {
    bucket: ScopeBucket,
    estimate: ScopeEstimate,
    clause_citation: ClauseCitation,
    extracted: Option<ScopeExtraction>,
    relatedness: Relatedness,
    triage_questions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageAWire {
    #[allow(dead_code)]
    verdict: ScopeVerdict,
    bucket: ScopeBucket,
    estimate: EstimateWire,
    clause_citation: CitationWire,
    #[serde(default)]
    extracted: Option<ScopeExtraction>,
    #[allow(dead_code)]
    engagement: Engagement,
    relatedness: Relatedness,
    #[serde(default)]
    triage_questions: Vec<String>,
}

#[derive(Deserialize)]
struct EstimateWire {
    size: TshirtSize,
    hours: f64,
    rationale: String,
}

#[derive(Deserialize)]
struct CitationWire {
    #[serde(default)]
    section: Option<String>,
    quote: String,
}

/// Parses stage-A output: strict schema first, defensive coercion second.
///
/// # Errors
/// Returns [`LlmError::SchemaMismatch`] when even the coercion pass cannot
/// recover verdict, bucket, size, and citation.
fn parse_stage_a(value: &Value) -> Result<(StageA, bool), LlmError> {
    if let Ok(wire) = serde_json::from_value::<StageAWire>(value.clone()) {
        if !wire.clause_citation.quote.trim().is_empty() && !wire.estimate.rationale.is_empty() {
            return Ok((
                StageA {
                    bucket: wire.bucket,
                    estimate: ScopeEstimate {
                        size: wire.estimate.size,
                        hours: wire.estimate.hours,
                        rationale: wire.estimate.rationale,
                    },
                    clause_citation: ClauseCitation {
                        section: wire.clause_citation.section,
                        quote: wire.clause_citation.quote,
                    },
                    extracted: wire.extracted,
                    relatedness: wire.relatedness,
                    triage_questions: truncate_list(wire.triage_questions, 8),
                },
                false,
            ));
        }
    }

    coerce_stage_a(value)
        .map(|stage_a| (stage_a, true))
        .ok_or_else(|| {
            LlmError::SchemaMismatch("stage-A response missing required fields".to_string())
        })
}

/// Rebuilds stage-A output from arbitrarily shaped JSON.
fn coerce_stage_a(value: &Value) -> Option<StageA> {
    let raw = value.as_object()?;

    let bucket = raw
        .get("bucket")
        .or_else(|| raw.get("classification"))
        .and_then(normalize_bucket)?;
    // The verdict itself is later overridden by policy, but its absence means
    // the response is not a classification at all.
    raw.get("verdict").and_then(normalize_verdict)?;

    let estimate_like = raw.get("estimate").or_else(|| raw.get("estimation"));
    let estimate_record = estimate_like.and_then(Value::as_object);
    let size = estimate_record
        .and_then(|record| record.get("size").or_else(|| record.get("tshirt")))
        .or(estimate_like)
        .and_then(normalize_tshirt)?;
    let defaults = default_estimate(size);
    let hours = estimate_record
        .and_then(|record| record.get("hours"))
        .and_then(number_like)
        .unwrap_or(defaults.hours);
    let rationale = estimate_record
        .and_then(|record| record.get("rationale"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(defaults.rationale);

    let citation_like = raw
        .get("clauseCitation")
        .or_else(|| raw.get("clause_citation"));
    let citation_record = citation_like.and_then(Value::as_object);
    let quote = citation_record
        .and_then(|record| record.get("quote"))
        .and_then(Value::as_str)
        .or_else(|| citation_like.and_then(Value::as_str))?
        .to_string();
    let section = citation_record
        .and_then(|record| record.get("section"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let extracted = raw.get("extracted").and_then(Value::as_object).map(|record| {
        ScopeExtraction {
            deliverables: string_array(record.get("deliverables")),
            exclusions: string_array(record.get("exclusions")),
        }
    });

    let relatedness = ["relatedness", "related_to_project", "related"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(normalize_relatedness))
        .unwrap_or(match bucket {
            ScopeBucket::BugDefect => Relatedness::Unknown,
            _ => Relatedness::InProject,
        });

    let triage_questions = ["triageQuestions", "triage_questions", "questions", "details_needed"]
        .iter()
        .find_map(|key| raw.get(*key))
        .map(triage_list)
        .unwrap_or_default();

    Some(StageA {
        bucket,
        estimate: ScopeEstimate {
            size,
            hours,
            rationale,
        },
        clause_citation: ClauseCitation { section, quote },
        extracted,
        relatedness,
        triage_questions,
    })
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn triage_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => truncate_list(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            8,
        ),
        Value::String(text) => truncate_list(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            8,
        ),
        _ => Vec::new(),
    }
}

fn truncate_list(mut list: Vec<String>, cap: usize) -> Vec<String> {
    list.truncate(cap);
    list
}

fn merge_extraction(
    from_llm: Option<&ScopeExtraction>,
    heuristic: &ExtractedSow,
) -> ScopeExtraction {
    let llm = from_llm.cloned().unwrap_or_default();
    ScopeExtraction {
        deliverables: if llm.deliverables.is_empty() {
            heuristic.deliverables.clone()
        } else {
            llm.deliverables
        },
        exclusions: if llm.exclusions.is_empty() {
            heuristic.exclusions.clone()
        } else {
            llm.exclusions
        },
    }
}

static GENERIC_QUOTE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bthis document defines\b",
        r"(?i)\bdefines what is included\b",
        r"(?i)\bin\s+scope\b",
        r"(?i)\bout\s+of\s+scope\b",
        r"(?i)\bmvp\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("generic pattern compiles"))
    .collect()
});

/// Scores distinct request keywords (length >= 4) found in the haystack.
pub fn keyword_overlap_score(haystack: &str, needle: &str) -> usize {
    let haystack = haystack.to_lowercase();
    let cleaned: String = needle
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { ' ' })
        .collect();

    let mut seen: Vec<&str> = Vec::new();
    let mut score = 0;
    for word in cleaned.split_whitespace() {
        if word.len() < 4 || seen.contains(&word) {
            continue;
        }
        seen.push(word);
        if haystack.contains(word) {
            score += 1;
        }
    }
    score
}

/// Flags citations that are generic boilerplate or unrelated to the request.
pub fn is_vague_clause_citation(quote: &str, request: &str) -> bool {
    let quote = quote.trim();
    if quote.is_empty() {
        return true;
    }

    let generic = GENERIC_QUOTE_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(quote));
    let overlap = keyword_overlap_score(&quote.to_lowercase(), request);

    // A quote with no request overlap is never actionable; a generic quote
    // needs more than token overlap to stand.
    if overlap == 0 {
        return true;
    }
    generic && overlap <= 1
}

/// Picks the best supporting clause from the extraction for a verdict.
pub fn pick_citation(
    request: &str,
    extracted: &ScopeExtraction,
    verdict: ScopeVerdict,
) -> ClauseCitation {
    let request_lower = request.to_lowercase();
    let deliverables_text = extracted.deliverables.join("\n").to_lowercase();
    let exclusions_text = extracted.exclusions.join("\n").to_lowercase();

    let candidates = if verdict == ScopeVerdict::OutOfScope {
        &extracted.exclusions
    } else {
        &extracted.deliverables
    };

    let mut best: Option<&String> = None;
    let mut best_score = 0;
    for candidate in candidates {
        let score = keyword_overlap_score(&candidate.to_lowercase(), &request_lower);
        if score > best_score {
            best_score = score;
            best = Some(candidate);
        }
    }

    let Some(best) = best else {
        let fallback = if verdict == ScopeVerdict::OutOfScope {
            extracted.exclusions.first()
        } else {
            extracted.deliverables.first()
        };
        return ClauseCitation {
            section: None,
            quote: fallback.cloned().unwrap_or_else(|| {
                if verdict == ScopeVerdict::OutOfScope {
                    "Exclusions section does not explicitly cover this request.".to_string()
                } else {
                    "Deliverables section does not explicitly cover this request.".to_string()
                }
            }),
        };
    };

    // Common demo scenario: a CSV-export ask where only the exclusions
    // mention CSV must cite the exclusion, whatever the overlap says.
    if request_lower.contains("csv")
        && !deliverables_text.contains("csv")
        && exclusions_text.contains("csv")
    {
        let csv_clause = extracted
            .exclusions
            .iter()
            .find(|clause| clause.to_lowercase().contains("csv"))
            .unwrap_or(best);
        return ClauseCitation {
            section: None,
            quote: csv_clause.clone(),
        };
    }

    ClauseCitation {
        section: None,
        quote: best.clone(),
    }
}

static BUG_WORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(bug|broken|error|exception|crash|500|fails?)\b")
        .expect("bug pattern compiles")
});
static BUG_PHRASES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(not working|doesn't work|unable to)\b").expect("bug phrases compile")
});
static CLARIFY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(how do i|how to|can you clarify|clarify|what does|where do i)\b")
        .expect("clarify pattern compiles")
});
static HTTP_500_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b500\b").expect("status pattern compiles"));

/// Keyword-based bucket assignment for the fallback path.
pub fn guess_bucket(request: &str) -> ScopeBucket {
    if BUG_WORDS_RE.is_match(request) || BUG_PHRASES_RE.is_match(request) {
        return ScopeBucket::BugDefect;
    }
    if CLARIFY_RE.is_match(request) {
        return ScopeBucket::Clarification;
    }
    ScopeBucket::ChangeRequest
}

/// Complete heuristic classification with zero external calls.
fn fallback_analysis(request: &str, extracted: &ExtractedSow) -> Classified {
    let bucket = guess_bucket(request);

    let has_context = !extracted.is_empty();
    let verdict = if !has_context {
        ScopeVerdict::GreyArea
    } else if bucket == ScopeBucket::ChangeRequest {
        ScopeVerdict::OutOfScope
    } else {
        ScopeVerdict::InScope
    };

    let estimate = default_estimate(if verdict == ScopeVerdict::OutOfScope {
        TshirtSize::Medium
    } else {
        TshirtSize::Small
    });

    let extraction = extracted.to_extraction();
    let clause_citation = pick_citation(request, &extraction, verdict);
    let diplomat_response = fallback_diplomat_note(verdict, &clause_citation);

    Classified {
        verdict,
        bucket,
        estimate,
        clause_citation,
        diplomat_response,
        extracted: extraction,
    }
}

fn fallback_diplomat_note(verdict: ScopeVerdict, citation: &ClauseCitation) -> DiplomatNote {
    match verdict {
        ScopeVerdict::OutOfScope => DiplomatNote {
            subject: "Re: Feature request - scope review".to_string(),
            body: format!(
                "Hi [Client Name],\n\nThanks for the request - I reviewed it against our agreed Statement of Work.\nThis looks like new functionality that isn't included in the current scope.\n\nReference: {}\n\nHappy to put together a quick change order with an updated estimate and timeline. Would you like us to proceed?\n\nBest,\n[Your Name]",
                citation.quote
            ),
        },
        ScopeVerdict::GreyArea => DiplomatNote {
            subject: "Re: Request - quick scope clarification".to_string(),
            body: "Hi [Client Name],\n\nThanks - I want to make sure we align this with the SOW before we commit engineering time.\nCould you confirm the expected behavior and where this fits in the workflow?\n\nOnce confirmed, we'll advise whether it's in scope or needs a change order.\n\nBest,\n[Your Name]"
                .to_string(),
        },
        ScopeVerdict::InScope => DiplomatNote {
            subject: "Re: Request received".to_string(),
            body: "Hi [Client Name],\n\nThanks - this appears to be covered by our current scope. We'll proceed and share an update once it's in progress.\n\nBest,\n[Your Name]"
                .to_string(),
        },
    }
}

/// Standard triage questions when the model supplies none.
pub fn bug_triage_defaults() -> Vec<String> {
    [
        "What browser/device are you using?",
        "Rough time of occurrence (and timezone)?",
        "Steps to reproduce (if known)?",
        "Any screenshots or console/network errors?",
        "Whether it happens for all users or specific accounts?",
    ]
    .iter()
    .map(|question| question.to_string())
    .collect()
}

fn bug_subject_from_request(request: &str) -> String {
    let text = request.to_lowercase();
    if text.contains("login") {
        return "Regarding the reported login issue".to_string();
    }
    if HTTP_500_RE.is_match(&text) {
        return "Regarding the reported 500 error".to_string();
    }
    if text.contains("error") || text.contains("fails") || text.contains("crash") {
        return "Regarding the reported issue".to_string();
    }
    "Regarding your report".to_string()
}

/// Local template for bug reports; no second LLM call needed.
fn bug_diplomat_note(request: &str, triage_questions: &[String]) -> DiplomatNote {
    let questions = triage_questions
        .iter()
        .map(|question| format!("- {question}"))
        .collect::<Vec<_>>()
        .join("\n");

    DiplomatNote {
        subject: bug_subject_from_request(request),
        body: format!(
            "Thanks for flagging this.\n\nWe'll look into it and follow up once we've reproduced the issue or have clear next steps.\n\nIn the meantime, could you share:\n{questions}"
        ),
    }
}

fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { ' ' })
        .collect();

    let mut counts: Vec<(String, usize)> = Vec::new();
    for word in cleaned.split_whitespace() {
        if word.len() < 4 {
            continue;
        }
        match counts.iter_mut().find(|(existing, _)| existing.as_str() == word) {
            Some((_, count)) => *count += 1,
            None => counts.push((word.to_string(), 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(limit).map(|(word, _)| word).collect()
}

fn phase_label(phase: crate::policy::ProjectPhase) -> &'static str {
    match phase {
        crate::policy::ProjectPhase::Design => "design",
        crate::policy::ProjectPhase::Development => "development",
        crate::policy::ProjectPhase::Uat => "uat",
        crate::policy::ProjectPhase::Unknown => "unknown",
    }
}

fn stage_a_system_prompt() -> String {
    let schema = json!({
        "engagement": "investigate | decline_unrelated | proceed | clarify | propose_change_order | new_project_offer",
        "relatedness": "in_project | unknown | explicitly_unrelated",
        "verdict": "in_scope | grey_area | out_of_scope",
        "bucket": "bug_defect | clarification | change_request",
        "estimate": { "size": "small | medium | large", "hours": 12, "rationale": "string" },
        "clauseCitation": { "section": null, "quote": "verbatim SOW quote" },
        "extracted": { "deliverables": ["..."], "exclusions": ["..."] },
        "triageQuestions": ["optional strings (bugs only)"],
    });

    [
        "You are an impartial arbiter between a signed Statement of Work (SOW) and a new client request.".to_string(),
        "Classify the request and produce a traffic-light verdict based only on the provided SOW excerpt.".to_string(),
        String::new(),
        "Return JSON only (no markdown fences).".to_string(),
        String::new(),
        "Output schema (keys must match exactly; no snake_case):".to_string(),
        serde_json::to_string_pretty(&schema).unwrap_or_default(),
        "Rules:".to_string(),
        "- Use the exact key names above (camelCase) and include all keys except `extracted` (optional).".to_string(),
        "- `estimate.hours` must be a single NUMBER of engineering hours (no ranges, no strings). Round to a whole number.".to_string(),
        "- `estimate.size` must be exactly one of: small|medium|large (no combined sizes).".to_string(),
        "- `clauseCitation.quote` must be a short verbatim snippet from the excerpt that directly supports the verdict.".to_string(),
        "- The quote must be specific: it should mention the feature/domain in question (or the closest relevant deliverable/exclusion).".to_string(),
        "- Never use generic preamble text as the quote (e.g. 'This document defines...', 'In Scope/Out of Scope...').".to_string(),
        "- If the excerpt does not explicitly mention the request, set verdict=grey_area and cite the closest relevant language.".to_string(),
        String::new(),
        "Engagement policy:".to_string(),
        "- If the request is a bug/defect report: set bucket=bug_defect and engagement=investigate unless it is explicitly unrelated to this project.".to_string(),
        "- Only set engagement=decline_unrelated when the request clearly concerns a different system/vendor/unrelated work.".to_string(),
        "- Keep triageQuestions short and practical when bucket=bug_defect (max 5).".to_string(),
        String::new(),
        "Avoid duplication across cards:".to_string(),
        "- `estimate.rationale` is for Engineering Impact ONLY (what work drives the size, assumptions/risks).".to_string(),
        "- Do NOT restate the clause citation or re-litigate scope in `estimate.rationale`.".to_string(),
        String::new(),
        "Effort rubric (examples):".to_string(),
        "- In Development/UAT phases, include QA/regression, release overhead, and risk buffers (estimates should generally be higher than in Design).".to_string(),
        "- CSV export button (new endpoint + formatting + permissions + testing): often 6-16h depending on data size and requirements.".to_string(),
        "- Chat-notification integrations (webhook/app auth + event triggers + configuration + retries + security + testing): often 16-40h unless very narrowly scoped.".to_string(),
        "- Minor UI tweaks or copy changes: often 1-4h.".to_string(),
        String::new(),
        "Buckets:".to_string(),
        "- bug_defect: existing functionality promised in-scope is not working as described.".to_string(),
        "- clarification: questions about how an in-scope feature works.".to_string(),
        "- change_request: new feature / new deliverable / scope change (out of scope).".to_string(),
        String::new(),
        "Estimation (t-shirt): small ~2h, medium ~8h, large ~20h+".to_string(),
        String::new(),
        "Clause citation rules:".to_string(),
        "- Quote a short, verbatim snippet from the SOW excerpt that justifies your verdict.".to_string(),
        "- Prefer an explicit exclusion/deliverable line over a general section header.".to_string(),
        "- Keep the quote under 240 characters.".to_string(),
    ]
    .join("\n")
}

fn stage_a_user_prompt(extracted: &ExtractedSow, request: &ScopeRequest) -> String {
    let phase_line = match request.project_phase.as_deref() {
        Some(phase) if !phase.trim().is_empty() => format!("Project phase: {phase}"),
        _ => "Project phase: (not provided)".to_string(),
    };

    format!(
        "{phase_line}\n\nIncoming client request:\n{}\n\nRequest keywords: {}\n\nHeuristic extraction (may be incomplete):\nDeliverables: {}\nExclusions: {}\n\nSOW excerpt (quote from THIS text only):\n{}",
        request.request,
        top_keywords(&request.request, 10).join(", "),
        serde_json::to_string_pretty(&extracted.deliverables).unwrap_or_default(),
        serde_json::to_string_pretty(&extracted.exclusions).unwrap_or_default(),
        extracted.excerpt
    )
}

fn stage_b_system_prompt() -> String {
    [
        "You write a client-facing response email based on the provided internal assessment JSON.",
        "Return JSON only (no markdown fences).",
        "",
        "Output schema:",
        "{ \"subject\": \"string\", \"body\": \"string\" }",
        "",
        "Hard constraints:",
        "- Keep the tone soft, practical, and concise. No hard ETAs. Avoid words like 'immediately'.",
        "- Never include internal fields, verdicts, or confidence levels in the email.",
        "",
        "Phase-aware guidance for change requests:",
        "- design phase: collaborative; ask 1-2 clarifying questions; explain we can likely incorporate during design and reflect impact in an updated plan/SOW if needed.",
        "- development/uat with engagement=propose_change_order: explain it's not in the current scope/timeline; propose a change order with updated estimate.",
        "- engagement=new_project_offer: explain it's too large/late-stage for the current engagement; offer to scope it as a separate project.",
        "",
        "Guidance:",
        "- If engagement=propose_change_order: cite the clauseCitation quote briefly (1 sentence), then propose a change order discussion and ask 1-2 scoping questions.",
        "- If engagement=clarify: answer concisely and ask any missing detail. You may cite the quote briefly if helpful.",
        "- If engagement=decline_unrelated: explain why unrelated and suggest who should own it.",
        "- If engagement=new_project_offer: offer a brief scoping call and suggest next steps; avoid sounding dismissive.",
    ]
    .join("\n")
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    //! Unit tests for citation logic, coercion, and the fallback path.

    use std::sync::{Arc, Mutex};

    use preflight_llm::ChatTransport;

    use super::*;

    const SOW: &str = "1. Overview\n\
2. In Scope\n\
- Customer portal with login\n\
- PDF invoice export\n\
3. Out of Scope\n\
- CSV export of any report\n\
- Slack integration\n\
4. Timeline\n";

    struct ScriptedTransport {
        script: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
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

    fn analyzer_with(script: Vec<Result<String, String>>) -> ScopeGuardAnalyzer {
        let client = LlmClient::new(
            "https://provider.test/v1/chat/completions",
            "test-model",
            Arc::new(ScriptedTransport::new(script)),
        )
        .expect("valid endpoint");
        ScopeGuardAnalyzer::new(Some(client), PhasePolicy::default())
    }

    fn request(text: &str, phase: Option<&str>) -> ScopeRequest {
        ScopeRequest {
            request: text.to_string(),
            project_phase: phase.map(str::to_string),
            request_id: Some("req-1".to_string()),
        }
    }

    #[test]
    fn vague_citations_are_discarded() {
        assert!(is_vague_clause_citation("", "add csv export"));
        assert!(is_vague_clause_citation(
            "This document defines what is included.",
            "add csv export"
        ));
        assert!(!is_vague_clause_citation(
            "CSV export of any report",
            "please add a csv export of the report"
        ));
    }

    #[test]
    fn csv_special_case_cites_the_exclusion() {
        let extraction = ScopeExtraction {
            deliverables: vec!["Reporting dashboard".to_string()],
            exclusions: vec!["CSV export of any report".to_string()],
        };
        let citation = pick_citation(
            "can we get a csv export of the reporting data",
            &extraction,
            ScopeVerdict::GreyArea,
        );
        assert_eq!(citation.quote, "CSV export of any report");
    }

    #[test]
    fn fallback_classifies_bugs_in_scope() {
        let analyzer = ScopeGuardAnalyzer::new(None, PhasePolicy::default());
        let response = analyzer.analyze(SOW, &request("the login page throws a 500 error", None));

        assert_eq!(response.model, None);
        assert_eq!(response.bucket, ScopeBucket::BugDefect);
        assert_eq!(response.verdict, ScopeVerdict::InScope);
        assert!(!response.diplomat_response.body.is_empty());
        assert_eq!(
            response.extracted.deliverables,
            vec!["Customer portal with login", "PDF invoice export"]
        );
    }

    #[test]
    fn fallback_marks_change_requests_out_of_scope() {
        let analyzer = ScopeGuardAnalyzer::new(None, PhasePolicy::default());
        let response = analyzer.analyze(SOW, &request("please add slack integration", None));

        assert_eq!(response.bucket, ScopeBucket::ChangeRequest);
        assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(response.estimate.size, TshirtSize::Medium);
        assert!(response.diplomat_response.body.contains("change order"));
    }

    #[test]
    fn policy_overrides_llm_verdict_in_development() {
        // The model says in_scope, but a 15h change request in development
        // must come out as out_of_scope / propose_change_order.
        let stage_a = json!({
            "engagement": "proceed",
            "relatedness": "in_project",
            "verdict": "in_scope",
            "bucket": "change_request",
            "estimate": {"size": "medium", "hours": 15, "rationale": "New endpoint plus UI."},
            "clauseCitation": {"section": null, "quote": "CSV export of any report"},
            "triageQuestions": [],
        })
        .to_string();
        let stage_b = json!({"subject": "Re: your request", "body": "Happy to scope this."})
            .to_string();

        let response = analyzer_with(vec![Ok(stage_a), Ok(stage_b)]).analyze(
            SOW,
            &request("add csv export of any report", Some("Development")),
        );

        assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(response.bucket, ScopeBucket::ChangeRequest);
        assert_eq!(response.estimate.hours, 15.0);
        assert_eq!(response.estimate.size, TshirtSize::Medium);
        assert_eq!(response.model.as_deref(), Some("test-model"));
    }

    #[test]
    fn same_request_is_grey_area_in_design() {
        let stage_a = json!({
            "engagement": "proceed",
            "relatedness": "in_project",
            "verdict": "in_scope",
            "bucket": "change_request",
            "estimate": {"size": "medium", "hours": 15, "rationale": "New endpoint plus UI."},
            "clauseCitation": {"section": null, "quote": "CSV export of any report"},
        })
        .to_string();
        let stage_b = json!({"subject": "Re: your request", "body": "Let's fold this into design."})
            .to_string();

        let response = analyzer_with(vec![Ok(stage_a), Ok(stage_b)]).analyze(
            SOW,
            &request("add csv export of any report", Some("Design")),
        );

        assert_eq!(response.verdict, ScopeVerdict::GreyArea);
    }

    #[test]
    fn bug_reports_skip_the_second_llm_call() {
        let stage_a = json!({
            "engagement": "investigate",
            "relatedness": "unknown",
            "verdict": "in_scope",
            "bucket": "bug_defect",
            "estimate": {"size": "small", "hours": 2, "rationale": "Reproduce and patch."},
            "clauseCitation": {"section": null, "quote": "Customer portal with login"},
        })
        .to_string();

        // Only one scripted response: a second call would hit the outage and
        // push the whole flow into fallback.
        let response = analyzer_with(vec![Ok(stage_a)]).analyze(
            SOW,
            &request("users report the login fails with an error", None),
        );

        assert_eq!(response.model.as_deref(), Some("test-model"));
        assert_eq!(response.bucket, ScopeBucket::BugDefect);
        assert_eq!(response.verdict, ScopeVerdict::InScope);
        assert!(response.diplomat_response.body.contains("could you share"));
        assert!(
            response
                .diplomat_response
                .body
                .contains("Steps to reproduce")
        );
    }

    #[test]
    fn snake_case_output_is_coerced() {
        let stage_a = json!({
            "verdict": "Out of scope",
            "classification": "new feature",
            "estimation": {"tshirt": "M", "hours": "about 12 hours", "rationale": "Sizable."},
            "clause_citation": "CSV export of any report",
            "related": "in project",
        })
        .to_string();
        let stage_b = json!({"subject": "Re: request", "body": "We can scope this."}).to_string();

        let response = analyzer_with(vec![Ok(stage_a), Ok(stage_b)]).analyze(
            SOW,
            &request("add csv export of any report", Some("Development")),
        );

        assert_eq!(response.model.as_deref(), Some("test-model"));
        assert_eq!(response.bucket, ScopeBucket::ChangeRequest);
        // 12h in development: out_of_scope via change order.
        assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
        assert_eq!(response.estimate.hours, 12.0);
    }

    #[test]
    fn total_llm_garbage_falls_back_cleanly() {
        let response = analyzer_with(vec![Ok("not json at all".to_string())]).analyze(
            SOW,
            &request("please add slack integration", Some("Development")),
        );

        assert_eq!(response.model, None);
        assert_eq!(response.verdict, ScopeVerdict::OutOfScope);
        assert!(!response.diplomat_response.body.is_empty());
    }
}
