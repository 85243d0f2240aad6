//! Defensive normalization of loosely-worded LLM output onto closed enums.
//!
//! Each function is pure and total: anything unrecognized maps to `None` so
//! the caller can apply bucket- or engagement-derived defaults instead of
//! trusting arbitrary wording deeper into the pipeline.

use serde_json::Value;

use crate::policy::{Engagement, ProjectPhase, Relatedness};
use crate::{ScopeBucket, ScopeEstimate, ScopeVerdict, TshirtSize};

/// Lowercases and collapses every non-alphanumeric run to one underscore.
pub fn normalize_underscored(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_underscore = false;
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_underscore && !out.is_empty() {
                out.push('_');
            }
            pending_underscore = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_underscore = true;
        }
    }
    out
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Maps loose verdict wording onto [`ScopeVerdict`].
pub fn normalize_verdict(value: &Value) -> Option<ScopeVerdict> {
    let normalized = normalize_underscored(as_str(value)?);
    if normalized.contains("out_of_scope") {
        return Some(ScopeVerdict::OutOfScope);
    }
    if normalized.contains("in_scope") {
        return Some(ScopeVerdict::InScope);
    }
    if normalized.contains("grey_area") || normalized.contains("gray_area") {
        return Some(ScopeVerdict::GreyArea);
    }
    None
}

/// Maps loose bucket wording onto [`ScopeBucket`].
pub fn normalize_bucket(value: &Value) -> Option<ScopeBucket> {
    let normalized = normalize_underscored(as_str(value)?);
    match normalized.as_str() {
        "bug_defect" => return Some(ScopeBucket::BugDefect),
        "clarification" => return Some(ScopeBucket::Clarification),
        "change_request" => return Some(ScopeBucket::ChangeRequest),
        _ => {}
    }
    if normalized.contains("bug") || normalized.contains("defect") {
        return Some(ScopeBucket::BugDefect);
    }
    if normalized.contains("clarif") {
        return Some(ScopeBucket::Clarification);
    }
    if normalized.contains("change") || normalized.contains("feature") || normalized.contains("new")
    {
        return Some(ScopeBucket::ChangeRequest);
    }
    None
}

/// Maps loose engagement wording onto [`Engagement`].
pub fn normalize_engagement(value: &Value) -> Option<Engagement> {
    let normalized = normalize_underscored(as_str(value)?);
    match normalized.as_str() {
        "investigate" => Some(Engagement::Investigate),
        "decline_unrelated" | "unrelated" => Some(Engagement::DeclineUnrelated),
        "proceed" | "ship" | "do_it" => Some(Engagement::Proceed),
        "clarify" | "clarification" => Some(Engagement::Clarify),
        "propose_change_order" | "change_order" | "estimate" | "quote" => {
            Some(Engagement::ProposeChangeOrder)
        }
        "new_project_offer" | "new_project" | "separate_project" | "new_scope" => {
            Some(Engagement::NewProjectOffer)
        }
        _ => None,
    }
}

/// Maps loose relatedness wording onto [`Relatedness`].
pub fn normalize_relatedness(value: &Value) -> Option<Relatedness> {
    let normalized = normalize_underscored(as_str(value)?);
    match normalized.as_str() {
        "in_project" | "related" => Some(Relatedness::InProject),
        "unknown" | "unclear" => Some(Relatedness::Unknown),
        "explicitly_unrelated" | "unrelated" | "out_of_project" => {
            Some(Relatedness::ExplicitlyUnrelated)
        }
        _ => None,
    }
}

/// Maps loose t-shirt wording onto [`TshirtSize`].
pub fn normalize_tshirt(value: &Value) -> Option<TshirtSize> {
    let normalized = normalize_underscored(as_str(value)?);
    match normalized.as_str() {
        "small" | "s" => return Some(TshirtSize::Small),
        "medium" | "m" => return Some(TshirtSize::Medium),
        "large" | "l" => return Some(TshirtSize::Large),
        _ => {}
    }
    if normalized.starts_with("sm") && !normalized.contains("medium") {
        return Some(TshirtSize::Small);
    }
    if normalized.starts_with("med") {
        return Some(TshirtSize::Medium);
    }
    if normalized.starts_with("lg") || normalized.contains("large") {
        return Some(TshirtSize::Large);
    }
    // Combined sizes collapse to the safer middle ground.
    let has_small = normalized.contains("small") || normalized.contains("sm");
    let has_medium = normalized.contains("medium") || normalized.contains("med");
    if has_small && has_medium {
        return Some(TshirtSize::Medium);
    }
    if has_medium {
        return Some(TshirtSize::Medium);
    }
    if has_small {
        return Some(TshirtSize::Small);
    }
    None
}

/// Normalizes a caller-supplied project phase string.
pub fn normalize_phase(phase: Option<&str>) -> ProjectPhase {
    let normalized = phase.unwrap_or_default().trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return ProjectPhase::Unknown;
    }
    if normalized.starts_with("des") {
        ProjectPhase::Design
    } else if normalized.starts_with("dev") {
        ProjectPhase::Development
    } else if normalized.starts_with("uat") {
        ProjectPhase::Uat
    } else {
        ProjectPhase::Unknown
    }
}

/// Derives a t-shirt size from an hour figure.
pub fn size_from_hours(hours: f64) -> TshirtSize {
    if !hours.is_finite() || hours <= 0.0 {
        return TshirtSize::Medium;
    }
    if hours <= 6.0 {
        TshirtSize::Small
    } else if hours <= 16.0 {
        TshirtSize::Medium
    } else {
        TshirtSize::Large
    }
}

/// Default estimate for a t-shirt size.
pub fn default_estimate(size: TshirtSize) -> ScopeEstimate {
    match size {
        TshirtSize::Small => ScopeEstimate {
            size,
            hours: 2.0,
            rationale: "Small change (~2 hours).".to_string(),
        },
        TshirtSize::Medium => ScopeEstimate {
            size,
            hours: 8.0,
            rationale: "Moderate change (~1 day).".to_string(),
        },
        TshirtSize::Large => ScopeEstimate {
            size,
            hours: 20.0,
            rationale: "Large change (20+ hours).".to_string(),
        },
    }
}
