#![warn(missing_docs)]
//! # preflight-heuristics
//!
//! ## Purpose
//! Computes deterministic structural signals over text samples.
//!
//! ## Responsibilities
//! - Score readability via the garbage-character ratio.
//! - Score context richness via word count and alpha ratio.
//! - Detect mixed date orderings and mixed currency markers.
//!
//! ## Data flow
//! Analyzer sample text -> [`compute_readability`] / [`compute_context_richness`]
//! / [`analyze_text_structure`] -> threshold checks in the per-kind analyzers.
//!
//! ## Error model
//! All computations are pure and total; empty input degrades to the declared
//! worst-case values instead of erroring.

use once_cell::sync::Lazy;
use regex::Regex;

static COMMON_UNICODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}\p{P}\p{S}]").expect("unicode class compiles"));

static MDY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0?[1-9]|1[0-2])[/.-](?:0?[1-9]|[12]\d|3[01])[/.-](?:19|20)\d{2}\b")
        .expect("month-first date pattern compiles")
});

static DMY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:0?[1-9]|[12]\d|3[01])[/.-](?:0?[1-9]|1[0-2])[/.-](?:19|20)\d{2}\b")
        .expect("day-first date pattern compiles")
});

static CURRENCY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:USD|EUR|GBP|JPY|CAD|AUD)\b").expect("iso code pattern compiles"));

const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Readability signal for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readability {
    /// Sample length in characters.
    pub text_length: usize,
    /// Garbage characters / total characters; 1.0 for empty input.
    pub garbage_ratio: f64,
}

/// Context-richness signal for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextRichness {
    /// Non-empty whitespace-split tokens.
    pub word_count: usize,
    /// Letters / non-whitespace characters; 0.0 when nothing remains.
    pub alpha_ratio: f64,
}

/// Format-consistency signals for one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureSignals {
    /// True only when both month-first and day-first dates appear.
    pub mixed_date_formats: bool,
    /// Distinct currency markers (symbols and ISO codes) found.
    pub currency_markers: Vec<String>,
}

/// Computes the garbage-character ratio of a sample.
///
/// A character counts as garbage when it is neither whitespace, printable
/// ASCII, nor a common Unicode letter/number/punctuation/symbol. Empty input
/// reports the worst-case ratio of 1.0.
pub fn compute_readability(text: &str) -> Readability {
    let mut total = 0usize;
    let mut garbage = 0usize;
    let mut buf = [0u8; 4];

    for ch in text.chars() {
        total += 1;
        if ch.is_whitespace() {
            continue;
        }
        let ascii_printable = ('\u{20}'..='\u{7e}').contains(&ch);
        if ascii_printable || COMMON_UNICODE_RE.is_match(ch.encode_utf8(&mut buf)) {
            continue;
        }
        garbage += 1;
    }

    if total == 0 {
        return Readability {
            text_length: 0,
            garbage_ratio: 1.0,
        };
    }

    Readability {
        text_length: total,
        garbage_ratio: garbage as f64 / total as f64,
    }
}

/// Computes word count and letter density of a sample.
pub fn compute_context_richness(text: &str) -> ContextRichness {
    let word_count = text.split_whitespace().count();

    let mut non_whitespace = 0usize;
    let mut letters = 0usize;
    for ch in text.chars() {
        if ch.is_whitespace() {
            continue;
        }
        non_whitespace += 1;
        if ch.is_alphabetic() {
            letters += 1;
        }
    }

    if non_whitespace == 0 {
        return ContextRichness {
            word_count,
            alpha_ratio: 0.0,
        };
    }

    ContextRichness {
        word_count,
        alpha_ratio: letters as f64 / non_whitespace as f64,
    }
}

/// Detects mixed date orderings and currency markers.
///
/// The mixed-date flag needs at least one month-first and one day-first match;
/// a single ambiguous format never triggers it. Currency markers collect the
/// fixed symbol set plus ISO code tokens, deduplicated.
pub fn analyze_text_structure(text: &str) -> StructureSignals {
    let mixed_date_formats = MDY_RE.is_match(text) && DMY_RE.is_match(text);

    let mut currency_markers: Vec<String> = Vec::new();
    for symbol in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            currency_markers.push(symbol.to_string());
        }
    }
    for found in CURRENCY_CODE_RE.find_iter(text) {
        let code = found.as_str().to_string();
        if !currency_markers.contains(&code) {
            currency_markers.push(code);
        }
    }

    StructureSignals {
        mixed_date_formats,
        currency_markers,
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for readability, richness, and structure signals.

    use super::*;

    #[test]
    fn empty_text_reports_worst_readability() {
        let readability = compute_readability("");
        assert_eq!(readability.text_length, 0);
        assert_eq!(readability.garbage_ratio, 1.0);
    }

    #[test]
    fn clean_ascii_has_zero_garbage() {
        let readability = compute_readability("plain invoice text 2024");
        assert_eq!(readability.garbage_ratio, 0.0);
    }

    #[test]
    fn control_characters_count_as_garbage() {
        let readability = compute_readability("ab\u{0000}\u{0001}");
        assert_eq!(readability.text_length, 4);
        assert!((readability.garbage_ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn richness_handles_whitespace_only_input() {
        let richness = compute_context_richness("   \n\t ");
        assert_eq!(richness.word_count, 0);
        assert_eq!(richness.alpha_ratio, 0.0);
    }

    #[test]
    fn mixed_dates_require_both_orderings() {
        let both = analyze_text_structure("billed 12/05/2023 and shipped 25/01/2023");
        assert!(both.mixed_date_formats);

        // 25 can only be a day, so only the day-first pattern matches.
        let single = analyze_text_structure("billed 25/01/2023 only");
        assert!(!single.mixed_date_formats);
    }

    #[test]
    fn currency_markers_mix_symbols_and_codes() {
        let signals = analyze_text_structure("$100 then 90 EUR then EUR again");
        assert_eq!(signals.currency_markers, vec!["$", "EUR"]);
    }
}
