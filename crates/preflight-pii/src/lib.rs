#![warn(missing_docs)]
//! # preflight-pii
//!
//! ## Purpose
//! Detects and masks personally identifiable information in text samples.
//!
//! ## Responsibilities
//! - Match emails, SSNs, and credit-card candidates with compiled patterns.
//! - Reject credit-card candidates that fail the Luhn checksum.
//! - Redact previously detected matches for safe display and transmission.
//!
//! ## Data flow
//! Analyzer sample text -> [`scan_pii`] -> [`PiiScan`] -> [`mask_text`] /
//! [`masked_examples`] consumed by finding construction and previews.
//!
//! ## Ownership and lifetimes
//! Scan results own their match strings; masking returns a fresh string and
//! never mutates the input.
//!
//! ## Error model
//! Detection and masking are pure and infallible; patterns are compiled once
//! at first use.
//!
//! ## Security and privacy notes
//! Masking trusts the scan result and never re-derives matches, so candidates
//! that failed checksum validation are left untouched. Masked output contains
//! no raw match for any detected category, which makes masking idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("email pattern compiles")
});

static SSN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern compiles"));

static CC_CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]*?){13,19}\b").expect("card pattern compiles"));

/// Transient detection result for one analyzer invocation.
///
/// Each category is deduplicated by string identity in first-seen order.
/// Credit cards are stored as bare digit strings after checksum validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PiiScan {
    /// Detected email addresses.
    pub emails: Vec<String>,
    /// Detected social security numbers.
    pub ssns: Vec<String>,
    /// Luhn-valid credit-card digit strings.
    pub credit_cards: Vec<String>,
}

impl PiiScan {
    /// Returns `true` when no category matched.
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.ssns.is_empty() && self.credit_cards.is_empty()
    }

    /// Total detections across all categories.
    pub fn total(&self) -> usize {
        self.emails.len() + self.ssns.len() + self.credit_cards.len()
    }
}

/// Validates a digit string with the Luhn checksum.
///
/// Returns `false` for empty input or any non-digit character.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut sum: u32 = 0;
    let mut double = false;
    for ch in digits.chars().rev() {
        let Some(digit) = ch.to_digit(10) else {
            return false;
        };

        let mut addend = digit;
        if double {
            addend *= 2;
            if addend > 9 {
                addend -= 9;
            }
        }
        sum += addend;
        double = !double;
    }

    sum % 10 == 0
}

/// Scans text for emails, SSNs, and Luhn-valid credit-card numbers.
///
/// Pure and deterministic; output order follows first appearance and
/// duplicates within a category collapse to one entry.
pub fn scan_pii(text: &str) -> PiiScan {
    let mut scan = PiiScan::default();

    for found in EMAIL_RE.find_iter(text) {
        push_unique(&mut scan.emails, found.as_str());
    }

    for found in SSN_RE.find_iter(text) {
        push_unique(&mut scan.ssns, found.as_str());
    }

    for found in CC_CANDIDATE_RE.find_iter(text) {
        let digits: String = found.as_str().chars().filter(char::is_ascii_digit).collect();
        if digits.len() < 13 || digits.len() > 19 {
            continue;
        }
        if !luhn_valid(&digits) {
            continue;
        }
        push_unique(&mut scan.credit_cards, &digits);
    }

    scan
}

fn push_unique(values: &mut Vec<String>, candidate: &str) {
    if !values.iter().any(|existing| existing == candidate) {
        values.push(candidate.to_string());
    }
}

/// Replaces every detected match in `text` with its redacted form.
///
/// Only matches present in `scan` are rewritten; digit runs that were not
/// validated stay untouched so false positives are never redacted.
pub fn mask_text(text: &str, scan: &PiiScan) -> String {
    let mut masked = text.to_string();

    for email in &scan.emails {
        masked = masked.replace(email.as_str(), &mask_email(email));
    }
    for ssn in &scan.ssns {
        masked = masked.replace(ssn.as_str(), &mask_ssn(ssn));
    }

    CC_CANDIDATE_RE
        .replace_all(&masked, |captures: &regex::Captures<'_>| {
            let raw = &captures[0];
            let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
            if scan.credit_cards.iter().any(|card| card == &digits) {
                mask_card(&digits)
            } else {
                raw.to_string()
            }
        })
        .into_owned()
}

/// Redacts an email as `first-char***@domain`.
pub fn mask_email(email: &str) -> String {
    let mut parts = email.splitn(2, '@');
    let (Some(user), Some(domain)) = (parts.next(), parts.next()) else {
        return "***@***".to_string();
    };
    let Some(first) = user.chars().next() else {
        return "***@***".to_string();
    };
    format!("{first}***@{domain}")
}

/// Redacts an SSN as `***-**-last4`.
pub fn mask_ssn(ssn: &str) -> String {
    let last4: String = tail_chars(ssn, 4);
    format!("***-**-{last4}")
}

/// Redacts a card digit string as `**** **** **** last4`.
pub fn mask_card(digits: &str) -> String {
    let last4: String = tail_chars(digits, 4);
    format!("**** **** **** {last4}")
}

fn tail_chars(value: &str, count: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    chars[chars.len().saturating_sub(count)..].iter().collect()
}

/// Returns masked example strings, at most three per category, in the fixed
/// order emails, SSNs, credit cards.
pub fn masked_examples(scan: &PiiScan) -> Vec<String> {
    let mut examples = Vec::new();
    examples.extend(scan.emails.iter().take(3).map(|email| mask_email(email)));
    examples.extend(scan.ssns.iter().take(3).map(|ssn| mask_ssn(ssn)));
    examples.extend(scan.credit_cards.iter().take(3).map(|card| mask_card(card)));
    examples
}

#[cfg(test)]
mod tests {
    //! Unit tests for detection, checksum validation, and masking.

    use super::*;

    #[test]
    fn luhn_accepts_known_valid_and_rejects_transposed() {
        assert!(luhn_valid("4242424242424242"));
        assert!(!luhn_valid("4242424242424241"));
        // Leading zeros do not change the weighted sum.
        assert!(luhn_valid("0004242424242424242"));
        assert!(!luhn_valid("4242-4242"));
        assert!(!luhn_valid(""));
    }

    #[test]
    fn scan_dedupes_within_categories() {
        let text = "a@b.com A@B.COM a@b.com 123-45-6789 123-45-6789";
        let scan = scan_pii(text);
        assert_eq!(scan.emails, vec!["a@b.com", "A@B.COM"]);
        assert_eq!(scan.ssns, vec!["123-45-6789"]);
    }

    #[test]
    fn scan_discards_non_luhn_digit_runs() {
        let scan = scan_pii("card 4242 4242 4242 4242 bogus 1234 5678 9012 3456");
        assert_eq!(scan.credit_cards, vec!["4242424242424242"]);
    }

    #[test]
    fn masking_redacts_all_detected_categories() {
        let text = "mail bob@corp.io ssn 123-45-6789 card 4242 4242 4242 4242";
        let scan = scan_pii(text);
        let masked = mask_text(text, &scan);
        assert!(masked.contains("b***@corp.io"));
        assert!(masked.contains("***-**-6789"));
        assert!(masked.contains("**** **** **** 4242"));
        assert!(!masked.contains("bob@corp.io"));
        assert!(!masked.contains("123-45-6789"));
    }

    #[test]
    fn masking_is_idempotent() {
        let text = "bob@corp.io 123-45-6789 4242424242424242";
        let scan = scan_pii(text);
        let once = mask_text(text, &scan);
        let twice = mask_text(&once, &scan);
        assert_eq!(once, twice);
    }

    #[test]
    fn masking_leaves_unvalidated_runs_alone() {
        let text = "ref 1234 5678 9012 3456";
        let scan = scan_pii(text);
        assert!(scan.credit_cards.is_empty());
        assert_eq!(mask_text(text, &scan), text);
    }

    #[test]
    fn examples_follow_fixed_category_order() {
        let scan = PiiScan {
            emails: vec!["a@b.com".into()],
            ssns: vec!["123-45-6789".into()],
            credit_cards: vec!["4242424242424242".into()],
        };
        let examples = masked_examples(&scan);
        assert_eq!(
            examples,
            vec!["a***@b.com", "***-**-6789", "**** **** **** 4242"]
        );
    }
}
