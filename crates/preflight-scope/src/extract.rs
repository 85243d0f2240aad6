//! Heading-based SOW clause extraction.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ScopeExtraction;

/// Extraction result: clause lists plus the excerpt window sent to the LLM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSow {
    /// Bulleted clauses under an in-scope heading.
    pub deliverables: Vec<String>,
    /// Bulleted clauses under an out-of-scope heading.
    pub exclusions: Vec<String>,
    /// Text window around the scope sections.
    pub excerpt: String,
}

impl ExtractedSow {
    /// Returns the clause lists as wire-model extraction.
    pub fn to_extraction(&self) -> ScopeExtraction {
        ScopeExtraction {
            deliverables: self.deliverables.clone(),
            exclusions: self.exclusions.clone(),
        }
    }

    /// Returns `true` when neither clause list has content.
    pub fn is_empty(&self) -> bool {
        self.deliverables.is_empty() && self.exclusions.is_empty()
    }
}

static DELIVERABLES_HEADINGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)\bin scope\b", r"(?i)\bdeliverables\b", r"(?i)\bincluded\b"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("heading pattern compiles"))
        .collect()
});

static EXCLUSIONS_HEADINGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bout of scope\b",
        r"(?i)\bexclusions\b",
        r"(?i)\bnot included\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("heading pattern compiles"))
    .collect()
});

static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-•*]\s+(.*\S)\s*$").expect("bullet pattern compiles"));

static MAJOR_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\.\s+\S").expect("major heading pattern compiles"));

const EXCERPT_CAP: usize = 18_000;
const CLAUSE_CAP: usize = 30;

fn find_heading_line(lines: &[&str], patterns: &[Regex]) -> Option<usize> {
    lines
        .iter()
        .position(|line| patterns.iter().any(|pattern| pattern.is_match(line)))
}

fn find_next_major_heading(lines: &[&str], from: usize) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(from + 1)
        .find(|(_, line)| MAJOR_HEADING_RE.is_match(line))
        .map(|(index, _)| index)
}

/// Lines strictly between a heading and a section end, empty when inverted.
fn section_lines<'a, 'b>(lines: &'a [&'b str], heading: usize, end: usize) -> &'a [&'b str] {
    let begin = (heading + 1).min(lines.len());
    let end = end.clamp(begin, lines.len());
    &lines[begin..end]
}

fn extract_bullets(lines: &[&str]) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in lines {
        if let Some(captures) = BULLET_RE.captures(line) {
            let item = captures[1].trim().to_string();
            if !items.contains(&item) {
                items.push(item);
            }
        }
        if items.len() >= CLAUSE_CAP {
            break;
        }
    }
    items
}

/// Segments SOW text into deliverables, exclusions, and an excerpt window.
///
/// Segmentation stops at the next numbered major heading after the exclusions
/// section; without scope headings the whole document becomes the excerpt and
/// both clause lists stay empty.
pub fn extract_sow_context(text: &str) -> ExtractedSow {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();

    let deliverables_start = find_heading_line(&lines, &DELIVERABLES_HEADINGS);
    let exclusions_start = find_heading_line(&lines, &EXCLUSIONS_HEADINGS);

    let excerpt_start = match (deliverables_start, exclusions_start) {
        (Some(start), _) => start,
        (None, Some(start)) => start.saturating_sub(20),
        (None, None) => 0,
    };

    let mut excerpt_end = lines.len();
    if let Some(start) = exclusions_start
        && let Some(next_major) = find_next_major_heading(&lines, start)
    {
        excerpt_end = next_major;
    }
    let excerpt_end = excerpt_end.max(excerpt_start);

    let excerpt: String = lines[excerpt_start..excerpt_end]
        .join("\n")
        .trim()
        .chars()
        .take(EXCERPT_CAP)
        .collect();

    let deliverables_lines: &[&str] = match deliverables_start {
        Some(start) => {
            // An exclusions heading that precedes the deliverables heading
            // leaves the deliverables section empty.
            let end = exclusions_start.unwrap_or(excerpt_end);
            section_lines(&lines, start, end)
        }
        None => &[],
    };
    let exclusions_lines: &[&str] = match exclusions_start {
        Some(start) => section_lines(&lines, start, excerpt_end),
        None => &[],
    };

    ExtractedSow {
        deliverables: extract_bullets(deliverables_lines),
        exclusions: extract_bullets(exclusions_lines),
        excerpt,
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for heading segmentation and bullet capture.

    use super::*;

    const SOW: &str = "Statement of Work\n\
1. Overview\n\
This document defines the engagement.\n\
2. In Scope\n\
- Customer portal with login\n\
- PDF invoice export\n\
- Admin dashboard\n\
3. Out of Scope\n\
- CSV export of any report\n\
- Slack integration\n\
4. Timeline\n\
- Kickoff in March\n";

    #[test]
    fn captures_bullets_under_each_heading() {
        let extracted = extract_sow_context(SOW);
        assert_eq!(
            extracted.deliverables,
            vec![
                "Customer portal with login",
                "PDF invoice export",
                "Admin dashboard"
            ]
        );
        assert_eq!(
            extracted.exclusions,
            vec!["CSV export of any report", "Slack integration"]
        );
    }

    #[test]
    fn excerpt_stops_at_next_major_heading() {
        let extracted = extract_sow_context(SOW);
        assert!(extracted.excerpt.contains("In Scope"));
        assert!(extracted.excerpt.contains("Slack integration"));
        assert!(!extracted.excerpt.contains("Kickoff in March"));
    }

    #[test]
    fn headingless_text_yields_empty_clause_lists() {
        let extracted = extract_sow_context("just a paragraph about the project");
        assert!(extracted.is_empty());
        assert_eq!(extracted.excerpt, "just a paragraph about the project");
    }

    #[test]
    fn inverted_heading_order_does_not_panic() {
        // Exclusions heading ahead of the deliverables heading leaves the
        // deliverables section empty instead of producing a backwards range.
        let text = "Out of Scope\n- excluded item\nIn Scope\n- included item\n";
        let extracted = extract_sow_context(text);
        assert!(extracted.deliverables.is_empty());
        assert!(extracted.exclusions.contains(&"excluded item".to_string()));
    }

    #[test]
    fn duplicate_bullets_collapse() {
        let text = "In Scope\n- same item\n- same item\n- other item\n";
        let extracted = extract_sow_context(text);
        assert_eq!(extracted.deliverables, vec!["same item", "other item"]);
    }
}
