//! Rule-based address provider
//!
//! Offline stand-in for a verification service. It normalizes common
//! spellings and flags addresses that are structurally incomplete. Known
//! multi-tenant buildings can be registered so that addresses without a suite
//! are flagged with the corrected form as a suggestion.

use async_trait::async_trait;
use mailroom_core::models::Verdict;
use regex::Regex;
use std::sync::LazyLock;

use super::AddressProvider;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

static SPACE_BEFORE_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("static regex"));

static STREET_SUFFIXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bstreet\b\.?|\bst\.", "St"),
        (r"(?i)\bavenue\b\.?|\bave\.", "Ave"),
        (r"(?i)\bboulevard\b\.?|\bblvd\.", "Blvd"),
        (r"(?i)\broad\b\.?|\brd\.", "Rd"),
        (r"(?i)\bdrive\b\.?|\bdr\.", "Dr"),
        (r"(?i)\blane\b\.?|\bln\.", "Ln"),
        (r"(?i)\bste\b\.?", "Suite"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("static regex"), replacement))
    .collect()
});

// ", il 62701" at the end of the address.
static STATE_ZIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*([A-Za-z]{2})\s+(\d{5}(?:-\d{4})?)$").expect("static regex")
});

static TRAILING_ZIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{4})?$").expect("static regex"));

static STREET_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+[A-Z]?\s+\S|p\.?\s*o\.?\s+box\s+\d)").expect("static regex"));

static UNIT_DESIGNATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:(?:suite|unit|apt|floor|fl)\b|#)").expect("static regex"));

/// A building where mail is only deliverable with a suite designation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteRequirement {
    /// Street line as it appears after normalization, e.g. "100 Main St".
    pub street_line: String,
    /// Designation to insert, e.g. "Suite 100".
    pub suite: String,
}

impl SuiteRequirement {
    pub fn new(street_line: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            street_line: street_line.into(),
            suite: suite.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleBasedProvider {
    suite_requirements: Vec<SuiteRequirement>,
}

impl RuleBasedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suite_requirement(mut self, requirement: SuiteRequirement) -> Self {
        self.suite_requirements.push(requirement);
        self
    }

    /// Canonical spelling of `address`: single spaces, ", " separators,
    /// abbreviated street suffixes and an upper-case state code.
    pub fn normalize(address: &str) -> String {
        let collapsed = WHITESPACE.replace_all(address.trim(), " ");
        let mut normalized = SPACE_BEFORE_COMMA.replace_all(&collapsed, ", ").into_owned();
        for (pattern, replacement) in STREET_SUFFIXES.iter() {
            normalized = pattern.replace_all(&normalized, *replacement).into_owned();
        }
        STATE_ZIP
            .replace(&normalized, |caps: &regex::Captures| {
                format!(", {} {}", caps[1].to_uppercase(), &caps[2])
            })
            .into_owned()
    }

    /// Check a normalized address; `None` means no problem found.
    fn find_problem(&self, normalized: &str) -> Option<Verdict> {
        if normalized.is_empty() {
            return Some(Verdict::exception("empty address", None));
        }
        if !TRAILING_ZIP.is_match(normalized) {
            return Some(Verdict::exception("missing ZIP code", None));
        }
        if !STREET_NUMBER.is_match(normalized) {
            return Some(Verdict::exception("missing street number", None));
        }

        let parts: Vec<&str> = normalized.split(", ").collect();
        if parts.len() < 3 {
            return Some(Verdict::exception(
                "incomplete address, expected 'street, city, ST ZIP'",
                None,
            ));
        }
        if !STATE_ZIP.is_match(normalized) {
            return Some(Verdict::exception("missing state code", None));
        }

        let street = parts[0];
        let has_unit = parts[1..].iter().any(|p| UNIT_DESIGNATOR.is_match(p));
        if has_unit {
            return None;
        }
        self.suite_requirements
            .iter()
            .find(|r| r.street_line.eq_ignore_ascii_case(street))
            .map(|r| {
                let mut fixed = vec![street, r.suite.as_str()];
                fixed.extend_from_slice(&parts[1..]);
                Verdict::exception("missing suite", Some(fixed.join(", ")))
            })
    }
}

#[async_trait]
impl AddressProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        "rules"
    }

    async fn verify(&self, address: &str) -> anyhow::Result<Verdict> {
        let normalized = Self::normalize(address);
        if let Some(problem) = self.find_problem(&normalized) {
            return Ok(problem);
        }
        if normalized != address.trim() {
            return Ok(Verdict::AutoCorrected {
                corrected_address: normalized,
            });
        }
        Ok(Verdict::Valid)
    }
}
