//! Curated-term pattern scanner.
//!
//! One case-insensitive, word-bounded alternation over the curated terms,
//! phrases and obfuscations. Each distinct match adds 0.5, capped at 1.0.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use tracing::warn;

use super::lexicon::{CURATED_PHRASES, OBFUSCATIONS, PROFANITY_TERMS};
use super::{check_input, SignalExtractor};
use crate::error::ExtractorError;
use crate::types::SignalScore;

/// Score contribution per distinct curated match.
const PER_MATCH: f64 = 0.5;
/// Compiled alternation size guard.
const REGEX_SIZE_LIMIT: usize = 4 * 1024 * 1024;

pub struct PatternScanner {
    matcher: Result<Regex, String>,
    max_bytes: usize,
}

impl PatternScanner {
    pub const NAME: &'static str = "pattern";

    /// Build with the built-in curated set plus `extra_terms`.
    ///
    /// A matcher that fails to compile leaves the scanner permanently
    /// unavailable instead of failing construction.
    pub fn new(extra_terms: &[String], max_bytes: usize) -> Self {
        let matcher = build_matcher(extra_terms);
        if let Err(e) = &matcher {
            warn!(error = %e, "Pattern scanner matcher failed to compile");
        }
        Self { matcher, max_bytes }
    }
}

fn build_matcher(extra_terms: &[String]) -> Result<Regex, String> {
    let mut terms: Vec<String> = PROFANITY_TERMS
        .iter()
        .map(|(t, _)| t.to_string())
        .chain(CURATED_PHRASES.iter().map(|p| p.to_string()))
        .chain(OBFUSCATIONS.iter().map(|o| o.to_string()))
        .chain(
            extra_terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        )
        .collect();
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();

    // Longest first so phrases win over the words inside them.
    let alternation = terms
        .iter()
        .map(|t| {
            t.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");

    RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| e.to_string())
}

impl SignalExtractor for PatternScanner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn try_score(&self, text: &str) -> Result<SignalScore, ExtractorError> {
        check_input(text, self.max_bytes)?;
        let matcher = self
            .matcher
            .as_ref()
            .map_err(|e| ExtractorError::Pattern(e.clone()))?;

        let matched: BTreeSet<String> = matcher
            .find_iter(text)
            .map(|m| {
                m.as_str()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .collect();

        let score = (matched.len() as f64 * PER_MATCH).min(1.0);
        Ok(SignalScore::available(
            Self::NAME,
            score,
            matched.into_iter().collect(),
        ))
    }
}
