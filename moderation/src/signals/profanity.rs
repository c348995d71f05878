//! Lexical/statistical profanity classifier.
//!
//! Tokens are normalised against common obfuscation before lookup, then each
//! distinct lexicon hit is treated as independent evidence:
//! `p = 1 − Π(1 − w_i)`.

use std::collections::BTreeMap;

use super::lexicon::PROFANITY_TERMS;
use super::{check_input, SignalExtractor};
use crate::error::ExtractorError;
use crate::types::SignalScore;

pub struct ProfanityClassifier {
    max_bytes: usize,
}

impl ProfanityClassifier {
    pub const NAME: &'static str = "profanity";

    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl SignalExtractor for ProfanityClassifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn try_score(&self, text: &str) -> Result<SignalScore, ExtractorError> {
        check_input(text, self.max_bytes)?;

        // term → weight, deduplicated and ordered for determinism
        let mut hits: BTreeMap<&'static str, f64> = BTreeMap::new();
        for raw in text.split_whitespace() {
            let token = normalize_token(raw);
            if token.is_empty() {
                continue;
            }
            if let Some((term, weight)) = lookup(&token) {
                hits.insert(term, weight);
            }
        }

        let clean = hits.values().fold(1.0, |acc, w| acc * (1.0 - w));
        let terms = hits.keys().map(|t| t.to_string()).collect();
        Ok(SignalScore::available(Self::NAME, 1.0 - clean, terms))
    }
}

/// Lowercase, strip surrounding punctuation, undo leetspeak and collapse
/// stretched letters (`fuuuuck` → `fuck`). `*` is kept as a mask character.
pub(crate) fn normalize_token(raw: &str) -> String {
    let trimmed =
        raw.trim_matches(|c: char| !c.is_alphanumeric() && !matches!(c, '*' | '@' | '$'));
    if !trimmed.chars().any(|c| c.is_alphabetic() || c == '*') {
        return String::new();
    }

    let mapped: String = trimmed
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            '0' => 'o',
            '1' | '!' => 'i',
            '3' => 'e',
            '4' | '@' => 'a',
            '5' | '$' => 's',
            '7' => 't',
            other => other,
        })
        .filter(|c| c.is_alphanumeric() || *c == '*')
        .collect();

    collapse_runs(&mapped)
}

/// Runs of three or more identical characters become one.
fn collapse_runs(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut j = i;
        while j < chars.len() && chars[j] == c {
            j += 1;
        }
        let run = j - i;
        if run >= 3 {
            out.push(c);
        } else {
            for _ in 0..run {
                out.push(c);
            }
        }
        i = j;
    }
    out
}

fn lookup(token: &str) -> Option<(&'static str, f64)> {
    let exact = |candidate: &str| {
        PROFANITY_TERMS
            .iter()
            .find(|(t, _)| *t == candidate)
            .map(|(t, w)| (*t, *w))
    };

    if let Some(hit) = exact(token) {
        return Some(hit);
    }
    if let Some(hit) = token.strip_suffix('s').and_then(exact) {
        return Some(hit);
    }
    if token.contains('*') {
        return PROFANITY_TERMS
            .iter()
            .find(|(t, _)| masked_match(token, t))
            .map(|(t, w)| (*t, *w));
    }
    None
}

/// `f*ck` matches `fuck`: same length, `*` matches any one character, and at
/// least two letters are visible.
fn masked_match(token: &str, term: &str) -> bool {
    if token.chars().count() != term.chars().count() {
        return false;
    }
    let visible = token.chars().filter(|c| *c != '*').count();
    visible >= 2
        && token
            .chars()
            .zip(term.chars())
            .all(|(a, b)| a == '*' || a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> SignalScore {
        ProfanityClassifier::new(64 * 1024).try_score(text).unwrap()
    }

    #[test]
    fn test_clean_text_scores_zero() {
        let s = score("Thanks for the quick help!");
        assert_eq!(s.score, 0.0);
        assert!(s.matched_terms.is_empty());
    }

    #[test]
    fn test_independent_evidence_combines() {
        let s = score("You are a worthless idiot and your company is garbage");
        // 1 - (0.55 * 0.3 * 0.5)
        assert!((s.score - 0.9175).abs() < 1e-9, "got {}", s.score);
        assert_eq!(s.matched_terms, vec!["garbage", "idiot", "worthless"]);
    }

    #[test]
    fn test_repeated_term_counts_once() {
        let once = score("idiot");
        let thrice = score("idiot idiot IDIOT!!!");
        assert_eq!(once.score, thrice.score);
    }

    #[test]
    fn test_obfuscation_is_normalized() {
        assert!(score("you 1d10t").score > 0.6);
        assert!(score("what a fuuuuck").score > 0.9);
        assert!(score("sh!t service").score > 0.8);
        assert!(score("f*ck this").score > 0.9);
        assert!(score("$hit").score > 0.8);
    }

    #[test]
    fn test_plural_is_matched() {
        assert_eq!(score("bunch of idiots").matched_terms, vec!["idiot"]);
    }

    #[test]
    fn test_mask_needs_visible_letters() {
        assert!(!masked_match("****", "fuck"));
        assert!(masked_match("f**k", "fuck"));
    }

    #[test]
    fn test_collapse_runs_keeps_doubles() {
        assert_eq!(collapse_runs("asshole"), "asshole");
        assert_eq!(collapse_runs("nooooo"), "no");
    }

    #[test]
    fn test_oversized_input_degrades() {
        let classifier = ProfanityClassifier::new(8);
        let s = classifier.score("this is far longer than eight bytes");
        assert!(!s.is_available());
    }
}
