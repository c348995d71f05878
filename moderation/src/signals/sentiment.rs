//! Lexicon-based sentiment polarity.
//!
//! Rule-based in the VADER manner: per-word valence, adjusted for negation,
//! boosters, ALL-CAPS emphasis, "but" contrast and exclamation marks, then
//! squashed with `s / sqrt(s² + α)`. The signal is the negative intensity.

use super::lexicon::{is_booster, is_negation, valence};
use super::{check_input, SignalExtractor};
use crate::error::ExtractorError;
use crate::types::SignalScore;

const ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
const CAPS_INCREMENT: f64 = 0.733;
const EXCLAMATION_INCREMENT: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
/// Compound at or below this counts as negative.
const NEGATIVE_CUTOFF: f64 = -0.05;
/// How far back negations and boosters reach.
const LOOKBACK: usize = 3;

pub struct SentimentScorer {
    max_bytes: usize,
}

/// Full polarity breakdown; the extractor only reports the negative side.
#[derive(Debug, Clone, PartialEq)]
pub struct Polarity {
    /// Normalised compound in [-1, 1].
    pub compound: f64,
    /// Words that ended up with negative valence.
    pub negative_terms: Vec<String>,
}

impl SentimentScorer {
    pub const NAME: &'static str = "sentiment";

    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn polarity(&self, text: &str) -> Polarity {
        let raw: Vec<&str> = text.split_whitespace().collect();
        let words: Vec<String> = raw.iter().map(|w| clean(w)).collect();
        let cap_differential = has_cap_differential(&raw);

        let mut valences: Vec<(usize, f64)> = Vec::new();
        for (i, word) in words.iter().enumerate() {
            let Some(base) = valence(word) else { continue };
            let mut v = base;

            if cap_differential && is_shouted(raw[i]) {
                v += CAPS_INCREMENT * v.signum();
            }

            for back in 1..=LOOKBACK.min(i) {
                if is_booster(&words[i - back]) {
                    let decay = 1.0 - 0.05 * (back - 1) as f64;
                    v += BOOSTER_INCREMENT * decay * v.signum();
                }
            }

            if (1..=LOOKBACK.min(i)).any(|back| is_negation(&words[i - back])) {
                v *= NEGATION_SCALAR;
            }

            valences.push((i, v));
        }

        // "but" shifts weight to the second clause
        if let Some(pivot) = words.iter().position(|w| w == "but") {
            for (i, v) in valences.iter_mut() {
                if *i < pivot {
                    *v *= 0.5;
                } else if *i > pivot {
                    *v *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().map(|(_, v)| v).sum();
        let bangs = text.matches('!').count().min(MAX_EXCLAMATIONS);
        let emphasis = bangs as f64 * EXCLAMATION_INCREMENT;
        if sum > 0.0 {
            sum += emphasis;
        } else if sum < 0.0 {
            sum -= emphasis;
        }

        let compound = if sum == 0.0 {
            0.0
        } else {
            (sum / (sum * sum + ALPHA).sqrt()).clamp(-1.0, 1.0)
        };

        let negative_terms = valences
            .iter()
            .filter(|(_, v)| *v < 0.0)
            .map(|(i, _)| words[*i].clone())
            .collect();

        Polarity {
            compound,
            negative_terms,
        }
    }
}

impl SignalExtractor for SentimentScorer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn try_score(&self, text: &str) -> Result<SignalScore, ExtractorError> {
        check_input(text, self.max_bytes)?;
        let polarity = self.polarity(text);
        let score = if polarity.compound <= NEGATIVE_CUTOFF {
            -polarity.compound
        } else {
            0.0
        };
        Ok(SignalScore::available(
            Self::NAME,
            score,
            polarity.negative_terms,
        ))
    }
}

fn clean(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

fn is_shouted(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

/// Some words shouted while others are not.
fn has_cap_differential(words: &[&str]) -> bool {
    let shouted = words.iter().filter(|w| is_shouted(w)).count();
    let alphabetic = words
        .iter()
        .filter(|w| w.chars().filter(|c| c.is_alphabetic()).count() > 1)
        .count();
    shouted > 0 && shouted < alphabetic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> SentimentScorer {
        SentimentScorer::new(64 * 1024)
    }

    #[test]
    fn test_positive_text_has_no_negative_signal() {
        let p = scorer().polarity("Thanks for the quick help!");
        assert!(p.compound > 0.5);
        let s = scorer().try_score("Thanks for the quick help!").unwrap();
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_insult_is_strongly_negative() {
        let s = scorer()
            .try_score("You are a worthless idiot and your company is garbage")
            .unwrap();
        // -6.2 / sqrt(6.2² + 15)
        assert!((s.score - 0.8481).abs() < 1e-3, "got {}", s.score);
        assert_eq!(s.matched_terms, vec!["worthless", "idiot", "garbage"]);
    }

    #[test]
    fn test_negation_flips_positive() {
        let s = scorer().try_score("I am not happy with this").unwrap();
        // 2.7 * -0.74 = -1.998
        assert!((s.score - 0.4583).abs() < 1e-3, "got {}", s.score);
        assert_eq!(s.matched_terms, vec!["happy"]);
    }

    #[test]
    fn test_negation_dampens_negative() {
        let p = scorer().polarity("this is not bad");
        assert!(p.compound > 0.0);
    }

    #[test]
    fn test_booster_and_caps_intensify() {
        let plain = scorer().polarity("the service was bad today").compound;
        let boosted = scorer().polarity("the service was very bad today").compound;
        let shouted = scorer().polarity("the service was BAD today").compound;
        assert!(boosted < plain);
        assert!(shouted < plain);
    }

    #[test]
    fn test_all_caps_text_gets_no_cap_bonus() {
        let shouted = scorer().polarity("BAD SERVICE").compound;
        let plain = scorer().polarity("bad service").compound;
        assert_eq!(shouted, plain);
    }

    #[test]
    fn test_but_shifts_weight() {
        let p = scorer().polarity("the staff were nice but the product is terrible");
        assert!(p.compound < 0.0);
    }

    #[test]
    fn test_exclamations_add_emphasis() {
        let calm = scorer().polarity("this is awful").compound;
        let loud = scorer().polarity("this is awful!!!").compound;
        assert!(loud < calm);
    }

    #[test]
    fn test_neutral_text() {
        let p = scorer().polarity("The parcel arrived on Tuesday");
        assert_eq!(p.compound, 0.0);
    }
}
