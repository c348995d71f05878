//! Signal extractors: independent scorers over a text span.
//!
//! Each extractor sits behind [`SignalExtractor`]. Failures never propagate:
//! [`SignalExtractor::score`] turns any internal error into an unavailable
//! zero score so one broken extractor cannot block the pipeline.
//!
//! ```text
//! text ─┬─ profanity  (weighted lexicon, de-obfuscated tokens)
//!       ├─ pattern    (curated terms and phrases, word-boundary regex)
//!       └─ sentiment  (valence lexicon with negation / boosters / emphasis)
//! ```

pub mod lexicon;
pub mod pattern;
pub mod profanity;
pub mod sentiment;

use tracing::warn;

use crate::config::ModerationConfig;
use crate::error::{ConfigError, ExtractorError};
use crate::types::SignalScore;

pub use pattern::PatternScanner;
pub use profanity::ProfanityClassifier;
pub use sentiment::SentimentScorer;

/// Names accepted as keys of `extractor_weights`.
pub const KNOWN_EXTRACTORS: &[&str] = &[
    ProfanityClassifier::NAME,
    PatternScanner::NAME,
    SentimentScorer::NAME,
];

/// Capability shared by all extractors.
pub trait SignalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score `text`; may fail on internal problems.
    fn try_score(&self, text: &str) -> Result<SignalScore, ExtractorError>;

    /// Score `text`, degrading to an unavailable zero score on failure.
    fn score(&self, text: &str) -> SignalScore {
        match self.try_score(text) {
            Ok(score) => score,
            Err(e) => {
                warn!(extractor = self.name(), error = %e, "Extractor unavailable, degrading to zero score");
                SignalScore::unavailable(self.name(), e.to_string())
            }
        }
    }
}

/// Shared input guard.
pub(crate) fn check_input(text: &str, limit: usize) -> Result<(), ExtractorError> {
    if text.trim().is_empty() {
        return Err(ExtractorError::EmptyInput);
    }
    if text.len() > limit {
        return Err(ExtractorError::InputTooLarge {
            len: text.len(),
            limit,
        });
    }
    Ok(())
}

/// The active extractor set, built from configuration.
pub struct SignalSet {
    extractors: Vec<Box<dyn SignalExtractor>>,
}

impl SignalSet {
    /// Register one extractor per key of `extractor_weights`.
    pub fn from_config(config: &ModerationConfig) -> Result<Self, ConfigError> {
        let mut extractors: Vec<Box<dyn SignalExtractor>> = Vec::new();
        for name in config.extractor_weights.keys() {
            let extractor: Box<dyn SignalExtractor> = match name.as_str() {
                ProfanityClassifier::NAME => {
                    Box::new(ProfanityClassifier::new(config.max_text_bytes))
                }
                PatternScanner::NAME => Box::new(PatternScanner::new(
                    &config.extra_terms,
                    config.max_text_bytes,
                )),
                SentimentScorer::NAME => Box::new(SentimentScorer::new(config.max_text_bytes)),
                other => return Err(ConfigError::UnknownExtractor(other.to_string())),
            };
            extractors.push(extractor);
        }
        Ok(Self { extractors })
    }

    /// Build from explicit extractors.
    pub fn with_extractors(extractors: Vec<Box<dyn SignalExtractor>>) -> Self {
        Self { extractors }
    }

    /// Run every extractor over `text`, in registration order.
    pub fn extract(&self, text: &str) -> Vec<SignalScore> {
        self.extractors.iter().map(|e| e.score(text)).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}
