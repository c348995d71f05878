//! Built-in word lists used by the extractors.
//!
//! Kept deliberately small: deployments extend the curated set through
//! `extra_terms` rather than editing these tables.

/// Weighted abusive vocabulary for the profanity classifier.
/// Weight is the independent probability that a text containing the term is
/// abusive.
pub const PROFANITY_TERMS: &[(&str, f64)] = &[
    ("fuck", 0.95),
    ("fucking", 0.95),
    ("motherfucker", 0.98),
    ("shit", 0.85),
    ("bullshit", 0.85),
    ("bitch", 0.9),
    ("bastard", 0.85),
    ("asshole", 0.92),
    ("dickhead", 0.9),
    ("cunt", 0.98),
    ("idiot", 0.7),
    ("moron", 0.75),
    ("imbecile", 0.7),
    ("stupid", 0.45),
    ("dumb", 0.4),
    ("worthless", 0.45),
    ("pathetic", 0.4),
    ("garbage", 0.5),
    ("trash", 0.35),
    ("crap", 0.5),
    ("damn", 0.3),
    ("loser", 0.5),
    ("scumbag", 0.85),
    ("jackass", 0.8),
];

/// Multi-word phrases the pattern scanner treats as single curated terms.
pub const CURATED_PHRASES: &[&str] = &[
    "shut up",
    "go to hell",
    "piece of crap",
    "piece of shit",
    "screw you",
    "drop dead",
    "get lost",
];

/// Common obfuscated spellings.
pub const OBFUSCATIONS: &[&str] = &["fck", "sht", "dmn", "btch"];

/// Sentiment valence in [-4, 4].
pub const VALENCE: &[(&str, f64)] = &[
    // positive
    ("thanks", 1.9),
    ("thank", 1.5),
    ("great", 3.1),
    ("good", 1.9),
    ("help", 1.7),
    ("helpful", 1.8),
    ("happy", 2.7),
    ("love", 3.2),
    ("excellent", 2.7),
    ("appreciate", 1.7),
    ("nice", 1.8),
    ("awesome", 3.1),
    ("amazing", 2.8),
    ("perfect", 2.7),
    ("pleased", 1.9),
    ("wonderful", 2.7),
    ("fantastic", 2.6),
    ("friendly", 2.2),
    ("satisfied", 1.8),
    // negative
    ("bad", -2.5),
    ("terrible", -2.1),
    ("awful", -2.0),
    ("horrible", -2.5),
    ("hate", -2.7),
    ("angry", -2.3),
    ("disappointed", -1.9),
    ("disappointing", -2.2),
    ("worst", -3.1),
    ("useless", -1.8),
    ("rude", -2.0),
    ("unacceptable", -2.0),
    ("ridiculous", -1.6),
    ("pathetic", -2.0),
    ("stupid", -2.4),
    ("idiot", -2.3),
    ("moron", -2.2),
    ("dumb", -2.3),
    ("worthless", -1.9),
    ("garbage", -2.0),
    ("trash", -1.5),
    ("scam", -2.2),
    ("liar", -2.2),
    ("incompetent", -2.1),
    ("disgusting", -2.4),
    ("furious", -2.7),
    ("annoyed", -1.6),
    ("frustrated", -1.5),
    ("frustrating", -1.9),
    ("fraud", -2.3),
    ("damn", -1.7),
    ("crap", -1.6),
    ("shit", -2.6),
    ("fuck", -2.5),
    ("fucking", -2.5),
    ("problem", -1.7),
];

/// Words that flip the valence of what follows.
pub const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nobody", "neither", "nor", "cannot", "without",
];

/// Intensifiers that push valence further from zero.
pub const BOOSTERS: &[&str] = &[
    "very",
    "extremely",
    "really",
    "so",
    "totally",
    "absolutely",
    "completely",
    "incredibly",
    "utterly",
    "super",
];

pub fn valence(term: &str) -> Option<f64> {
    VALENCE.iter().find(|(t, _)| *t == term).map(|(_, v)| *v)
}

pub fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token) || token.ends_with("n't")
}

pub fn is_booster(token: &str) -> bool {
    BOOSTERS.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_are_probabilities() {
        assert!(PROFANITY_TERMS
            .iter()
            .all(|(_, w)| *w > 0.0 && *w < 1.0));
    }

    #[test]
    fn test_valence_bounds() {
        assert!(VALENCE.iter().all(|(_, v)| v.abs() <= 4.0));
    }

    #[test]
    fn test_negation_contraction() {
        assert!(is_negation("don't"));
        assert!(is_negation("never"));
        assert!(!is_negation("now"));
    }
}
