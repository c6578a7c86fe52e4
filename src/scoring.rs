//! Similarity scoring between an original prompt and a guess, plus the
//! per-image point awards derived from it.

use crate::types::PlayerId;

/// Bonus for an image whose guesses averaged below [`STUMPER_THRESHOLD`].
pub const STUMPER_BONUS: u32 = 50;
pub const STUMPER_THRESHOLD: f64 = 40.0;

const JACCARD_WEIGHT: f64 = 0.6;
const LEVENSHTEIN_WEIGHT: f64 = 0.4;

/// Similarity between two strings in [0, 100].
///
/// Blends token-set Jaccard overlap with normalized Levenshtein distance so
/// that both word choice and spelling proximity count.
pub fn similarity(original: &str, guess: &str) -> u32 {
    let original = original.trim().to_lowercase();
    let guess = guess.trim().to_lowercase();

    if original == guess {
        return 100;
    }

    let tokens_a = tokenize(&original);
    let tokens_b = tokenize(&guess);

    let intersection = tokens_a.iter().filter(|t| tokens_b.contains(*t)).count();
    let union = tokens_a.len() + tokens_b.iter().filter(|t| !tokens_a.contains(*t)).count();
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };

    let len_a = original.chars().count();
    let len_b = guess.chars().count();
    let lev = if len_a.max(len_b) == 0 {
        1.0
    } else {
        1.0 - levenshtein(&original, &guess) as f64 / len_a.max(len_b) as f64
    };

    let blended = 100.0 * (JACCARD_WEIGHT * jaccard + LEVENSHTEIN_WEIGHT * lev);
    (blended.round() as i64).clamp(0, 100) as u32
}

/// Replace non-word, non-whitespace characters with spaces, then split.
/// Duplicate tokens collapse (set semantics).
fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

/// Char-based edit distance, single-row DP.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// One guesser's computed similarity for an image.
#[derive(Debug, Clone)]
pub struct GuessScore {
    pub player_id: PlayerId,
    pub score: u32,
}

/// Points awarded for one image after all its guesses are scored.
#[derive(Debug, Clone, Default)]
pub struct ImageAward {
    /// (guesser, points) — each guesser earns their similarity score.
    pub guesser_points: Vec<(PlayerId, u32)>,
    /// Stumper bonus for the creator, when the guesses averaged low.
    pub creator_bonus: Option<u32>,
}

/// Award points for one image. An empty score list yields nothing.
pub fn award_points(scores: &[GuessScore]) -> ImageAward {
    if scores.is_empty() {
        return ImageAward::default();
    }

    let guesser_points = scores
        .iter()
        .map(|s| (s.player_id.clone(), s.score))
        .collect();

    let mean = scores.iter().map(|s| s.score as f64).sum::<f64>() / scores.len() as f64;
    let creator_bonus = (mean < STUMPER_THRESHOLD).then_some(STUMPER_BONUS);

    ImageAward {
        guesser_points,
        creator_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(similarity("a blue cat", "a blue cat"), 100);
        assert_eq!(similarity("  A Blue Cat ", "a blue cat"), 100);
    }

    #[test]
    fn disjoint_strings_score_0() {
        // No shared tokens and no shared characters.
        assert_eq!(similarity("aaaa bbbb", "xyz wvu"), 0);
    }

    #[test]
    fn shared_tokens_raise_the_score() {
        let none = similarity("a blue cat", "xxxxxx");
        let one = similarity("a blue cat", "blue xxxxxx");
        let two = similarity("a blue cat", "a blue xxxxxx");
        assert!(none < one, "{none} < {one}");
        assert!(one < two, "{one} < {two}");
    }

    #[test]
    fn punctuation_splits_tokens() {
        // Punctuation-only differences keep full token overlap.
        assert!(similarity("a blue cat", "a blue, cat!") >= 90);
    }

    #[test]
    fn near_miss_spelling_scores_high() {
        let score = similarity("a blue cat", "a blue bat");
        assert!(score > 50, "got {score}");
        assert!(score < 100);
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn empty_scores_yield_no_award() {
        let award = award_points(&[]);
        assert!(award.guesser_points.is_empty());
        assert!(award.creator_bonus.is_none());
    }

    #[test]
    fn stumper_bonus_below_threshold() {
        let award = award_points(&[
            GuessScore {
                player_id: "bob".to_string(),
                score: 10,
            },
            GuessScore {
                player_id: "carol".to_string(),
                score: 20,
            },
        ]);
        assert_eq!(award.creator_bonus, Some(STUMPER_BONUS));
        assert_eq!(
            award.guesser_points,
            vec![("bob".to_string(), 10), ("carol".to_string(), 20)]
        );
    }

    #[test]
    fn no_bonus_at_or_above_threshold() {
        let award = award_points(&[
            GuessScore {
                player_id: "bob".to_string(),
                score: 40,
            },
            GuessScore {
                player_id: "carol".to_string(),
                score: 40,
            },
        ]);
        assert!(award.creator_bonus.is_none());
    }
}
