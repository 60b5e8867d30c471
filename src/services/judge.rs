//! Free-text answer judging.
//!
//! Exact comparison on normalized text first, then a bounded edit-distance
//! fallback so near-misses ("keybord") still count. The judge never fails;
//! a verdict always comes back.

/// Correctness verdict for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the submission matches the canonical answer.
    pub is_correct: bool,
}

/// Judge a submission against the canonical answer.
pub fn check(user_answer: &str, correct_answer: &str) -> Verdict {
    let submitted = normalize(user_answer);
    let canonical = normalize(correct_answer);

    if submitted.is_empty() {
        return Verdict { is_correct: false };
    }

    if submitted == canonical {
        return Verdict { is_correct: true };
    }

    let distance = edit_distance(&submitted, &canonical);
    Verdict {
        is_correct: distance <= typo_budget(canonical.chars().count()),
    }
}

/// Lowercase, strip punctuation, and collapse runs of whitespace so casing
/// and articles of style don't fail honest answers.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Edits tolerated for a canonical answer of the given length.
fn typo_budget(canonical_len: usize) -> usize {
    match canonical_len {
        0..=4 => 0,
        5..=8 => 1,
        _ => 2,
    }
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_correct() {
        assert!(check("a keyboard", "a keyboard").is_correct);
    }

    #[test]
    fn casing_and_punctuation_are_ignored() {
        assert!(check("A Keyboard!", "a keyboard").is_correct);
        assert!(check("  a   keyboard ", "a keyboard").is_correct);
    }

    #[test]
    fn small_typos_are_tolerated_on_longer_answers() {
        assert!(check("keybord", "keyboard").is_correct);
        assert!(check("an echoo", "an echo").is_correct);
    }

    #[test]
    fn short_answers_require_exactness() {
        assert!(!check("fog", "dog").is_correct);
        assert!(check("dog", "dog").is_correct);
    }

    #[test]
    fn wrong_answers_are_rejected() {
        assert!(!check("a piano", "a keyboard").is_correct);
        assert!(!check("", "a keyboard").is_correct);
        assert!(!check("   ", "a keyboard").is_correct);
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }
}
