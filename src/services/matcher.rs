//! Name matching for submitted guesses.

/// Shortest guess that may win on a substring match alone; anything shorter
/// must hit an exact full, first, or last name.
const MIN_SUBSTRING_GUESS: usize = 4;

/// Decides whether a submitted guess names the expected player.
///
/// The engine calls this once per submission and never inspects how the
/// decision was made.
pub trait NameMatcher: Send + Sync {
    /// Whether `guess` should be accepted for `reference`.
    fn matches(&self, guess: &str, reference: &str) -> bool;
}

/// Case-insensitive reference matcher: exact full-name match, exact first or
/// last name match, or a substring hit once the guess is long enough to be
/// unambiguous.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuzzyNameMatcher;

impl NameMatcher for FuzzyNameMatcher {
    fn matches(&self, guess: &str, reference: &str) -> bool {
        let guess = guess.trim().to_lowercase();
        if guess.is_empty() {
            return false;
        }

        let reference = reference.trim().to_lowercase();
        if guess == reference {
            return true;
        }

        let mut parts = reference.split_whitespace();
        let first = parts.next();
        let last = parts.next_back();
        if first == Some(guess.as_str()) || last == Some(guess.as_str()) {
            return true;
        }

        guess.chars().count() >= MIN_SUBSTRING_GUESS && reference.contains(&guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(guess: &str, reference: &str) -> bool {
        FuzzyNameMatcher.matches(guess, reference)
    }

    #[test]
    fn first_and_last_names_match_exactly() {
        assert!(matches("lebron", "LeBron James"));
        assert!(matches("james", "LeBron James"));
        assert!(matches("LEBRON JAMES", "LeBron James"));
    }

    #[test]
    fn unrelated_guess_is_rejected() {
        assert!(!matches("xyz", "LeBron James"));
        assert!(!matches("curry", "LeBron James"));
    }

    #[test]
    fn long_enough_substring_is_accepted() {
        assert!(matches("bron", "LeBron James"));
        assert!(!matches("bro", "LeBron James"));
    }

    #[test]
    fn blank_guess_never_matches() {
        assert!(!matches("", "LeBron James"));
        assert!(!matches("   ", "LeBron James"));
    }

    #[test]
    fn middle_names_do_not_break_last_name_matching() {
        assert!(matches("ming", "Yao Ming"));
        assert!(matches("gilgeous-alexander", "Shai Gilgeous-Alexander"));
    }
}
