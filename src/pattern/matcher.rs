//! Pattern matcher implementations

use crate::result::PatternError;
use regex::bytes::Regex;

/// Location of a pattern match inside a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Start position of the match
    pub start: usize,
    /// End position of the match
    pub end: usize,
    /// Captured groups (for regex)
    pub captures: Vec<String>,
}

/// Trait for pattern matching
pub trait Matcher: Send + Sync {
    /// Find a match in the buffer
    fn find(&self, buffer: &[u8]) -> Option<Match>;
}

/// Exact string matcher using Boyer-Moore-Horspool algorithm
pub struct ExactMatcher {
    pattern: Vec<u8>,
    bad_char_table: [usize; 256],
}

impl ExactMatcher {
    /// Create a new exact matcher
    pub fn new(pattern: impl Into<Vec<u8>>) -> Result<Self, PatternError> {
        let pattern = pattern.into();

        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let mut bad_char_table = [pattern.len(); 256];
        for (i, &byte) in pattern.iter().enumerate().take(pattern.len() - 1) {
            bad_char_table[byte as usize] = pattern.len() - 1 - i;
        }

        Ok(Self {
            pattern,
            bad_char_table,
        })
    }
}

impl Matcher for ExactMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        if buffer.len() < self.pattern.len() {
            return None;
        }

        let mut pos = 0;
        while pos + self.pattern.len() <= buffer.len() {
            if buffer[pos..pos + self.pattern.len()] == self.pattern[..] {
                return Some(Match {
                    start: pos,
                    end: pos + self.pattern.len(),
                    captures: vec![],
                });
            }

            let shift_char = buffer[pos + self.pattern.len() - 1];
            pos += self.bad_char_table[shift_char as usize];
        }

        None
    }
}

/// Regex matcher over raw bytes.
///
/// Console output routinely carries stray non-UTF-8 bytes (line noise,
/// half-stripped escape sequences), so matching never requires the
/// buffer to be valid UTF-8.
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Create a matcher from an already compiled regex
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl Matcher for RegexMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        let captures = self.regex.captures(buffer)?;
        let full_match = captures.get(0)?;

        let capture_strings = captures
            .iter()
            .flatten()
            .map(|cap| String::from_utf8_lossy(cap.as_bytes()).into_owned())
            .collect();

        Some(Match {
            start: full_match.start(),
            end: full_match.end(),
            captures: capture_strings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regex(pattern: &str) -> RegexMatcher {
        RegexMatcher::new(Regex::new(pattern).unwrap())
    }

    #[test]
    fn test_exact_matcher() {
        let matcher = ExactMatcher::new(b"login:").unwrap();
        let buffer = b"\r\nsonic login: ";

        let result = matcher.find(buffer).unwrap();
        assert_eq!(result.start, 8);
        assert_eq!(result.end, 14);
    }

    #[test]
    fn test_exact_matcher_not_found() {
        let matcher = ExactMatcher::new(b"GNU GRUB").unwrap();
        let buffer = b"Loading Linux 4.9.0 ...";

        assert!(matcher.find(buffer).is_none());
    }

    #[test]
    fn test_exact_matcher_empty_pattern() {
        assert!(ExactMatcher::new(b"").is_err());
    }

    #[test]
    fn test_exact_matcher_multiple_occurrences() {
        let matcher = ExactMatcher::new(b"ONIE").unwrap();
        let buffer = b"*ONIE: Install OS\r\n ONIE: Rescue";

        let result = matcher.find(buffer).unwrap();
        assert_eq!(result.start, 1);
    }

    #[test]
    fn test_exact_matcher_binary_data() {
        let matcher = ExactMatcher::new([0xFF, 0xFE, 0xFD]).unwrap();
        let buffer = b"prefix\xFF\xFE\xFDsuffix";

        let result = matcher.find(buffer).unwrap();
        assert_eq!(result.start, 6);
        assert_eq!(result.end, 9);
    }

    #[test]
    fn test_regex_matcher_with_captures() {
        let matcher = regex(r"sonic-(\w+ *)login:");
        let buffer = b"Debian GNU/Linux 9 sonic-lab7 login: ";

        let result = matcher.find(buffer).unwrap();
        assert_eq!(result.captures[0], "sonic-lab7 login:");
        assert_eq!(result.captures[1], "lab7 ");
    }

    #[test]
    fn test_regex_matcher_no_match() {
        let matcher = regex(r"ONIE:/\w* #");
        assert!(matcher.find(b"ONIE: Rescue").is_none());
    }

    #[test]
    fn test_regex_matcher_invalid_utf8_around_match() {
        let matcher = regex(r"[pP]assword:");
        let buffer = b"\xFF\xFBPassword: \xFE";

        let result = matcher.find(buffer).unwrap();
        assert_eq!(result.start, 2);
        assert_eq!(result.captures[0], "Password:");
    }

    #[test]
    fn test_regex_matcher_shell_prompts() {
        let user = regex(r"@[-\w_]*:[\w~/-]*\$");
        let root = regex(r"@[-\w_]*:[\w~/-]*#");

        assert!(user.find(b"admin@sonic:~$ ").is_some());
        assert!(root.find(b"admin@sonic:~$ ").is_none());
        assert!(root.find(b"root@sonic:/home/admin# ").is_some());
    }
}
