//! Pattern matching for expect operations

mod matcher;

pub use matcher::Match;

use crate::result::PatternError;
use matcher::{ExactMatcher, Matcher, RegexMatcher};
use regex::bytes::Regex;
use std::fmt;

/// Pattern types for matching console output.
///
/// # Examples
///
/// ```
/// use sonic_loader::Pattern;
///
/// // Exact string (fastest)
/// let p1 = Pattern::exact("GNU GRUB");
///
/// // Regular expression
/// let p2 = Pattern::regex(r"ONIE:/\w* #").unwrap();
///
/// // Special patterns
/// let p3 = Pattern::Eof;
/// let p4 = Pattern::Timeout;
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact string match, case preserving.
    ///
    /// Uses Boyer-Moore-Horspool; prefer it when the signature is fixed text.
    Exact(String),

    /// Regular expression match over raw bytes.
    Regex(Regex),

    /// Matches when the console process closes its output.
    Eof,

    /// Matches when the wait runs out of time.
    Timeout,
}

impl Pattern {
    /// Create an exact string pattern.
    ///
    /// ```
    /// use sonic_loader::Pattern;
    ///
    /// let pattern = Pattern::exact("Last login:");
    /// ```
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns a regex error if the pattern is invalid.
    ///
    /// ```
    /// use sonic_loader::Pattern;
    ///
    /// let pattern = Pattern::regex(r"sonic-(\w+ *)login:").unwrap();
    /// ```
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Check if this is a special pattern (EOF, Timeout)
    pub fn is_special(&self) -> bool {
        matches!(self, Pattern::Eof | Pattern::Timeout)
    }

    fn to_matcher(&self) -> Result<Option<Box<dyn Matcher>>, PatternError> {
        match self {
            Pattern::Exact(s) => Ok(Some(Box::new(ExactMatcher::new(s.as_bytes())?))),
            Pattern::Regex(r) => Ok(Some(Box::new(RegexMatcher::new(r.clone())))),
            Pattern::Eof | Pattern::Timeout => Ok(None),
        }
    }
}

/// An ordered list of patterns compiled once and reused across waits.
///
/// Matching is first-match-wins in list order: when two patterns both
/// match the unmatched output, the one listed earlier is reported, even
/// if the other one occurs earlier in the text. Callers encode
/// tie-breaking through the order they list patterns in.
///
/// ```
/// use sonic_loader::{Pattern, PatternSet};
///
/// let set = PatternSet::new(&[
///     Pattern::regex(r"sonic-(\w+ *)login:").unwrap(),
///     Pattern::regex(r"login:").unwrap(),
///     Pattern::Timeout,
/// ]).unwrap();
///
/// let (index, _) = set.find(b"sonic-lab7 login: ").unwrap();
/// assert_eq!(index, 0);
/// assert_eq!(set.timeout_index(), Some(2));
/// ```
pub struct PatternSet {
    patterns: Vec<Pattern>,
    matchers: Vec<(usize, Box<dyn Matcher>)>,
    eof: Option<usize>,
    timeout: Option<usize>,
}

impl PatternSet {
    /// Compile a list of patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if an exact pattern is empty.
    pub fn new(patterns: &[Pattern]) -> Result<Self, PatternError> {
        let mut matchers = Vec::new();
        let mut eof = None;
        let mut timeout = None;

        for (idx, pattern) in patterns.iter().enumerate() {
            match pattern {
                Pattern::Eof => {
                    eof.get_or_insert(idx);
                }
                Pattern::Timeout => {
                    timeout.get_or_insert(idx);
                }
                _ => {
                    if let Some(matcher) = pattern.to_matcher()? {
                        matchers.push((idx, matcher));
                    }
                }
            }
        }

        Ok(Self {
            patterns: patterns.to_vec(),
            matchers,
            eof,
            timeout,
        })
    }

    /// Find the first pattern (in list order) matching `buffer`.
    pub fn find(&self, buffer: &[u8]) -> Option<(usize, Match)> {
        self.matchers
            .iter()
            .find_map(|(idx, matcher)| matcher.find(buffer).map(|m| (*idx, m)))
    }

    /// Index of the `Eof` pattern, if the set has one.
    pub fn eof_index(&self) -> Option<usize> {
        self.eof
    }

    /// Index of the `Timeout` pattern, if the set has one.
    pub fn timeout_index(&self) -> Option<usize> {
        self.timeout
    }

    /// Number of patterns in the set, special patterns included.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the set has no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("patterns", &self.patterns)
            .finish()
    }
}
