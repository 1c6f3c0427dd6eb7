//! Result types for expect operations

mod error;

pub use error::{ExpectError, PatternError};

/// Result of a successful wait.
///
/// For the special patterns (`Eof`, `Timeout`) `matched` is empty and
/// `before` holds whatever unmatched output had accumulated.
///
/// # Examples
///
/// ```no_run
/// use sonic_loader::{Session, Pattern};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let mut session = Session::spawn("echo ONIE:/ #")?;
/// session.send_line("echo $boot_reason").await?;
/// let result = session.expect(Pattern::regex(r"ONIE:/\w* #")?).await?;
///
/// // Everything the installer printed between the two prompts
/// println!("Boot reason output: {}", result.before);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Index of the pattern that matched within the waited-on set.
    pub pattern_index: usize,

    /// The matched text.
    pub matched: String,

    /// Start position of the match in the buffer (byte offset).
    pub start: usize,

    /// End position of the match in the buffer (byte offset).
    pub end: usize,

    /// Text received after the previous match and before this one.
    ///
    /// This is where command output ends up when waiting for the prompt
    /// that follows the command.
    pub before: String,

    /// Captured groups (for regex patterns).
    ///
    /// Index 0 is the full match, 1+ are the groups. Empty for exact
    /// and special patterns.
    pub captures: Vec<String>,
}

impl MatchResult {
    /// Build a result for a special pattern (EOF or timeout) that matched
    /// without consuming any output.
    pub(crate) fn special(pattern_index: usize, position: usize, before: String) -> Self {
        Self {
            pattern_index,
            matched: String::new(),
            start: position,
            end: position,
            before,
            captures: vec![],
        }
    }
}
