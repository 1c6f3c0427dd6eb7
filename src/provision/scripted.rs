//! Scripted console for driving the provisioner in tests.

use std::collections::VecDeque;
use std::time::Duration;

use crate::pattern::PatternSet;
use crate::result::{ExpectError, MatchResult};
use crate::session::Console;

/// What the device does when the driver waits and nothing buffered matches.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Print text.
    Output(String),
    /// Stay quiet for the whole wait.
    Silence,
    /// Close the connection.
    Eof,
    /// Never answer; the wait only ends by cancellation.
    Hang,
}

pub(crate) fn output(text: &str) -> Step {
    Step::Output(text.to_string())
}

/// Replays a fixed transcript, one step per unsatisfied wait.
///
/// Lines sent to it are echoed into its output like a terminal in cooked
/// mode, so scripts only carry what the device prints on its own.
/// Running out of script behaves like the device going quiet.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConsole {
    script: VecDeque<Step>,
    buffer: Vec<u8>,
    matched: usize,
    eof: bool,
    echo: bool,
    /// Raw sends and lines, in order. Lines are recorded without their
    /// terminator.
    pub sent: Vec<String>,
    /// Timeout of every wait, in order.
    pub waits: Vec<Duration>,
}

impl ScriptedConsole {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: script.into_iter().collect(),
            echo: true,
            ..Self::default()
        }
    }

    /// Stop echoing sent lines.
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn sent_line(&self, line: &str) -> bool {
        self.sent.iter().any(|s| s == line)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn unmatched_text(&self) -> String {
        String::from_utf8_lossy(&self.buffer[self.matched..]).into_owned()
    }
}

impl Console for ScriptedConsole {
    async fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        self.sent.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        self.sent.push(line.to_string());
        if self.echo && !self.eof {
            self.buffer.extend_from_slice(line.as_bytes());
            self.buffer.extend_from_slice(b"\r\n");
        }
        Ok(())
    }

    async fn expect_within(
        &mut self,
        patterns: &PatternSet,
        timeout: Duration,
    ) -> Result<MatchResult, ExpectError> {
        self.waits.push(timeout);

        loop {
            if let Some((pattern_index, m)) = patterns.find(&self.buffer[self.matched..]) {
                let start = self.matched + m.start;
                let end = self.matched + m.end;
                let result = MatchResult {
                    pattern_index,
                    matched: String::from_utf8_lossy(&self.buffer[start..end]).into_owned(),
                    start,
                    end,
                    before: String::from_utf8_lossy(&self.buffer[self.matched..start])
                        .into_owned(),
                    captures: m.captures,
                };
                self.matched = end;
                return Ok(result);
            }

            if self.eof {
                let index = patterns.eof_index().ok_or(ExpectError::Eof)?;
                let before = self.unmatched_text();
                self.matched = self.buffer.len();
                return Ok(MatchResult::special(index, self.matched, before));
            }

            match self.script.pop_front().unwrap_or(Step::Silence) {
                Step::Output(text) => self.buffer.extend_from_slice(text.as_bytes()),
                Step::Eof => self.eof = true,
                Step::Silence => {
                    let index = patterns
                        .timeout_index()
                        .ok_or(ExpectError::Timeout { duration: timeout })?;
                    return Ok(MatchResult::special(
                        index,
                        self.buffer.len(),
                        self.unmatched_text(),
                    ));
                }
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    }
}
