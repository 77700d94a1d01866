//! Error types and reporting for the shell.
//!
//! Every stage of the pipeline (lexing, parsing, expansion, redirection and
//! execution) returns a `ShellError` instead of a bare string. An error
//! carries:
//! - its kind, which also decides the exit status it maps to
//! - a human-readable message
//! - optional context about what input caused it
//! - an optional byte offset and line/column for pointing at the problem
//!
//! Two flags refine the kind: `incomplete` marks syntax errors caused by
//! running out of input (the reader may ask for a continuation line), and
//! `fatal` marks errors that must terminate a non-interactive shell.

use std::fmt;
use std::io;

/// Categorized error types for better diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token, e.g. an unterminated quote
    Lex,
    /// Unexpected token or unmatched construct
    Parse,
    /// Error during parameter/command/arithmetic/glob expansion
    Expansion,
    /// Error with input/output redirections
    Redirection,
    /// Error executing a command
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "syntax error"),
            ErrorKind::Parse => write!(f, "syntax error"),
            ErrorKind::Expansion => write!(f, "expansion error"),
            ErrorKind::Redirection => write!(f, "redirection error"),
            ErrorKind::Execution => write!(f, "execution error"),
        }
    }
}

/// Rich error type with context information
#[derive(Debug, Clone)]
pub struct ShellError {
    pub kind: ErrorKind,
    pub message: String,
    /// Additional context explaining what was being processed
    pub context: Option<String>,
    /// Byte offset in the input where the error occurred
    pub position: Option<usize>,
    /// 1-based line and column of `position`
    pub location: Option<(usize, usize)>,
    /// The input ended before the construct was complete
    pub incomplete: bool,
    /// The shell must stop (unbound variable under `set -u`)
    pub fatal: bool,
    /// Exit status override (126/127 for command lookup failures)
    pub status: Option<i32>,
}

impl ShellError {
    /// Create a new error with just the kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ShellError {
            kind,
            message: message.into(),
            context: None,
            position: None,
            location: None,
            incomplete: false,
            fatal: false,
            status: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn expansion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expansion, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    pub fn redirection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Redirection, message)
    }

    /// Add context string (e.g., "Expected: cmd < filename")
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add character position in input where error occurred
    pub fn with_position(mut self, pos: usize) -> Self {
        self.position = Some(pos);
        self
    }

    pub fn with_location(mut self, offset: usize, line: usize, column: usize) -> Self {
        self.position = Some(offset);
        self.location = Some((line, column));
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.incomplete = true;
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    /// Exit status a command reports when it fails with this error.
    pub fn exit_status(&self) -> i32 {
        if let Some(status) = self.status {
            return status;
        }
        match self.kind {
            ErrorKind::Lex | ErrorKind::Parse => 2,
            ErrorKind::Expansion | ErrorKind::Redirection | ErrorKind::Execution => 1,
        }
    }

    /// Format error with a snippet of the input showing where the problem is
    pub fn display_with_input(&self, input: &str) -> String {
        let mut msg = self.display_simple();

        if let Some(pos) = self.position {
            if pos < input.len() && input.is_char_boundary(pos) {
                // Show a snippet around the error position
                let mut start = pos.saturating_sub(15);
                while !input.is_char_boundary(start) {
                    start -= 1;
                }
                let mut end = (pos + 15).min(input.len());
                while !input.is_char_boundary(end) {
                    end += 1;
                }
                let snippet = &input[start..end];

                msg.push_str(&format!("\n  near: '{}'", snippet.replace('\n', "↵")));
                msg.push('\n');

                // Add a pointer to the exact position
                let offset = input[start..pos].chars().count();
                msg.push_str(&format!("  {}{}", " ".repeat(offset + 9), "^"));
            } else {
                msg.push_str("\n  at end of input");
            }
        }

        msg
    }

    /// Simplified display without input context
    pub fn display_simple(&self) -> String {
        let mut msg = match self.kind {
            ErrorKind::Lex | ErrorKind::Parse => match self.location {
                Some((line, column)) => {
                    format!("{} at {}:{}: {}", self.kind, line, column, self.message)
                }
                None => format!("{}: {}", self.kind, self.message),
            },
            _ => self.message.clone(),
        };
        if let Some(context) = &self.context {
            msg.push_str(&format!("\n  hint: {}", context));
        }
        msg
    }
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.display_simple())
    }
}

impl std::error::Error for ShellError {}

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::execution(err.to_string())
    }
}

impl From<nix::errno::Errno> for ShellError {
    fn from(err: nix::errno::Errno) -> Self {
        ShellError::execution(err.desc())
    }
}

/// Convenience type alias for Results with ShellError
pub type ShellResult<T> = Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_kind() {
        assert_eq!(ShellError::parse("x").exit_status(), 2);
        assert_eq!(ShellError::expansion("x").exit_status(), 1);
        assert_eq!(ShellError::execution("x").with_status(127).exit_status(), 127);
    }

    #[test]
    fn parse_errors_carry_location() {
        let err = ShellError::parse("unexpected token `fi'").with_location(4, 1, 5);
        assert_eq!(
            err.to_string(),
            "syntax error at 1:5: unexpected token `fi'"
        );
        let shown = err.display_with_input("if; fi");
        assert!(shown.contains("near: 'if; fi'"));
    }

    #[test]
    fn snippet_points_at_position() {
        let err = ShellError::expansion("bad").with_position(3);
        let shown = err.display_with_input("ab\ncd");
        assert!(shown.starts_with("bad\n  near: 'ab↵cd'"), "{shown}");
        assert!(shown.ends_with(&format!("{}^", " ".repeat(12))), "{shown}");
        let past_end = ShellError::parse("eof").with_position(10);
        assert!(past_end.display_with_input("x").ends_with("at end of input"));
    }
}
