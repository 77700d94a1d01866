//! Shell language front-end: tokens, lexer, parser and source regeneration.
//!
//! - `lexer` turns source text into tokens, keeping raw word text.
//! - `parser` builds the `ast::Node` tree with recursive descent.
//! - `regen` turns a tree back into source that parses to the same tree.
use crate::ast::Node;
use crate::error::{ShellError, ShellResult};

mod lexer;
mod parser;
mod regen;
mod token;

pub use lexer::{unquote_delimiter, Lexer};
pub use parser::Parser;
pub use regen::regenerate;
pub use token::{Keyword, Token, TokenKind};

/// Parse a complete program. The result is always a `Node::List`.
pub fn parse(input: &str) -> ShellResult<Node> {
    let mut parser = Parser::new(input);
    match parser.parse_program() {
        Some(node) => Ok(node),
        None => Err(parser
            .take_error()
            .unwrap_or_else(|| ShellError::parse("syntax error"))),
    }
}

/// True while `input` stops inside a construct, a quote or a
/// here-document, so a reader should collect another line.
pub fn needs_more_input(input: &str) -> bool {
    let mut parser = Parser::new(input);
    let _ = parser.parse_program();
    parser.needs_more_input()
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Function names also allow `-`, `.` and `:` after the first character.
pub fn is_function_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(is_name("_a1"));
        assert!(!is_name("1a"));
        assert!(!is_name("a-b"));
        assert!(is_function_name("git-up"));
        assert!(!is_function_name(""));
    }

    #[test]
    fn parse_reports_first_error() {
        let err = parse("echo )").unwrap_err();
        assert!(err.message.contains(")"));
        assert!(parse("").unwrap().is_empty_list());
    }
}
