//! Lexer for shell source.
//!
//! Produces one token at a time with a single token of lookahead. Word tokens
//! keep their raw text (quotes, escapes and substitution spans included) so
//! the expansion engine sees exactly what was written.
//!
//! Here-document bodies are read eagerly: when the delimiter word after `<<`
//! is lexed, the body lines following the current line are collected and
//! queued, and those lines are skipped once the lexer reaches the end of the
//! current line.
use std::collections::VecDeque;

use log::warn;

use super::token::{Keyword, Token, TokenKind};
use crate::ast::HereDoc;

// Bound nesting depth to avoid pathological recursion in command substitution.
const MAX_SUBST_DEPTH: usize = 32;

#[derive(Copy, Clone, Eq, PartialEq)]
enum Shape {
    Plain,
    Single,
    Double,
    Subst,
}

pub struct Lexer {
    input: String,
    pos: usize,
    line: usize,
    column: usize,
    keywords: bool,
    command_position: bool,
    after_function: bool,
    subst_depth: usize,
    // Set after `<<`/`<<-`; the next word is a heredoc delimiter.
    heredoc_pending: Option<bool>,
    // Where the next body starts when several heredocs share a line.
    heredoc_resume: Option<usize>,
    // Offset of the newline after which the consumed bodies are skipped.
    heredoc_skip: Option<usize>,
    heredocs: VecDeque<HereDoc>,
    heredoc_unterminated: bool,
    error_incomplete: bool,
    current: Token,
    peeked: Option<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            keywords: true,
            command_position: true,
            after_function: false,
            subst_depth: 0,
            heredoc_pending: None,
            heredoc_resume: None,
            heredoc_skip: None,
            heredocs: VecDeque::new(),
            heredoc_unterminated: false,
            error_incomplete: false,
            current: Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line: 1,
                column: 1,
                offset: 0,
            },
            peeked: None,
        };
        lexer.current = lexer.lex_token();
        lexer
    }

    /// Lex the whole input, `Eof` included. Stops after the first `Error`.
    pub fn tokenize(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.advance();
            let done = matches!(token.kind, TokenKind::Eof | TokenKind::Error);
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            let token = self.lex_token();
            self.peeked = Some(token);
        }
        match &self.peeked {
            Some(token) => token,
            None => &self.current,
        }
    }

    /// Move to the next token, returning the one that was current.
    pub fn advance(&mut self) -> Token {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.lex_token(),
        };
        std::mem::replace(&mut self.current, next)
    }

    pub fn matches(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub fn consume(&mut self, kind: TokenKind) -> Option<Token> {
        if self.matches(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub fn set_keyword_recognition(&mut self, enabled: bool) {
        self.keywords = enabled;
    }

    /// Next queued here-document body, in delimiter order.
    pub fn take_heredoc(&mut self) -> Option<HereDoc> {
        self.heredocs.pop_front()
    }

    /// Some heredoc reached end of input before its delimiter line.
    pub fn heredoc_unterminated(&self) -> bool {
        self.heredoc_unterminated
    }

    /// The last `Error` token was caused by running out of input.
    pub fn error_incomplete(&self) -> bool {
        self.error_incomplete
    }

    fn lex_token(&mut self) -> Token {
        let mut token = self.scan();
        if token.kind == TokenKind::Word && self.keywords && self.command_position {
            if let Some(kw) = Keyword::from_word(&token.text) {
                token.kind = TokenKind::Keyword(kw);
            }
        }
        match token.kind {
            TokenKind::DLess => self.heredoc_pending = Some(false),
            TokenKind::DLessDash => self.heredoc_pending = Some(true),
            kind if kind.is_word() => {}
            _ => self.heredoc_pending = None,
        }
        // `function name {`: the body opens right after the name.
        let after_function = std::mem::replace(
            &mut self.after_function,
            token.kind == TokenKind::Keyword(Keyword::Function),
        );
        self.command_position =
            token.kind.opens_command() || (after_function && token.kind.is_word());
        token
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_blanks(&mut self) {
        loop {
            match self.peek_char() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('\\') if self.peek_char_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                Some('#') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize, line: usize, column: usize) -> Token {
        Token {
            kind,
            text: self.input[start..self.pos].to_string(),
            line,
            column,
            offset: start,
        }
    }

    fn error_token(&mut self, message: String, start: usize, line: usize, column: usize) -> Token {
        self.error_incomplete = self.pos >= self.input.len();
        self.pos = self.input.len();
        Token {
            kind: TokenKind::Error,
            text: message,
            line,
            column,
            offset: start,
        }
    }

    fn scan(&mut self) -> Token {
        self.skip_blanks();
        let (start, line, column) = (self.pos, self.line, self.column);
        let Some(ch) = self.peek_char() else {
            return self.token(TokenKind::Eof, start, line, column);
        };
        let kind = match ch {
            '\n' => {
                self.bump();
                self.finish_line(start);
                TokenKind::Newline
            }
            ';' => {
                self.bump();
                if self.peek_char() == Some(';') {
                    self.bump();
                    TokenKind::DoubleSemicolon
                } else {
                    TokenKind::Semicolon
                }
            }
            '&' => {
                self.bump();
                match self.peek_char() {
                    Some('&') => {
                        self.bump();
                        TokenKind::LogicalAnd
                    }
                    Some('>') => {
                        self.bump();
                        if self.peek_char() == Some('>') {
                            self.bump();
                            TokenKind::AndDGreat
                        } else {
                            TokenKind::AndGreat
                        }
                    }
                    _ => TokenKind::Ampersand,
                }
            }
            '|' => {
                self.bump();
                if self.peek_char() == Some('|') {
                    self.bump();
                    TokenKind::LogicalOr
                } else {
                    TokenKind::Pipe
                }
            }
            '(' => {
                self.bump();
                TokenKind::LParen
            }
            ')' => {
                self.bump();
                TokenKind::RParen
            }
            '<' | '>' => self.scan_redirect(),
            _ => {
                let digits = self.rest().bytes().take_while(u8::is_ascii_digit).count();
                if digits > 0 && matches!(self.rest().as_bytes().get(digits), Some(b'<' | b'>')) {
                    for _ in 0..digits {
                        self.bump();
                    }
                    self.scan_redirect()
                } else {
                    return self.scan_word(start, line, column);
                }
            }
        };
        self.token(kind, start, line, column)
    }

    fn scan_redirect(&mut self) -> TokenKind {
        match self.bump() {
            Some('<') => match self.peek_char() {
                Some('<') => {
                    self.bump();
                    match self.peek_char() {
                        Some('<') => {
                            self.bump();
                            TokenKind::TLess
                        }
                        Some('-') => {
                            self.bump();
                            TokenKind::DLessDash
                        }
                        _ => TokenKind::DLess,
                    }
                }
                Some('&') => {
                    self.bump();
                    TokenKind::LessAnd
                }
                _ => TokenKind::Less,
            },
            _ => match self.peek_char() {
                Some('>') => {
                    self.bump();
                    TokenKind::DGreat
                }
                Some('&') => {
                    self.bump();
                    TokenKind::GreatAnd
                }
                Some('|') => {
                    self.bump();
                    TokenKind::Great
                }
                _ => TokenKind::Great,
            },
        }
    }

    fn scan_word(&mut self, start: usize, line: usize, column: usize) -> Token {
        let mut text = String::new();
        let mut pieces = 0usize;
        let mut shape = Shape::Plain;
        while let Some(ch) = self.peek_char() {
            let result = match ch {
                ' ' | '\t' | '\r' | '\n' | ';' | '&' | '|' | '<' | '>' | '(' | ')' => break,
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some('\n') => continue,
                        Some(escaped) => {
                            text.push('\\');
                            text.push(escaped);
                        }
                        None => text.push('\\'),
                    }
                    shape = Shape::Plain;
                    Ok(())
                }
                '\'' => {
                    shape = Shape::Single;
                    self.scan_single(&mut text)
                }
                '"' => {
                    shape = Shape::Double;
                    self.scan_double(&mut text)
                }
                '`' => {
                    shape = Shape::Subst;
                    self.scan_backtick(&mut text)
                }
                '$' if self.peek_char_at(1) == Some('(') => {
                    shape = if self.peek_char_at(2) == Some('(') {
                        Shape::Plain
                    } else {
                        Shape::Subst
                    };
                    self.scan_dollar_paren(&mut text)
                }
                '$' if self.peek_char_at(1) == Some('{') => {
                    shape = Shape::Plain;
                    self.scan_param(&mut text)
                }
                _ => {
                    self.bump();
                    text.push(ch);
                    shape = Shape::Plain;
                    Ok(())
                }
            };
            if let Err(message) = result {
                return self.error_token(message, start, line, column);
            }
            pieces += 1;
        }

        if let Some(strip_tabs) = self.heredoc_pending.take() {
            self.read_heredoc(&text, strip_tabs);
        }

        let kind = match (pieces, shape) {
            (1, Shape::Single) => TokenKind::LiteralString,
            (1, Shape::Double) => TokenKind::ExpandableString,
            (1, Shape::Subst) => TokenKind::CommandSubst,
            _ => TokenKind::Word,
        };
        Token {
            kind,
            text,
            line,
            column,
            offset: start,
        }
    }

    fn scan_single(&mut self, text: &mut String) -> Result<(), String> {
        self.bump();
        text.push('\'');
        loop {
            match self.bump() {
                Some('\'') => {
                    text.push('\'');
                    return Ok(());
                }
                Some(ch) => text.push(ch),
                None => return Err("unterminated single quote".to_string()),
            }
        }
    }

    fn scan_double(&mut self, text: &mut String) -> Result<(), String> {
        self.bump();
        text.push('"');
        loop {
            match self.peek_char() {
                None => return Err("unterminated double quote".to_string()),
                Some('"') => {
                    self.bump();
                    text.push('"');
                    return Ok(());
                }
                Some('\\') => {
                    self.bump();
                    text.push('\\');
                    match self.bump() {
                        Some(ch) => text.push(ch),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
                Some('`') => self.scan_backtick(text)?,
                Some('$') if self.peek_char_at(1) == Some('(') => self.scan_dollar_paren(text)?,
                Some('$') if self.peek_char_at(1) == Some('{') => self.scan_param(text)?,
                Some(ch) => {
                    self.bump();
                    text.push(ch);
                }
            }
        }
    }

    fn scan_backtick(&mut self, text: &mut String) -> Result<(), String> {
        self.bump();
        text.push('`');
        loop {
            match self.bump() {
                Some('`') => {
                    text.push('`');
                    return Ok(());
                }
                Some('\\') => {
                    text.push('\\');
                    match self.bump() {
                        Some(ch) => text.push(ch),
                        None => return Err("unterminated backquote".to_string()),
                    }
                }
                Some(ch) => text.push(ch),
                None => return Err("unterminated backquote".to_string()),
            }
        }
    }

    /// `$(...)` or `$((...))`, balanced on parentheses outside quotes.
    fn scan_dollar_paren(&mut self, text: &mut String) -> Result<(), String> {
        if self.subst_depth >= MAX_SUBST_DEPTH {
            return Err("command substitution nested too deeply".to_string());
        }
        self.subst_depth += 1;
        let result = self.scan_paren_body(text);
        self.subst_depth -= 1;
        result
    }

    fn scan_paren_body(&mut self, text: &mut String) -> Result<(), String> {
        self.bump();
        self.bump();
        text.push_str("$(");
        let mut depth = 1usize;
        // `$((` bodies are arithmetic, where `<<` is a shift.
        let arithmetic = self.peek_char() == Some('(');
        // Here-documents opened on the current line: (delimiter, strip_tabs).
        let mut pending: Vec<(String, bool)> = Vec::new();
        loop {
            match self.peek_char() {
                None => return Err("unterminated command substitution".to_string()),
                Some('<') if !arithmetic && self.rest().starts_with("<<<") => {
                    for _ in 0..3 {
                        self.bump();
                    }
                    text.push_str("<<<");
                }
                Some('<') if !arithmetic && self.peek_char_at(1) == Some('<') => {
                    pending.push(self.scan_heredoc_operator(text));
                }
                Some('\n') if !pending.is_empty() => {
                    self.bump();
                    text.push('\n');
                    for (delimiter, strip_tabs) in pending.drain(..) {
                        self.copy_heredoc_body(text, &delimiter, strip_tabs);
                    }
                }
                Some('\'') => self.scan_single(text)?,
                Some('"') => self.scan_double(text)?,
                Some('`') => self.scan_backtick(text)?,
                Some('\\') => {
                    self.bump();
                    text.push('\\');
                    if let Some(ch) = self.bump() {
                        text.push(ch);
                    }
                }
                Some('$') if self.peek_char_at(1) == Some('(') => self.scan_dollar_paren(text)?,
                Some('$') if self.peek_char_at(1) == Some('{') => self.scan_param(text)?,
                Some(ch) => {
                    self.bump();
                    text.push(ch);
                    match ch {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// `<<WORD` or `<<-WORD` inside a substitution body. Returns the
    /// unquoted delimiter and whether tabs are stripped.
    fn scan_heredoc_operator(&mut self, text: &mut String) -> (String, bool) {
        self.bump();
        self.bump();
        text.push_str("<<");
        let strip_tabs = self.peek_char() == Some('-');
        if strip_tabs {
            self.bump();
            text.push('-');
        }
        while let Some(ch @ (' ' | '\t')) = self.peek_char() {
            self.bump();
            text.push(ch);
        }
        let mut raw = String::new();
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || matches!(ch, ';' | '&' | '|' | '<' | '>' | '(' | ')') {
                break;
            }
            self.bump();
            raw.push(ch);
            if ch == '\'' || ch == '"' {
                while let Some(inner) = self.bump() {
                    raw.push(inner);
                    if inner == ch {
                        break;
                    }
                }
            } else if ch == '\\' {
                if let Some(next) = self.bump() {
                    raw.push(next);
                }
            }
        }
        text.push_str(&raw);
        (unquote_delimiter(&raw), strip_tabs)
    }

    /// Copy here-document lines verbatim up to and including the delimiter
    /// line. The body is lexed again when the substitution runs.
    fn copy_heredoc_body(&mut self, text: &mut String, delimiter: &str, strip_tabs: bool) {
        while self.peek_char().is_some() {
            let mut line = String::new();
            let mut ended = false;
            while let Some(ch) = self.bump() {
                if ch == '\n' {
                    ended = true;
                    break;
                }
                line.push(ch);
            }
            text.push_str(&line);
            if ended {
                text.push('\n');
            }
            let candidate = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
            if candidate == delimiter {
                return;
            }
        }
    }

    /// `${...}`, balanced on braces outside quotes.
    fn scan_param(&mut self, text: &mut String) -> Result<(), String> {
        self.bump();
        self.bump();
        text.push_str("${");
        let mut depth = 1usize;
        loop {
            match self.peek_char() {
                None => return Err("unterminated parameter expansion".to_string()),
                Some('\'') => self.scan_single(text)?,
                Some('"') => self.scan_double(text)?,
                Some('`') => self.scan_backtick(text)?,
                Some('\\') => {
                    self.bump();
                    text.push('\\');
                    if let Some(ch) = self.bump() {
                        text.push(ch);
                    }
                }
                Some('$') if self.peek_char_at(1) == Some('(') => self.scan_dollar_paren(text)?,
                Some(ch) => {
                    self.bump();
                    text.push(ch);
                    match ch {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn read_heredoc(&mut self, raw_delimiter: &str, strip_tabs: bool) {
        let quoted = raw_delimiter.contains(['\'', '"', '\\']);
        let delimiter = unquote_delimiter(raw_delimiter);
        let start = match self.heredoc_resume {
            Some(resume) => resume,
            None => match self.rest().find('\n') {
                Some(idx) => {
                    self.heredoc_skip = Some(self.pos + idx);
                    self.pos + idx + 1
                }
                None => self.input.len(),
            },
        };

        let mut content = String::new();
        let mut cursor = start;
        let mut terminated = false;
        while cursor < self.input.len() {
            let end = self.input[cursor..]
                .find('\n')
                .map(|idx| cursor + idx)
                .unwrap_or(self.input.len());
            let raw_line = &self.input[cursor..end];
            let body_line = if strip_tabs {
                raw_line.trim_start_matches('\t')
            } else {
                raw_line
            };
            cursor = (end + 1).min(self.input.len());
            if body_line == delimiter {
                terminated = true;
                break;
            }
            content.push_str(body_line);
            content.push('\n');
        }

        if !terminated {
            warn!("heredoc event=unterminated delimiter={}", delimiter);
            self.heredoc_unterminated = true;
        }
        if self.heredoc_skip.is_some() {
            self.heredoc_resume = Some(cursor);
        }
        self.heredocs.push_back(HereDoc {
            content,
            expand: !quoted,
        });
    }

    fn finish_line(&mut self, newline_at: usize) {
        if self.heredoc_skip != Some(newline_at) {
            return;
        }
        self.heredoc_skip = None;
        if let Some(resume) = self.heredoc_resume.take() {
            if resume > self.pos {
                self.line += self.input[self.pos..resume].matches('\n').count();
                self.column = 1;
                self.pos = resume;
            }
        }
    }
}

/// Strip quotes and backslashes from a heredoc delimiter word.
pub fn unquote_delimiter(raw: &str) -> String {
    let mut out = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' => {}
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    fn texts(input: &str) -> Vec<String> {
        Lexer::tokenize(input).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn operators_are_greedy() {
        assert_eq!(
            kinds("a&&b||c;;d"),
            vec![
                TokenKind::Word,
                TokenKind::LogicalAnd,
                TokenKind::Word,
                TokenKind::LogicalOr,
                TokenKind::Word,
                TokenKind::DoubleSemicolon,
                TokenKind::Word,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("a >> b 2>&1 &>> c <<< d"),
            vec![
                TokenKind::Word,
                TokenKind::DGreat,
                TokenKind::Word,
                TokenKind::GreatAnd,
                TokenKind::Word,
                TokenKind::AndDGreat,
                TokenKind::Word,
                TokenKind::TLess,
                TokenKind::Word,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn io_number_stays_on_operator() {
        let tokens = Lexer::tokenize("cmd 2>err");
        assert_eq!(tokens[1].kind, TokenKind::Great);
        assert_eq!(tokens[1].text, "2>");
        assert_eq!(tokens[1].io_number(), Some(2));
        assert_eq!(tokens[2].text, "err");
    }

    #[test]
    fn keywords_only_in_command_position() {
        assert_eq!(
            kinds("echo if"),
            vec![TokenKind::Word, TokenKind::Word, TokenKind::Eof]
        );
        assert_eq!(
            kinds("if true; then x; fi"),
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::Keyword(Keyword::Then),
                TokenKind::Word,
                TokenKind::Semicolon,
                TokenKind::Keyword(Keyword::Fi),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keyword_recognition_can_be_disabled() {
        let mut lexer = Lexer::new("echo; if");
        lexer.set_keyword_recognition(false);
        lexer.advance();
        lexer.advance();
        assert_eq!(lexer.current().kind, TokenKind::Word);
        assert_eq!(lexer.current().text, "if");
    }

    #[test]
    fn quoted_words_are_classified() {
        let tokens = Lexer::tokenize("'a b' \"c $d\" $(e f) `g` x'y'");
        assert_eq!(tokens[0].kind, TokenKind::LiteralString);
        assert_eq!(tokens[0].text, "'a b'");
        assert_eq!(tokens[1].kind, TokenKind::ExpandableString);
        assert_eq!(tokens[2].kind, TokenKind::CommandSubst);
        assert_eq!(tokens[2].text, "$(e f)");
        assert_eq!(tokens[3].kind, TokenKind::CommandSubst);
        assert_eq!(tokens[4].kind, TokenKind::Word);
    }

    #[test]
    fn substitutions_are_balanced() {
        assert_eq!(
            texts("echo $(echo $(echo ')') \"(\")x $((1+(2*3)))"),
            vec!["echo", "$(echo $(echo ')') \"(\")x", "$((1+(2*3)))", ""]
        );
        assert_eq!(texts("${a:-b c}d"), vec!["${a:-b c}d", ""]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut lexer = Lexer::new("echo 'abc");
        lexer.advance();
        assert_eq!(lexer.current().kind, TokenKind::Error);
        assert!(lexer.error_incomplete());
    }

    #[test]
    fn comments_and_continuations() {
        assert_eq!(texts("echo a # b c\n"), vec!["echo", "a", "\n", ""]);
        assert_eq!(texts("echo a\\\nb"), vec!["echo", "ab", ""]);
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = Lexer::tokenize("a\n  bc");
        assert_eq!((tokens[2].line, tokens[2].column, tokens[2].offset), (2, 3, 4));
    }

    #[test]
    fn heredoc_bodies_are_queued_and_skipped() {
        let mut lexer = Lexer::new("cat <<EOF; cat <<-'END'\nhello $x\nEOF\n\tworld\n\tEND\necho done\n");
        let mut words = Vec::new();
        while !lexer.matches(TokenKind::Eof) {
            let token = lexer.advance();
            if token.kind.is_word() {
                words.push(token.text);
            }
        }
        assert_eq!(words, vec!["cat", "EOF", "cat", "'END'", "echo", "done"]);
        let first = lexer.take_heredoc().unwrap();
        assert_eq!(first.content, "hello $x\n");
        assert!(first.expand);
        let second = lexer.take_heredoc().unwrap();
        assert_eq!(second.content, "world\n");
        assert!(!second.expand);
        assert!(!lexer.heredoc_unterminated());
    }

    #[test]
    fn heredoc_at_eof_is_accepted() {
        let mut lexer = Lexer::new("cat <<EOF\nbody\n");
        while !lexer.matches(TokenKind::Eof) {
            lexer.advance();
        }
        assert!(lexer.heredoc_unterminated());
        assert_eq!(lexer.take_heredoc().unwrap().content, "body\n");
    }
}
