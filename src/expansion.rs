//! Word expansion.
//!
//! A raw word goes through brace expansion first, then one left-to-right
//! pass that handles quoting, tilde, parameter, command and arithmetic
//! expansion while recording how each piece of text was quoted. Field
//! splitting and pathname expansion only look at unquoted expansion
//! results, so quote removal falls out of the piece model.

use crate::ast::Word;
use crate::error::{ShellError, ShellResult};
use crate::io_helpers::strip_trailing_newlines;
use crate::parse::unquote_delimiter;

pub mod arith;
pub mod brace;
pub mod glob;
mod param;
pub mod pattern;
pub mod split;

pub use brace::expand_braces;
pub use pattern::{glob_match, Removal};

use split::{join_pieces, split_fields, Piece, DEFAULT_IFS};

/// What the expansion engine needs from the shell.
///
/// `lookup_var` also answers the special parameters `?`, `$`, `!`, `-` and
/// `0`; positional parameters come from `positional`.
pub trait ExpansionContext {
    fn lookup_var(&self, name: &str) -> Option<String>;
    fn assign_var(&mut self, name: &str, value: &str) -> ShellResult<()>;
    fn positional(&self) -> Vec<String>;
    /// Run `source` and return its standard output.
    fn command_subst(&mut self, source: &str) -> ShellResult<String>;
    fn nounset(&self) -> bool {
        false
    }
    fn noglob(&self) -> bool {
        false
    }
}

/// Full expansion of one word into zero or more fields.
pub fn expand_word<C: ExpansionContext + ?Sized>(word: &str, ctx: &mut C) -> ShellResult<Vec<String>> {
    let mut fields = Vec::new();
    for alternative in expand_braces(word) {
        let pieces = Expander::new(ctx, false).run(&alternative)?;
        let ifs = ctx.lookup_var("IFS").unwrap_or_else(|| DEFAULT_IFS.to_string());
        let noglob = ctx.noglob();
        for field in split_fields(&pieces, &ifs) {
            fields.extend(glob::expand_field(field, noglob));
        }
    }
    Ok(fields)
}

pub fn expand_words<C: ExpansionContext + ?Sized>(words: &[Word], ctx: &mut C) -> ShellResult<Vec<String>> {
    let mut out = Vec::new();
    for word in words {
        out.extend(expand_word(word.as_str(), ctx)?);
    }
    Ok(out)
}

/// Expansion without brace expansion, splitting or globbing: redirection
/// targets, `case` subjects, here-strings.
pub fn expand_word_single<C: ExpansionContext + ?Sized>(word: &str, ctx: &mut C) -> ShellResult<String> {
    let pieces = Expander::new(ctx, false).run(word)?;
    Ok(join_pieces(&pieces))
}

/// Right-hand side of `NAME=value`: tilde expansion also follows `:` and `=`.
pub fn expand_assignment<C: ExpansionContext + ?Sized>(value: &str, ctx: &mut C) -> ShellResult<String> {
    let pieces = Expander::new(ctx, true).run(value)?;
    Ok(join_pieces(&pieces))
}

/// A `case` pattern: expansions are done, quoted characters come back
/// escaped so they match literally.
pub fn expand_pattern<C: ExpansionContext + ?Sized>(word: &str, ctx: &mut C) -> ShellResult<String> {
    let pieces = Expander::new(ctx, false).run(word)?;
    Ok(pattern_text(&pieces))
}

/// Body of an unquoted here-document: `$`, backquotes and backslash escapes
/// of `$`, `` ` ``, `\` and newline. Double quotes are ordinary text.
pub fn expand_heredoc<C: ExpansionContext + ?Sized>(body: &str, ctx: &mut C) -> ShellResult<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut expander = Expander::new(ctx, false);
    expander.quoted_text(&chars, true)?;
    Ok(join_pieces(&expander.pieces))
}

fn pattern_text(pieces: &[Piece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Lit(text) | Piece::Expanded(text) => out.push_str(text),
            Piece::Quoted(text) => out.push_str(&pattern::escape(text)),
            Piece::Break => out.push(' '),
        }
    }
    out
}

fn bad_substitution(text: &[char]) -> ShellError {
    let text: String = text.iter().collect();
    ShellError::expansion(format!("{}: bad substitution", text))
}

/// Index of the bracket closing the one at `open` (`(` or `{`), skipping
/// quoted text and nested substitutions.
fn find_close(chars: &[char], open: usize) -> Option<usize> {
    let (open_ch, close_ch) = match chars.get(open)? {
        '(' => ('(', ')'),
        '{' => ('{', '}'),
        _ => return None,
    };
    // Here-documents only occur in command substitutions, not `$((`.
    let heredocs = open_ch == '(' && chars.get(open + 1) != Some(&'(');
    let mut pending: Vec<(String, bool)> = Vec::new();
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '<' if heredocs && chars[i..].starts_with(&['<', '<', '<']) => {
                i += 3;
                continue;
            }
            '<' if heredocs && chars.get(i + 1) == Some(&'<') => {
                let (delimiter, strip_tabs, next) = heredoc_delimiter(chars, i + 2);
                pending.push((delimiter, strip_tabs));
                i = next;
                continue;
            }
            '\n' if !pending.is_empty() => {
                i += 1;
                for (delimiter, strip_tabs) in pending.drain(..) {
                    i = skip_heredoc_body(chars, i, &delimiter, strip_tabs);
                }
                continue;
            }
            '\'' => {
                i = skip_single_quote(chars, i)?;
                continue;
            }
            '"' => {
                i = skip_double_quote(chars, i)?;
                continue;
            }
            '`' => {
                i = find_backtick(chars, i)? + 1;
                continue;
            }
            ch if ch == open_ch => depth += 1,
            ch if ch == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Delimiter of a `<<` operator whose `-`/word starts at `start`. Returns
/// the unquoted delimiter, whether tabs are stripped, and the index after it.
fn heredoc_delimiter(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut i = start;
    let strip_tabs = chars.get(i) == Some(&'-');
    if strip_tabs {
        i += 1;
    }
    while matches!(chars.get(i), Some(' ') | Some('\t')) {
        i += 1;
    }
    let mut raw = String::new();
    while let Some(&ch) = chars.get(i) {
        if ch.is_whitespace() || matches!(ch, ';' | '&' | '|' | '<' | '>' | '(' | ')') {
            break;
        }
        raw.push(ch);
        i += 1;
        if ch == '\'' || ch == '"' {
            while let Some(&inner) = chars.get(i) {
                raw.push(inner);
                i += 1;
                if inner == ch {
                    break;
                }
            }
        } else if ch == '\\' {
            if let Some(&next) = chars.get(i) {
                raw.push(next);
                i += 1;
            }
        }
    }
    (unquote_delimiter(&raw), strip_tabs, i)
}

/// Index just past the delimiter line of a here-document body at `start`.
fn skip_heredoc_body(chars: &[char], start: usize, delimiter: &str, strip_tabs: bool) -> usize {
    let mut i = start;
    while i < chars.len() {
        let end = chars[i..]
            .iter()
            .position(|&ch| ch == '\n')
            .map_or(chars.len(), |offset| i + offset);
        let line: String = chars[i..end].iter().collect();
        i = (end + 1).min(chars.len());
        let candidate = if strip_tabs { line.trim_start_matches('\t') } else { line.as_str() };
        if candidate == delimiter {
            break;
        }
    }
    i
}

fn skip_single_quote(chars: &[char], start: usize) -> Option<usize> {
    let end = chars[start + 1..].iter().position(|&ch| ch == '\'')?;
    Some(start + end + 2)
}

fn skip_double_quote(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Some(i + 1),
            '$' if matches!(chars.get(i + 1), Some('(') | Some('{')) => {
                i = find_close(chars, i + 1)? + 1;
            }
            '`' => i = find_backtick(chars, i)? + 1,
            _ => i += 1,
        }
    }
    None
}

fn find_backtick(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// One expansion pass over a word, collecting pieces.
pub(crate) struct Expander<'c, C: ExpansionContext + ?Sized> {
    ctx: &'c mut C,
    pieces: Vec<Piece>,
    assignment: bool,
}

impl<'c, C: ExpansionContext + ?Sized> Expander<'c, C> {
    fn new(ctx: &'c mut C, assignment: bool) -> Self {
        Expander {
            ctx,
            pieces: Vec::new(),
            assignment,
        }
    }

    fn run(mut self, word: &str) -> ShellResult<Vec<Piece>> {
        let chars: Vec<char> = word.chars().collect();
        self.word(&chars)?;
        Ok(self.pieces)
    }

    /// A fresh expander sharing this one's context.
    fn nested(&mut self) -> Expander<'_, C> {
        Expander::new(&mut *self.ctx, false)
    }

    fn push(&mut self, piece: Piece) {
        if let Some(last) = self.pieces.last_mut() {
            match (last, &piece) {
                (Piece::Lit(last), Piece::Lit(text))
                | (Piece::Quoted(last), Piece::Quoted(text))
                | (Piece::Expanded(last), Piece::Expanded(text)) => {
                    last.push_str(text);
                    return;
                }
                _ => {}
            }
        }
        self.pieces.push(piece);
    }

    fn value(&mut self, text: String, quoted: bool) {
        if quoted {
            self.push(Piece::Quoted(text));
        } else {
            self.push(Piece::Expanded(text));
        }
    }

    fn ifs(&self) -> String {
        self.ctx
            .lookup_var("IFS")
            .unwrap_or_else(|| DEFAULT_IFS.to_string())
    }

    fn word(&mut self, chars: &[char]) -> ShellResult<()> {
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            let tilde_here = i == 0
                || (self.assignment && matches!(chars[i - 1], ':' | '='));
            match ch {
                '\'' => {
                    let end = skip_single_quote(chars, i)
                        .ok_or_else(|| ShellError::expansion("unterminated single quote"))?;
                    self.push(Piece::Quoted(chars[i + 1..end - 1].iter().collect()));
                    i = end;
                }
                '"' => {
                    let end = skip_double_quote(chars, i)
                        .ok_or_else(|| ShellError::expansion("unterminated double quote"))?;
                    self.double_quoted(&chars[i + 1..end - 1])?;
                    i = end;
                }
                '\\' => {
                    match chars.get(i + 1) {
                        Some('\n') => {}
                        Some(&next) => self.push(Piece::Quoted(next.to_string())),
                        None => self.push(Piece::Lit("\\".into())),
                    }
                    i += 2;
                }
                '$' => i = self.dollar(chars, i, false)?,
                '`' => i = self.backtick(chars, i, false)?,
                '~' if tilde_here => i = self.tilde(chars, i),
                _ => {
                    self.push(Piece::Lit(ch.to_string()));
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn double_quoted(&mut self, inner: &[char]) -> ShellResult<()> {
        let text: String = inner.iter().collect();
        // `"$@"` alone produces no field at all when there are no parameters.
        if text != "$@" && text != "${@}" {
            self.push(Piece::Quoted(String::new()));
        }
        self.quoted_text(inner, false)
    }

    /// Text inside double quotes (or a here-document body when `heredoc`).
    fn quoted_text(&mut self, chars: &[char], heredoc: bool) -> ShellResult<()> {
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    match chars.get(i + 1) {
                        Some('\n') => {}
                        Some(&next) if matches!(next, '$' | '`' | '\\') || (next == '"' && !heredoc) => {
                            self.push(Piece::Quoted(next.to_string()));
                        }
                        Some(&next) => self.push(Piece::Quoted(format!("\\{}", next))),
                        None => self.push(Piece::Quoted("\\".into())),
                    }
                    i += 2;
                }
                '$' => i = self.dollar(chars, i, true)?,
                '`' => i = self.backtick(chars, i, true)?,
                ch => {
                    self.push(Piece::Quoted(ch.to_string()));
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn tilde(&mut self, chars: &[char], start: usize) -> usize {
        let mut end = start + 1;
        while end < chars.len() && chars[end] != '/' && !(self.assignment && chars[end] == ':') {
            end += 1;
        }
        let prefix: String = chars[start + 1..end].iter().collect();
        if prefix.contains(['\'', '"', '\\', '$', '`']) {
            self.push(Piece::Lit("~".into()));
            return start + 1;
        }
        let home = match prefix.as_str() {
            "" => self.ctx.lookup_var("HOME").or_else(|| user_home(None)),
            "+" => self.ctx.lookup_var("PWD"),
            "-" => self.ctx.lookup_var("OLDPWD"),
            user => user_home(Some(user)),
        };
        match home {
            Some(home) => self.push(Piece::Quoted(home)),
            None => self.push(Piece::Lit(format!("~{}", prefix))),
        }
        end
    }

    /// Expand the `$` construct at `chars[i]`; returns the index after it.
    fn dollar(&mut self, chars: &[char], i: usize, quoted: bool) -> ShellResult<usize> {
        match chars.get(i + 1) {
            Some('(') => {
                let close = find_close(chars, i + 1).ok_or_else(|| bad_substitution(&chars[i..]))?;
                let arithmetic = chars.get(i + 2) == Some(&'(')
                    && close > i + 3
                    && chars[close - 1] == ')'
                    && find_close(chars, i + 2) == Some(close - 1);
                if arithmetic {
                    let value = self.arithmetic(&chars[i + 3..close - 1])?;
                    self.value(value.to_string(), quoted);
                } else {
                    let source: String = chars[i + 2..close].iter().collect();
                    let output = self.ctx.command_subst(&source)?;
                    self.value(strip_trailing_newlines(output), quoted);
                }
                Ok(close + 1)
            }
            Some('{') => {
                let close = find_close(chars, i + 1).ok_or_else(|| bad_substitution(&chars[i..]))?;
                param::expand(self, &chars[i + 2..close], quoted)?;
                Ok(close + 1)
            }
            Some(&ch) if ch == '_' || ch.is_ascii_alphabetic() => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end] == '_' || chars[end].is_ascii_alphanumeric()) {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().collect();
                self.simple_param(&name, quoted)?;
                Ok(end)
            }
            Some(&ch) if ch.is_ascii_digit() || matches!(ch, '@' | '*' | '#' | '?' | '-' | '$' | '!') => {
                self.simple_param(&ch.to_string(), quoted)?;
                Ok(i + 2)
            }
            _ => {
                if quoted {
                    self.push(Piece::Quoted("$".into()));
                } else {
                    self.push(Piece::Lit("$".into()));
                }
                Ok(i + 1)
            }
        }
    }

    fn simple_param(&mut self, name: &str, quoted: bool) -> ShellResult<()> {
        match name {
            "@" => self.positional_fields(quoted),
            "*" => {
                let params = self.ctx.positional();
                if quoted {
                    self.push(Piece::Quoted(params.join(&self.star_separator())));
                } else {
                    self.unquoted_params(params);
                }
            }
            _ => {
                let value = self.param_value(name);
                match value {
                    Some(value) => self.value(value, quoted),
                    None if self.ctx.nounset() => return Err(unbound(name)),
                    None => {}
                }
            }
        }
        Ok(())
    }

    fn positional_fields(&mut self, quoted: bool) {
        let params = self.ctx.positional();
        if quoted {
            for (index, param) in params.into_iter().enumerate() {
                if index > 0 {
                    self.push(Piece::Break);
                }
                self.push(Piece::Quoted(param));
            }
        } else {
            self.unquoted_params(params);
        }
    }

    fn unquoted_params(&mut self, params: Vec<String>) {
        for (index, param) in params.into_iter().enumerate() {
            if index > 0 {
                self.push(Piece::Break);
            }
            self.push(Piece::Expanded(param));
        }
    }

    /// `"$*"` joins parameters with the first IFS character.
    fn star_separator(&self) -> String {
        self.ifs().chars().next().map(String::from).unwrap_or_default()
    }

    /// Value of a named, positional or special parameter other than `@`/`*`.
    fn param_value(&self, name: &str) -> Option<String> {
        if name == "#" {
            return Some(self.ctx.positional().len().to_string());
        }
        if name != "0" && name.chars().all(|ch| ch.is_ascii_digit()) {
            let index: usize = name.parse().ok()?;
            return self.ctx.positional().get(index.checked_sub(1)?).cloned();
        }
        self.ctx.lookup_var(name)
    }

    fn arithmetic(&mut self, expr: &[char]) -> ShellResult<i64> {
        let text = {
            let mut nested = self.nested();
            nested.quoted_text(expr, false)?;
            join_pieces(&nested.pieces)
        };
        arith::evaluate(&text, &mut *self.ctx)
    }

    fn backtick(&mut self, chars: &[char], i: usize, quoted: bool) -> ShellResult<usize> {
        let end = find_backtick(chars, i)
            .ok_or_else(|| ShellError::expansion("unterminated backquote"))?;
        let mut source = String::new();
        let mut j = i + 1;
        while j < end {
            if chars[j] == '\\' && matches!(chars.get(j + 1), Some('$') | Some('`') | Some('\\')) {
                j += 1;
            }
            source.push(chars[j]);
            j += 1;
        }
        let output = self.ctx.command_subst(&source)?;
        self.value(strip_trailing_newlines(output), quoted);
        Ok(end + 1)
    }

    /// Expand an operand word of `${name op word}`. Unquoted operands split
    /// like any other expansion; quoted ones stay one piece.
    fn operand(&mut self, word: &[char], quoted: bool) -> ShellResult<()> {
        let pieces = {
            let mut nested = self.nested();
            if quoted {
                nested.quoted_operand(word)?;
            } else {
                nested.word(word)?;
            }
            nested.pieces
        };
        for piece in pieces {
            match piece {
                Piece::Lit(text) if quoted => self.push(Piece::Quoted(text)),
                Piece::Expanded(text) if quoted => self.push(Piece::Quoted(text)),
                Piece::Lit(text) => self.push(Piece::Expanded(text)),
                piece => self.push(piece),
            }
        }
        Ok(())
    }

    /// Inside `"${x:-word}"` quotes in `word` are removed but nothing splits.
    fn quoted_operand(&mut self, word: &[char]) -> ShellResult<()> {
        let mut i = 0;
        while i < word.len() {
            match word[i] {
                '\'' | '"' => {
                    let end = if word[i] == '\'' {
                        skip_single_quote(word, i)
                    } else {
                        skip_double_quote(word, i)
                    };
                    let end = end.ok_or_else(|| bad_substitution(word))?;
                    if word[i] == '\'' {
                        self.push(Piece::Quoted(word[i + 1..end - 1].iter().collect()));
                    } else {
                        self.quoted_text(&word[i + 1..end - 1], false)?;
                    }
                    i = end;
                }
                _ => {
                    let start = i;
                    while i < word.len() && !matches!(word[i], '\'' | '"') {
                        i += 1;
                    }
                    self.quoted_text(&word[start..i], false)?;
                }
            }
        }
        Ok(())
    }

    /// Operand as plain text, no splitting.
    fn operand_text(&mut self, word: &[char]) -> ShellResult<String> {
        let mut nested = self.nested();
        nested.word(word)?;
        Ok(join_pieces(&nested.pieces))
    }

    /// Operand as a pattern: quoted characters escaped.
    fn operand_pattern(&mut self, word: &[char]) -> ShellResult<String> {
        let mut nested = self.nested();
        nested.word(word)?;
        Ok(pattern_text(&nested.pieces))
    }
}

fn unbound(name: &str) -> ShellError {
    ShellError::expansion(format!("{}: unbound variable", name)).fatal()
}

fn user_home(user: Option<&str>) -> Option<String> {
    let user = match user {
        Some(name) => nix::unistd::User::from_name(name).ok()??,
        None => nix::unistd::User::from_uid(nix::unistd::getuid()).ok()??,
    };
    Some(user.dir.to_string_lossy().into_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct MapContext {
        pub vars: HashMap<String, String>,
        pub params: Vec<String>,
        pub nounset: bool,
        pub noglob: bool,
        pub commands: Vec<String>,
    }

    impl MapContext {
        pub fn with_vars(vars: &[(&str, &str)]) -> Self {
            MapContext {
                vars: vars
                    .iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl ExpansionContext for MapContext {
        fn lookup_var(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }

        fn assign_var(&mut self, name: &str, value: &str) -> ShellResult<()> {
            self.vars.insert(name.to_string(), value.to_string());
            Ok(())
        }

        fn positional(&self) -> Vec<String> {
            self.params.clone()
        }

        // `echo ARGS` prints its arguments; anything else prints nothing.
        fn command_subst(&mut self, source: &str) -> ShellResult<String> {
            self.commands.push(source.to_string());
            Ok(match source.trim().strip_prefix("echo ") {
                Some(rest) => format!("{}\n\n", rest),
                None => String::new(),
            })
        }

        fn nounset(&self) -> bool {
            self.nounset
        }

        fn noglob(&self) -> bool {
            self.noglob
        }
    }

    fn fields(word: &str, ctx: &mut MapContext) -> Vec<String> {
        expand_word(word, ctx).unwrap()
    }

    #[test]
    fn quoting_controls_splitting() {
        let mut ctx = MapContext::with_vars(&[("v", "a  b")]);
        assert_eq!(fields("$v", &mut ctx), vec!["a", "b"]);
        assert_eq!(fields("\"$v\"", &mut ctx), vec!["a  b"]);
        assert_eq!(fields("'$v'", &mut ctx), vec!["$v"]);
        assert_eq!(fields("x\\ y", &mut ctx), vec!["x y"]);
        assert_eq!(fields("\"\"", &mut ctx), vec![""]);
        assert!(fields("$unset", &mut ctx).is_empty());
        assert_eq!(fields("pre${v}post", &mut ctx), vec!["prea", "bpost"]);
    }

    #[test]
    fn positional_parameters() {
        let mut ctx = MapContext::default();
        ctx.params = vec!["one".into(), "two words".into()];
        assert_eq!(fields("\"$@\"", &mut ctx), vec!["one", "two words"]);
        assert_eq!(fields("$@", &mut ctx), vec!["one", "two", "words"]);
        assert_eq!(fields("\"$*\"", &mut ctx), vec!["one two words"]);
        assert_eq!(fields("\"x$@y\"", &mut ctx), vec!["xone", "two wordsy"]);
        assert_eq!(fields("$#", &mut ctx), vec!["2"]);
        assert_eq!(fields("$2", &mut ctx), vec!["two", "words"]);

        ctx.params.clear();
        assert!(fields("\"$@\"", &mut ctx).is_empty());
        assert_eq!(fields("\"$*\"", &mut ctx), vec![""]);
    }

    #[test]
    fn star_joins_with_first_ifs_character() {
        let mut ctx = MapContext::with_vars(&[("IFS", ":")]);
        ctx.params = vec!["a".into(), "b".into()];
        assert_eq!(fields("\"$*\"", &mut ctx), vec!["a:b"]);
    }

    #[test]
    fn command_and_arithmetic_substitution() {
        let mut ctx = MapContext::with_vars(&[("n", "4")]);
        assert_eq!(fields("$(echo hi there)", &mut ctx), vec!["hi", "there"]);
        assert_eq!(fields("\"$(echo hi there)\"", &mut ctx), vec!["hi there"]);
        assert_eq!(fields("`echo x`", &mut ctx), vec!["x"]);
        assert_eq!(fields("$((n * 2 + $n))", &mut ctx), vec!["12"]);
        assert_eq!(fields("$(( (1 + 2) * 3 ))", &mut ctx), vec!["9"]);
        assert!(expand_word("$((1 / 0))", &mut ctx).is_err());
        assert_eq!(ctx.commands, vec!["echo hi there", "echo hi there", "echo x"]);
    }

    #[test]
    fn substitution_skips_heredoc_bodies() {
        let mut ctx = MapContext::default();
        fields("$(cat <<'E' <<<s\nit's ) \"\nE\n)", &mut ctx);
        fields("$(cat <<-E\n\t(\n\tE\n)", &mut ctx);
        assert_eq!(fields("$((1 << 2))", &mut ctx), vec!["4"]);
        assert_eq!(
            ctx.commands,
            vec!["cat <<'E' <<<s\nit's ) \"\nE\n", "cat <<-E\n\t(\n\tE\n"]
        );
    }

    #[test]
    fn tilde_expansion() {
        let mut ctx = MapContext::with_vars(&[("HOME", "/home/u"), ("PWD", "/w")]);
        assert_eq!(fields("~", &mut ctx), vec!["/home/u"]);
        assert_eq!(fields("~/src", &mut ctx), vec!["/home/u/src"]);
        assert_eq!(fields("~+", &mut ctx), vec!["/w"]);
        assert_eq!(fields("a~", &mut ctx), vec!["a~"]);
        assert_eq!(fields("\"~\"", &mut ctx), vec!["~"]);
        assert_eq!(
            expand_assignment("~/a:~/b", &mut ctx).unwrap(),
            "/home/u/a:/home/u/b"
        );
        assert_eq!(fields("~no_such_user_posish", &mut ctx), vec!["~no_such_user_posish"]);
    }

    #[test]
    fn braces_run_before_parameters() {
        let mut ctx = MapContext::with_vars(&[("x", "X")]);
        assert_eq!(fields("{a,$x}", &mut ctx), vec!["a", "X"]);
        assert_eq!(fields("\"{a,b}\"", &mut ctx), vec!["{a,b}"]);
    }

    #[test]
    fn nounset_is_fatal() {
        let mut ctx = MapContext::default();
        ctx.nounset = true;
        let err = expand_word("$missing", &mut ctx).unwrap_err();
        assert!(err.fatal);
        assert!(err.message.contains("missing: unbound variable"));
        assert!(expand_word("${missing:-ok}", &mut ctx).is_ok());
        assert!(expand_word("\"$@\"", &mut ctx).is_ok());
    }

    #[test]
    fn single_and_pattern_forms() {
        let mut ctx = MapContext::with_vars(&[("v", "a  *")]);
        ctx.noglob = true;
        assert_eq!(expand_word_single("$v.txt", &mut ctx).unwrap(), "a  *.txt");
        assert_eq!(expand_pattern("\"*\"$v", &mut ctx).unwrap(), "\\*a  *");
        assert_eq!(fields("$v", &mut ctx), vec!["a", "*"]);
    }

    #[test]
    fn heredoc_bodies() {
        let mut ctx = MapContext::with_vars(&[("name", "world")]);
        assert_eq!(
            expand_heredoc("hi \"$name\" \\$x\n", &mut ctx).unwrap(),
            "hi \"world\" $x\n"
        );
    }

    #[test]
    fn ifs_splitting_of_expansions_only() {
        let mut ctx = MapContext::with_vars(&[("IFS", ":"), ("p", "a:b::c")]);
        assert_eq!(fields("$p", &mut ctx), vec!["a", "b", "", "c"]);
        assert_eq!(fields("x:y", &mut ctx), vec!["x:y"]);
    }
}
