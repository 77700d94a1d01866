//! `${...}` parameter expansion.

use crate::error::{ShellError, ShellResult};
use crate::parse::is_name;

use super::pattern::{glob_match, remove_pattern, replace_pattern, Removal};
use super::split::Piece;
use super::{bad_substitution, unbound, ExpansionContext, Expander};

/// What a parameter name refers to.
enum Target {
    Scalar(Option<String>),
    /// `@` or `*`: the positional parameters, one element each.
    List { items: Vec<String>, star: bool },
}

pub(super) fn expand<C: ExpansionContext + ?Sized>(
    exp: &mut Expander<'_, C>,
    inner: &[char],
    quoted: bool,
) -> ShellResult<()> {
    if inner.is_empty() {
        return Err(bad_substitution(&['$', '{', '}']));
    }
    if inner[0] == '#' && inner.len() > 1 {
        if let Some((name, rest)) = split_name(&inner[1..]) {
            if rest.is_empty() {
                return length(exp, &name, quoted);
            }
        }
    }
    let (name, rest) = split_name(inner).ok_or_else(|| whole(inner))?;
    if rest.is_empty() {
        return exp.simple_param(&name, quoted);
    }

    let target = lookup(exp, &name);
    let (op, word) = split_operator(rest).ok_or_else(|| whole(inner))?;
    match op {
        ":-" | "-" | ":=" | "=" | ":+" | "+" | ":?" | "?" => {
            conditional(exp, &name, target, op, word, quoted)
        }
        _ => {
            let target = require(exp, &name, target)?;
            let target = transform(exp, target, op, word)?;
            emit(exp, target, quoted);
            Ok(())
        }
    }
}

fn whole(inner: &[char]) -> ShellError {
    let mut text = vec!['$', '{'];
    text.extend_from_slice(inner);
    text.push('}');
    bad_substitution(&text)
}

/// Split a leading parameter name off `chars`.
fn split_name(chars: &[char]) -> Option<(String, &[char])> {
    let first = *chars.first()?;
    let end = if first == '_' || first.is_ascii_alphabetic() {
        chars
            .iter()
            .position(|ch| !(*ch == '_' || ch.is_ascii_alphanumeric()))
            .unwrap_or(chars.len())
    } else if first.is_ascii_digit() {
        chars
            .iter()
            .position(|ch| !ch.is_ascii_digit())
            .unwrap_or(chars.len())
    } else if matches!(first, '@' | '*' | '#' | '?' | '-' | '$' | '!') {
        1
    } else {
        return None;
    };
    Some((chars[..end].iter().collect(), &chars[end..]))
}

fn split_operator(rest: &[char]) -> Option<(&'static str, &[char])> {
    const OPERATORS: &[&str] = &[
        ":-", ":=", ":+", ":?", "##", "%%", "^^", ",,", "//", "-", "=", "+", "?", "#", "%", "^",
        ",", "/", ":",
    ];
    let text: String = rest.iter().take(2).collect();
    let op = OPERATORS.iter().find(|op| text.starts_with(**op))?;
    Some((*op, &rest[op.len()..]))
}

fn lookup<C: ExpansionContext + ?Sized>(exp: &Expander<'_, C>, name: &str) -> Target {
    match name {
        "@" | "*" => Target::List {
            items: exp.ctx.positional(),
            star: name == "*",
        },
        _ => Target::Scalar(exp.param_value(name)),
    }
}

/// The target of a non-conditional operator; unset is an error under `-u`.
fn require<C: ExpansionContext + ?Sized>(
    exp: &Expander<'_, C>,
    name: &str,
    target: Target,
) -> ShellResult<Target> {
    match target {
        Target::Scalar(None) if exp.ctx.nounset() => Err(unbound(name)),
        Target::Scalar(None) => Ok(Target::Scalar(Some(String::new()))),
        target => Ok(target),
    }
}

fn length<C: ExpansionContext + ?Sized>(
    exp: &mut Expander<'_, C>,
    name: &str,
    quoted: bool,
) -> ShellResult<()> {
    let count = match lookup(exp, name) {
        Target::List { items, .. } => items.len(),
        Target::Scalar(Some(value)) => value.chars().count(),
        Target::Scalar(None) if exp.ctx.nounset() => return Err(unbound(name)),
        Target::Scalar(None) => 0,
    };
    exp.value(count.to_string(), quoted);
    Ok(())
}

fn conditional<C: ExpansionContext + ?Sized>(
    exp: &mut Expander<'_, C>,
    name: &str,
    target: Target,
    op: &str,
    word: &[char],
    quoted: bool,
) -> ShellResult<()> {
    let colon = op.starts_with(':');
    let is_set = match &target {
        Target::Scalar(Some(value)) => !(colon && value.is_empty()),
        Target::Scalar(None) => false,
        Target::List { items, .. } => !items.is_empty(),
    };
    match op.trim_start_matches(':') {
        "-" if is_set => emit(exp, target, quoted),
        "-" => exp.operand(word, quoted)?,
        "+" if is_set => exp.operand(word, quoted)?,
        "+" => {}
        "=" if is_set => emit(exp, target, quoted),
        "=" => {
            if !is_name(name) {
                return Err(ShellError::expansion(format!(
                    "${}: cannot assign in this way",
                    name
                )));
            }
            let value = exp.operand_text(word)?;
            exp.ctx.assign_var(name, &value)?;
            exp.value(value, quoted);
        }
        _ if is_set => emit(exp, target, quoted),
        _ => {
            let message = exp.operand_text(word)?;
            let message = if message.is_empty() {
                "parameter null or not set".to_string()
            } else {
                message
            };
            return Err(ShellError::expansion(format!("{}: {}", name, message)));
        }
    }
    Ok(())
}

fn transform<C: ExpansionContext + ?Sized>(
    exp: &mut Expander<'_, C>,
    target: Target,
    op: &str,
    word: &[char],
) -> ShellResult<Target> {
    if op == ":" {
        return substring(exp, target, word);
    }
    let apply: Box<dyn Fn(&str) -> String> = match op {
        "#" | "##" | "%" | "%%" => {
            let pattern = exp.operand_pattern(word)?;
            let mode = match op {
                "#" => Removal::ShortestPrefix,
                "##" => Removal::LongestPrefix,
                "%" => Removal::ShortestSuffix,
                _ => Removal::LongestSuffix,
            };
            Box::new(move |value: &str| remove_pattern(value, &pattern, mode))
        }
        "^" | "^^" | "," | ",," => {
            let pattern = if word.is_empty() {
                "?".to_string()
            } else {
                exp.operand_pattern(word)?
            };
            let upper = op.starts_with('^');
            let all = op.len() == 2;
            Box::new(move |value: &str| change_case(value, &pattern, upper, all))
        }
        _ => {
            let split = find_slash(word);
            let (pattern, replacement) = match split {
                Some(index) => (&word[..index], &word[index + 1..]),
                None => (word, &[][..]),
            };
            let pattern = exp.operand_pattern(pattern)?;
            let replacement = exp.operand_text(replacement)?;
            let all = op == "//";
            Box::new(move |value: &str| replace_pattern(value, &pattern, &replacement, all))
        }
    };
    Ok(match target {
        Target::Scalar(value) => Target::Scalar(value.map(|value| apply(&value))),
        Target::List { items, star } => Target::List {
            items: items.iter().map(|item| apply(item)).collect(),
            star,
        },
    })
}

fn change_case(value: &str, pattern: &str, upper: bool, all: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for (index, ch) in value.chars().enumerate() {
        if (all || index == 0) && glob_match(pattern, &ch.to_string()) {
            if upper {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// First `/` not inside quotes or a nested expansion.
fn find_slash(word: &[char]) -> Option<usize> {
    let mut i = 0;
    while i < word.len() {
        match word[i] {
            '\\' => i += 2,
            '\'' => i = super::skip_single_quote(word, i)?,
            '"' => i = super::skip_double_quote(word, i)?,
            '$' if matches!(word.get(i + 1), Some('{') | Some('(')) => {
                i = super::find_close(word, i + 1)? + 1;
            }
            '/' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// `${name:offset}` and `${name:offset:length}`.
fn substring<C: ExpansionContext + ?Sized>(
    exp: &mut Expander<'_, C>,
    target: Target,
    word: &[char],
) -> ShellResult<Target> {
    let (offset, len) = match top_level_colon(word) {
        Some(index) => (&word[..index], Some(&word[index + 1..])),
        None => (word, None),
    };
    let offset = exp.arithmetic(offset)?;
    let len = match len {
        Some(len) => Some(exp.arithmetic(len)?),
        None => None,
    };
    Ok(match target {
        Target::Scalar(value) => {
            let chars: Vec<char> = value.unwrap_or_default().chars().collect();
            let range = slice_range(chars.len(), offset, len)?;
            Target::Scalar(Some(chars[range].iter().collect()))
        }
        Target::List { items, star } => {
            let mut all = Vec::with_capacity(items.len() + 1);
            all.push(exp.ctx.lookup_var("0").unwrap_or_default());
            all.extend(items);
            let range = slice_range(all.len(), offset, len)?;
            Target::List {
                items: all[range].to_vec(),
                star,
            }
        }
    })
}

fn top_level_colon(word: &[char]) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in word.iter().enumerate() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '?' if depth == 0 => return None,
            ':' if depth == 0 => return Some(index),
            _ => {}
        }
    }
    None
}

fn slice_range(count: usize, offset: i64, len: Option<i64>) -> ShellResult<std::ops::Range<usize>> {
    let count = count as i64;
    let start = if offset < 0 { count.saturating_add(offset) } else { offset };
    if start < 0 || start > count {
        return Ok(0..0);
    }
    let end = match len {
        None => count,
        Some(len) if len < 0 => {
            let end = count.saturating_add(len);
            if end < start {
                return Err(ShellError::expansion(format!(
                    "{}: substring expression < 0",
                    len
                )));
            }
            end
        }
        Some(len) => start.saturating_add(len).min(count),
    };
    Ok(start as usize..end as usize)
}

fn emit<C: ExpansionContext + ?Sized>(exp: &mut Expander<'_, C>, target: Target, quoted: bool) {
    match target {
        Target::Scalar(Some(value)) => exp.value(value, quoted),
        Target::Scalar(None) => {}
        Target::List { items, star: true } if quoted => {
            let separator = exp.star_separator();
            exp.push(Piece::Quoted(items.join(&separator)));
        }
        Target::List { items, .. } if quoted => {
            for (index, item) in items.into_iter().enumerate() {
                if index > 0 {
                    exp.push(Piece::Break);
                }
                exp.push(Piece::Quoted(item));
            }
        }
        Target::List { items, .. } => exp.unquoted_params(items),
    }
}

#[cfg(test)]
mod tests {
    use crate::expansion::tests::MapContext;
    use crate::expansion::{expand_word, expand_word_single};

    fn single(word: &str, ctx: &mut MapContext) -> String {
        expand_word_single(word, ctx).unwrap()
    }

    #[test]
    fn defaults_and_alternatives() {
        let mut ctx = MapContext::with_vars(&[("empty", ""), ("set", "v")]);
        assert_eq!(single("${unset:-d}", &mut ctx), "d");
        assert_eq!(single("${empty:-d}", &mut ctx), "d");
        assert_eq!(single("${empty-d}", &mut ctx), "");
        assert_eq!(single("${set:+alt}", &mut ctx), "alt");
        assert_eq!(single("${unset:+alt}", &mut ctx), "");
        assert_eq!(single("${empty+alt}", &mut ctx), "alt");
        assert_eq!(single("${unset:-$set}", &mut ctx), "v");
    }

    #[test]
    fn assign_default() {
        let mut ctx = MapContext::default();
        assert_eq!(single("${x:=hello}", &mut ctx), "hello");
        assert_eq!(ctx.vars["x"], "hello");
        assert!(expand_word_single("${1:=no}", &mut ctx).is_err());
    }

    #[test]
    fn error_if_unset() {
        let mut ctx = MapContext::default();
        let err = expand_word_single("${x:?missing value}", &mut ctx).unwrap_err();
        assert_eq!(err.message, "x: missing value");
        let err = expand_word_single("${x?}", &mut ctx).unwrap_err();
        assert_eq!(err.message, "x: parameter null or not set");
        assert!(!err.fatal);
    }

    #[test]
    fn length_and_removal() {
        let mut ctx = MapContext::with_vars(&[("p", "/usr/lib/libc.so.6")]);
        ctx.params = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(single("${#p}", &mut ctx), "18");
        assert_eq!(single("${#}", &mut ctx), "3");
        assert_eq!(single("${#@}", &mut ctx), "3");
        assert_eq!(single("${p##*/}", &mut ctx), "libc.so.6");
        assert_eq!(single("${p#*/}", &mut ctx), "usr/lib/libc.so.6");
        assert_eq!(single("${p%.*}", &mut ctx), "/usr/lib/libc.so");
        assert_eq!(single("${p%%.*}", &mut ctx), "/usr/lib/libc");
        assert_eq!(single("${p%\"*\"}", &mut ctx), "/usr/lib/libc.so.6");
    }

    #[test]
    fn case_changes() {
        let mut ctx = MapContext::with_vars(&[("w", "hello World")]);
        assert_eq!(single("${w^}", &mut ctx), "Hello World");
        assert_eq!(single("${w^^}", &mut ctx), "HELLO WORLD");
        assert_eq!(single("${w,,}", &mut ctx), "hello world");
        assert_eq!(single("${w^^[lo]}", &mut ctx), "heLLO WOrLd");
    }

    #[test]
    fn substrings() {
        let mut ctx = MapContext::with_vars(&[("s", "abcdef"), ("n", "2")]);
        assert_eq!(single("${s:2}", &mut ctx), "cdef");
        assert_eq!(single("${s:1:3}", &mut ctx), "bcd");
        assert_eq!(single("${s: -2}", &mut ctx), "ef");
        assert_eq!(single("${s:1:-2}", &mut ctx), "bcd");
        assert_eq!(single("${s:$n:n}", &mut ctx), "cd");
        assert_eq!(single("${s:10}", &mut ctx), "");
        assert!(expand_word_single("${s:4:-3}", &mut ctx).is_err());
    }

    #[test]
    fn huge_substring_bounds_clamp() {
        let mut ctx = MapContext::with_vars(&[("s", "abc")]);
        assert_eq!(single("${s:1:9223372036854775807}", &mut ctx), "bc");
        assert_eq!(single("${s:9223372036854775807}", &mut ctx), "");
        assert_eq!(single("${s: -9223372036854775807}", &mut ctx), "");
        assert!(expand_word_single("${s:1:-9223372036854775807}", &mut ctx).is_err());
    }

    #[test]
    fn replacement() {
        let mut ctx = MapContext::with_vars(&[("v", "a.b.c")]);
        assert_eq!(single("${v/./-}", &mut ctx), "a-b.c");
        assert_eq!(single("${v//./-}", &mut ctx), "a-b-c");
        assert_eq!(single("${v//./}", &mut ctx), "abc");
    }

    #[test]
    fn positional_lists() {
        let mut ctx = MapContext::default();
        ctx.params = vec!["x.rs".into(), "y.rs".into()];
        ctx.vars.insert("0".into(), "posish".into());
        assert_eq!(expand_word("\"${@%.rs}\"", &mut ctx).unwrap(), vec!["x", "y"]);
        assert_eq!(expand_word("\"${@:2}\"", &mut ctx).unwrap(), vec!["y.rs"]);
        assert_eq!(expand_word("\"${*:-none}\"", &mut ctx).unwrap(), vec!["x.rs y.rs"]);
        ctx.params.clear();
        assert_eq!(expand_word("${@:-none}", &mut ctx).unwrap(), vec!["none"]);
    }

    #[test]
    fn unquoted_defaults_split() {
        let mut ctx = MapContext::default();
        assert_eq!(expand_word("${x:-a b}", &mut ctx).unwrap(), vec!["a", "b"]);
        assert_eq!(expand_word("\"${x:-a b}\"", &mut ctx).unwrap(), vec!["a b"]);
        assert_eq!(expand_word("\"${x:-\"q\"}\"", &mut ctx).unwrap(), vec!["q"]);
    }

    #[test]
    fn bad_substitutions() {
        let mut ctx = MapContext::default();
        assert!(expand_word_single("${}", &mut ctx).is_err());
        assert!(expand_word_single("${x;}", &mut ctx).is_err());
    }
}
