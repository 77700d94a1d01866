//! Brace expansion on raw word text.
//!
//! Runs before every other expansion. Quoted text, backslash escapes and
//! `${...}` / `$(...)` spans are never brace expressions. A `{...}` with no
//! top-level comma and no valid range is left as written.

// Upper bound on the words one brace expression may produce.
const MAX_BRACE_WORDS: usize = 10_000;

pub fn expand_braces(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = Vec::new();
    expand_into(&chars, &mut out);
    out
}

fn expand_into(chars: &[char], out: &mut Vec<String>) {
    let Some((open, close, alternatives)) = find_brace(chars) else {
        out.push(chars.iter().collect());
        return;
    };
    let prefix = &chars[..open];
    let suffix = &chars[close + 1..];
    for alternative in alternatives {
        if out.len() >= MAX_BRACE_WORDS {
            return;
        }
        let mut word: Vec<char> = prefix.to_vec();
        word.extend(alternative.chars());
        word.extend_from_slice(suffix);
        expand_into(&word, out);
    }
}

/// First expandable `{...}`: its bounds and the alternatives it yields.
fn find_brace(chars: &[char]) -> Option<(usize, usize, Vec<String>)> {
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => i = skip_single(chars, i),
            '"' => i = skip_double(chars, i),
            '$' if matches!(chars.get(i + 1), Some('{') | Some('(')) => {
                i = skip_balanced(chars, i + 1);
            }
            '{' => {
                if let Some(close) = matching_brace(chars, i) {
                    let inner = &chars[i + 1..close];
                    if let Some(alternatives) = alternatives(inner) {
                        return Some((i, close, alternatives));
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

fn skip_single(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() && chars[i] != '\'' {
        i += 1;
    }
    i + 1
}

fn skip_double(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Skip a `{...}` or `(...)` span starting at `start`.
fn skip_balanced(chars: &[char], start: usize) -> usize {
    let (open, close) = if chars[start] == '{' { ('{', '}') } else { ('(', ')') };
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '\'' => {
                i = skip_single(chars, i);
                continue;
            }
            '"' => {
                i = skip_double(chars, i);
                continue;
            }
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    i
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '\'' => {
                i = skip_single(chars, i);
                continue;
            }
            '"' => {
                i = skip_double(chars, i);
                continue;
            }
            '$' if matches!(chars.get(i + 1), Some('{') | Some('(')) => {
                i = skip_balanced(chars, i + 1);
                continue;
            }
            '{' => depth += 1,
            '}' => {
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

fn alternatives(inner: &[char]) -> Option<Vec<String>> {
    let parts = split_top_level_commas(inner);
    if parts.len() > 1 {
        return Some(parts);
    }
    let text: String = inner.iter().collect();
    expand_range(&text)
}

fn split_top_level_commas(inner: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i < inner.len() {
        match inner[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '\'' => {
                i = skip_single(inner, i);
                continue;
            }
            '"' => {
                i = skip_double(inner, i);
                continue;
            }
            '$' if matches!(inner.get(i + 1), Some('{') | Some('(')) => {
                i = skip_balanced(inner, i + 1);
                continue;
            }
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inner[start..i].iter().collect());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let end = inner.len().min(i);
    parts.push(inner[start.min(end)..end].iter().collect());
    parts
}

/// `a..e`, `1..5`, `1..10..2`, `01..10`.
fn expand_range(text: &str) -> Option<Vec<String>> {
    let pieces: Vec<&str> = text.split("..").collect();
    if pieces.len() != 2 && pieces.len() != 3 {
        return None;
    }
    let step = match pieces.get(2) {
        Some(step) => Some(step.parse::<i64>().ok()?),
        None => None,
    };
    let step = step.map(i64::abs).filter(|step| *step != 0).unwrap_or(1);

    if let (Ok(start), Ok(end)) = (pieces[0].parse::<i64>(), pieces[1].parse::<i64>()) {
        let width = pad_width(pieces[0]).max(pad_width(pieces[1]));
        let mut values = Vec::new();
        let mut current = start;
        while values.len() < MAX_BRACE_WORDS {
            if (start <= end && current > end) || (start > end && current < end) {
                break;
            }
            values.push(format_padded(current, width));
            current = if start <= end {
                current.checked_add(step)?
            } else {
                current.checked_sub(step)?
            };
        }
        return Some(values);
    }

    let mut start_chars = pieces[0].chars();
    let mut end_chars = pieces[1].chars();
    let (Some(start), None, Some(end), None) = (
        start_chars.next(),
        start_chars.next(),
        end_chars.next(),
        end_chars.next(),
    ) else {
        return None;
    };
    if !start.is_ascii_alphabetic() || !end.is_ascii_alphabetic() {
        return None;
    }
    let (from, to) = (start as u32, end as u32);
    let step = u32::try_from(step).ok()?;
    let mut values = Vec::new();
    let mut current = from;
    loop {
        if let Some(ch) = char::from_u32(current) {
            values.push(ch.to_string());
        }
        if from <= to {
            current += step;
            if current > to {
                break;
            }
        } else {
            if current < to + step {
                break;
            }
            current -= step;
        }
    }
    Some(values)
}

fn pad_width(text: &str) -> usize {
    let digits = text.trim_start_matches('-');
    if digits.len() > 1 && digits.starts_with('0') {
        text.len()
    } else {
        0
    }
}

fn format_padded(value: i64, width: usize) -> String {
    if width == 0 {
        return value.to_string();
    }
    if value < 0 {
        format!("-{:0>w$}", value.unsigned_abs(), w = width.saturating_sub(1))
    } else {
        format!("{:0>w$}", value, w = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_lists_and_nesting() {
        assert_eq!(expand_braces("a{b,c}d"), vec!["abd", "acd"]);
        assert_eq!(
            expand_braces("{x,y{1,2}}"),
            vec!["x", "y1", "y2"]
        );
        assert_eq!(expand_braces("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn ranges() {
        assert_eq!(expand_braces("{1..5}"), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(expand_braces("{5..1..2}"), vec!["5", "3", "1"]);
        assert_eq!(expand_braces("{a..e}"), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(expand_braces("{e..a..2}"), vec!["e", "c", "a"]);
        assert_eq!(expand_braces("{01..10..3}"), vec!["01", "04", "07", "10"]);
        assert_eq!(expand_braces("{-2..1}"), vec!["-2", "-1", "0", "1"]);
    }

    #[test]
    fn non_expressions_are_left_alone() {
        assert_eq!(expand_braces("{}"), vec!["{}"]);
        assert_eq!(expand_braces("{a}"), vec!["{a}"]);
        assert_eq!(expand_braces("'{a,b}'"), vec!["'{a,b}'"]);
        assert_eq!(expand_braces("${x:-a,b}"), vec!["${x:-a,b}"]);
        assert_eq!(expand_braces("\\{a,b}"), vec!["\\{a,b}"]);
        assert_eq!(expand_braces("{1..x}"), vec!["{1..x}"]);
    }
}
