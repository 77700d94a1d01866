//! Shell pattern matching for `case` and `${var#pattern}` style removal.
//!
//! Supports `*`, `?`, bracket expressions with `!`/`^` negation, ranges and
//! `[:class:]` names, and backslash escapes. Quoted pattern text reaches
//! this module with each special character escaped.

pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, 0, &text, 0)
}

fn match_from(pattern: &[char], mut p: usize, text: &[char], mut t: usize) -> bool {
    // Backtracking point for the most recent `*`.
    let mut star: Option<(usize, usize)> = None;
    loop {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    while p < pattern.len() && pattern[p] == '*' {
                        p += 1;
                    }
                    if p == pattern.len() {
                        return true;
                    }
                    star = Some((p, t));
                    continue;
                }
                '?' if t < text.len() => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' if t < text.len() => {
                    if let Some((matched, next)) = match_bracket(pattern, p, text[t]) {
                        if matched {
                            p = next;
                            t += 1;
                            continue;
                        }
                    } else if text[t] == '[' {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
                '\\' if p + 1 < pattern.len() => {
                    if t < text.len() && text[t] == pattern[p + 1] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                ch if t < text.len() && ch == text[t] && ch != '?' && ch != '[' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        } else if t == text.len() {
            return true;
        }
        match star {
            Some((star_p, star_t)) if star_t < text.len() => {
                star = Some((star_p, star_t + 1));
                p = star_p;
                t = star_t + 1;
            }
            _ => return false,
        }
    }
}

/// Match `ch` against the bracket expression at `pattern[start]`. Returns
/// the result and the index after `]`, or `None` when unterminated.
fn match_bracket(pattern: &[char], start: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let current = *pattern.get(i)?;
        if current == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if current == '[' && pattern.get(i + 1) == Some(&':') {
            if let Some(end) = find_class_end(pattern, i + 2) {
                let name: String = pattern[i + 2..end].iter().collect();
                if class_matches(&name, ch) {
                    matched = true;
                }
                i = end + 2;
                continue;
            }
        }
        let (low, next) = if current == '\\' {
            (*pattern.get(i + 1)?, i + 2)
        } else {
            (current, i + 1)
        };
        if pattern.get(next) == Some(&'-') && pattern.get(next + 1).is_some_and(|c| *c != ']') {
            let (high, after) = if pattern[next + 1] == '\\' {
                (*pattern.get(next + 2)?, next + 3)
            } else {
                (pattern[next + 1], next + 2)
            };
            if low <= ch && ch <= high {
                matched = true;
            }
            i = after;
        } else {
            if low == ch {
                matched = true;
            }
            i = next;
        }
    }
}

fn find_class_end(pattern: &[char], from: usize) -> Option<usize> {
    (from..pattern.len().saturating_sub(1)).find(|&i| pattern[i] == ':' && pattern[i + 1] == ']')
}

fn class_matches(name: &str, ch: char) -> bool {
    match name {
        "alpha" => ch.is_alphabetic(),
        "digit" => ch.is_ascii_digit(),
        "alnum" => ch.is_alphanumeric(),
        "upper" => ch.is_uppercase(),
        "lower" => ch.is_lowercase(),
        "space" => ch.is_whitespace(),
        "blank" => ch == ' ' || ch == '\t',
        "punct" => ch.is_ascii_punctuation(),
        "xdigit" => ch.is_ascii_hexdigit(),
        "cntrl" => ch.is_control(),
        "print" => !ch.is_control(),
        "graph" => !ch.is_control() && !ch.is_whitespace(),
        _ => false,
    }
}

/// True when `pattern` has an unescaped `*`, `?` or `[`.
pub fn has_glob_chars(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '*' | '?' | '[' => return true,
            _ => {}
        }
    }
    false
}

/// Escape pattern-special characters so `text` matches only itself.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Remove backslash escapes added by `escape`.
pub fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    ShortestPrefix,
    LongestPrefix,
    ShortestSuffix,
    LongestSuffix,
}

/// `${v#p}`, `${v##p}`, `${v%p}`, `${v%%p}`.
pub fn remove_pattern(value: &str, pattern: &str, mode: Removal) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let slice = |from: usize, to: usize| -> String { chars[from..to].iter().collect() };
    match mode {
        Removal::ShortestPrefix => (0..=len)
            .find(|&i| glob_match(pattern, &slice(0, i)))
            .map(|i| slice(i, len)),
        Removal::LongestPrefix => (0..=len)
            .rev()
            .find(|&i| glob_match(pattern, &slice(0, i)))
            .map(|i| slice(i, len)),
        Removal::ShortestSuffix => (0..=len)
            .rev()
            .find(|&i| glob_match(pattern, &slice(i, len)))
            .map(|i| slice(0, i)),
        Removal::LongestSuffix => (0..=len)
            .find(|&i| glob_match(pattern, &slice(i, len)))
            .map(|i| slice(0, i)),
    }
    .unwrap_or_else(|| value.to_string())
}

/// `${v/p/r}` (first match) and `${v//p/r}` (every match).
pub fn replace_pattern(value: &str, pattern: &str, replacement: &str, all: bool) -> String {
    if pattern.is_empty() {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut replaced = false;
    while i < chars.len() {
        if !replaced || all {
            let longest = (i + 1..=chars.len())
                .rev()
                .find(|&end| glob_match(pattern, &chars[i..end].iter().collect::<String>()));
            if let Some(end) = longest {
                out.push_str(replacement);
                i = end;
                replaced = true;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(!glob_match("*.rs", "main.rsx"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn brackets() {
        assert!(glob_match("[abc]x", "bx"));
        assert!(glob_match("[!a]*", "bcd"));
        assert!(!glob_match("[!a]*", "abc"));
        assert!(glob_match("[^a]*", "zzz"));
        assert!(glob_match("[a-c][0-9]", "b7"));
        assert!(glob_match("[]]", "]"));
        assert!(glob_match("[[:digit:]]*", "9lives"));
        assert!(glob_match("[", "["));
    }

    #[test]
    fn escapes_are_literal() {
        assert!(glob_match("\\*", "*"));
        assert!(!glob_match("\\*", "x"));
        assert!(glob_match(&escape("a*b"), "a*b"));
        assert!(!glob_match(&escape("a*b"), "aXb"));
        assert_eq!(unescape(&escape("[x]")), "[x]");
        assert!(has_glob_chars("a*"));
        assert!(!has_glob_chars("a\\*"));
    }

    #[test]
    fn removal() {
        assert_eq!(remove_pattern("path/to/file.tar.gz", "*/", Removal::ShortestPrefix), "to/file.tar.gz");
        assert_eq!(remove_pattern("path/to/file.tar.gz", "*/", Removal::LongestPrefix), "file.tar.gz");
        assert_eq!(remove_pattern("file.tar.gz", ".*", Removal::ShortestSuffix), "file.tar");
        assert_eq!(remove_pattern("file.tar.gz", ".*", Removal::LongestSuffix), "file");
        assert_eq!(remove_pattern("abc", "x", Removal::LongestSuffix), "abc");
    }

    #[test]
    fn replacement() {
        assert_eq!(replace_pattern("a-b-c", "-", "+", false), "a+b-c");
        assert_eq!(replace_pattern("a-b-c", "-", "+", true), "a+b+c");
        assert_eq!(replace_pattern("hello", "l*", "L", false), "heL");
    }
}
