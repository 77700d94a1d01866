//! Field splitting.
//!
//! The expansion pass produces a sequence of pieces tagged with how they
//! were quoted. Only `Expanded` pieces (unquoted expansion results) are
//! split on IFS; literal and quoted text only ever join the current field.

pub const DEFAULT_IFS: &str = " \t\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Unquoted literal text from the word itself.
    Lit(String),
    /// Quoted text. Never split or globbed, and its presence forces a field.
    Quoted(String),
    /// Result of an unquoted expansion, subject to splitting and globbing.
    Expanded(String),
    /// Hard field boundary between positional parameters of `$@`.
    Break,
}

/// One field after splitting: the final text and the pattern handed to
/// pathname expansion, where quoted characters are escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    pub text: String,
    pub pattern: String,
    pub glob: bool,
}

impl Field {
    fn push_literal(&mut self, text: &str) {
        self.text.push_str(text);
        if text.contains(['*', '?', '[']) {
            self.glob = true;
        }
        self.pattern.push_str(&text.replace("[^", "[!"));
    }

    fn push_quoted(&mut self, text: &str) {
        self.text.push_str(text);
        self.pattern.push_str(&glob::Pattern::escape(text));
    }

    fn push_char(&mut self, ch: char) {
        self.text.push(ch);
        self.pattern.push(ch);
        if matches!(ch, '*' | '?' | '[') {
            self.glob = true;
        }
    }
}

struct Splitter<'a> {
    ifs: &'a str,
    fields: Vec<Field>,
    current: Option<Field>,
    // A non-whitespace delimiter ended the previous field.
    after_delimiter: bool,
    started: bool,
}

impl<'a> Splitter<'a> {
    fn field(&mut self) -> &mut Field {
        self.started = true;
        self.after_delimiter = false;
        self.current.get_or_insert_with(Field::default)
    }

    fn finish(&mut self) {
        if let Some(field) = self.current.take() {
            self.fields.push(field);
        }
    }

    fn expanded(&mut self, text: &str) {
        if self.ifs.is_empty() {
            if !text.is_empty() {
                let field = self.field();
                for ch in text.chars() {
                    field.push_char(ch);
                }
            }
            return;
        }
        for ch in text.chars() {
            if !self.ifs.contains(ch) {
                self.field().push_char(ch);
            } else if ch.is_whitespace() {
                self.finish();
            } else {
                if self.current.is_some() {
                    self.finish();
                } else if self.after_delimiter || !self.started {
                    self.fields.push(Field::default());
                }
                self.started = true;
                self.after_delimiter = true;
            }
        }
    }
}

/// Split pieces into fields using `ifs`.
pub fn split_fields(pieces: &[Piece], ifs: &str) -> Vec<Field> {
    let mut splitter = Splitter {
        ifs,
        fields: Vec::new(),
        current: None,
        after_delimiter: false,
        started: false,
    };
    for piece in pieces {
        match piece {
            Piece::Lit(text) => splitter.field().push_literal(text),
            Piece::Quoted(text) => splitter.field().push_quoted(text),
            Piece::Expanded(text) => splitter.expanded(text),
            Piece::Break => {
                splitter.finish();
                splitter.after_delimiter = false;
            }
        }
    }
    splitter.finish();
    splitter.fields
}

/// Concatenate pieces without splitting. `$@` boundaries become spaces.
pub fn join_pieces(pieces: &[Piece]) -> String {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            Piece::Lit(text) | Piece::Quoted(text) | Piece::Expanded(text) => out.push_str(text),
            Piece::Break => out.push(' '),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pieces: &[Piece], ifs: &str) -> Vec<String> {
        split_fields(pieces, ifs)
            .into_iter()
            .map(|field| field.text)
            .collect()
    }

    fn expanded(text: &str) -> Piece {
        Piece::Expanded(text.to_string())
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(texts(&[expanded("  a  b\tc\n")], DEFAULT_IFS), vec!["a", "b", "c"]);
        assert!(texts(&[expanded("   ")], DEFAULT_IFS).is_empty());
    }

    #[test]
    fn non_whitespace_delimiters_keep_empty_fields() {
        assert_eq!(texts(&[expanded("a::b")], ":"), vec!["a", "", "b"]);
        assert_eq!(texts(&[expanded(":a")], ":"), vec!["", "a"]);
        assert_eq!(texts(&[expanded("a:")], ":"), vec!["a"]);
        assert_eq!(texts(&[expanded("a : b")], ": "), vec!["a", "b"]);
        assert_eq!(texts(&[expanded("a: :b")], ": "), vec!["a", "", "b"]);
    }

    #[test]
    fn literals_and_quotes_join_fields() {
        let pieces = [
            Piece::Lit("x".into()),
            expanded("1 2"),
            Piece::Quoted(" y".into()),
        ];
        assert_eq!(texts(&pieces, DEFAULT_IFS), vec!["x1", "2 y"]);
        assert_eq!(texts(&[Piece::Quoted(String::new())], DEFAULT_IFS), vec![""]);
        assert_eq!(texts(&[expanded("a b")], ""), vec!["a b"]);
    }

    #[test]
    fn breaks_separate_parameters() {
        let pieces = [
            Piece::Quoted("a b".into()),
            Piece::Break,
            Piece::Quoted(String::new()),
        ];
        assert_eq!(texts(&pieces, DEFAULT_IFS), vec!["a b", ""]);
        assert_eq!(join_pieces(&pieces), "a b ");
    }

    #[test]
    fn quoted_glob_characters_are_escaped() {
        let fields = split_fields(
            &[Piece::Lit("*.".into()), Piece::Quoted("[x]".into())],
            DEFAULT_IFS,
        );
        assert!(fields[0].glob);
        assert_eq!(fields[0].pattern, "*.[[]x[]]");
        assert_eq!(fields[0].text, "*.[x]");
    }
}
