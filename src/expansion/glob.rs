use glob::{glob_with, MatchOptions};
use log::debug;

use super::split::Field;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Pathname expansion of one field. Fields without unquoted wildcards, bad
/// patterns and patterns matching nothing all stay literal.
pub fn expand_field(field: Field, noglob: bool) -> Vec<String> {
    if noglob || !field.glob {
        return vec![field.text];
    }
    match matching_paths(&field.pattern) {
        Some(matches) => matches,
        None => vec![field.text],
    }
}

/// Sorted paths matching `pattern`, or `None` when nothing matches.
pub fn matching_paths(pattern: &str) -> Option<Vec<String>> {
    let entries = match glob_with(pattern, OPTIONS) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("glob event=bad-pattern pattern={:?} error={}", pattern, err);
            return None;
        }
    };
    let mut matches = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => matches.push(path.to_string_lossy().into_owned()),
            Err(err) => debug!("glob event=unreadable path={}", err.path().display()),
        }
    }
    if matches.is_empty() {
        return None;
    }
    matches.sort();
    Some(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::split::{split_fields, Piece, DEFAULT_IFS};
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn field(pieces: &[Piece]) -> Field {
        split_fields(pieces, DEFAULT_IFS).remove(0)
    }

    #[test]
    fn matches_are_sorted_and_hide_dotfiles() {
        let dir = tempdir().unwrap();
        for name in ["b.rs", "a.rs", "c.txt", ".hidden.rs"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let pattern = format!("{}/*.rs", dir.path().display());
        let expanded = expand_field(field(&[Piece::Lit(pattern)]), false);
        assert_eq!(
            expanded,
            vec![
                dir.path().join("a.rs").display().to_string(),
                dir.path().join("b.rs").display().to_string(),
            ]
        );
    }

    #[test]
    fn caret_negation_and_no_match() {
        let dir = tempdir().unwrap();
        for name in ["a1", "b1"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let base = dir.path().display().to_string();
        let expanded = expand_field(field(&[Piece::Lit(format!("{}/[^a]1", base))]), false);
        assert_eq!(expanded, vec![format!("{}/b1", base)]);

        let missing = format!("{}/*.none", base);
        assert_eq!(expand_field(field(&[Piece::Lit(missing.clone())]), false), vec![missing]);
    }

    #[test]
    fn quoted_and_noglob_fields_stay_literal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("x.rs"), "").unwrap();
        let base = dir.path().display().to_string();
        let quoted = field(&[Piece::Lit(format!("{}/", base)), Piece::Quoted("*.rs".into())]);
        assert_eq!(expand_field(quoted, false), vec![format!("{}/*.rs", base)]);
        let plain = field(&[Piece::Lit(format!("{}/*.rs", base))]);
        assert_eq!(expand_field(plain, true), vec![format!("{}/*.rs", base)]);
    }

    proptest! {
        #[test]
        fn words_without_wildcards_pass_through(s in "[a-z0-9_./-]{0,32}") {
            let fields = split_fields(&[Piece::Lit(s.clone())], DEFAULT_IFS);
            for field in fields {
                prop_assert!(!field.glob);
                prop_assert_eq!(expand_field(field, false), vec![s.clone()]);
            }
        }
    }
}
