//! Alias store.
//!
//! Aliases replace the first word of a simple command when that word is an
//! unquoted literal. Chains (`alias ll='l -a'`, `alias l='ls -l'`) are
//! followed up to `MAX_ALIAS_DEPTH` levels; an alias whose value starts with
//! its own name stops the chain.

use std::collections::BTreeMap;

use crate::io_helpers::shell_quote;

pub const MAX_ALIAS_DEPTH: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct AliasStore {
    aliases: BTreeMap<String, String>,
}

impl AliasStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.aliases.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.aliases.remove(name).is_some()
    }

    pub fn clear(&mut self) {
        self.aliases.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// `alias name='value'`, as printed by the `alias` builtin.
    pub fn format_line(name: &str, value: &str) -> String {
        format!("alias {}={}", name, shell_quote(value))
    }

    /// Source text replacing the command word `name`, with chained aliases
    /// on the first word resolved.
    pub fn expand(&self, name: &str) -> Option<String> {
        let mut text = self.get(name)?.to_string();
        let mut current = name.to_string();
        let mut depth = 1;
        while depth < MAX_ALIAS_DEPTH {
            let (first, rest) = split_first_word(&text);
            if first.is_empty() || first == current {
                break;
            }
            let Some(value) = self.get(first) else {
                break;
            };
            let next = first.to_string();
            text = format!("{}{}", value, rest);
            current = next;
            depth += 1;
        }
        Some(text)
    }
}

fn split_first_word(text: &str) -> (&str, &str) {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|ch: char| ch.is_whitespace() || matches!(ch, ';' | '&' | '|' | '<' | '>' | '(' | ')'))
        .unwrap_or(trimmed.len());
    trimmed.split_at(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chains_resolve_on_first_word() {
        let mut store = AliasStore::new();
        store.set("ll", "l -a");
        store.set("l", "ls -l");
        assert_eq!(store.expand("ll").as_deref(), Some("ls -l -a"));
        assert_eq!(store.expand("missing"), None);
    }

    #[test]
    fn self_reference_and_cycles_terminate() {
        let mut store = AliasStore::new();
        store.set("ls", "ls --color");
        assert_eq!(store.expand("ls").as_deref(), Some("ls --color"));

        store.set("a", "b x");
        store.set("b", "a y");
        let expanded = store.expand("a").unwrap();
        assert!(expanded.starts_with('a') || expanded.starts_with('b'));
    }

    #[test]
    fn remove_and_format() {
        let mut store = AliasStore::new();
        store.set("g", "git status");
        assert_eq!(AliasStore::format_line("g", "git status"), "alias g='git status'");
        assert!(store.remove("g"));
        assert!(!store.remove("g"));
        assert!(store.is_empty());
    }
}
