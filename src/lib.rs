//! posish: a POSIX-family shell.
//!
//! Source text goes through the lexer and parser in `parse` into the
//! syntax tree in `ast`; `execution::Executor` walks the tree, expanding
//! words with `expansion` and running pipelines, functions and jobs.
//! The interactive reader in `repl` is only built with the `shell` feature,
//! so fuzz targets and tests can link the core alone.

pub mod alias;
pub mod ast;
pub mod builtins;
pub mod error;
pub mod execution;
pub mod expansion;
pub mod io_helpers;
pub mod job_control;
pub mod options;
pub mod parse;
#[cfg(feature = "shell")]
pub mod repl;
pub mod scope;
pub mod signals;
pub mod suggest;

pub use ast::Node;
pub use error::{ErrorKind, ShellError, ShellResult};
pub use execution::{Executor, Flow};
pub use expansion::ExpansionContext;
pub use options::ShellOptions;
pub use parse::{parse, regenerate};

/// Expansion context with fixed variables and no side effects. Command
/// substitutions expand to nothing.
struct InertContext;

impl ExpansionContext for InertContext {
    fn lookup_var(&self, name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/fuzz".to_string()),
            "IFS" => None,
            _ => Some(String::new()),
        }
    }

    fn assign_var(&mut self, _name: &str, _value: &str) -> ShellResult<()> {
        Ok(())
    }

    fn positional(&self) -> Vec<String> {
        vec!["one".to_string(), "two words".to_string()]
    }

    fn command_subst(&mut self, _source: &str) -> ShellResult<String> {
        Ok(String::new())
    }

    fn noglob(&self) -> bool {
        true
    }
}

/// Fuzz helper: parse arbitrary bytes and check that a successful parse
/// survives regeneration.
pub fn fuzz_parse_bytes(data: &[u8]) {
    let input = String::from_utf8_lossy(data);
    if let Ok(tree) = parse::parse(&input) {
        let text = parse::regenerate(&tree);
        if let Ok(again) = parse::parse(&text) {
            assert_eq!(tree, again, "regenerated text parses differently: {:?}", text);
        }
    }
}

/// Fuzz helper: parse, then expand every simple command's words.
pub fn fuzz_expand_bytes(data: &[u8]) {
    let input = String::from_utf8_lossy(data);
    let Ok(tree) = parse::parse(&input) else {
        return;
    };
    let mut ctx = InertContext;
    expand_commands(&tree, &mut ctx);
}

fn expand_commands(node: &Node, ctx: &mut InertContext) {
    match node {
        Node::Command(cmd) => {
            let _ = expansion::expand_words(&cmd.words, ctx);
            for assignment in &cmd.assignments {
                let _ = expansion::expand_assignment(assignment.value.as_str(), ctx);
            }
        }
        Node::Pipeline(pipeline) => {
            for stage in &pipeline.stages {
                expand_commands(stage, ctx);
            }
        }
        Node::And(left, right) | Node::Or(left, right) => {
            expand_commands(left, ctx);
            expand_commands(right, ctx);
        }
        Node::List(items) => {
            for item in items {
                expand_commands(item, ctx);
            }
        }
        Node::Background(inner)
        | Node::Subshell(inner)
        | Node::BraceGroup(inner)
        | Node::Redirected(inner, _) => expand_commands(inner, ctx),
        _ => {}
    }
}
