//! `alias`, `unalias`, `eval`, `source` and `type`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::alias::AliasStore;
use crate::error::{ShellError, ShellResult};
use crate::execution::{Executor, Flow};
use crate::io_helpers::{os_message, report};
use crate::parse::Keyword;

use super::{emit, is_builtin, status, usage};

pub(super) fn alias(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if argv.len() == 1 {
        let mut text = String::new();
        for (name, value) in exec.aliases().iter() {
            text.push_str(&AliasStore::format_line(name, value));
            text.push('\n');
        }
        emit("alias", &text)?;
        return status(0);
    }
    let mut code = 0;
    let mut text = String::new();
    for arg in &argv[1..] {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                debug!("exec event=alias-define name={}", name);
                exec.aliases_mut().set(name, value);
            }
            _ => match exec.aliases().get(arg) {
                Some(value) => {
                    text.push_str(&AliasStore::format_line(arg, value));
                    text.push('\n');
                }
                None => {
                    report(format!("alias: {}: not found", arg));
                    code = 1;
                }
            },
        }
    }
    emit("alias", &text)?;
    status(code)
}

pub(super) fn unalias(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if argv.len() == 1 {
        return Err(usage("unalias: usage: unalias [-a] name ..."));
    }
    if argv[1] == "-a" {
        exec.aliases_mut().clear();
        return status(0);
    }
    let mut code = 0;
    for name in &argv[1..] {
        if !exec.aliases_mut().remove(name) {
            report(format!("unalias: {}: not found", name));
            code = 1;
        }
    }
    status(code)
}

/// Join the arguments with spaces and run the result as shell input.
pub(super) fn eval(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let source = argv[1..].join(" ");
    if source.trim().is_empty() {
        return status(0);
    }
    exec.run_flow(&source)
}

pub(super) fn source(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let Some(file) = argv.get(1) else {
        return Err(usage(format!("{}: filename argument required", argv[0])));
    };
    let path = locate_script(exec, file);
    let text = fs::read_to_string(&path)
        .map_err(|err| ShellError::execution(format!("{}: {}", file, os_message(&err))))?;
    debug!("exec event=source path={}", path.display());
    exec.run_sourced(&text, argv[2..].to_vec())
}

/// A name without `/` is looked up on `PATH` first, then in the current
/// directory.
fn locate_script(exec: &Executor, file: &str) -> PathBuf {
    if file.contains('/') {
        return PathBuf::from(file);
    }
    let path = exec.scope().value("PATH").unwrap_or("");
    path.split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(file))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(file))
}

pub(super) fn type_builtin(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let mut code = 0;
    let mut text = String::new();
    for name in &argv[1..] {
        let line = if let Some(value) = exec.aliases().get(name) {
            format!("{} is aliased to `{}'", name, value)
        } else if Keyword::from_word(name).is_some() {
            format!("{} is a shell keyword", name)
        } else if exec.function(name).is_some() {
            format!("{} is a function", name)
        } else if is_builtin(name) {
            format!("{} is a shell builtin", name)
        } else {
            match exec.resolve_command(name).filter(|path| path.is_file()) {
                Some(path) => format!("{} is {}", name, path.display()),
                None => {
                    report(format!("type: {}: not found", name));
                    code = 1;
                    continue;
                }
            }
        };
        text.push_str(&line);
        text.push('\n');
    }
    emit("type", &text)?;
    status(code)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use crate::execution::Executor;

    #[test]
    fn alias_define_and_remove() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("alias setit='it=1'"), 0);
        assert_eq!(exec.aliases().get("setit"), Some("it=1"));
        exec.run_source("setit");
        assert_eq!(exec.scope().value("it"), Some("1"));
        assert_eq!(exec.run_source("unalias setit"), 0);
        assert_eq!(exec.run_source("unalias setit"), 1);
        assert_eq!(exec.run_source("alias missing"), 1);
    }

    #[test]
    fn eval_runs_joined_words() {
        let mut exec = Executor::new();
        exec.run_source("cmd='x=evaluated'; eval $cmd");
        assert_eq!(exec.scope().value("x"), Some("evaluated"));
        assert_eq!(exec.run_source("eval 'if'"), 2);
        assert_eq!(exec.run_source("f() { eval 'return 4'; echo no; }; f"), 4);
    }

    #[test]
    fn source_runs_in_current_shell() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sourced=$1; return 5; after=1").unwrap();
        let mut exec = Executor::new();
        let source = format!(". '{}' arg", file.path().display());
        assert_eq!(exec.run_source(&source), 5);
        assert_eq!(exec.scope().value("sourced"), Some("arg"));
        assert_eq!(exec.scope().value("after"), None);
        assert!(exec.scope().positional().is_empty());
        assert_eq!(exec.run_source("source /no/such/file"), 1);
    }

    #[test]
    #[serial]
    fn type_classifies_names() {
        let mut exec = Executor::new();
        exec.run_source("f() { :; }");
        assert_eq!(exec.run_source("type if f cd sh >/dev/null"), 0);
        assert_eq!(exec.run_source("type no-such-thing-xyz"), 1);
    }
}
