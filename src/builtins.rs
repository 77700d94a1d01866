//! Builtin commands.
//!
//! Every handler receives the executor and the expanded argv, including the
//! command name. Usage errors come back as `ShellError`s with status 2 and
//! are reported by the executor.

use log::debug;

use crate::error::{ShellError, ShellResult};
use crate::execution::{Executor, Flow};
use crate::io_helpers::{os_message, report, write_stdout};

mod job_cmds;
mod scripting;
mod test_cmd;
mod variables;

pub use test_cmd::evaluate as evaluate_test;

pub type BuiltinFn = fn(&mut Executor, &[String]) -> ShellResult<Flow>;

pub const NAMES: &[&str] = &[
    ":", ".", "[", "alias", "bg", "break", "cd", "continue", "echo", "eval", "exit", "export",
    "false", "fg", "help", "jobs", "local", "pwd", "readonly", "return", "set", "shift",
    "source", "test", "true", "type", "unalias", "unset", "wait",
];

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    let handler: BuiltinFn = match name {
        ":" | "true" => builtin_true,
        "false" => builtin_false,
        "echo" => echo,
        "pwd" => pwd,
        "cd" => cd,
        "exit" => exit,
        "return" => return_builtin,
        "break" => break_builtin,
        "continue" => continue_builtin,
        "help" => help,
        "export" => variables::export,
        "readonly" => variables::readonly,
        "local" => variables::local,
        "unset" => variables::unset,
        "set" => variables::set,
        "shift" => variables::shift,
        "alias" => scripting::alias,
        "unalias" => scripting::unalias,
        "eval" => scripting::eval,
        "source" | "." => scripting::source,
        "type" => scripting::type_builtin,
        "test" | "[" => test_cmd::test,
        "jobs" => job_cmds::jobs,
        "fg" => job_cmds::fg,
        "bg" => job_cmds::bg,
        "wait" => job_cmds::wait,
        _ => return None,
    };
    Some(handler)
}

pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
}

fn status(code: i32) -> ShellResult<Flow> {
    Ok(Flow::Normal(code))
}

fn usage(message: impl Into<String>) -> ShellError {
    ShellError::execution(message).with_status(2)
}

/// Write builtin output; failures other than a closed pipe become errors.
fn emit(name: &str, text: &str) -> ShellResult<()> {
    write_stdout(text)
        .map_err(|err| ShellError::execution(format!("{}: write error: {}", name, os_message(&err))))
}

/// Parse an optional numeric status argument, defaulting to `$?`.
fn status_arg(exec: &Executor, name: &str, arg: Option<&String>) -> ShellResult<i32> {
    match arg {
        None => Ok(exec.last_status()),
        Some(text) => text
            .parse::<i64>()
            .map(|value| (value & 0xff) as i32)
            .map_err(|_| usage(format!("{}: {}: numeric argument required", name, text))),
    }
}

fn builtin_true(_exec: &mut Executor, _argv: &[String]) -> ShellResult<Flow> {
    status(0)
}

fn builtin_false(_exec: &mut Executor, _argv: &[String]) -> ShellResult<Flow> {
    status(1)
}

fn echo(_exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let mut newline = true;
    let mut escapes = false;
    let mut args = &argv[1..];
    while let Some(first) = args.first() {
        let Some(flags) = first.strip_prefix('-') else {
            break;
        };
        if flags.is_empty() || !flags.chars().all(|ch| matches!(ch, 'n' | 'e' | 'E')) {
            break;
        }
        for flag in flags.chars() {
            match flag {
                'n' => newline = false,
                'e' => escapes = true,
                _ => escapes = false,
            }
        }
        args = &args[1..];
    }
    let mut out = String::new();
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        if escapes && push_escaped(arg, &mut out) {
            emit("echo", &out)?;
            return status(0);
        }
        if !escapes {
            out.push_str(arg);
        }
    }
    if newline {
        out.push('\n');
    }
    emit("echo", &out)?;
    status(0)
}

/// Append `arg` with backslash escapes interpreted. Returns true at `\c`,
/// which suppresses all further output.
fn push_escaped(arg: &str, out: &mut String) -> bool {
    let mut chars = arg.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('e') => out.push('\x1b'),
            Some('\\') => out.push('\\'),
            Some('c') => return true,
            Some('0') => {
                let mut value = 0u32;
                for _ in 0..3 {
                    match chars.peek().and_then(|digit| digit.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\0'));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    false
}

fn pwd(_exec: &mut Executor, _argv: &[String]) -> ShellResult<Flow> {
    let dir = std::env::current_dir()
        .map_err(|err| ShellError::execution(format!("pwd: {}", os_message(&err))))?;
    emit("pwd", &format!("{}\n", dir.display()))?;
    status(0)
}

fn cd(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if argv.len() > 2 {
        return Err(ShellError::execution("cd: too many arguments"));
    }
    let mut announce = false;
    let target = match argv.get(1).map(String::as_str) {
        None => exec
            .scope()
            .value("HOME")
            .map(str::to_string)
            .ok_or_else(|| ShellError::execution("cd: HOME not set"))?,
        Some("-") => {
            announce = true;
            exec.scope()
                .value("OLDPWD")
                .map(str::to_string)
                .ok_or_else(|| ShellError::execution("cd: OLDPWD not set"))?
        }
        Some(dir) => dir.to_string(),
    };
    let old = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(_) => exec.scope().value("PWD").unwrap_or_default().to_string(),
    };
    std::env::set_current_dir(&target)
        .map_err(|err| ShellError::execution(format!("cd: {}: {}", target, os_message(&err))))?;
    let new = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or(target);
    debug!("exec event=cd from={} to={}", old, new);
    exec.scope_mut().export("OLDPWD", Some(old))?;
    exec.scope_mut().export("PWD", Some(new.clone()))?;
    if announce {
        emit("cd", &format!("{}\n", new))?;
    }
    status(0)
}

fn exit(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let code = match status_arg(exec, "exit", argv.get(1)) {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            2
        }
    };
    Ok(Flow::Exit(code))
}

fn return_builtin(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if !exec.can_return() {
        return Err(ShellError::execution(
            "return: can only `return' from a function or sourced script",
        ));
    }
    Ok(Flow::Return(status_arg(exec, "return", argv.get(1))?))
}

fn break_builtin(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    loop_control(exec, argv, true)
}

fn continue_builtin(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    loop_control(exec, argv, false)
}

fn loop_control(exec: &mut Executor, argv: &[String], leave: bool) -> ShellResult<Flow> {
    let name = if leave { "break" } else { "continue" };
    let levels = match argv.get(1) {
        None => 1,
        Some(arg) => match arg.parse::<usize>() {
            Ok(levels) if levels >= 1 => levels,
            _ => return Err(usage(format!("{}: {}: loop count out of range", name, arg))),
        },
    };
    let depth = exec.loop_depth();
    if depth == 0 {
        report(format!(
            "{}: only meaningful in a `for', `while', or `until' loop",
            name
        ));
        return status(0);
    }
    let levels = levels.min(depth);
    Ok(if leave {
        Flow::Break(levels)
    } else {
        Flow::Continue(levels)
    })
}

fn help(_exec: &mut Executor, _argv: &[String]) -> ShellResult<Flow> {
    let mut text = String::from("posish builtins:\n");
    for chunk in NAMES.chunks(8) {
        text.push_str("  ");
        text.push_str(&chunk.join(" "));
        text.push('\n');
    }
    text.push_str("Functions take `name() { ... }` or `name(a, b=default) { ... }`.\n");
    emit("help", &text)?;
    status(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn every_listed_name_resolves() {
        for name in NAMES {
            assert!(is_builtin(name), "{name} missing from lookup");
        }
        assert!(!is_builtin("ls"));
    }

    #[test]
    fn echo_escapes() {
        let mut out = String::new();
        assert!(!push_escaped("a\\tb\\\\", &mut out));
        assert_eq!(out, "a\tb\\");
        let mut out = String::new();
        assert!(push_escaped("x\\cy", &mut out));
        assert_eq!(out, "x");
        let mut out = String::new();
        push_escaped("\\0101\\q", &mut out);
        assert_eq!(out, "A\\q");
    }

    #[test]
    fn exit_statuses() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("exit 300"), 44);
        assert_eq!(exec.exit_requested(), Some(44));
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("false; exit"), 1);
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("exit nope"), 2);
    }

    #[test]
    fn return_outside_function_fails() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("return 3"), 1);
        assert!(exec.has_error());
    }

    #[test]
    fn break_outside_loop_is_harmless() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("break; after=1"), 0);
        assert_eq!(exec.scope().value("after"), Some("1"));
        assert_eq!(exec.run_source("for i in 1; do break 0; done"), 2);
    }

    #[test]
    #[serial]
    fn cd_updates_pwd_and_oldpwd() {
        let dir = tempfile::tempdir().unwrap();
        let start = std::env::current_dir().unwrap();
        let target = dir.path().canonicalize().unwrap();
        let mut exec = Executor::new();
        let source = format!("cd '{}'", target.display());
        assert_eq!(exec.run_source(&source), 0);
        let pwd = exec.scope().value("PWD").map(str::to_string);
        let oldpwd = exec.scope().value("OLDPWD").map(str::to_string);
        std::env::set_current_dir(&start).unwrap();
        assert_eq!(pwd, Some(target.display().to_string()));
        assert_eq!(oldpwd, Some(start.display().to_string()));
        assert_eq!(exec.run_source("cd /definitely/not/here"), 1);
    }
}
