use crate::error::{ShellError, ShellResult};
use crate::execution::{Executor, Flow};
use crate::io_helpers::shell_quote;
use crate::parse::is_name;
use crate::scope::Variable;

use super::{emit, status, usage};

/// Split `NAME=value` into its parts; a bare `NAME` has no value.
fn split_assignment(arg: &str) -> (&str, Option<String>) {
    match arg.split_once('=') {
        Some((name, value)) => (name, Some(value.to_string())),
        None => (arg, None),
    }
}

/// Apply `action` to each `NAME[=value]` operand. Bad names and failed
/// bindings are reported and make the status 1 without stopping the rest.
fn for_each_binding(
    exec: &mut Executor,
    builtin: &str,
    operands: &[String],
    action: fn(&mut Executor, &str, Option<String>) -> ShellResult<()>,
) -> ShellResult<Flow> {
    let mut code = 0;
    for operand in operands {
        let (name, value) = split_assignment(operand);
        if !is_name(name) {
            exec.fail(ShellError::execution(format!(
                "{}: `{}': not a valid identifier",
                builtin, operand
            )));
            code = 1;
            continue;
        }
        if let Err(err) = action(exec, name, value) {
            exec.fail(err);
            code = 1;
        }
    }
    status(code)
}

fn listing(exec: &Executor, prefix: &str, keep: fn(&Variable) -> bool) -> String {
    let mut text = String::new();
    for (name, var) in exec.scope().visible() {
        if keep(var) {
            text.push_str(&format!("{}{}={}\n", prefix, name, shell_quote(&var.value)));
        }
    }
    text
}

fn operands(argv: &[String], flag: &str) -> Vec<String> {
    argv[1..].iter().filter(|arg| *arg != flag).cloned().collect()
}

pub(super) fn export(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let operands = operands(argv, "-p");
    if operands.is_empty() {
        emit("export", &listing(exec, "export ", |var| var.exported))?;
        return status(0);
    }
    for_each_binding(exec, "export", &operands, |exec, name, value| {
        exec.scope_mut().export(name, value)
    })
}

pub(super) fn readonly(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let operands = operands(argv, "-p");
    if operands.is_empty() {
        emit("readonly", &listing(exec, "readonly ", |var| var.readonly))?;
        return status(0);
    }
    for_each_binding(exec, "readonly", &operands, |exec, name, value| {
        exec.scope_mut().set_readonly(name, value)
    })
}

pub(super) fn local(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if !exec.scope().in_function() {
        return Err(ShellError::execution("local: can only be used in a function"));
    }
    if argv.len() == 1 {
        emit("local", &listing(exec, "local ", |var| var.local))?;
        return status(0);
    }
    for_each_binding(exec, "local", &argv[1..], |exec, name, value| {
        exec.scope_mut().set_local(name, value)
    })
}

pub(super) fn unset(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let mut vars_only = false;
    let mut funcs_only = false;
    let mut names = &argv[1..];
    while let Some(flag) = names.first().and_then(|arg| arg.strip_prefix('-')) {
        match flag {
            "v" => vars_only = true,
            "f" => funcs_only = true,
            "" => {}
            _ => return Err(usage(format!("unset: -{}: invalid option", flag))),
        }
        names = &names[1..];
    }
    let mut code = 0;
    for name in names {
        if funcs_only {
            exec.remove_function(name);
            continue;
        }
        if !vars_only && exec.scope().get(name).is_none() && exec.remove_function(name) {
            continue;
        }
        if let Err(err) = exec.scope_mut().unset(name) {
            exec.fail(err);
            code = 1;
        }
    }
    status(code)
}

pub(super) fn set(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let args = &argv[1..];
    if args.is_empty() {
        emit("set", &listing(exec, "", |_| true))?;
        return status(0);
    }
    let mut index = 0;
    while index < args.len() {
        let arg = args[index].as_str();
        if arg == "--" {
            exec.set_positional(args[index + 1..].to_vec());
            return status(0);
        }
        if arg == "-" {
            exec.options_mut().xtrace = false;
            index += 1;
            break;
        }
        let (on, flags) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
            (Some(flags), _) => (true, flags),
            (None, Some(flags)) => (false, flags),
            (None, None) => break,
        };
        if flags == "o" {
            match args.get(index + 1) {
                Some(name) => {
                    if !exec.options_mut().set_named(name, on) {
                        return Err(usage(format!("set: {}: invalid option name", name)));
                    }
                    index += 2;
                }
                None => {
                    let lines = if on {
                        exec.options().describe()
                    } else {
                        reusable_options(exec)
                    };
                    let mut text = lines.join("\n");
                    text.push('\n');
                    emit("set", &text)?;
                    index += 1;
                }
            }
            continue;
        }
        for flag in flags.chars() {
            if !exec.options_mut().set_flag(flag, on) {
                let sign = if on { '-' } else { '+' };
                return Err(usage(format!("set: {}{}: invalid option", sign, flag)));
            }
        }
        index += 1;
    }
    if index < args.len() {
        exec.set_positional(args[index..].to_vec());
    }
    status(0)
}

/// `set +o` prints commands that restore the current options.
fn reusable_options(exec: &Executor) -> Vec<String> {
    exec.options()
        .describe()
        .iter()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let state = parts.next()?;
            let sign = if state == "on" { '-' } else { '+' };
            Some(format!("set {}o {}", sign, name))
        })
        .collect()
}

pub(super) fn shift(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let count = match argv.get(1) {
        None => 1,
        Some(arg) => arg
            .parse::<usize>()
            .map_err(|_| usage(format!("shift: {}: numeric argument required", arg)))?,
    };
    if !exec.scope_mut().shift(count) {
        return Err(ShellError::execution(format!(
            "shift: {}: shift count out of range",
            count
        )));
    }
    status(0)
}
