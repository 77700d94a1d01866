use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

use log::{debug, warn};

use posish::execution::Executor;
use posish::io_helpers::{flush_std, os_message, report};
use posish::options::ShellOptions;
use posish::repl::Repl;
use posish::signals::{init_session, install_signal_handlers, stdin_is_tty};

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Command(String),
    Script(String),
    Stdin,
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    mode: Mode,
    options: ShellOptions,
    force_interactive: bool,
    /// `$0`, when one was given.
    name: Option<String>,
    positional: Vec<String>,
}

const USAGE: &str = "usage: posish [-eufnxi] [-c command [name [arg ...]] | script [arg ...]]";

/// `posish [-eufnxi] [-c command [name [arg ...]]]` or
/// `posish [-eufnxi] [script [arg ...]]`.
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation, String> {
    let mut args = args.into_iter().peekable();
    let mut options = ShellOptions::default();
    let mut force_interactive = false;
    let mut command_mode = false;
    while let Some(arg) = args.peek() {
        if arg == "--" {
            args.next();
            break;
        }
        let (on, flags) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
            (Some(flags), _) if !flags.is_empty() => (true, flags.to_string()),
            (None, Some(flags)) if !flags.is_empty() => (false, flags.to_string()),
            _ => break,
        };
        args.next();
        for flag in flags.chars() {
            match flag {
                'c' if on => command_mode = true,
                'i' => force_interactive = on,
                _ if options.set_flag(flag, on) => {}
                _ => {
                    let sign = if on { '-' } else { '+' };
                    return Err(format!("{}{}: invalid option\n{}", sign, flag, USAGE));
                }
            }
        }
    }
    let mode = if command_mode {
        let command = args
            .next()
            .ok_or_else(|| format!("-c: option requires an argument\n{}", USAGE))?;
        Mode::Command(command)
    } else {
        match args.next() {
            Some(path) => Mode::Script(path),
            None => Mode::Stdin,
        }
    };
    let name = match &mode {
        Mode::Command(_) => args.next(),
        Mode::Script(path) => Some(path.clone()),
        Mode::Stdin => None,
    };
    Ok(Invocation {
        mode,
        options,
        force_interactive,
        name,
        positional: args.collect(),
    })
}

fn init_logging() {
    let env = env_logger::Env::default().filter_or("POSISH_LOG", "warn");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

fn main() {
    init_logging();
    let invocation = match parse_args(env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(message) => {
            report(message);
            process::exit(2);
        }
    };
    debug!("main event=start mode={:?}", invocation.mode);

    let interactive = invocation.force_interactive
        || (invocation.mode == Mode::Stdin && stdin_is_tty());
    let mut exec = Executor::new();
    *exec.options_mut() = invocation.options;
    exec.set_debug(log::log_enabled!(log::Level::Debug));
    exec.set_interactive(interactive);
    if let Some(name) = invocation.name {
        exec.set_script_name(name);
    }
    exec.set_positional(invocation.positional);

    if interactive && stdin_is_tty() {
        if let Err(err) = install_signal_handlers() {
            warn!("signal setup failed: {}", err);
        }
        match init_session() {
            Ok(pgid) => exec.set_shell_pgid(pgid),
            Err(err) => warn!("job control disabled: {}", err),
        }
    }

    let status = match invocation.mode {
        Mode::Command(command) => {
            exec.run_source(&command);
            exec.exit_requested().unwrap_or(exec.last_status())
        }
        Mode::Script(path) => match File::open(&path) {
            Ok(file) => Repl::from_reader(BufReader::new(file)).run(&mut exec),
            Err(err) => {
                report(format!("{}: {}", path, os_message(&err)));
                if err.kind() == io::ErrorKind::NotFound {
                    127
                } else {
                    126
                }
            }
        },
        Mode::Stdin if interactive && stdin_is_tty() => match Repl::interactive() {
            Ok(mut repl) => repl.run(&mut exec),
            Err(err) => {
                report(format!("cannot start line editor: {}", err));
                1
            }
        },
        Mode::Stdin => Repl::from_reader(io::stdin().lock()).run(&mut exec),
    };
    flush_std();
    process::exit(status);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Invocation, String> {
        parse_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn command_string_with_name_and_args() {
        let inv = parse(&["-e", "-c", "echo $1", "prog", "a", "b"]).unwrap();
        assert_eq!(inv.mode, Mode::Command("echo $1".into()));
        assert!(inv.options.errexit);
        assert_eq!(inv.name.as_deref(), Some("prog"));
        assert_eq!(inv.positional, ["a", "b"]);
    }

    #[test]
    fn script_path_and_combined_flags() {
        let inv = parse(&["-xu", "run.sh", "-e"]).unwrap();
        assert_eq!(inv.mode, Mode::Script("run.sh".into()));
        assert!(inv.options.xtrace && inv.options.nounset);
        assert!(!inv.options.errexit);
        assert_eq!(inv.positional, ["-e"]);
    }

    #[test]
    fn stdin_and_errors() {
        let inv = parse(&["-i"]).unwrap();
        assert_eq!(inv.mode, Mode::Stdin);
        assert!(inv.force_interactive);
        assert!(parse(&["-c"]).is_err());
        assert!(parse(&["-q"]).is_err());
        assert_eq!(parse(&["--", "-file"]).unwrap().mode, Mode::Script("-file".into()));
    }
}
