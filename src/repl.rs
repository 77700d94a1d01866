//! Reading commands.
//!
//! A terminal gets a rustyline editor with in-memory history; scripts and
//! piped input are read line by line. Either way, lines are collected until
//! they form complete commands, then handed to the executor.

use std::env;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, EditMode, Editor};
use signal_hook::consts::signal::SIGCHLD;
use signal_hook::flag;

use crate::execution::Executor;
use crate::io_helpers::report;
use crate::parse::needs_more_input;

enum Source {
    Editor(Box<Editor<(), DefaultHistory>>),
    Reader(Box<dyn BufRead>),
}

enum Input {
    Line(String),
    /// Ctrl-C at the prompt: drop the pending command.
    Interrupted,
    Eof,
}

pub struct Repl {
    source: Source,
    sigchld: Arc<AtomicBool>,
}

/// `POSISH_EDITMODE=vi` selects vi keys; anything else is emacs.
fn edit_mode() -> EditMode {
    match env::var("POSISH_EDITMODE").ok().as_deref() {
        Some("vi") | Some("VI") => EditMode::Vi,
        _ => EditMode::Emacs,
    }
}

impl Repl {
    /// Line editor on the terminal, with SIGCHLD noted for job reaping.
    pub fn interactive() -> io::Result<Self> {
        let config = Config::builder()
            .auto_add_history(false)
            .edit_mode(edit_mode())
            .build();
        let editor = Editor::with_config(config).map_err(io::Error::other)?;
        let sigchld = Arc::new(AtomicBool::new(false));
        flag::register(SIGCHLD, Arc::clone(&sigchld))?;
        Ok(Repl {
            source: Source::Editor(Box::new(editor)),
            sigchld,
        })
    }

    pub fn from_reader(reader: impl BufRead + 'static) -> Self {
        Repl {
            source: Source::Reader(Box::new(reader)),
            sigchld: Arc::new(AtomicBool::new(false)),
        }
    }

    fn read(&mut self, prompt: &str) -> io::Result<Input> {
        match &mut self.source {
            Source::Editor(editor) => match editor.readline(prompt) {
                Ok(line) => Ok(Input::Line(line)),
                Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
                Err(ReadlineError::Eof) => Ok(Input::Eof),
                Err(err) => Err(io::Error::other(err)),
            },
            Source::Reader(reader) => {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    return Ok(Input::Eof);
                }
                Ok(Input::Line(line))
            }
        }
    }

    fn remember(&mut self, command: &str) {
        if let Source::Editor(editor) = &mut self.source {
            let _ = editor.add_history_entry(command.trim_end());
        }
    }

    /// Run commands until end of input or `exit`. Returns the shell's exit
    /// status.
    pub fn run(&mut self, exec: &mut Executor) -> i32 {
        let mut pending = String::new();
        loop {
            if self.sigchld.swap(false, Ordering::SeqCst) {
                exec.reap_jobs();
            }
            let prompt = prompt_for(exec, pending.is_empty());
            let line = match self.read(&prompt) {
                Ok(Input::Line(line)) => line,
                Ok(Input::Interrupted) => {
                    pending.clear();
                    continue;
                }
                Ok(Input::Eof) => break,
                Err(err) => {
                    report(format!("read error: {}", err));
                    break;
                }
            };
            pending.push_str(&line);
            if !line.ends_with('\n') {
                pending.push('\n');
            }
            if needs_more_input(&pending) {
                continue;
            }
            let command = std::mem::take(&mut pending);
            if command.trim().is_empty() {
                continue;
            }
            self.remember(&command);
            exec.run_source(&command);
            if exec.is_interactive() {
                exec.clear_error();
            }
            if let Some(status) = exec.exit_requested() {
                return status;
            }
        }
        if !pending.trim().is_empty() {
            debug!("repl event=eof pending_bytes={}", pending.len());
            exec.run_source(&pending);
            if let Some(status) = exec.exit_requested() {
                return status;
            }
        }
        if exec.is_interactive() {
            println!();
        }
        exec.last_status()
    }
}

fn prompt_for(exec: &Executor, fresh: bool) -> String {
    let (name, fallback) = if fresh { ("PS1", "$ ") } else { ("PS2", "> ") };
    exec.scope().value(name).unwrap_or(fallback).to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn incomplete_input_is_detected() {
        assert!(needs_more_input("if true; then\n"));
        assert!(needs_more_input("echo 'open\n"));
        assert!(needs_more_input("cat <<EOF\nbody\n"));
        assert!(!needs_more_input("cat <<EOF\nbody\nEOF\n"));
        assert!(!needs_more_input("echo done\n"));
        assert!(!needs_more_input("echo )\n"));
    }

    #[test]
    fn reader_runs_multiline_commands() {
        let script = "x=1\nif [ $x = 1 ]; then\n  y=yes\nfi\nexit 3\nz=unreached\n";
        let mut repl = Repl::from_reader(Cursor::new(script.to_string()));
        let mut exec = Executor::new();
        assert_eq!(repl.run(&mut exec), 3);
        assert_eq!(exec.scope().value("y"), Some("yes"));
        assert_eq!(exec.scope().value("z"), None);
    }

    #[test]
    fn unterminated_input_is_a_syntax_error() {
        let mut repl = Repl::from_reader(Cursor::new("while true; do\n".to_string()));
        let mut exec = Executor::new();
        assert_eq!(repl.run(&mut exec), 2);
    }
}
