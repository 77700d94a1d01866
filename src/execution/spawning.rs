//! Process creation: external commands, pipelines, background jobs,
//! subshells and command substitution.
//!
//! Shell-level children (pipeline stages, subshells, background jobs,
//! substitutions) are plain `fork`s that keep a copy of the executor and
//! leave through `_exit`. External programs go through `Command`, with a
//! `pre_exec` hook placing them in their job's process group.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::debug;
use nix::unistd::{fork, setpgid, ForkResult, Pid};

use crate::ast::{Node, Pipeline};
use crate::builtins;
use crate::error::{ShellError, ShellResult};
use crate::io_helpers::{flush_std, os_message, report, shell_quote, write_stderr, write_stdout};
use crate::job_control::{
    enter_process_group, reset_signal_dispositions, set_process_group, wait_for_pids,
    wait_for_process_group, JobStatus, SignalMaskGuard, TerminalGuard, TermiosGuard, WaitOutcome,
    WaitResult,
};
use crate::parse;
use crate::suggest;

use super::redirection::{cloexec_pipe, move_fd};
use super::{Executor, Flow};

/// Exit code of a finished process: its status, or 128 + the signal that
/// killed it.
pub fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        1
    }
}

/// Leave a forked child without running destructors or atexit handlers.
fn child_exit(status: i32) -> ! {
    flush_std();
    unsafe { libc::_exit(status) }
}

fn spawn_error(name: &str, path: &Path, err: io::Error) -> ShellError {
    let (message, status) = match err.kind() {
        io::ErrorKind::NotFound => (format!("{}: No such file or directory", name), 127),
        _ if path.is_dir() => (format!("{}: Is a directory", name), 126),
        io::ErrorKind::PermissionDenied => (format!("{}: Permission denied", name), 126),
        _ => (format!("{}: {}", name, os_message(&err)), 126),
    };
    ShellError::execution(message).with_status(status)
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl Executor {
    /// Search `PATH` for `name`. Names containing `/` are used as given.
    /// A match that exists but is not executable is returned when nothing
    /// better is found, so the spawn reports 126.
    pub(crate) fn resolve_command(&self, name: &str) -> Option<PathBuf> {
        if name.contains('/') {
            return Some(PathBuf::from(name));
        }
        let path = self.scope.value("PATH").unwrap_or("/usr/local/bin:/usr/bin:/bin");
        let mut fallback = None;
        for dir in path.split(':') {
            let dir = if dir.is_empty() { "." } else { dir };
            let candidate = Path::new(dir).join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
            if fallback.is_none() && candidate.is_file() {
                fallback = Some(candidate);
            }
        }
        fallback
    }

    fn not_found(&self, name: &str) -> ShellError {
        let err = ShellError::execution(format!("{}: command not found", name)).with_status(127);
        if !self.interactive {
            return err;
        }
        let on_path = suggest::path_commands(self.scope.value("PATH").unwrap_or(""));
        let candidates = builtins::NAMES
            .iter()
            .copied()
            .chain(self.function_names())
            .chain(self.aliases.iter().map(|(alias, _)| alias))
            .chain(on_path.iter().map(String::as_str));
        match suggest::best_suggestion(name, candidates) {
            Some(suggestion) => err.with_context(format!("did you mean `{}'?", suggestion)),
            None => err,
        }
    }

    pub(super) fn run_external(&mut self, argv: &[String]) -> ShellResult<i32> {
        let name = argv[0].as_str();
        let Some(path) = self.resolve_command(name) else {
            return Err(self.not_found(name));
        };
        let mut command = Command::new(&path);
        command
            .arg0(name)
            .args(&argv[1..])
            .env_clear()
            .envs(self.scope.exported());
        if self.job_control() {
            return self.run_foreground_job(command, &path, argv);
        }
        let mut child = command.spawn().map_err(|err| spawn_error(name, &path, err))?;
        let pid = child.id() as i32;
        debug!("job event=spawn kind=external pid={} cmd={}", pid, name);
        self.fg_pgid.store(pid, Ordering::SeqCst);
        let status = child.wait();
        self.fg_pgid.store(0, Ordering::SeqCst);
        Ok(exit_status_code(status?))
    }

    /// Run an external program as its own foreground job.
    fn run_foreground_job(&mut self, mut command: Command, path: &Path, argv: &[String]) -> ShellResult<i32> {
        // The child joins its new group and takes the terminal before exec.
        set_process_group(&mut command, 0, true);
        // Block SIGCHLD during the handoff to avoid races with wait/reap.
        let handoff_guard = SignalMaskGuard::new()?;
        let child = command
            .spawn()
            .map_err(|err| spawn_error(&argv[0], path, err))?;
        let pgid = child.id() as i32;
        let _ = setpgid(Pid::from_raw(pgid), Pid::from_raw(pgid));
        debug!("job event=spawn kind=single pid={} pgid={}", pgid, pgid);
        self.fg_pgid.store(pgid, Ordering::SeqCst);
        let _termios_guard = TermiosGuard::new();
        let mut tty_guard = TerminalGuard::new(self.shell_pgid);
        if let Err(err) = tty_guard.set_foreground(pgid) {
            debug!("tty event=handoff pgid={} error={}", pgid, err);
        }
        drop(handoff_guard);
        let outcome = wait_for_process_group(pgid, 1, pgid);
        self.fg_pgid.store(0, Ordering::SeqCst);
        drop(tty_guard);
        let text = argv.iter().map(|arg| shell_quote(arg)).collect::<Vec<_>>().join(" ");
        Ok(self.finish_foreground(outcome?, pgid, pgid, 1, || text))
    }

    /// Status of a foreground job; a stopped one moves to the job table.
    fn finish_foreground(
        &mut self,
        result: WaitResult,
        pgid: i32,
        last_pid: i32,
        count: usize,
        describe: impl FnOnce() -> String,
    ) -> i32 {
        if result.outcome == WaitOutcome::Stopped {
            let id = self.jobs.add(pgid, last_pid, count, &describe(), JobStatus::Stopped);
            if let Some(job) = self.jobs.get(id) {
                let _ = write_stdout(&format!("\n{}\n", job.describe()));
            }
        }
        result.status_code
    }

    /// Fork a shell-level child. With `group`, the child joins that process
    /// group (0 starts a new one) and, when `foreground`, takes the terminal.
    fn fork_child(&mut self, group: Option<i32>, foreground: bool) -> ShellResult<ForkResult> {
        flush_std();
        // SAFETY: the interpreter is single-threaded and the child either
        // keeps interpreting or execs.
        let result = unsafe { fork() }
            .map_err(|err| ShellError::execution(format!("fork: {}", err.desc())))?;
        if let ForkResult::Child = result {
            let setup = match group {
                Some(pgid) => enter_process_group(pgid, foreground),
                None => reset_signal_dispositions(),
            };
            if let Err(err) = setup {
                debug!("job event=child-setup error={}", err);
            }
            self.forked = true;
            self.interactive = false;
            self.jobs.clear();
            self.fg_pgid = Arc::new(AtomicI32::new(0));
        }
        Ok(result)
    }

    /// Flow of a forked child's work turned into its exit status.
    fn child_status(&mut self, result: ShellResult<Flow>) -> i32 {
        match result {
            Ok(flow) => flow.status(),
            Err(err) => self.fail(err),
        }
    }

    pub(super) fn run_pipeline(&mut self, pipeline: &Pipeline) -> ShellResult<Flow> {
        let flow = match pipeline.stages.as_slice() {
            [single] if pipeline.negated => self.suppressed(|this| this.exec_node(single))?,
            [single] => self.exec_node(single)?,
            stages => {
                let describe = || parse::regenerate(&Node::Pipeline(pipeline.clone()));
                Flow::Normal(self.run_stages(stages, describe)?)
            }
        };
        match flow {
            Flow::Normal(status) if pipeline.negated => Ok(Flow::Normal(i32::from(status == 0))),
            other => Ok(other),
        }
    }

    /// Fork one child per stage, connected by pipes, and wait for all of
    /// them. Reports the last stage's status.
    fn run_stages(&mut self, stages: &[Node], describe: impl FnOnce() -> String) -> ShellResult<i32> {
        let job_control = self.job_control();
        let handoff_guard = if job_control {
            Some(SignalMaskGuard::new()?)
        } else {
            None
        };
        let mut pgid = 0;
        let mut pids = Vec::with_capacity(stages.len());
        let mut input: Option<OwnedFd> = None;
        for (index, stage) in stages.iter().enumerate() {
            let (next_input, output) = if index + 1 < stages.len() {
                let (reader, writer) = match cloexec_pipe() {
                    Ok(pipe) => pipe,
                    Err(err) => return Err(abandon(err, &pids)),
                };
                (Some(reader), Some(writer))
            } else {
                (None, None)
            };
            let group = job_control.then_some(pgid);
            match self.fork_child(group, true) {
                Ok(ForkResult::Child) => {
                    drop(next_input);
                    let wired = input.take().map_or(Ok(()), |fd| move_fd(fd, 0)).and_then(|()| {
                        output.map_or(Ok(()), |fd| move_fd(fd, 1))
                    });
                    if let Err(err) = wired {
                        report(format!("pipe: {}", os_message(&err)));
                        child_exit(1);
                    }
                    let status = self.exec_node(stage);
                    let status = self.child_status(status);
                    child_exit(status)
                }
                Ok(ForkResult::Parent { child }) => {
                    let pid = child.as_raw();
                    if job_control {
                        if pgid == 0 {
                            pgid = pid;
                        }
                        let _ = setpgid(child, Pid::from_raw(pgid));
                    }
                    debug!("job event=spawn kind=stage index={} pid={} pgid={}", index, pid, pgid);
                    pids.push(pid);
                }
                Err(err) => return Err(abandon(err, &pids)),
            }
            input = next_input;
        }
        drop(input);
        let last_pid = pids.last().copied().unwrap_or(0);
        if !job_control {
            drop(handoff_guard);
            return Ok(wait_for_pids(&pids)?);
        }
        self.fg_pgid.store(pgid, Ordering::SeqCst);
        let _termios_guard = TermiosGuard::new();
        let mut tty_guard = TerminalGuard::new(self.shell_pgid);
        if let Err(err) = tty_guard.set_foreground(pgid) {
            debug!("tty event=handoff pgid={} error={}", pgid, err);
        }
        drop(handoff_guard);
        let outcome = wait_for_process_group(pgid, pids.len(), last_pid);
        self.fg_pgid.store(0, Ordering::SeqCst);
        drop(tty_guard);
        Ok(self.finish_foreground(outcome?, pgid, last_pid, pids.len(), describe))
    }

    pub(super) fn run_subshell(&mut self, node: &Node, inner: &Node) -> ShellResult<Flow> {
        let status = self.run_stages(std::slice::from_ref(inner), || parse::regenerate(node))?;
        Ok(Flow::Normal(status))
    }

    pub(super) fn run_background(&mut self, inner: &Node) -> ShellResult<Flow> {
        let job_control = self.job_control();
        let command = parse::regenerate(inner);
        match self.fork_child(Some(0), false)? {
            ForkResult::Child => {
                if !job_control {
                    // Without job control a background job must not read the
                    // shell's input.
                    if let Ok(null) = File::open("/dev/null") {
                        let _ = move_fd(null.into(), 0);
                    }
                }
                let status = self.exec_node(inner);
                let status = self.child_status(status);
                child_exit(status)
            }
            ForkResult::Parent { child } => {
                let pid = child.as_raw();
                let _ = setpgid(child, child);
                self.last_bg_pid = Some(pid);
                let id = self.jobs.add(pid, pid, 1, &command, JobStatus::Running);
                debug!("job event=spawn kind=background pid={} pgid={} id={}", pid, pid, id);
                if self.interactive {
                    let _ = write_stderr(&format!("[{}] {}\n", id, pid));
                }
                Ok(Flow::Normal(0))
            }
        }
    }

    /// Run `source` in a forked child and collect its standard output.
    pub(super) fn capture_output(&mut self, source: &str) -> ShellResult<String> {
        let node = parse::parse(source)?;
        let (reader, writer) = cloexec_pipe()?;
        match self.fork_child(None, false)? {
            ForkResult::Child => {
                drop(reader);
                if let Err(err) = move_fd(writer, 1) {
                    report(format!("command substitution: {}", os_message(&err)));
                    child_exit(1);
                }
                let status = self.exec_node(&node);
                let status = self.child_status(status);
                child_exit(status)
            }
            ForkResult::Parent { child } => {
                drop(writer);
                let mut output = Vec::new();
                let read = File::from(reader).read_to_end(&mut output);
                let status = wait_for_pids(&[child.as_raw()])?;
                read?;
                debug!(
                    "exec event=subst pid={} status={} bytes={}",
                    child,
                    status,
                    output.len()
                );
                self.last_status = status;
                self.subst_status = Some(status);
                Ok(String::from_utf8_lossy(&output).into_owned())
            }
        }
    }
}

/// Reap the stages already started before reporting a failed pipeline.
fn abandon(err: ShellError, pids: &[i32]) -> ShellError {
    if let Err(wait_err) = wait_for_pids(pids) {
        debug!("job event=abandon error={}", wait_err);
    }
    err
}
