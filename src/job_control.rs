use std::collections::BTreeMap;
use std::io;
use std::os::fd::BorrowedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use log::{debug, warn};
use nix::sys::signal::{
    kill, sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::sys::termios::{tcgetattr, tcsetattr, SetArg, Termios};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgrp, setpgid, tcsetpgrp, Pid};

use crate::io_helpers::write_stdout;

/// Make a spawned command lead (or join) process group `pgid` before exec.
/// `pgid == 0` starts a new group. Foreground groups also take the terminal.
pub fn set_process_group(command: &mut Command, pgid: i32, foreground: bool) {
    unsafe {
        command.pre_exec(move || enter_process_group(pgid, foreground));
    }
}

/// Child side of process-group setup, shared by `pre_exec` hooks and forked
/// children. Runs while the job-control signals are still ignored, so
/// taking the terminal from a background group cannot stop the child.
pub fn enter_process_group(pgid: i32, foreground: bool) -> io::Result<()> {
    setpgid(Pid::from_raw(0), Pid::from_raw(pgid)).map_err(io::Error::from)?;
    if foreground {
        set_terminal_foreground(getpgrp().as_raw())?;
    }
    reset_signal_dispositions()
}

/// Restore default handling for everything the interactive shell ignores,
/// and unblock all signals.
pub fn reset_signal_dispositions() -> io::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for &sig in &[
        Signal::SIGINT,
        Signal::SIGTSTP,
        Signal::SIGQUIT,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGPIPE,
        Signal::SIGCHLD,
    ] {
        unsafe { sigaction(sig, &action) }.map_err(io::Error::from)?;
    }
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None).map_err(io::Error::from)?;
    Ok(())
}

pub fn set_terminal_foreground(pgid: i32) -> io::Result<()> {
    let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
    match tcsetpgrp(fd, Pid::from_raw(pgid)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ENOTTY) => Ok(()),
        Err(err) => Err(io::Error::from(err)),
    }
}

pub struct SignalMaskGuard {
    old: SigSet,
}

impl SignalMaskGuard {
    pub fn new() -> io::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        set.add(Signal::SIGCHLD);
        let mut old = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut old)).map_err(io::Error::from)?;
        Ok(Self { old })
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        if let Err(err) = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.old), None) {
            warn!("signal event=restore mask error={}", err);
        }
    }
}

pub struct TermiosGuard {
    saved: Option<Termios>,
}

impl TermiosGuard {
    pub fn new() -> Self {
        Self {
            saved: tcgetattr(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) }).ok(),
        }
    }
}

impl Drop for TermiosGuard {
    fn drop(&mut self) {
        if let Some(ref termios) = self.saved {
            let fd = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
            if let Err(err) = tcsetattr(fd, SetArg::TCSANOW, termios) {
                warn!("termios event=restore error={}", err);
            }
        }
    }
}

/// Hands the terminal to a job and gives it back to the shell on drop.
pub struct TerminalGuard {
    shell_pgid: i32,
    active: bool,
}

impl TerminalGuard {
    pub fn new(shell_pgid: i32) -> Self {
        Self {
            shell_pgid,
            active: false,
        }
    }

    pub fn set_foreground(&mut self, pgid: i32) -> io::Result<()> {
        set_terminal_foreground(pgid)?;
        self.active = true;
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = set_terminal_foreground(self.shell_pgid) {
                warn!("tty event=restore error={}", err);
            }
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Done => "Done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: usize,
    pub pgid: i32,
    pub last_pid: i32,
    pub count: usize,
    pub command: String,
    pub status: JobStatus,
    /// Started with `&` rather than stopped out of the foreground.
    pub background: bool,
    /// Status of the last process once the job is done.
    pub exit_status: Option<i32>,
}

impl Job {
    pub fn describe(&self) -> String {
        let suffix = if self.status == JobStatus::Running { " &" } else { "" };
        format!("[{}] {} {}{}", self.id, self.status.label(), self.command, suffix)
    }
}

/// Jobs keyed by id. Ids grow monotonically for the life of the table.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
    next_id: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn add(
        &mut self,
        pgid: i32,
        last_pid: i32,
        count: usize,
        command: &str,
        status: JobStatus,
    ) -> usize {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                last_pid,
                count,
                command: command.trim_end_matches('&').trim().to_string(),
                status,
                background: status == JobStatus::Running,
                exit_status: None,
            },
        );
        debug!("job event=add id={} pgid={} status={:?}", id, pgid, status);
        id
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.jobs.keys().copied().collect()
    }

    /// Job owning `pid`, either as its group leader or its last process.
    pub fn find_pid(&self, pid: i32) -> Option<usize> {
        self.jobs
            .values()
            .find(|job| job.pgid == pid || job.last_pid == pid)
            .map(|job| job.id)
    }

    /// Resolve a job spec: `%n`, `n`, `%%`, `%+`, `%-`, or none for the
    /// current job.
    pub fn resolve(&self, spec: Option<&str>) -> Result<usize, String> {
        let current = || self.jobs.keys().next_back().copied();
        let id = match spec {
            None | Some("%") | Some("%%") | Some("%+") => current(),
            Some("%-") => self.jobs.keys().rev().nth(1).copied().or_else(current),
            Some(value) => {
                let trimmed = value.strip_prefix('%').unwrap_or(value);
                let id = trimmed
                    .parse::<usize>()
                    .map_err(|_| format!("{}: no such job", value))?;
                self.jobs.contains_key(&id).then_some(id)
            }
        };
        id.ok_or_else(|| format!("{}: no such job", spec.unwrap_or("current")))
    }

    /// Poll every job without blocking. Finished jobs are marked Done; when
    /// `notify` is set, state changes are printed and Done jobs dropped.
    pub fn reap(&mut self, notify: bool) {
        for id in self.ids() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if job.status == JobStatus::Done {
                continue;
            }
            match poll_job_status(job.pgid, job.last_pid) {
                JobPoll::Done(code) => {
                    job.status = JobStatus::Done;
                    job.exit_status = Some(code);
                    debug!("job event=reap done pgid={} id={} status={}", job.pgid, job.id, code);
                }
                JobPoll::Stopped if job.status != JobStatus::Stopped => {
                    job.status = JobStatus::Stopped;
                    debug!("job event=reap stopped pgid={} id={}", job.pgid, job.id);
                    if notify {
                        let _ = write_stdout(&format!("{}\n", job.describe()));
                    }
                }
                JobPoll::Running if job.status != JobStatus::Running => {
                    job.status = JobStatus::Running;
                    debug!("job event=reap running pgid={} id={}", job.pgid, job.id);
                    if notify {
                        let _ = write_stdout(&format!("{}\n", job.describe()));
                    }
                }
                _ => {}
            }
        }
        if notify {
            self.drain_done(true);
        }
    }

    /// Drop Done jobs, printing them first when `print` is set.
    pub fn drain_done(&mut self, print: bool) {
        let done: Vec<usize> = self
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Done)
            .map(|job| job.id)
            .collect();
        for id in done {
            if let Some(job) = self.jobs.remove(&id) {
                if print {
                    let _ = write_stdout(&format!("{}\n", job.describe()));
                }
            }
        }
    }
}

pub enum JobPoll {
    Done(i32),
    Stopped,
    Running,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct WaitResult {
    pub outcome: WaitOutcome,
    pub status_code: i32,
}

pub struct BringJobResult {
    pub status_code: i32,
    pub stopped_job: Option<Job>,
}

/// Continue `job` in the foreground and wait for it. With `terminal`, the
/// job's group gets the terminal until it exits or stops.
pub fn bring_job_foreground(
    mut job: Job,
    fg_pgid: &Arc<AtomicI32>,
    shell_pgid: i32,
    terminal: bool,
) -> io::Result<BringJobResult> {
    debug!("job event=fg pgid={} id={}", job.pgid, job.id);
    let handoff_guard = SignalMaskGuard::new()?;
    fg_pgid.store(job.pgid, Ordering::SeqCst);
    let _termios_guard = TermiosGuard::new();
    let mut tty_guard = TerminalGuard::new(shell_pgid);
    if terminal {
        tty_guard.set_foreground(job.pgid)?;
    }
    drop(handoff_guard);
    continue_job(job.pgid)?;
    let outcome = wait_for_process_group(job.pgid, job.count, job.last_pid);
    fg_pgid.store(0, Ordering::SeqCst);
    let outcome = outcome?;
    match outcome.outcome {
        WaitOutcome::Exited => Ok(BringJobResult {
            status_code: outcome.status_code,
            stopped_job: None,
        }),
        WaitOutcome::Stopped => {
            job.status = JobStatus::Stopped;
            job.background = false;
            Ok(BringJobResult {
                status_code: outcome.status_code,
                stopped_job: Some(job),
            })
        }
    }
}

pub fn continue_job(pgid: i32) -> io::Result<()> {
    debug!("job event=cont pgid={}", pgid);
    kill(Pid::from_raw(-pgid), Signal::SIGCONT).map_err(io::Error::from)
}

/// Status of a wait: exit code, or 128 + signal number.
pub fn status_of(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
        _ => None,
    }
}

/// Wait until `expected_count` members of `pgid` have exited, or one stops.
/// The reported status is that of `last_pid`.
pub fn wait_for_process_group(
    pgid: i32,
    expected_count: usize,
    last_pid: i32,
) -> io::Result<WaitResult> {
    debug!(
        "job event=wait pgid={} expected_count={} last_pid={}",
        pgid, expected_count, last_pid
    );
    let mut exited = 0usize;
    let mut status_code = 0;
    loop {
        match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::WUNTRACED)) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                let pid = status.pid().map(Pid::as_raw).unwrap_or(0);
                let code = status_of(status).unwrap_or(0);
                debug!("job event=exit pgid={} pid={} code={}", pgid, pid, code);
                if pid == last_pid {
                    status_code = code;
                }
                exited += 1;
                if expected_count > 0 && exited >= expected_count {
                    break;
                }
            }
            Ok(WaitStatus::Stopped(pid, sig)) => {
                debug!("job event=stopped pgid={} pid={}", pgid, pid);
                let _ = kill(Pid::from_raw(-pgid), Signal::SIGTSTP);
                return Ok(WaitResult {
                    outcome: WaitOutcome::Stopped,
                    status_code: 128 + sig as i32,
                });
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => break,
            Err(err) => {
                debug!("job event=wait error={}", err);
                return Err(io::Error::from(err));
            }
        }
    }
    Ok(WaitResult {
        outcome: WaitOutcome::Exited,
        status_code,
    })
}

/// Wait for specific children that share the shell's process group.
pub fn wait_for_pids(pids: &[i32]) -> io::Result<i32> {
    let mut status_code = 0;
    for (index, &pid) in pids.iter().enumerate() {
        let code = loop {
            match waitpid(Pid::from_raw(pid), None) {
                Ok(status) => match status_of(status) {
                    Some(code) => break code,
                    None => continue,
                },
                Err(nix::errno::Errno::EINTR) => continue,
                Err(nix::errno::Errno::ECHILD) => break 0,
                Err(err) => return Err(io::Error::from(err)),
            }
        };
        debug!("job event=exit pid={} code={}", pid, code);
        if index + 1 == pids.len() {
            status_code = code;
        }
    }
    Ok(status_code)
}

fn poll_job_status(pgid: i32, last_pid: i32) -> JobPoll {
    let mut outcome = JobPoll::NoChange;
    let mut last_code = None;
    loop {
        match waitpid(
            Pid::from_raw(-pgid),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED),
        ) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                if status.pid().map(Pid::as_raw) == Some(last_pid) {
                    last_code = status_of(status);
                }
                continue;
            }
            Ok(WaitStatus::Stopped(_, _)) => {
                debug!("job event=poll stopped pgid={}", pgid);
                outcome = JobPoll::Stopped;
                break;
            }
            Ok(WaitStatus::Continued(_)) => {
                debug!("job event=poll continued pgid={}", pgid);
                outcome = JobPoll::Running;
                continue;
            }
            Ok(WaitStatus::StillAlive) => break,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::ECHILD) => {
                debug!("job event=poll done pgid={}", pgid);
                outcome = JobPoll::Done(last_code.unwrap_or(0));
                break;
            }
            Err(_) => break,
        }
    }
    outcome
}
