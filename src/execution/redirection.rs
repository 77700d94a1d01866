use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{close, dup2, fork, pipe, ForkResult, Pid};

use crate::ast::{Redirect, RedirectOp};
use crate::error::{ShellError, ShellResult};
use crate::expansion;
use crate::io_helpers::{flush_std, os_message};

use super::Executor;

/// Saved copies of redirected descriptors live at or above this number.
const SAVE_FD_BASE: RawFd = 10;

/// Here-document bodies up to this size are written straight into the pipe;
/// larger ones get a writer process so the shell cannot block on a full pipe.
const PIPE_CAPACITY: usize = 16 * 1024;

/// Applies redirections to the shell's own descriptors and puts the
/// originals back when dropped, on every exit path.
pub struct RedirectGuard {
    /// Target descriptor and its saved original (`None`: it was closed).
    saved: Vec<(RawFd, Option<OwnedFd>)>,
    writers: Vec<Pid>,
}

impl RedirectGuard {
    pub fn apply(redirects: &[Redirect], exec: &mut Executor) -> ShellResult<Self> {
        let mut guard = RedirectGuard {
            saved: Vec::new(),
            writers: Vec::new(),
        };
        for redirect in redirects {
            // On error the partially applied guard drops and restores.
            guard.apply_one(redirect, exec)?;
        }
        Ok(guard)
    }

    fn apply_one(&mut self, redirect: &Redirect, exec: &mut Executor) -> ShellResult<()> {
        let fd = redirect.fd();
        debug!("redirect event=apply op={} fd={}", redirect.op.symbol(), fd);
        match redirect.op {
            RedirectOp::Input => {
                let path = expand_target(redirect, exec)?;
                self.save(fd)?;
                let file = File::open(&path).map_err(|err| open_error(&path, err))?;
                self.install(fd, file.into())
            }
            RedirectOp::Output | RedirectOp::Append => {
                let path = expand_target(redirect, exec)?;
                self.save(fd)?;
                let file = open_output(&path, redirect.op == RedirectOp::Append)?;
                self.install(fd, file.into())
            }
            RedirectOp::OutputAll | RedirectOp::AppendAll => {
                let path = expand_target(redirect, exec)?;
                self.output_all(&path, redirect.op == RedirectOp::AppendAll)
            }
            RedirectOp::DupInput | RedirectOp::DupOutput => {
                let target = expand_target(redirect, exec)?;
                if target == "-" {
                    self.save(fd)?;
                    match close(fd) {
                        Ok(()) | Err(Errno::EBADF) => Ok(()),
                        Err(err) => Err(ShellError::redirection(format!("{}: {}", fd, err.desc()))),
                    }
                } else if let Ok(source) = target.parse::<RawFd>() {
                    self.duplicate(source, fd)
                } else if redirect.op == RedirectOp::DupOutput && redirect.fd.is_none() {
                    // `>&file` is the old spelling of `&>file`.
                    self.output_all(&target, false)
                } else {
                    Err(ShellError::redirection(format!("{}: ambiguous redirect", target)))
                }
            }
            RedirectOp::HereDoc { .. } => {
                let content = match &redirect.heredoc {
                    Some(doc) if doc.expand => expansion::expand_heredoc(&doc.content, exec)?,
                    Some(doc) => doc.content.clone(),
                    None => String::new(),
                };
                self.save(fd)?;
                let reader = self.feed(content)?;
                self.install(fd, reader)
            }
            RedirectOp::HereString => {
                let mut content = expand_target(redirect, exec)?;
                content.push('\n');
                self.save(fd)?;
                let reader = self.feed(content)?;
                self.install(fd, reader)
            }
        }
    }

    fn output_all(&mut self, path: &str, append: bool) -> ShellResult<()> {
        self.save(1)?;
        self.save(2)?;
        let file = open_output(path, append)?;
        dup2(file.as_raw_fd(), 2).map_err(|err| dup_error(2, err))?;
        self.install(1, file.into())
    }

    /// Keep a close-on-exec copy of `target` so it can be restored. The
    /// first save of a descriptor wins.
    fn save(&mut self, target: RawFd) -> ShellResult<()> {
        if self.saved.iter().any(|(fd, _)| *fd == target) {
            return Ok(());
        }
        let saved = match fcntl(target, FcntlArg::F_DUPFD_CLOEXEC(SAVE_FD_BASE)) {
            Ok(raw) => Some(unsafe { OwnedFd::from_raw_fd(raw) }),
            Err(Errno::EBADF) => None,
            Err(err) => {
                return Err(ShellError::redirection(format!(
                    "{}: cannot save descriptor: {}",
                    target,
                    err.desc()
                )))
            }
        };
        self.saved.push((target, saved));
        Ok(())
    }

    fn install(&mut self, target: RawFd, fd: OwnedFd) -> ShellResult<()> {
        move_fd(fd, target).map_err(|err| {
            ShellError::redirection(format!("{}: {}", target, os_message(&err)))
        })
    }

    fn duplicate(&mut self, source: RawFd, target: RawFd) -> ShellResult<()> {
        if fcntl(source, FcntlArg::F_GETFD).is_err() {
            return Err(ShellError::redirection(format!("{}: bad file descriptor", source)));
        }
        if source == target {
            return Ok(());
        }
        self.save(target)?;
        dup2(source, target).map_err(|err| dup_error(target, err))?;
        Ok(())
    }

    /// Read end of a pipe that yields `content`.
    fn feed(&mut self, content: String) -> ShellResult<OwnedFd> {
        let (reader, writer) = cloexec_pipe()?;
        if content.len() <= PIPE_CAPACITY {
            File::from(writer).write_all(content.as_bytes())?;
            return Ok(reader);
        }
        flush_std();
        // SAFETY: the interpreter is single-threaded; the child only writes
        // and leaves through _exit.
        match unsafe { fork() }? {
            ForkResult::Child => {
                drop(reader);
                let status = match File::from(writer).write_all(content.as_bytes()) {
                    Ok(()) => 0,
                    Err(_) => 1,
                };
                unsafe { libc::_exit(status) }
            }
            ForkResult::Parent { child } => {
                debug!("redirect event=writer pid={} bytes={}", child, content.len());
                self.writers.push(child);
                Ok(reader)
            }
        }
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        flush_std();
        for (target, saved) in self.saved.drain(..).rev() {
            let restored = match saved {
                Some(fd) => dup2(fd.as_raw_fd(), target).map(|_| ()),
                None => close(target),
            };
            if let Err(err) = restored {
                if err != Errno::EBADF {
                    warn!("redirect event=restore fd={} error={}", target, err);
                }
            }
        }
        for pid in self.writers.drain(..) {
            let _ = kill(pid, Signal::SIGKILL);
            let _ = waitpid(pid, None);
        }
    }
}

/// Pipe whose ends are not inherited across exec until moved onto a
/// standard descriptor.
pub(crate) fn cloexec_pipe() -> ShellResult<(OwnedFd, OwnedFd)> {
    let (reader, writer) =
        pipe().map_err(|err| ShellError::execution(format!("pipe: {}", err.desc())))?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}

/// Make `target` refer to `fd`'s file and close `fd`. `target` stays open
/// across exec.
pub(crate) fn move_fd(fd: OwnedFd, target: RawFd) -> io::Result<()> {
    if fd.as_raw_fd() == target {
        fcntl(target, FcntlArg::F_SETFD(FdFlag::empty())).map_err(io::Error::from)?;
        let _ = fd.into_raw_fd();
        return Ok(());
    }
    dup2(fd.as_raw_fd(), target).map_err(io::Error::from)?;
    Ok(())
}

fn expand_target(redirect: &Redirect, exec: &mut Executor) -> ShellResult<String> {
    expansion::expand_word_single(redirect.target.as_str(), exec)
}

fn open_output(path: &str, append: bool) -> ShellResult<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|err| open_error(path, err))
}

fn open_error(path: &str, err: io::Error) -> ShellError {
    ShellError::redirection(format!("{}: {}", path, os_message(&err)))
}

fn dup_error(fd: RawFd, err: Errno) -> ShellError {
    ShellError::redirection(format!("{}: {}", fd, err.desc()))
}
