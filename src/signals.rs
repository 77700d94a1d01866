use std::io;

use log::debug;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{getpgrp, getpid, setpgid, Pid};

use crate::job_control::set_terminal_foreground;

/// Signals an interactive shell ignores so that only its foreground job
/// reacts to the terminal. Children restore the defaults.
const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTSTP,
    Signal::SIGQUIT,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

pub fn install_signal_handlers() -> io::Result<()> {
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    for signal in JOB_CONTROL_SIGNALS {
        unsafe { sigaction(signal, &action) }.map_err(io::Error::from)?;
    }
    debug!("signal event=install mode=ignore");
    Ok(())
}

/// Put an interactive shell in its own process group and give that group
/// the terminal. Returns the shell's process group id.
pub fn init_session() -> io::Result<i32> {
    let pid = getpid();
    if getpgrp() != pid {
        match setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
            Ok(()) => {}
            // A session leader cannot change its group; it already leads one.
            Err(nix::errno::Errno::EPERM) => {}
            Err(err) => return Err(io::Error::from(err)),
        }
    }
    let pgid = getpgrp().as_raw();
    set_terminal_foreground(pgid)?;
    debug!("signal event=session pid={} pgid={}", pid, pgid);
    Ok(pgid)
}

pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}
