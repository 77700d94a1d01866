use log::debug;

use crate::error::{ShellError, ShellResult};
use crate::execution::{Executor, Flow};
use crate::io_helpers::report;
use crate::job_control::{
    bring_job_foreground, continue_job, wait_for_process_group, JobStatus, WaitOutcome,
};

use super::{emit, status};

fn job_error(builtin: &str, message: impl std::fmt::Display) -> ShellError {
    ShellError::execution(format!("{}: {}", builtin, message))
}

pub(super) fn jobs(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let mode = argv.get(1).map(String::as_str);
    exec.jobs_mut().reap(false);
    let mut text = String::new();
    for job in exec.jobs().iter() {
        let line = match mode {
            Some("-p") => job.pgid.to_string(),
            Some("-l") => format!(
                "[{}] {} {} {}",
                job.id,
                job.pgid,
                job.status.label(),
                job.command
            ),
            _ => job.describe(),
        };
        text.push_str(&line);
        text.push('\n');
    }
    emit("jobs", &text)?;
    exec.jobs_mut().drain_done(false);
    status(0)
}

pub(super) fn fg(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let id = exec
        .jobs()
        .resolve(argv.get(1).map(String::as_str))
        .map_err(|message| job_error("fg", message))?;
    let Some(job) = exec.jobs_mut().remove(id) else {
        return Err(job_error("fg", "no such job"));
    };
    if job.status == JobStatus::Done {
        return status(job.exit_status.unwrap_or(0));
    }
    emit("fg", &format!("{}\n", job.command))?;
    let terminal = exec.job_control();
    let result = bring_job_foreground(job, &exec.current_child(), exec.shell_pgid(), terminal)
        .map_err(|err| job_error("fg", err))?;
    if let Some(stopped) = result.stopped_job {
        emit("fg", &format!("\n{}\n", stopped.describe()))?;
        exec.jobs_mut().insert(stopped);
    }
    status(result.status_code)
}

pub(super) fn bg(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    let id = exec
        .jobs()
        .resolve(argv.get(1).map(String::as_str))
        .map_err(|message| job_error("bg", message))?;
    let Some(job) = exec.jobs_mut().get_mut(id) else {
        return Err(job_error("bg", "no such job"));
    };
    if job.status != JobStatus::Stopped {
        report(format!("bg: job {} already in background", job.id));
        return status(0);
    }
    continue_job(job.pgid).map_err(|err| job_error("bg", err))?;
    job.status = JobStatus::Running;
    job.background = true;
    let line = format!("[{}] {} &\n", job.id, job.command);
    emit("bg", &line)?;
    status(0)
}

/// `wait` with no operands waits for every job and returns 0. Operands are
/// job specs (`%n`) or pids; the status is that of the last one.
pub(super) fn wait(exec: &mut Executor, argv: &[String]) -> ShellResult<Flow> {
    if argv.len() == 1 {
        for id in exec.jobs().ids() {
            wait_job(exec, id)?;
        }
        return status(0);
    }
    let mut code = 0;
    for operand in &argv[1..] {
        let id = if operand.starts_with('%') {
            exec.jobs()
                .resolve(Some(operand))
                .map_err(|message| job_error("wait", message))?
        } else {
            let pid = operand.parse::<i32>().map_err(|_| {
                job_error("wait", format!("`{}': not a pid or valid job spec", operand))
                    .with_status(2)
            })?;
            match exec.jobs().find_pid(pid) {
                Some(id) => id,
                None => {
                    report(format!("wait: pid {} is not a child of this shell", pid));
                    code = 127;
                    continue;
                }
            }
        };
        code = wait_job(exec, id)?;
    }
    status(code)
}

fn wait_job(exec: &mut Executor, id: usize) -> ShellResult<i32> {
    let Some(mut job) = exec.jobs_mut().remove(id) else {
        return Ok(127);
    };
    if job.status == JobStatus::Done {
        return Ok(job.exit_status.unwrap_or(0));
    }
    debug!("job event=wait-builtin id={} pgid={}", job.id, job.pgid);
    let result = wait_for_process_group(job.pgid, job.count, job.last_pid)
        .map_err(|err| job_error("wait", err))?;
    if result.outcome == WaitOutcome::Stopped {
        job.status = JobStatus::Stopped;
        exec.jobs_mut().insert(job);
    }
    Ok(result.status_code)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use crate::execution::Executor;
    use crate::job_control::JobStatus;

    #[test]
    #[serial]
    fn wait_for_job_spec_and_all() {
        let mut exec = Executor::new();
        exec.run_source("sh -c 'exit 4' &");
        assert_eq!(exec.jobs().len(), 1);
        assert_eq!(exec.run_source("wait %1"), 4);
        assert!(exec.jobs().is_empty());
        exec.run_source("sh -c 'exit 1' & sh -c 'exit 2' &");
        assert_eq!(exec.run_source("wait"), 0);
        assert!(exec.jobs().is_empty());
    }

    #[test]
    #[serial]
    fn wait_unknown_pid_is_127() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("wait 999999"), 127);
        assert_eq!(exec.run_source("wait %3"), 1);
    }

    #[test]
    #[serial]
    fn finished_job_keeps_its_status() {
        let mut exec = Executor::new();
        exec.run_source("sh -c 'exit 6' &");
        std::thread::sleep(std::time::Duration::from_millis(200));
        exec.jobs_mut().reap(false);
        assert_eq!(exec.jobs().iter().next().map(|job| job.status), Some(JobStatus::Done));
        assert_eq!(exec.run_source("wait %1"), 6);
    }

    #[test]
    #[serial]
    fn bg_and_fg_need_a_job() {
        let mut exec = Executor::new();
        assert_eq!(exec.run_source("fg"), 1);
        assert_eq!(exec.run_source("bg %2"), 1);
    }
}
