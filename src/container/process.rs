use crate::errors::{NookError, Result, ResultExt};
use log::{debug, info};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::convert::Infallible;
use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;

/// How a waited-for process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
}

impl ExitStatus {
    /// Exit code to hand back to our own caller; a signal `n` becomes `128 + n`,
    /// the way shells report it.
    pub fn code(&self) -> i32 {
        match *self {
            ExitStatus::Code(code) => code,
            ExitStatus::Signal(signal) => 128 + signal,
        }
    }

    fn from_wait_status(status: WaitStatus) -> Option<ExitStatus> {
        match status {
            WaitStatus::Exited(_, code) => Some(ExitStatus::Code(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::Signal(signal as i32)),
            _ => None,
        }
    }
}

/// Block until `pid` terminates.
pub fn wait_for(pid: Pid) -> Result<ExitStatus> {
    debug!("waiting for process {}", pid);
    loop {
        let status = waitpid(pid, None).with_context(|| format!("wait for pid {}", pid))?;
        match ExitStatus::from_wait_status(status) {
            Some(exit) => {
                info!("process {} finished: {:?}", pid, exit);
                return Ok(exit);
            }
            None => debug!("process {} status: {:?}", pid, status),
        }
    }
}

/// Build a NUL-terminated argv from raw argument bytes.
pub fn build_argv<I, S>(argv: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    argv.into_iter()
        .map(|arg| {
            let arg = arg.as_ref();
            CString::new(arg.as_bytes())
                .map_err(|e| NookError::InvalidConfig(format!("argument {:?}: {}", arg, e)))
        })
        .collect()
}

/// Replace the current process image with `program`, searching `PATH`.
///
/// Only returns on failure.
pub fn exec_command(program: &str, args: &[String]) -> Result<Infallible> {
    let argv = build_argv(std::iter::once(program).chain(args.iter().map(String::as_str)))?;
    info!("exec {:?}", argv);
    nix::unistd::execvp(&argv[0], &argv).with_context(|| format!("exec {}", program))
}
