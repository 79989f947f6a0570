pub mod namespace;
pub mod prepare;
pub mod process;

use crate::config::ContainerConfig;
use crate::errors::{Result, ResultExt};
use crate::sync::Sync;
use log::{debug, error, info};
use namespace::{NamespaceSpec, UserNamespaceMapping};
use nix::sched::clone;
use nix::unistd::Pid;
use process::ExitStatus;
use std::ffi::{CString, OsString};

/// The re-exec target: this very binary.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Name of the verb the re-exec'd child is started with.
pub const SPAWNER_VERB: &str = "spawner";

/// Stack for the cloned child. It only waits on a pipe and execs.
const STACK_SIZE: usize = 1024 * 1024;

/// A container as seen from the host: what to isolate and what to run.
#[derive(Debug, Clone)]
pub struct Container {
    pub config: ContainerConfig,
    pub namespaces: NamespaceSpec,
    pub user_mapping: UserNamespaceMapping,
    pub command: String,
    pub args: Vec<String>,
    pub log_level: Option<String>,
    pid: Option<Pid>,
}

impl Container {
    /// A fully isolated container running as root mapped to the caller.
    pub fn new(config: ContainerConfig, command: String, args: Vec<String>) -> Self {
        Self {
            config,
            namespaces: NamespaceSpec::isolation(),
            user_mapping: UserNamespaceMapping::for_current_user(),
            command,
            args,
            log_level: None,
            pid: None,
        }
    }

    /// Log filter to hand down to the spawner.
    pub fn set_log_level(&mut self, log_level: Option<String>) {
        self.log_level = log_level;
    }

    /// Check everything that can be checked before any namespace exists and
    /// pin the rootfs to an absolute path.
    pub fn validate(&mut self) -> Result<()> {
        self.config.validate()?;
        self.namespaces.validate()?;
        self.user_mapping.validate()?;
        self.config.rootfs = self.config.check_rootfs()?;
        debug!("container validated: {:?}", self.config);
        Ok(())
    }

    /// argv of the re-exec'd spawner, `argv[0]` included.
    pub fn spawner_args(&self) -> Vec<OsString> {
        let argv0 = std::env::args_os().next().unwrap_or_else(|| "nook".into());
        let mut args = vec![argv0];
        if let Some(ref level) = self.log_level {
            args.push("--log-level".into());
            args.push(level.into());
        }
        args.push(SPAWNER_VERB.into());
        args.extend(self.config.to_args());
        args.push("--".into());
        args.push((&self.command).into());
        args.extend(self.args.iter().map(OsString::from));
        args
    }

    /// Clone the spawner into its new namespaces.
    ///
    /// The child is held on a pipe until its uid/gid maps are in place, so it
    /// never runs unmapped. Stdio is inherited as-is.
    pub fn start(&mut self) -> Result<Pid> {
        if let Some(pid) = self.pid {
            crate::bail!("container already started as pid {}", pid);
        }

        let argv = process::build_argv(self.spawner_args())?;
        let exe = CString::new(SELF_EXE)?;
        let flags = self.namespaces.clone_flags();
        let sync = Sync::new()?;

        let child_main = || -> isize {
            if let Err(e) = sync.wait_for_parent() {
                error!("{}", e);
                return 1;
            }
            match nix::unistd::execv(&exe, &argv) {
                Ok(never) => match never {},
                Err(e) => {
                    error!("exec {}: {}", SELF_EXE, e);
                    1
                }
            }
        };

        let mut stack = vec![0u8; STACK_SIZE];
        debug!("cloning spawner with {:?}", flags);
        let pid = unsafe { clone(Box::new(child_main), &mut stack, flags, Some(libc::SIGCHLD)) }
            .context("clone")?;
        info!("spawner cloned, pid {}", pid);

        // Until the child is released, any failure must let it go (it sees
        // EOF and exits) and reap it.
        let guard = scopeguard::guard(pid, |pid| {
            let _ = sync.close_write_end();
            let _ = process::wait_for(pid);
        });

        sync.close_read_end()?;
        self.user_mapping.apply_to(pid).context("map ids")?;
        sync.release_child()?;

        let pid = scopeguard::ScopeGuard::into_inner(guard);
        self.pid = Some(pid);
        Ok(pid)
    }

    /// Block until the spawner (by then the user command) exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let Some(pid) = self.pid.take() else {
            crate::bail!("container was not started");
        };
        process::wait_for(pid)
    }

    pub fn run(&mut self) -> Result<ExitStatus> {
        self.start()?;
        self.wait()
    }
}
