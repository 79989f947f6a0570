//! Stage two: runs as PID 1 inside the freshly cloned namespaces, sets up the
//! container's filesystem view and hostname, then becomes the user command.

use super::namespace::set_hostname;
use super::process::exec_command;
use crate::config::ContainerConfig;
use crate::errors::*;
use crate::mounts::{self, MountPoint};
use log::info;
use nix::unistd::{getpid, Pid};
use std::convert::Infallible;

/// Refuse to touch any mount unless we are the init process of a new PID
/// namespace, which only `nook run` produces. Run directly on the host, the
/// root switch would otherwise operate on the host's own mount table.
///
/// This check stands in for the `EINVAL` that pivot_root(2) would return for
/// a rootfs on the host's root filesystem, so a direct `spawner` run fails here
/// and never reaches the pivot.
pub fn ensure_isolated(pid: Pid) -> Result<()> {
    if pid != Pid::from_raw(1) {
        return Err(NookError::Generic(format!(
            "not running as init of a new PID namespace (pid {}); containers are started with `run`",
            pid
        )))
        .context("switch root");
    }
    Ok(())
}

/// Prepare the isolated environment described by `config` and exec
/// `command`. Only returns on failure; every step is fatal.
pub fn prepare_and_exec(
    config: &ContainerConfig,
    command: &str,
    args: &[String],
) -> Result<Infallible> {
    config.validate()?;
    let rootfs = config.check_rootfs()?;
    ensure_isolated(getpid())?;

    MountPoint::proc(&rootfs).mount()?;
    mounts::switch_root(&rootfs, &config.old_root)?;
    set_hostname(&config.hostname)?;

    info!("container ready, running {}", command);
    exec_command(command, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_ensure_isolated_accepts_init() {
        assert!(ensure_isolated(Pid::from_raw(1)).is_ok());
    }

    #[test]
    fn test_ensure_isolated_rejects_host_process() {
        let err = ensure_isolated(Pid::from_raw(4242)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("switch root: "), "{}", msg);
        assert!(msg.contains("4242"), "{}", msg);
    }

    #[test]
    fn test_missing_rootfs_fails_before_any_mount() {
        let mut config = ContainerConfig::new();
        config.rootfs = PathBuf::from("/nonexistent/nook-rootfs");
        let err = prepare_and_exec(&config, "/bin/true", &[]).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/nook-rootfs"), "{}", err);
    }

    #[test]
    fn test_outside_namespace_fails_at_root_switch() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ContainerConfig::new();
        config.rootfs = dir.path().to_path_buf();
        // The test harness is never PID 1, so this must stop at the guard and
        // leave the directory untouched.
        let err = prepare_and_exec(&config, "/bin/true", &[]).unwrap_err();
        assert!(err.to_string().starts_with("switch root: "), "{}", err);
        assert!(!dir.path().join("proc").exists());
    }
}
