use crate::errors::*;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{chdir, pivot_root};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A filesystem to mount inside the container before the root switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub flags: MsFlags,
}

impl MountPoint {
    /// A fresh `proc` for the container's own PID namespace at `rootfs/proc`.
    pub fn proc(rootfs: &Path) -> Self {
        Self {
            source: "proc".to_string(),
            target: rootfs.join("proc"),
            fstype: "proc".to_string(),
            flags: MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        }
    }

    /// Create the mount point directory (an existing one is fine) and mount.
    pub fn mount(&self) -> Result<()> {
        if let Err(e) = fs::create_dir(&self.target) {
            if e.kind() != ErrorKind::AlreadyExists {
                return Err(e).with_context(|| format!("create {}", self.target.display()));
            }
        }
        mount(
            Some(self.source.as_str()),
            &self.target,
            Some(self.fstype.as_str()),
            self.flags,
            None::<&str>,
        )
        .with_context(|| format!("mount {} on {}", self.fstype, self.target.display()))?;
        info!("mounted {} on {}", self.fstype, self.target.display());
        Ok(())
    }
}

/// Where a root transition currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootState {
    /// New root is bind-mounted on itself.
    Bound,
    /// Root switched, old root parked under the staging directory, cwd is `/`.
    Pivoted,
    /// Old root detached and its staging directory removed.
    Cleaned,
}

/// New root bind-mounted onto itself, so that it is a mount point distinct
/// from the current root, as pivot_root(2) requires.
#[derive(Debug)]
pub struct BoundRoot {
    new_root: PathBuf,
    old_root: String,
}

/// Root switched; the previous root is still reachable at `/<old_root>`.
#[derive(Debug)]
pub struct PivotedRoot {
    old_root: String,
}

impl BoundRoot {
    /// Recursively bind `new_root` onto itself.
    pub fn bind(new_root: &Path, old_root: &str) -> Result<Self> {
        mount(
            Some(new_root),
            new_root,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None::<&str>,
        )
        .with_context(|| format!("bind mount {}", new_root.display()))?;
        debug!("root transition: {:?} at {}", RootState::Bound, new_root.display());
        Ok(Self {
            new_root: new_root.to_path_buf(),
            old_root: old_root.to_string(),
        })
    }

    /// Swap roots: stage the old root, detach `/` from host propagation,
    /// pivot and move to the new `/`.
    pub fn pivot(self) -> Result<PivotedRoot> {
        let put_old = self.new_root.join(&self.old_root);
        prepare_put_old(&put_old)?;

        // Shared propagation (the systemd default) makes pivot_root fail.
        mount(
            None::<&str>,
            "/",
            None::<&str>,
            MsFlags::MS_REC | MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .context("make / private")?;

        pivot_root(&self.new_root, &put_old)
            .with_context(|| format!("pivot_root to {}", self.new_root.display()))?;
        chdir("/").context("chdir to new root")?;

        debug!("root transition: {:?}", RootState::Pivoted);
        Ok(PivotedRoot {
            old_root: self.old_root,
        })
    }
}

impl PivotedRoot {
    /// Path of the parked old root, as seen from the new root.
    pub fn old_root_path(&self) -> PathBuf {
        Path::new("/").join(&self.old_root)
    }

    /// Detach the old root and remove its staging directory.
    ///
    /// A staging directory that is no longer a mount point, or no longer
    /// exists, only gets a warning. The directory is removed with
    /// `remove_dir`, never recursively, so a root that is somehow still
    /// attached fails here instead of having its files deleted.
    pub fn clean(self) -> Result<RootState> {
        let old_root = self.old_root_path();

        match umount2(&old_root, MntFlags::MNT_DETACH) {
            Ok(()) => {}
            Err(Errno::EINVAL) => warn!("{} is not mounted any more", old_root.display()),
            Err(e) => {
                return Err(e).with_context(|| format!("unmount old root {}", old_root.display()))
            }
        }

        match fs::remove_dir(&old_root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{} already removed", old_root.display())
            }
            Err(e) => {
                return Err(e).with_context(|| format!("remove old root {}", old_root.display()))
            }
        }

        debug!("root transition: {:?}", RootState::Cleaned);
        Ok(RootState::Cleaned)
    }
}

/// Create the staging directory for the old root.
///
/// An existing empty directory is reused; anything else at that path would be
/// shadowed by the old root, so it is refused.
pub fn prepare_put_old(put_old: &Path) -> Result<()> {
    match fs::create_dir(put_old) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e).with_context(|| format!("create {}", put_old.display())),
    }

    let meta = fs::symlink_metadata(put_old)
        .with_context(|| format!("inspect {}", put_old.display()))?;
    if !meta.is_dir() {
        crate::bail!("{} exists and is not a directory", put_old.display());
    }
    let mut entries =
        fs::read_dir(put_old).with_context(|| format!("inspect {}", put_old.display()))?;
    if entries.next().is_some() {
        crate::bail!("{} exists and is not empty", put_old.display());
    }
    debug!("reusing empty staging directory {}", put_old.display());
    Ok(())
}

/// Run the whole transition: bind, pivot, clean.
pub fn switch_root(new_root: &Path, old_root: &str) -> Result<RootState> {
    info!("switching root to {}", new_root.display());
    let state = BoundRoot::bind(new_root, old_root)?.pivot()?.clean()?;
    info!("root switched to {}", new_root.display());
    Ok(state)
}
