use crate::errors::{NookError, Result, ResultExt};
use log::{debug, info};
use nix::sched::CloneFlags;
use nix::unistd::{Gid, Pid, Uid};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;

/// Linux namespace types a container is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamespaceType {
    /// hostname
    Uts,
    /// process tree
    Pid,
    /// filesystem view
    Mount,
    /// UID/GID mapping
    User,
}

impl NamespaceType {
    pub const ALL: [NamespaceType; 4] = [
        NamespaceType::Uts,
        NamespaceType::Pid,
        NamespaceType::Mount,
        NamespaceType::User,
    ];

    pub fn clone_flag(&self) -> CloneFlags {
        match self {
            NamespaceType::Uts => CloneFlags::CLONE_NEWUTS,
            NamespaceType::Pid => CloneFlags::CLONE_NEWPID,
            NamespaceType::Mount => CloneFlags::CLONE_NEWNS,
            NamespaceType::User => CloneFlags::CLONE_NEWUSER,
        }
    }

    /// Name of the namespace link under `/proc/<pid>/ns/`.
    pub fn proc_path(&self) -> &'static str {
        match self {
            NamespaceType::Uts => "uts",
            NamespaceType::Pid => "pid",
            NamespaceType::Mount => "mnt",
            NamespaceType::User => "user",
        }
    }
}

/// The set of namespaces requested for the child.
///
/// The root switch needs a private mount namespace and a safe UID 0 needs a
/// user namespace, so the four types only make sense together; see
/// [`NamespaceSpec::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceSpec {
    namespaces: BTreeSet<NamespaceType>,
}

impl NamespaceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four namespaces a container needs.
    pub fn isolation() -> Self {
        let mut spec = Self::new();
        for ns_type in NamespaceType::ALL {
            spec.add(ns_type);
        }
        spec
    }

    pub fn add(&mut self, ns_type: NamespaceType) -> &mut Self {
        debug!("adding namespace: {:?}", ns_type);
        self.namespaces.insert(ns_type);
        self
    }

    pub fn contains(&self, ns_type: NamespaceType) -> bool {
        self.namespaces.contains(&ns_type)
    }

    pub fn clone_flags(&self) -> CloneFlags {
        self.namespaces
            .iter()
            .fold(CloneFlags::empty(), |flags, ns| flags | ns.clone_flag())
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = NamespaceType::ALL
            .iter()
            .filter(|ns| !self.contains(**ns))
            .map(|ns| ns.proc_path())
            .collect();
        if !missing.is_empty() {
            return Err(NookError::InvalidConfig(format!(
                "uts, pid, mnt and user namespaces must be requested together, missing: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// One row of a `uid_map` or `gid_map` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    /// First id inside the container.
    pub container_id: u32,
    /// First id on the host.
    pub host_id: u32,
    /// Number of consecutive ids covered.
    pub size: u32,
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.container_id, self.host_id, self.size)
    }
}

/// UID and GID mappings for a new user namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserNamespaceMapping {
    pub uid_mappings: Vec<IdMapping>,
    pub gid_mappings: Vec<IdMapping>,
}

impl UserNamespaceMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map container root (0) to a single host uid and gid.
    pub fn single_identity(uid: Uid, gid: Gid) -> Self {
        Self {
            uid_mappings: vec![IdMapping {
                container_id: 0,
                host_id: uid.as_raw(),
                size: 1,
            }],
            gid_mappings: vec![IdMapping {
                container_id: 0,
                host_id: gid.as_raw(),
                size: 1,
            }],
        }
    }

    /// Map container root to the real uid and gid of the calling process.
    pub fn for_current_user() -> Self {
        Self::single_identity(nix::unistd::getuid(), nix::unistd::getgid())
    }

    pub fn validate(&self) -> Result<()> {
        if self.uid_mappings.is_empty() || self.gid_mappings.is_empty() {
            return Err(NookError::InvalidConfig(
                "user namespace needs both a UID and a GID mapping".to_string(),
            ));
        }
        for (kind, mappings) in [("UID", &self.uid_mappings), ("GID", &self.gid_mappings)] {
            if mappings.iter().any(|m| m.size == 0) {
                return Err(NookError::InvalidConfig(format!(
                    "{} mapping size cannot be 0",
                    kind
                )));
            }
        }
        Ok(())
    }

    /// Install the mappings for a child that is still waiting at its
    /// creation barrier.
    ///
    /// An unprivileged writer must deny `setgroups` before `gid_map` is
    /// accepted, so the order here is fixed.
    pub fn apply_to(&self, pid: Pid) -> Result<()> {
        debug!("writing id maps for pid {}", pid);
        let proc_dir = format!("/proc/{}", pid);

        write_proc_file(&format!("{}/uid_map", proc_dir), &render(&self.uid_mappings))?;
        write_proc_file(&format!("{}/setgroups", proc_dir), "deny")?;
        write_proc_file(&format!("{}/gid_map", proc_dir), &render(&self.gid_mappings))?;

        info!(
            "mapped pid {}: uid [{}] gid [{}]",
            pid,
            render_inline(&self.uid_mappings),
            render_inline(&self.gid_mappings)
        );
        Ok(())
    }
}

/// The map file body: one `inside outside count` line per mapping.
fn render(mappings: &[IdMapping]) -> String {
    mappings.iter().map(|m| format!("{}\n", m)).collect()
}

fn render_inline(mappings: &[IdMapping]) -> String {
    mappings
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// The kernel wants each map in a single write(2).
fn write_proc_file(path: &str, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("write {}", path))
}

/// Set the hostname of the current UTS namespace.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).context("sethostname")?;
    info!("hostname set to {}", hostname);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_requests_all_four() {
        let spec = NamespaceSpec::isolation();
        let flags = spec.clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(flags.contains(CloneFlags::CLONE_NEWUSER));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_partial_spec_is_rejected() {
        let mut spec = NamespaceSpec::new();
        spec.add(NamespaceType::Mount).add(NamespaceType::Pid);
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.ends_with("missing: uts, user"), "{}", err);
    }

    #[test]
    fn test_empty_spec_has_no_flags() {
        assert!(NamespaceSpec::new().clone_flags().is_empty());
        assert!(NamespaceSpec::new().validate().is_err());
    }

    #[test]
    fn test_single_identity_mapping() {
        let mapping = UserNamespaceMapping::single_identity(Uid::from_raw(1000), Gid::from_raw(100));
        assert_eq!(render(&mapping.uid_mappings), "0 1000 1\n");
        assert_eq!(render(&mapping.gid_mappings), "0 100 1\n");
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn test_current_user_maps_real_ids() {
        let mapping = UserNamespaceMapping::for_current_user();
        assert_eq!(mapping.uid_mappings[0].host_id, nix::unistd::getuid().as_raw());
        assert_eq!(mapping.gid_mappings[0].host_id, nix::unistd::getgid().as_raw());
        assert_eq!(mapping.uid_mappings[0].container_id, 0);
    }

    #[test]
    fn test_zero_size_mapping_is_rejected() {
        let mut mapping = UserNamespaceMapping::single_identity(Uid::from_raw(1), Gid::from_raw(1));
        mapping.gid_mappings[0].size = 0;
        assert!(mapping.validate().is_err());
        assert!(UserNamespaceMapping::new().validate().is_err());
    }

    #[test]
    fn test_render_multiple_rows() {
        let rows = [
            IdMapping { container_id: 0, host_id: 1000, size: 1 },
            IdMapping { container_id: 1, host_id: 100000, size: 65536 },
        ];
        assert_eq!(render(&rows), "0 1000 1\n1 100000 65536\n");
        assert_eq!(render_inline(&rows), "0 1000 1, 1 100000 65536");
    }
}
