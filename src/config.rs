use crate::errors::{NookError, Result, ResultExt};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Default location of the container's root filesystem, relative to the
/// working directory of the invoking process.
pub const DEFAULT_ROOTFS: &str = "./rootfs";

/// Default name of the directory that receives the old root during pivot.
pub const DEFAULT_OLD_ROOT: &str = ".old_root";

/// Default UTS hostname inside the container.
pub const DEFAULT_HOSTNAME: &str = "container001";

/// Longest hostname the kernel accepts (`HOST_NAME_MAX`).
const HOSTNAME_MAX: usize = 64;

/// Everything the spawner needs to know about the container it prepares.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub rootfs: PathBuf,
    pub old_root: String,
    pub hostname: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            rootfs: PathBuf::from(DEFAULT_ROOTFS),
            old_root: DEFAULT_OLD_ROOT.to_string(),
            hostname: DEFAULT_HOSTNAME.to_string(),
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: ContainerConfig = serde_json::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    /// Start from `file` (or the defaults) and apply command-line overrides.
    pub fn resolve(
        file: Option<&Path>,
        rootfs: Option<PathBuf>,
        hostname: Option<String>,
        old_root: Option<String>,
    ) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        if let Some(rootfs) = rootfs {
            config.rootfs = rootfs;
        }
        if let Some(hostname) = hostname {
            config.hostname = hostname;
        }
        if let Some(old_root) = old_root {
            config.old_root = old_root;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(NookError::InvalidConfig("hostname is empty".to_string()));
        }
        if self.hostname.len() > HOSTNAME_MAX {
            return Err(NookError::InvalidConfig(format!(
                "hostname is longer than {} bytes: {}",
                HOSTNAME_MAX, self.hostname
            )));
        }
        if self.hostname.contains(['\0', '/']) {
            return Err(NookError::InvalidConfig(format!(
                "hostname contains an invalid character: {:?}",
                self.hostname
            )));
        }

        let mut components = Path::new(&self.old_root).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !self.old_root.contains('/') => {}
            _ => {
                return Err(NookError::InvalidConfig(format!(
                    "old root must be a single directory name: {:?}",
                    self.old_root
                )));
            }
        }

        if self.rootfs.as_os_str().is_empty() {
            return Err(NookError::InvalidConfig("rootfs path is empty".to_string()));
        }

        Ok(())
    }

    /// Check that the rootfs is an existing directory and return its absolute path.
    pub fn check_rootfs(&self) -> Result<PathBuf> {
        let meta = std::fs::metadata(&self.rootfs)
            .with_context(|| format!("rootfs {}", self.rootfs.display()))?;
        if !meta.is_dir() {
            return Err(NookError::InvalidConfig(format!(
                "rootfs is not a directory: {}",
                self.rootfs.display()
            )));
        }
        let rootfs = std::fs::canonicalize(&self.rootfs)
            .with_context(|| format!("resolve rootfs {}", self.rootfs.display()))?;
        Ok(rootfs)
    }

    /// Command-line flags that reproduce this configuration in the spawner.
    ///
    /// The rootfs is passed as raw bytes, so paths that are not UTF-8 reach
    /// the spawner unchanged.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            "--rootfs".into(),
            self.rootfs.clone().into_os_string(),
            "--hostname".into(),
            self.hostname.clone().into(),
            "--old-root".into(),
            self.old_root.clone().into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::new();
        assert_eq!(config.rootfs, PathBuf::from("./rootfs"));
        assert_eq!(config.old_root, ".old_root");
        assert_eq!(config.hostname, "container001");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nook.json");
        fs::write(&path, r#"{ "hostname": "box7" }"#).unwrap();

        let config = ContainerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.hostname, "box7");
        assert_eq!(config.rootfs, PathBuf::from(DEFAULT_ROOTFS));
        assert_eq!(config.old_root, DEFAULT_OLD_ROOT);
    }

    #[test]
    fn test_load_bad_json_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ rootfs = ").unwrap();

        let err = ContainerConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nook.json");
        fs::write(&path, r#"{ "rootfs": "/srv/alpine", "hostname": "a" }"#).unwrap();

        let config =
            ContainerConfig::resolve(Some(path.as_path()), None, Some("b".to_string()), None).unwrap();
        assert_eq!(config.rootfs, PathBuf::from("/srv/alpine"));
        assert_eq!(config.hostname, "b");
        assert_eq!(config.old_root, DEFAULT_OLD_ROOT);
    }

    #[test]
    fn test_validate_rejects_bad_hostnames() {
        let mut config = ContainerConfig::new();
        config.hostname = String::new();
        assert!(config.validate().is_err());
        config.hostname = "x".repeat(65);
        assert!(config.validate().is_err());
        config.hostname = "a/b".to_string();
        assert!(config.validate().is_err());
        config.hostname = "x".repeat(64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nested_old_root() {
        let mut config = ContainerConfig::new();
        for bad in ["", ".", "..", "a/b", "/old", "old/"] {
            config.old_root = bad.to_string();
            assert!(config.validate().is_err(), "{:?} accepted", bad);
        }
        config.old_root = "put_old".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_check_rootfs_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ContainerConfig::new();
        config.rootfs = dir.path().join("does-not-exist");
        let err = config.check_rootfs().unwrap_err();
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[test]
    fn test_check_rootfs_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rootfs");
        fs::write(&file, "").unwrap();
        let mut config = ContainerConfig::new();
        config.rootfs = file;
        assert!(matches!(
            config.check_rootfs(),
            Err(NookError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_check_rootfs_is_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ContainerConfig::new();
        config.rootfs = dir.path().to_path_buf();
        let rootfs = config.check_rootfs().unwrap();
        assert!(rootfs.is_absolute());
    }

    #[test]
    fn test_to_args_lists_every_field() {
        let mut config = ContainerConfig::new();
        config.rootfs = PathBuf::from("/tmp/r");
        config.hostname = "h".to_string();
        let args = config.to_args();
        assert_eq!(
            args,
            ["--rootfs", "/tmp/r", "--hostname", "h", "--old-root", ".old_root"]
        );
    }

    #[test]
    fn test_to_args_keeps_non_utf8_rootfs() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let raw = b"/tmp/nook-\xffroot".to_vec();
        let mut config = ContainerConfig::new();
        config.rootfs = PathBuf::from(OsString::from_vec(raw.clone()));
        assert!(config.validate().is_ok());

        let args = config.to_args();
        assert_eq!(args[0], "--rootfs");
        assert_eq!(args[1].as_bytes(), raw.as_slice());
    }
}
