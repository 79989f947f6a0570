use thiserror::Error;

#[derive(Error, Debug)]
pub enum NookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Generic(String),

    #[error("{0}")]
    Nix(#[from] nix::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("NUL error: {0}")]
    NulError(#[from] std::ffi::NulError),

    /// A failed step, tagged with the operation that was running.
    #[error("{op}: {source}")]
    Context {
        op: String,
        #[source]
        source: Box<NookError>,
    },
}

pub type Result<T> = std::result::Result<T, NookError>;

#[macro_export]
macro_rules! bail {
    ($msg:expr) => {
        return Err($crate::errors::NookError::Generic($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::NookError::Generic(format!($fmt, $($arg)*)))
    };
}

/// Attach the name of the failing operation to an error.
pub trait ResultExt<T> {
    fn context<S: Into<String>>(self, op: S) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<NookError>,
{
    fn context<S: Into<String>>(self, op: S) -> Result<T> {
        self.map_err(|e| NookError::Context {
            op: op.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| NookError::Context {
            op: f().into(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
impl NookError {
    /// The errno behind this error, looking through any context layers.
    pub(crate) fn errno(&self) -> Option<nix::errno::Errno> {
        match self {
            NookError::Nix(e) => Some(*e),
            NookError::Io(e) => e.raw_os_error().map(nix::errno::Errno::from_i32),
            NookError::Context { source, .. } => source.errno(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_context_names_the_operation() {
        let res: std::result::Result<(), Errno> = Err(Errno::EPERM);
        let err = res.context("pivot_root").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("pivot_root: "), "{}", msg);
        assert_eq!(err.errno(), Some(Errno::EPERM));
    }

    #[test]
    fn test_nested_context_keeps_errno() {
        let res: std::result::Result<(), Errno> = Err(Errno::EINVAL);
        let err = res
            .context("umount old root")
            .with_context(|| format!("clean up {}", "/.old_root"))
            .unwrap_err();
        assert_eq!(err.to_string().split(": ").next(), Some("clean up /.old_root"));
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }

    #[test]
    fn test_bail_formats_message() {
        fn fails(name: &str) -> Result<()> {
            crate::bail!("unsupported command: {}", name);
        }
        let err = fails("build").unwrap_err();
        assert_eq!(err.to_string(), "unsupported command: build");
        assert_eq!(err.errno(), None);
    }
}
