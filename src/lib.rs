pub mod commands;
pub mod config;
pub mod container;
pub mod errors;
pub mod logger;
pub mod mounts;
pub mod sync;

pub use config::ContainerConfig;
pub use container::namespace::{IdMapping, NamespaceSpec, NamespaceType, UserNamespaceMapping};
pub use container::process::ExitStatus;
pub use container::Container;
pub use errors::{NookError, Result};
