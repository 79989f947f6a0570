use crate::errors::Result;

pub mod run;
pub mod spawner;

/// Common trait for the CLI verbs.
pub trait Command {
    /// Run the verb; the returned value becomes the process exit status.
    fn execute(&self) -> Result<i32>;
}
