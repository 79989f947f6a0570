use crate::config::ContainerConfig;
use crate::container::prepare::prepare_and_exec;
use crate::errors::Result;
use log::debug;

pub struct SpawnerCommand {
    pub config: ContainerConfig,
    pub command: String,
    pub args: Vec<String>,
}

impl SpawnerCommand {
    pub fn new(config: ContainerConfig, command: String, args: Vec<String>) -> Self {
        Self {
            config,
            command,
            args,
        }
    }
}

impl super::Command for SpawnerCommand {
    fn execute(&self) -> Result<i32> {
        debug!("preparing container: {:?}", self.config);
        match prepare_and_exec(&self.config, &self.command, &self.args)? {}
    }
}
