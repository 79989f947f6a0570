use crate::config::ContainerConfig;
use crate::container::Container;
use crate::errors::Result;
use log::info;

pub struct RunCommand {
    pub config: ContainerConfig,
    pub command: String,
    pub args: Vec<String>,
    pub log_level: Option<String>,
}

impl RunCommand {
    pub fn new(
        config: ContainerConfig,
        command: String,
        args: Vec<String>,
        log_level: Option<String>,
    ) -> Self {
        Self {
            config,
            command,
            args,
            log_level,
        }
    }
}

impl super::Command for RunCommand {
    fn execute(&self) -> Result<i32> {
        info!("running {} {:?} in {}", self.command, self.args, self.config.rootfs.display());

        let mut container =
            Container::new(self.config.clone(), self.command.clone(), self.args.clone());
        container.set_log_level(self.log_level.clone());
        container.validate()?;

        let status = container.run()?;
        info!("container exited: {:?}", status);
        Ok(status.code())
    }
}
