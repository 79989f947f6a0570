use clap::{Args, Parser, Subcommand};
use nook::commands::{self, Command};
use nook::config::ContainerConfig;
use nook::errors::Result;
use nook::logger::{self, Stage};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "nook")]
#[command(about = "Run a command in fresh namespaces on top of a private root filesystem")]
#[command(version)]
struct Cli {
    /// Log filter in env_logger syntax (defaults to $NOOK_LOG, then "warn")
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command inside a new container
    Run {
        #[command(flatten)]
        container: ContainerArgs,
        /// Command to execute, followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Internal re-exec target; prepares the container and execs the command
    #[command(hide = true)]
    Spawner {
        #[command(flatten)]
        container: ContainerArgs,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct ContainerArgs {
    /// JSON file with rootfs, hostname and old_root settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding the container's root filesystem
    #[arg(long, value_name = "DIR")]
    rootfs: Option<PathBuf>,
    /// Hostname inside the container
    #[arg(long, value_name = "NAME")]
    hostname: Option<String>,
    /// Name of the staging directory for the old root
    #[arg(long, value_name = "NAME", hide = true)]
    old_root: Option<String>,
}

impl ContainerArgs {
    fn resolve(self) -> Result<ContainerConfig> {
        ContainerConfig::resolve(
            self.config.as_deref(),
            self.rootfs,
            self.hostname,
            self.old_root,
        )
    }
}

fn split_command(mut command: Vec<String>) -> (String, Vec<String>) {
    // clap guarantees at least one element.
    let args = command.split_off(1);
    (command.remove(0), args)
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run { container, command } => {
            let (command, args) = split_command(command);
            let cmd =
                commands::run::RunCommand::new(container.resolve()?, command, args, cli.log_level);
            cmd.execute()
        }
        Commands::Spawner { container, command } => {
            let (command, args) = split_command(command);
            let cmd = commands::spawner::SpawnerCommand::new(container.resolve()?, command, args);
            cmd.execute()
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let stage = match cli.command {
        Commands::Run { .. } => Stage::Run,
        Commands::Spawner { .. } => Stage::Spawner,
    };
    logger::init(stage, cli.log_level.as_deref()).unwrap_or_else(|e| {
        eprintln!("nook: failed to initialise logging: {}", e);
        process::exit(1);
    });

    match dispatch(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("nook {}: error: {}", stage.as_str(), e);
            process::exit(1);
        }
    }
}
