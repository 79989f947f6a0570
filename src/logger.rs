use env_logger::{Builder, Env};
use std::io::Write;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV: &str = "NOOK_LOG";

/// Quiet by default so that the container's own stderr is not polluted.
pub const DEFAULT_FILTER: &str = "warn";

/// Which process lifecycle is logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Run,
    Spawner,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Run => "run",
            Stage::Spawner => "spawner",
        }
    }
}

fn builder(stage: Stage, filter: Option<&str>) -> Builder {
    let mut builder = match filter {
        Some(filter) => {
            let mut b = Builder::new();
            b.parse_filters(filter);
            b
        }
        None => Builder::from_env(Env::default().filter_or(LOG_ENV, DEFAULT_FILTER)),
    };

    builder.format(move |buf, record| {
        writeln!(
            buf,
            "{} [{} {}] {}",
            record.level(),
            stage.as_str(),
            std::process::id(),
            record.args()
        )
    });
    builder
}

/// Install the stderr logger for this stage.
pub fn init(stage: Stage, filter: Option<&str>) -> Result<(), log::SetLoggerError> {
    builder(stage, filter).try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Run.as_str(), "run");
        assert_eq!(Stage::Spawner.as_str(), "spawner");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let logger = builder(Stage::Run, Some("debug")).build();
        assert_eq!(logger.filter(), log::LevelFilter::Debug);
    }
}
