pub mod logging {
    use std::fs::{self, OpenOptions};
    use std::path::{Path, PathBuf};
    use std::sync::OnceLock;

    use clap::ValueEnum;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
    use tracing_subscriber::EnvFilter;

    /// Overrides the per-level defaults with a full `EnvFilter` directive.
    pub const FILTER_ENV: &str = "BOTLOG_LOG_FILTER";

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl From<LogLevel> for LevelFilter {
        fn from(level: LogLevel) -> Self {
            match level {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    /// Installs the global subscriber. Calls after the first are no-ops.
    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if GUARD.get().is_some() {
            return Ok(());
        }

        let (writer, guard) = writer_for(config.file.as_deref())?;
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter(config.level))
            .with_level(true)
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(guard);
        Ok(())
    }

    fn writer_for(file: Option<&Path>) -> Result<(NonBlocking, WorkerGuard), InitError> {
        let Some(path) = file else {
            return Ok(tracing_appender::non_blocking(std::io::stderr()));
        };
        let io_err = |source| InitError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        Ok(tracing_appender::non_blocking(file))
    }

    fn env_filter(level: LogLevel) -> EnvFilter {
        match std::env::var(FILTER_ENV) {
            Ok(directive) if !directive.trim().is_empty() => EnvFilter::new(directive),
            _ => EnvFilter::new(default_directive(level)),
        }
    }

    /// Target prefixes our crates log under: `botlog.*` and the app's module
    /// paths, `history.*` and the SDK's module paths.
    const OWN_TARGETS: [&str; 2] = ["botlog", "history"];

    /// Verbose levels only apply to our crates; dependencies stay at info.
    pub(crate) fn default_directive(level: LogLevel) -> String {
        match level {
            LogLevel::Debug | LogLevel::Trace => {
                let level = LevelFilter::from(level).to_string().to_ascii_lowercase();
                OWN_TARGETS
                    .iter()
                    .fold("info".to_string(), |acc, target| format!("{acc},{target}={level}"))
            }
            other => LevelFilter::from(other).to_string().to_ascii_lowercase(),
        }
    }

}
