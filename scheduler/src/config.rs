//! Process-wide scheduler configuration.
//!
//! A small set of knobs, matching the original system's `config`
//! module: how far `scan` may race ahead of execution, how many
//! threads back the synchronous-task pool, and where (if anywhere) the
//! model client's response cache lives. Built the way the teacher
//! crate builds its worker configuration: a plain struct plus a
//! `getopts`-based `from_args` for binaries that want a CLI surface,
//! gated behind the `getopts` feature so library-only consumers don't
//! pay for the dependency.

use crate::error::SchedulerError;

/// Default value for [`Config::max_window`].
pub const DEFAULT_MAX_WINDOW: usize = 64;

/// Default value for [`Config::thread_pool_size`].
pub const DEFAULT_THREAD_POOL_SIZE: usize = 20;

/// Process-wide scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-scope bound on in-flight schedule nodes; `scan` stalls once
    /// a scope's window size reaches this value.
    pub max_window: usize,
    /// Number of OS threads backing the synchronous ("python agent")
    /// task pool.
    pub thread_pool_size: usize,
    /// Root directory for the model client's content-addressed
    /// response cache. `None` disables caching entirely.
    pub debug_path: Option<String>,
    /// Emit one `tracing` event per schedule-node lifecycle
    /// transition in addition to the normal `DEBUG`-level logging.
    pub verbose: bool,
    /// Record wall-clock timing for task bodies and emit it via
    /// `tracing`.
    pub timing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_window: DEFAULT_MAX_WINDOW,
            thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
            debug_path: None,
            verbose: false,
            timing: false,
        }
    }
}

impl Config {
    /// Builds a default configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "getopts")]
impl Config {
    /// Parses a configuration out of command-line style arguments,
    /// following the same shape as the teacher crate's
    /// `execute_from_args`: build a `getopts::Options`, parse, then
    /// translate matches into the typed struct.
    pub fn from_args<I: IntoIterator<Item = String>>(args: I) -> Result<Self, SchedulerError> {
        let mut opts = getopts::Options::new();
        opts.optopt("", "max-window", "per-scope scan lookahead", "N");
        opts.optopt("", "thread-pool-size", "python-agent thread pool size", "N");
        opts.optopt("", "debug-path", "model client cache directory", "PATH");
        opts.optflag("", "verbose", "emit verbose scheduler logging");
        opts.optflag("", "timing", "record task body timing");

        let matches = opts
            .parse(args)
            .map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;

        let mut config = Config::default();

        if let Some(value) = matches.opt_str("max-window") {
            config.max_window = value
                .parse()
                .map_err(|_| SchedulerError::InvalidConfig(format!("invalid --max-window: {value}")))?;
        }
        if let Some(value) = matches.opt_str("thread-pool-size") {
            config.thread_pool_size = value.parse().map_err(|_| {
                SchedulerError::InvalidConfig(format!("invalid --thread-pool-size: {value}"))
            })?;
        }
        if let Some(value) = matches.opt_str("debug-path") {
            config.debug_path = Some(value);
        }
        config.verbose = matches.opt_present("verbose");
        config.timing = matches.opt_present("timing");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_system_constants() {
        let config = Config::default();
        assert_eq!(config.max_window, 64);
        assert_eq!(config.thread_pool_size, 20);
        assert!(config.debug_path.is_none());
    }

    #[cfg(feature = "getopts")]
    #[test]
    fn parses_overrides_from_args() {
        let args = vec![
            "--max-window".to_string(),
            "8".to_string(),
            "--debug-path".to_string(),
            "/tmp/cache".to_string(),
            "--verbose".to_string(),
        ];
        let config = Config::from_args(args).expect("valid args");
        assert_eq!(config.max_window, 8);
        assert_eq!(config.debug_path.as_deref(), Some("/tmp/cache"));
        assert!(config.verbose);
        assert!(!config.timing);
    }

    #[cfg(feature = "getopts")]
    #[test]
    fn rejects_malformed_numeric_argument() {
        let args = vec!["--max-window".to_string(), "not-a-number".to_string()];
        assert!(Config::from_args(args).is_err());
    }
}
