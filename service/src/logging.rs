use crate::config::Config;
use log::LevelFilter;
use simplelog::{self, ConfigBuilder};

/// HTTP and SSE client modules that are suppressed below Trace.
/// They log every request, frame and reconnect at debug level.
const FILTERED_MODULES: &[&str] = &[
    "reqwest",
    "hyper",
    "hyper_util",
    "eventsource_client",
    "rustls",
    "h2",
];

pub struct Logger {}

impl Logger {
    /// Initializes the global terminal logger at the level configured in `config`.
    ///
    /// Dependency output is only let through at Trace, where the raw stream
    /// framing is usually what is being debugged.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;
        let log_config = Self::build_log_config(Self::should_filter_dependencies(level));

        simplelog::TermLogger::init(
            level,
            log_config,
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
        .expect("Failed to start simplelog");
    }

    fn should_filter_dependencies(level: LevelFilter) -> bool {
        level != LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        builder.set_target_level(LevelFilter::Error);

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_modules_cover_stream_client_stack() {
        for module in ["reqwest", "hyper", "eventsource_client"] {
            assert!(
                FILTERED_MODULES.contains(&module),
                "{module} should be filtered"
            );
        }
    }

    #[test]
    fn test_only_trace_lets_dependency_logs_through() {
        assert!(!Logger::should_filter_dependencies(LevelFilter::Trace));
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            assert!(
                Logger::should_filter_dependencies(level),
                "{level} should filter dependencies"
            );
        }
    }

    #[test]
    fn test_build_log_config_does_not_panic() {
        let _filtered = Logger::build_log_config(true);
        let _unfiltered = Logger::build_log_config(false);
    }
}
