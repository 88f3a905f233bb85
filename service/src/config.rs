use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use events::JobCategory;
use log::LevelFilter;
use std::time::Duration;

/// Default base URL of the platform API used when `BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4000";

/// Default delay before reconnecting the event stream after a failure.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Base URL of the platform REST API. The token and event stream endpoints
    /// are resolved relative to it.
    #[arg(short, long, env, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Bearer token attached to the stream-token request. Obtained from the
    /// regular API login flow.
    #[arg(long, env)]
    api_token: Option<String>,

    /// Seconds to wait before reconnecting after the event stream fails
    #[arg(long, env, default_value_t = DEFAULT_RECONNECT_DELAY_SECS)]
    pub reconnect_delay_secs: u64,

    /// Timeout in seconds for the stream-token request
    #[arg(long, env, default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Identifier of a background job to watch until it completes or fails
    #[arg(long, env)]
    pub job_id: Option<String>,

    /// Resource category of the watched job
    #[arg(long, env, default_value = "quiz")]
    pub job_category: JobCategory,

    /// Identifier of a learning guide whose sections should be reconstructed
    #[arg(long, env)]
    pub content_id: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    /// Returns the API base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn set_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Returns the bearer token for the stream-token request, if configured.
    pub fn api_token(&self) -> Option<String> {
        self.api_token.clone()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["learnstream"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_stream_contract() {
        let config = parse(&["--base-url", "http://api.test"]);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.job_category, JobCategory::Quiz);
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let config = parse(&["--base-url", "http://api.test/v1/"]);
        assert_eq!(config.base_url(), "http://api.test/v1");
    }

    #[test]
    fn test_watch_arguments_are_parsed() {
        let config = parse(&[
            "--base-url",
            "http://api.test",
            "--job-id",
            "job-1",
            "--job-category",
            "flashcard",
            "--content-id",
            "c1",
            "--log-level-filter",
            "DEBUG",
        ]);
        assert_eq!(config.job_id.as_deref(), Some("job-1"));
        assert_eq!(config.job_category, JobCategory::Flashcard);
        assert_eq!(config.content_id.as_deref(), Some("c1"));
        assert_eq!(config.log_level_filter, LevelFilter::Debug);
    }

    #[test]
    fn test_unknown_job_category_is_rejected() {
        let result = Config::try_parse_from([
            "learnstream",
            "--base-url",
            "http://api.test",
            "--job-category",
            "video",
        ]);
        assert!(result.is_err());
    }
}
