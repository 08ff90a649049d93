use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Reel-Queue
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub downloader: DownloaderConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub persistence: PersistenceConfig,
    /// Extra request headers sent with every download
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Download behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloaderConfig {
    /// Directory downloaded files are written to (created on start)
    #[serde(rename = "download-directory")]
    pub download_directory: PathBuf,

    /// Number of concurrent download workers
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: u32,

    /// Retries per URL after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Consecutive failures before the current run is aborted (0 disables)
    #[serde(rename = "max-consecutive-failures")]
    pub max_consecutive_failures: u32,

    /// Base retry delay (milliseconds), doubled per attempt
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound (exclusive) of the random jitter added to each retry delay
    #[serde(rename = "retry-jitter-ms", default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Whole-request timeout, covering the body stream
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl DownloaderConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the downloader
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the downloader
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the downloader
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Queue snapshot configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// JSON file holding URLs that were queued but not yet downloaded
    #[serde(rename = "queue-file")]
    pub queue_file: PathBuf,
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_jitter_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    3600
}

fn default_connect_timeout_secs() -> u64 {
    10
}
