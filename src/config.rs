//! Pipeline Configuration
//!
//! Every tunable of the producer, the append log, the consumer and the sink lives in
//! `PipelineConfig`. Each field is a command line flag that falls back to an `SA_*`
//! environment variable and then to its default. A malformed value is a startup error
//! rather than a silent fallback to the default.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "stream_analytics")]
pub struct PipelineConfig {
    /// Listen address for `/records`, `/stats` and `/health`.
    #[arg(long, env = "SA_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    /// Newline-delimited JSON feed. When absent, records arrive through `POST /records`.
    #[arg(long, env = "SA_STREAM_URL")]
    pub stream_url: Option<String>,

    #[arg(long, env = "SA_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// 0 disables the time-based flush.
    #[arg(long, env = "SA_FLUSH_INTERVAL_MS", default_value_t = 5_000)]
    pub flush_interval_ms: u64,

    #[arg(long, env = "SA_DEFAULT_PARTITION_KEY", default_value = "unknown")]
    pub default_partition_key: String,

    #[arg(long, env = "SA_PUT_ATTEMPTS", default_value_t = 3)]
    pub put_attempts: usize,

    #[arg(long, env = "SA_LOG_SHARDS", default_value_t = 4)]
    pub log_shards: u32,

    #[arg(long, env = "SA_RETENTION_HOURS", default_value_t = 24)]
    pub retention_hours: u64,

    #[arg(long, env = "SA_CONSUMER_BATCH_SIZE", default_value_t = 10)]
    pub consumer_batch_size: usize,

    #[arg(long, env = "SA_INVOCATION_TIMEOUT_SECS", default_value_t = 60)]
    pub invocation_timeout_secs: u64,

    #[arg(long, env = "SA_MAX_DELIVERY_ATTEMPTS", default_value_t = 10)]
    pub max_delivery_attempts: u32,

    /// Base URL of the sentiment / entity service.
    #[arg(long, env = "SA_ANALYSIS_ENDPOINT", default_value = "http://127.0.0.1:9000")]
    pub analysis_endpoint: String,

    /// Per-request timeout of one analysis call.
    #[arg(long, env = "SA_ANALYSIS_TIMEOUT_SECS", default_value_t = 20)]
    pub analysis_timeout_secs: u64,

    #[arg(long, env = "SA_ANALYSIS_ATTEMPTS", default_value_t = 3)]
    pub analysis_attempts: usize,

    #[arg(long, env = "SA_LANGUAGE_CODE", default_value = "en")]
    pub language_code: String,

    #[arg(long, env = "SA_OUTPUT_DIR", default_value = "output")]
    pub output_dir: String,

    #[arg(long, env = "SA_SENTIMENT_FOLDER", default_value = "sentiment")]
    pub sentiment_folder: String,

    #[arg(long, env = "SA_ENTITIES_FOLDER", default_value = "entities")]
    pub entities_folder: String,

    #[arg(long, env = "SA_STATS_INTERVAL_SECS", default_value_t = 30)]
    pub stats_interval_secs: u64,
}

impl PipelineConfig {
    /// Parses the process arguments and environment, then validates.
    ///
    /// Exits with usage on `--help` or on a value clap cannot parse.
    pub fn load() -> Result<Self> {
        Self::parse().checked()
    }

    /// Normalizes optional values and runs `validate`.
    pub fn checked(mut self) -> Result<Self> {
        self.stream_url = self.stream_url.filter(|url| !url.trim().is_empty());
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.put_attempts == 0 {
            anyhow::bail!("put_attempts must be at least 1");
        }
        if self.log_shards == 0 {
            anyhow::bail!("log_shards must be at least 1");
        }
        if self.consumer_batch_size == 0 {
            anyhow::bail!("consumer_batch_size must be at least 1");
        }
        if self.invocation_timeout_secs == 0 {
            anyhow::bail!("invocation_timeout_secs must be at least 1");
        }
        if self.max_delivery_attempts == 0 {
            anyhow::bail!("max_delivery_attempts must be at least 1");
        }
        if self.analysis_attempts == 0 {
            anyhow::bail!("analysis_attempts must be at least 1");
        }
        if self.default_partition_key.trim().is_empty() {
            anyhow::bail!("default_partition_key must not be empty");
        }
        if self.language_code.trim().is_empty() {
            anyhow::bail!("language_code must not be empty");
        }
        for (name, folder) in [
            ("sentiment_folder", &self.sentiment_folder),
            ("entities_folder", &self.entities_folder),
        ] {
            if folder.trim_matches('/').is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }
        if self.sentiment_folder == self.entities_folder {
            anyhow::bail!("sentiment_folder and entities_folder must differ");
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}
