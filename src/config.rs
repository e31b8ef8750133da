//! Runtime configuration. Every option is a command line flag that falls
//! back to an environment variable, then to a default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::{builder::BoolishValueParser, ArgAction, Args as ClapArgs};
use url::Url;

#[derive(ClapArgs, Debug, Clone)]
pub struct Config {
    /// Address to bind the http server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Public origin of this service, used for card image urls
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:3000")]
    pub base_url: String,

    /// Site name shown in OpenGraph tags and page titles
    #[arg(long, env = "SITE_NAME", default_value = "vxsharkey")]
    pub site_name: String,

    /// Maximum number of cached responses and cards
    #[arg(long, env = "CACHE_MAX_SIZE", default_value_t = 500)]
    pub cache_max_size: u64,

    /// Cache time-to-live in milliseconds
    #[arg(long = "cache-ttl", env = "CACHE_TTL", default_value_t = 900_000)]
    pub cache_ttl_ms: u64,

    /// Timeout for instance api requests in milliseconds
    #[arg(long = "request-timeout", env = "REQUEST_TIMEOUT", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Render preview cards with a headless browser
    #[arg(
        long,
        env = "OG_IMAGE_ENABLED",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub og_image_enabled: bool,

    /// Chromium executable used for card rendering
    #[arg(long, env = "CHROMIUM_PATH", default_value = "/usr/bin/chromium-browser")]
    pub chromium_path: PathBuf,

    /// Rate limit window in milliseconds
    #[arg(long = "rate-limit-window", env = "RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    pub rate_limit_window_ms: u64,

    /// Requests allowed per client within one window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 100)]
    pub rate_limit_max: u32,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.cache_max_size > 0, "cache size must be positive");
        ensure!(self.cache_ttl_ms > 0, "cache ttl must be positive");
        ensure!(self.request_timeout_ms > 0, "request timeout must be positive");
        ensure!(self.rate_limit_window_ms > 0, "rate limit window must be positive");
        ensure!(self.rate_limit_max > 0, "rate limit must allow at least one request");

        let base_url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid base url '{}'", self.base_url))?;
        ensure!(
            matches!(base_url.scheme(), "http" | "https"),
            "base url must be http or https"
        );

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base url without a trailing slash.
    pub fn base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn log_summary(&self) {
        log::info!(
            "bind={} base_url={} cache_max_size={} cache_ttl_ms={} request_timeout_ms={} og_image_enabled={}",
            self.bind_addr(),
            self.base_url(),
            self.cache_max_size,
            self.cache_ttl_ms,
            self.request_timeout_ms,
            self.og_image_enabled,
        );
    }
}
