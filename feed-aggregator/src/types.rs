use std::env;
use std::time::Duration;
use tracing::warn;
use url::Url;
// Use the interfaces crate for the boundary types
pub use interfaces::defs::{Author, FeedItem, FeedReason, FeedOrigin, FeedPage, FetchRequest, PostRef, PostView, ReplyRef, RepostReason};

/// Publisher DID of the first-party feed generators.
pub const FIRST_PARTY_PUBLISHER: &str = "did:plc:z72i7hdynmk6r22z27h6tvur";

/// Query parameter on the launch URL that overrides the personalization header.
pub const DEBUG_TOPICS_PARAM: &str = "debug_topics";

/// HTTP-level settings for talking to the upstream services.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Service used for authenticated calls.
    pub service_url: String,
    /// Public service used when no session is available.
    pub public_service_url: String,
    pub access_token: Option<String>,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            service_url: "https://bsky.social".to_string(),
            public_service_url: "https://public.api.bsky.app".to_string(),
            access_token: None,
            user_agent: "Feed-Aggregator/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

impl FetchConfig {
    /// Defaults overlaid with `FEED_SERVICE_URL`, `FEED_PUBLIC_SERVICE_URL`,
    /// `FEED_ACCESS_TOKEN`, `FEED_USER_AGENT`, `FEED_HTTP_TIMEOUT_SECONDS`,
    /// `FEED_MAX_RETRIES` and `FEED_RETRY_DELAY_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_url: env::var("FEED_SERVICE_URL").unwrap_or(defaults.service_url),
            public_service_url: env::var("FEED_PUBLIC_SERVICE_URL").unwrap_or(defaults.public_service_url),
            access_token: env::var("FEED_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            user_agent: env::var("FEED_USER_AGENT").unwrap_or(defaults.user_agent),
            timeout_seconds: env_parse("FEED_HTTP_TIMEOUT_SECONDS").unwrap_or(defaults.timeout_seconds),
            max_retries: env_parse("FEED_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay_ms: env_parse("FEED_RETRY_DELAY_MS").unwrap_or(defaults.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Production,
    /// Content-engineering mode: the two-source aggregator stops at the
    /// fallback marker instead of fetching fallback content.
    Development,
}

/// Overrides resolved once at process start and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugOverrides {
    pub topics: Option<String>,
}

impl DebugOverrides {
    pub fn from_launch_url(launch_url: &Url) -> Self {
        let topics = launch_url
            .query_pairs()
            .find(|(key, _)| key == DEBUG_TOPICS_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());
        Self { topics }
    }

    pub fn parse(launch_url: &str) -> Self {
        match Url::parse(launch_url) {
            Ok(url) => Self::from_launch_url(&url),
            Err(e) => {
                warn!("Ignoring unparseable launch URL {}: {}", launch_url, e);
                Self::default()
            }
        }
    }
}

/// Engine-level settings shared by every source and aggregator.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub content_languages: Vec<String>,
    /// Moderation-label authorities respected on anonymous calls.
    pub app_labelers: Vec<String>,
    pub first_party_publishers: Vec<String>,
    pub fetch_timeout: Duration,
    pub freshness_cutoff: chrono::Duration,
    pub mode: ExecutionMode,
    pub debug: DebugOverrides,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            content_languages: vec!["en".to_string()],
            app_labelers: vec!["did:plc:ar7c4by46qjdydhdevvrndac".to_string()],
            first_party_publishers: vec![FIRST_PARTY_PUBLISHER.to_string()],
            fetch_timeout: Duration::from_millis(500),
            freshness_cutoff: chrono::Duration::hours(24),
            mode: ExecutionMode::Production,
            debug: DebugOverrides::default(),
        }
    }
}

impl FeedConfig {
    /// Defaults overlaid with `FEED_CONTENT_LANGUAGES` and `FEED_APP_LABELERS`
    /// (comma separated), `FEED_FETCH_TIMEOUT_MS`, `FEED_DEV_MODE` and
    /// `FEED_LAUNCH_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match env::var("FEED_DEV_MODE").as_deref() {
            Ok("1") | Ok("true") => ExecutionMode::Development,
            _ => defaults.mode,
        };
        Self {
            content_languages: env_list("FEED_CONTENT_LANGUAGES").unwrap_or(defaults.content_languages),
            app_labelers: env_list("FEED_APP_LABELERS").unwrap_or(defaults.app_labelers),
            first_party_publishers: defaults.first_party_publishers,
            fetch_timeout: env_parse("FEED_FETCH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            freshness_cutoff: defaults.freshness_cutoff,
            mode,
            debug: env::var("FEED_LAUNCH_URL")
                .map(|url| DebugOverrides::parse(&url))
                .unwrap_or_default(),
        }
    }

    pub fn with_debug(mut self, debug: DebugOverrides) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Caller-controlled mixing parameters for the weighted aggregator.
#[derive(Debug, Clone, Default)]
pub struct MixingParams {
    /// Global switch for sampling supplementary content into the primary stream.
    pub enabled: bool,
    /// Generator URIs of the supplementary sources.
    pub sources: Vec<String>,
}

/// Interest tags aggregated from the caller's preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInterests {
    pub tags: Vec<String>,
}

impl UserInterests {
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    pub fn header_value(&self) -> String {
        self.tags.join(",")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("General error: {0}")]
    General(String),
}

impl AggregatorError {
    /// Rate limiting and server-side failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AggregatorError::Status { status, .. } => *status == 429 || *status >= 500,
            AggregatorError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
