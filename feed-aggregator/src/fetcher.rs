use crate::traits::{FeedApi, PageQuery, RequestHeaders};
use crate::types::{AggregatorError, FeedPage, FetchConfig, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const GET_TIMELINE: &str = "app.bsky.feed.getTimeline";
const GET_FEED: &str = "app.bsky.feed.getFeed";

/// [`FeedApi`] over HTTP.
///
/// Authenticated calls go to the configured service with a bearer token;
/// anonymous calls are built by hand against the public service.
pub struct HttpFeedApi {
    client: Client,
    config: FetchConfig,
}

impl HttpFeedApi {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    fn page_url(base: &str, method: &str, generator: Option<&str>, query: &PageQuery) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/xrpc/{}", base.trim_end_matches('/'), method))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(feed) = generator {
                pairs.append_pair("feed", feed);
            }
            if let Some(cursor) = &query.cursor {
                pairs.append_pair("cursor", cursor);
            }
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(lang) = &query.lang {
                pairs.append_pair("lang", lang);
            }
        }
        Ok(url)
    }

    async fn get_page(&self, url: Url, headers: &RequestHeaders, authenticated: bool) -> Result<FeedPage> {
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 16,
            multiplier: 2.0,
            max_elapsed_time: Some(delay * 64),
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let started = Instant::now();
            match self.send(&url, headers, authenticated).await {
                Ok(page) => {
                    debug!(
                        "Fetched {} items from {} in {}ms",
                        page.feed.len(),
                        url.path(),
                        started.elapsed().as_millis()
                    );
                    return Ok(page);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => match backoff.next_backoff() {
                    Some(delay) => {
                        warn!("Attempt {} failed for {}, retrying in {:?}: {}", attempt + 1, url.path(), delay, e);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, url: &Url, headers: &RequestHeaders, authenticated: bool) -> Result<FeedPage> {
        let mut request = self.client.get(url.clone());
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }
        if authenticated {
            if let Some(token) = &self.config.access_token {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Status {
                status: status.as_u16(),
                url: format!("{}{}", url.host_str().unwrap_or(""), url.path()),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    fn has_session(&self) -> bool {
        self.config.access_token.is_some()
    }

    async fn get_timeline(&self, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        let url = Self::page_url(&self.config.service_url, GET_TIMELINE, None, query)?;
        self.get_page(url, headers, true).await
    }

    async fn get_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        let url = Self::page_url(&self.config.service_url, GET_FEED, Some(generator), query)?;
        self.get_page(url, headers, true).await
    }

    async fn get_public_feed(&self, generator: &str, query: &PageQuery, headers: &RequestHeaders) -> Result<FeedPage> {
        let url = Self::page_url(&self.config.public_service_url, GET_FEED, Some(generator), query)?;
        self.get_page(url, headers, false).await
    }
}
