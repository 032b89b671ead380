use crate::sources::queue::{FetchOutcome, SourceQueue};
use crate::traits::{FeedApi, FeedContract, PageQuery, RequestHeaders, Source, ACCEPT_LANGUAGE};
use crate::tuner::FeedTuner;
use crate::types::{FeedConfig, FeedItem, FeedPage, FetchRequest};
use crate::utils::headers;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// The chronological "following" timeline.
///
/// Fetched batches go through the tuner before they are enqueued, so the
/// mixing work is already done by the time the aggregator samples them.
pub struct PrimarySource {
    api: Arc<dyn FeedApi>,
    headers: RequestHeaders,
    queue: SourceQueue,
    tuner: Arc<Mutex<FeedTuner>>,
}

impl PrimarySource {
    pub const LABEL: &'static str = "following";

    pub fn new(api: Arc<dyn FeedApi>, config: &FeedConfig) -> Self {
        Self::with_tuner(api, config, FeedTuner::following())
    }

    pub fn with_tuner(api: Arc<dyn FeedApi>, config: &FeedConfig, tuner: FeedTuner) -> Self {
        let mut request_headers = RequestHeaders::new();
        request_headers.insert(ACCEPT_LANGUAGE, headers::content_languages(&config.content_languages));
        Self {
            api,
            headers: request_headers,
            queue: SourceQueue::new(Self::LABEL),
            tuner: Arc::new(Mutex::new(tuner)),
        }
    }

    pub fn cursor(&self) -> Option<String> {
        self.queue.cursor()
    }

    pub fn request_headers(&self) -> &RequestHeaders {
        &self.headers
    }
}

#[async_trait]
impl Source for PrimarySource {
    fn label(&self) -> &str {
        self.queue.label()
    }

    fn num_ready(&self) -> usize {
        self.queue.num_ready()
    }

    fn has_more(&self) -> bool {
        self.queue.has_more()
    }

    fn take(&self, n: usize) -> Vec<FeedItem> {
        self.queue.take(n)
    }

    async fn fetch_next(&self, n: usize) {
        let api = Arc::clone(&self.api);
        let headers = self.headers.clone();
        let tuner = Arc::clone(&self.tuner);
        self.queue
            .fetch_with(n, move |cursor, n| async move {
                match api.get_timeline(&PageQuery::new(cursor, n), &headers).await {
                    Ok(page) if page.feed.is_empty() => FetchOutcome::Fetched(page),
                    Ok(page) => {
                        let feed = tuner.lock().unwrap_or_else(PoisonError::into_inner).tune(page.feed);
                        if feed.is_empty() {
                            FetchOutcome::Filtered { cursor: page.cursor }
                        } else {
                            FetchOutcome::Fetched(FeedPage { cursor: page.cursor, feed })
                        }
                    }
                    Err(e) => {
                        warn!(source = Self::LABEL, "Timeline fetch failed: {}", e);
                        FetchOutcome::Exhausted
                    }
                }
            })
            .await
    }
}

/// Bare following feed: one upstream page per call, no queueing or tuning.
#[async_trait]
impl FeedContract for PrimarySource {
    async fn peek_latest(&self) -> Option<FeedItem> {
        match self.api.get_timeline(&PageQuery::new(None, 1), &self.headers).await {
            Ok(page) => page.feed.into_iter().next(),
            Err(e) => {
                warn!(source = Self::LABEL, "Peek failed: {}", e);
                None
            }
        }
    }

    async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        let cursor = request.cursor.filter(|c| !c.is_empty());
        match self.api.get_timeline(&PageQuery::new(cursor, request.limit), &self.headers).await {
            Ok(page) => page,
            Err(e) => {
                warn!(source = Self::LABEL, "Timeline page failed: {}", e);
                FeedPage::empty()
            }
        }
    }
}
