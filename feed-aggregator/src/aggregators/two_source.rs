use crate::sources::{PrimarySource, SupplementarySource};
use crate::traits::{FeedApi, FeedContract};
use crate::types::{ExecutionMode, FeedConfig, FeedItem, FeedPage, FetchRequest, UserInterests};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Primary,
    /// Terminal for the session: the primary source is no longer queried.
    Fallback,
}

/// Serves the following timeline until it runs dry, then switches for the
/// rest of the session to a fallback generator. The switch is announced with
/// a single [`FeedItem::fallback_marker`] placed after the last primary item.
pub struct TwoSourceAggregator {
    api: Arc<dyn FeedApi>,
    config: FeedConfig,
    fallback_uri: String,
    interests: UserInterests,
    session: Uuid,
    mode: FeedMode,
    primary: PrimarySource,
    fallback: SupplementarySource,
}

impl TwoSourceAggregator {
    pub fn new(api: Arc<dyn FeedApi>, config: FeedConfig, fallback_uri: impl Into<String>, interests: UserInterests) -> Self {
        let fallback_uri = fallback_uri.into();
        let primary = PrimarySource::new(Arc::clone(&api), &config);
        let fallback = SupplementarySource::new(Arc::clone(&api), &config, fallback_uri.as_str(), &interests);
        Self {
            api,
            config,
            fallback_uri,
            interests,
            session: Uuid::new_v4(),
            mode: FeedMode::Primary,
            primary,
            fallback,
        }
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    fn reset(&mut self) {
        self.session = Uuid::new_v4();
        self.mode = FeedMode::Primary;
        self.primary = PrimarySource::new(Arc::clone(&self.api), &self.config);
        self.fallback = SupplementarySource::new(Arc::clone(&self.api), &self.config, self.fallback_uri.as_str(), &self.interests);
        info!(session = %self.session, fallback = %self.fallback_uri, "Started feed session");
    }

    pub async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        let limit = request.limit;
        let mut cursor = request.cursor.clone();
        if request.is_first_page() {
            self.reset();
            cursor = None;
        }

        let mut feed = Vec::new();
        let mut next_cursor = None;

        if self.mode == FeedMode::Primary {
            let page = self.primary.fetch(FetchRequest { cursor: cursor.clone(), limit }).await;
            feed.extend(page.feed);
            next_cursor = page.cursor;
            if next_cursor.is_none() {
                info!(session = %self.session, "Primary feed exhausted; switching to fallback");
                feed.push(FeedItem::fallback_marker());
                self.mode = FeedMode::Fallback;
                cursor = None;
            }
        }

        if self.mode == FeedMode::Fallback {
            if self.config.mode == ExecutionMode::Development {
                debug!(session = %self.session, "Development mode; skipping fallback fetch");
            } else {
                let page = self.fallback.fetch(FetchRequest { cursor, limit }).await;
                feed.extend(page.feed);
                next_cursor = page.cursor;
            }
        }

        FeedPage { cursor: next_cursor, feed }
    }
}

#[async_trait]
impl FeedContract for TwoSourceAggregator {
    async fn peek_latest(&self) -> Option<FeedItem> {
        match self.mode {
            FeedMode::Primary => self.primary.peek_latest().await,
            FeedMode::Fallback => self.fallback.peek_latest().await,
        }
    }

    async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        TwoSourceAggregator::fetch(self, request).await
    }
}
