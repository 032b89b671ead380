use crate::aggregators::sampling::{self, SlotChoice, SlotState};
use crate::sources::{PrimarySource, SupplementarySource};
use crate::traits::{FeedApi, FeedContract, Source};
use crate::tuner::FeedTuner;
use crate::types::{FeedConfig, FeedItem, FeedPage, FetchRequest, MixingParams, UserInterests};
use async_trait::async_trait;
use futures::future::join_all;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Top-up size for the primary source, awaited without a timeout.
pub const PRIMARY_TOP_UP: usize = 60;
/// Top-up size for each supplementary source in the current window.
pub const SUPPLEMENTARY_TOP_UP: usize = 10;
/// Supplementary sources with fewer ready items than this get topped up.
pub const SUPPLEMENTARY_LOW_WATER: usize = 5;
/// Supplementary sources topped up per fetch call.
pub const WINDOW_SIZE: usize = 3;

type TunerFactory = Arc<dyn Fn() -> FeedTuner + Send + Sync>;

/// Snapshot of the mixing cursors, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorState {
    pub item_cursor: usize,
    pub sample_cursor: usize,
    pub feed_cursor: usize,
    /// Generator URIs in their current (shuffled) order.
    pub sources: Vec<String>,
}

/// Mixes the following timeline with a shuffled set of generator feeds.
///
/// The first [`sampling::WARMUP_SLOTS`] items of every session come from the
/// primary source; after that roughly every fourth or fifth slot is handed to
/// a supplementary source when mixing is enabled and at least two of them
/// have items ready.
pub struct WeightedAggregator {
    api: Arc<dyn FeedApi>,
    config: FeedConfig,
    mixing: MixingParams,
    interests: UserInterests,
    make_tuner: TunerFactory,
    session: Uuid,
    primary: PrimarySource,
    sources: Vec<SupplementarySource>,
    item_cursor: usize,
    sample_cursor: usize,
    feed_cursor: usize,
}

impl WeightedAggregator {
    pub fn new(api: Arc<dyn FeedApi>, config: FeedConfig, mixing: MixingParams, interests: UserInterests) -> Self {
        let primary = PrimarySource::new(Arc::clone(&api), &config);
        let mut aggregator = Self {
            api,
            config,
            mixing,
            interests,
            make_tuner: Arc::new(FeedTuner::following),
            session: Uuid::new_v4(),
            primary,
            sources: Vec::new(),
            item_cursor: 0,
            sample_cursor: 0,
            feed_cursor: 0,
        };
        aggregator.reset();
        aggregator
    }

    /// Use a different tuning pass for the primary source, starting with the
    /// next session.
    pub fn with_tuner<F>(mut self, make_tuner: F) -> Self
    where
        F: Fn() -> FeedTuner + Send + Sync + 'static,
    {
        self.make_tuner = Arc::new(make_tuner);
        self.reset();
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn state(&self) -> AggregatorState {
        AggregatorState {
            item_cursor: self.item_cursor,
            sample_cursor: self.sample_cursor,
            feed_cursor: self.feed_cursor,
            sources: self.sources.iter().map(|s| s.generator_uri().to_string()).collect(),
        }
    }

    pub fn primary(&self) -> &PrimarySource {
        &self.primary
    }

    pub fn sources(&self) -> &[SupplementarySource] {
        &self.sources
    }

    /// Throw away every queue and cursor and start a new session.
    fn reset(&mut self) {
        self.session = Uuid::new_v4();
        self.primary = PrimarySource::with_tuner(Arc::clone(&self.api), &self.config, (self.make_tuner)());
        let mut sources: Vec<SupplementarySource> = self
            .mixing
            .sources
            .iter()
            .map(|uri| SupplementarySource::new(Arc::clone(&self.api), &self.config, uri.as_str(), &self.interests))
            .collect();
        sources.shuffle(&mut rand::thread_rng());
        self.sources = sources;
        self.item_cursor = 0;
        self.sample_cursor = 0;
        self.feed_cursor = 0;
        info!(
            session = %self.session,
            sources = self.sources.len(),
            mixing = self.mixing.enabled,
            "Started feed session"
        );
    }

    /// Indices of the next supplementary sources to top up, wrapping to the
    /// start once the end of the list is reached.
    fn next_window(&mut self) -> Vec<usize> {
        let len = self.sources.len();
        if len == 0 {
            return Vec::new();
        }
        let start = self.feed_cursor.min(len);
        let end = (start + WINDOW_SIZE).min(len);
        self.feed_cursor = if end >= len { 0 } else { end };
        (start..end).collect()
    }

    pub async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        if request.is_first_page() {
            self.reset();
        }
        let limit = request.limit;

        if self.primary.num_ready() < limit {
            self.primary.fetch_next(PRIMARY_TOP_UP).await;
        }

        let window = self.next_window();
        let primary_short = !self.primary.has_more() && self.primary.num_ready() < limit;
        if self.mixing.enabled || primary_short {
            let timeout = self.config.fetch_timeout;
            let top_ups = window
                .iter()
                .map(|&i| &self.sources[i])
                .filter(|source| source.num_ready() < SUPPLEMENTARY_LOW_WATER)
                .map(|source| source.fetch_next_within(SUPPLEMENTARY_TOP_UP, timeout));
            join_all(top_ups).await;
        }

        let mut feed = Vec::with_capacity(limit);
        while feed.len() < limit {
            match self.sample_item() {
                Some(item) => feed.push(item),
                None => break,
            }
        }

        debug!(
            session = %self.session,
            returned = feed.len(),
            item_cursor = self.item_cursor,
            primary_ready = self.primary.num_ready(),
            "Assembled page"
        );

        let cursor = if feed.is_empty() && self.is_drained() {
            None
        } else {
            Some(self.item_cursor.to_string())
        };
        FeedPage { cursor, feed }
    }

    /// No source has anything buffered or anything left upstream.
    fn is_drained(&self) -> bool {
        is_done(&self.primary) && self.sources.iter().all(is_done)
    }

    fn sample_item(&mut self) -> Option<FeedItem> {
        let candidates: Vec<usize> = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, source)| source.num_ready() > 0)
            .map(|(i, _)| i)
            .collect();
        let primary_ready = self.primary.num_ready();
        let state = SlotState {
            slot: self.item_cursor,
            mixing_enabled: self.mixing.enabled,
            candidates: candidates.len(),
            primary_has_more: self.primary.has_more() || primary_ready > 0,
            primary_has_ready: primary_ready > 0,
        };

        let item = match sampling::choose(&state) {
            SlotChoice::Supplementary => {
                let source = &self.sources[candidates[self.sample_cursor % candidates.len()]];
                self.sample_cursor += 1;
                source.take(1).pop()
            }
            SlotChoice::Primary => self.primary.take(1).pop(),
            SlotChoice::Stall | SlotChoice::Exhausted => None,
        };
        if item.is_some() {
            self.item_cursor += 1;
        }
        item
    }
}

fn is_done<S: Source>(source: &S) -> bool {
    !source.has_more() && source.num_ready() == 0
}

#[async_trait]
impl FeedContract for WeightedAggregator {
    async fn peek_latest(&self) -> Option<FeedItem> {
        self.primary.peek_latest().await
    }

    async fn fetch(&mut self, request: FetchRequest) -> FeedPage {
        WeightedAggregator::fetch(self, request).await
    }
}
