pub mod aggregators;
pub mod fetcher;
pub mod sources;
pub mod traits;
pub mod tuner;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

pub use aggregators::{AggregatorState, FeedMode, TwoSourceAggregator, WeightedAggregator};
pub use fetcher::HttpFeedApi;
pub use sources::{PrimarySource, SupplementarySource};
pub use traits::{FeedApi, FeedContract, PageQuery, RequestHeaders, Source};
pub use tuner::{FeedTuner, TuneRule};
pub use types::*;
