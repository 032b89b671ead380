pub mod sampling;
pub mod two_source;
pub mod weighted;

pub use two_source::{FeedMode, TwoSourceAggregator};
pub use weighted::{AggregatorState, WeightedAggregator};
