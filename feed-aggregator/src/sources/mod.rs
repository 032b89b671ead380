pub mod primary;
pub mod queue;
pub mod supplementary;

pub use primary::PrimarySource;
pub use queue::{FetchOutcome, SourceQueue};
pub use supplementary::SupplementarySource;
