pub mod defs;

pub use defs::{Author, FeedItem, FeedReason, FeedOrigin, FeedPage, FetchRequest, PostRef, PostView, ReplyRef, RepostReason};
