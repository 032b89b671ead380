//! Item builders for unit tests.

use crate::types::{Author, FeedItem, FeedReason, PostRef, PostView, ReplyRef, RepostReason};
use chrono::{DateTime, Utc};

pub fn item_by_at(uri: &str, did: &str, indexed_at: DateTime<Utc>) -> FeedItem {
    FeedItem {
        post: PostView {
            uri: uri.to_string(),
            cid: format!("cid-{uri}"),
            author: Author {
                did: did.to_string(),
                handle: format!("{}.test", did.trim_start_matches("did:plc:")),
            },
            record: serde_json::json!({ "text": uri }),
            indexed_at,
        },
        reply: None,
        reason: None,
        origin: None,
    }
}

pub fn item_by(uri: &str, did: &str) -> FeedItem {
    item_by_at(uri, did, Utc::now())
}

pub fn item(uri: &str) -> FeedItem {
    item_by(uri, "did:plc:alice")
}

pub fn reply_to(mut item: FeedItem, parent_did: &str) -> FeedItem {
    let parent = PostRef {
        uri: format!("at://{parent_did}/app.bsky.feed.post/parent"),
        author: Some(Author { did: parent_did.to_string(), handle: String::new() }),
    };
    item.reply = Some(ReplyRef { root: parent.clone(), parent });
    item
}

pub fn repost_of(uri: &str, by: &str) -> FeedItem {
    let mut item = item(uri);
    item.reason = Some(FeedReason::Repost(RepostReason {
        by: Author { did: by.to_string(), handle: String::new() },
        indexed_at: Utc::now(),
    }));
    item
}

pub fn with_langs(mut item: FeedItem, langs: &[&str]) -> FeedItem {
    item.post.record["langs"] = serde_json::json!(langs);
    item
}
