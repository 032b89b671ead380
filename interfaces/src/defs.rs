use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FALLBACK_MARKER_URI: &str = "fallback-marker-post";
pub const FALLBACK_MARKER_CID: &str = "fake";
pub const FALLBACK_MARKER_DID: &str = "did:fake";
pub const FALLBACK_MARKER_HANDLE: &str = "fake.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub did: String,
    #[serde(default)]
    pub handle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: Author,
    #[serde(default)]
    pub record: serde_json::Value,
    pub indexed_at: DateTime<Utc>,
}

/// Minimal view of a post referenced from a reply. Only what the tuner needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: String,
    #[serde(default)]
    pub author: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: PostRef,
    pub parent: PostRef,
}

/// Why an item appears in a feed. Only reposts carry data the engine uses;
/// pins and any reason type added later decode as [`FeedReason::Other`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FeedReason {
    #[serde(rename = "app.bsky.feed.defs#reasonRepost")]
    Repost(RepostReason),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostReason {
    pub by: Author,
    pub indexed_at: DateTime<Utc>,
}

/// Which supplementary generator produced an item, attached by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedOrigin {
    pub generator_uri: String,
    pub display_url: String,
}

/// One entry of a feed, as returned by the upstream and handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: PostView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FeedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "__source")]
    pub origin: Option<FeedOrigin>,
}

impl FeedItem {
    /// Synthetic item telling the renderer the feed switched to its fallback.
    /// Never fetched from or sent to an upstream.
    pub fn fallback_marker() -> Self {
        Self {
            post: PostView {
                uri: FALLBACK_MARKER_URI.to_owned(),
                cid: FALLBACK_MARKER_CID.to_owned(),
                author: Author {
                    did: FALLBACK_MARKER_DID.to_owned(),
                    handle: FALLBACK_MARKER_HANDLE.to_owned(),
                },
                record: serde_json::Value::Object(Default::default()),
                indexed_at: Utc::now(),
            },
            reply: None,
            reason: None,
            origin: None,
        }
    }

    pub fn is_fallback_marker(&self) -> bool {
        self.post.uri == FALLBACK_MARKER_URI && self.post.cid == FALLBACK_MARKER_CID
    }

    pub fn is_repost(&self) -> bool {
        matches!(self.reason, Some(FeedReason::Repost(_)))
    }

    pub fn is_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Languages declared on the post record, if any.
    pub fn langs(&self) -> Vec<&str> {
        self.post
            .record
            .get("langs")
            .and_then(|v| v.as_array())
            .map(|langs| langs.iter().filter_map(|l| l.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default)]
    pub feed: Vec<FeedItem>,
}

impl FeedPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub cursor: Option<String>,
    pub limit: usize,
}

impl FetchRequest {
    pub fn first_page(limit: usize) -> Self {
        Self { cursor: None, limit }
    }

    pub fn next_page(cursor: impl Into<String>, limit: usize) -> Self {
        Self { cursor: Some(cursor.into()), limit }
    }

    /// An absent or empty cursor both mean "start a new pagination session".
    pub fn is_first_page(&self) -> bool {
        self.cursor.as_deref().is_none_or(str::is_empty)
    }
}

// Object style note:
// Everything here is plain data. Behavior over these types (fetching, mixing,
// tuning) lives in the feed-aggregator crate so the renderer only ever depends
// on this crate.
