use crate::types::FeedItem;
use std::collections::HashSet;
use tracing::debug;

/// One step of the content-tuning pass applied to primary-source batches.
pub trait TuneRule: Send {
    fn rule_name(&self) -> &'static str;

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem>;
}

/// Drops posts already emitted earlier in the session, which mostly catches
/// reposts of something the reader has already seen.
#[derive(Debug, Default)]
pub struct DedupReposts {
    seen: HashSet<String>,
}

impl TuneRule for DedupReposts {
    fn rule_name(&self) -> &'static str {
        "dedup_reposts"
    }

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items
            .into_iter()
            .filter(|item| self.seen.insert(item.post.uri.clone()))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RemoveReposts;

impl TuneRule for RemoveReposts {
    fn rule_name(&self) -> &'static str {
        "remove_reposts"
    }

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items.into_iter().filter(|item| !item.is_repost()).collect()
    }
}

#[derive(Debug, Default)]
pub struct RemoveReplies;

impl TuneRule for RemoveReplies {
    fn rule_name(&self) -> &'static str {
        "remove_replies"
    }

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items.into_iter().filter(|item| !item.is_reply()).collect()
    }
}

/// Keeps a reply only when it answers the viewer or continues the replier's
/// own thread.
#[derive(Debug)]
pub struct FollowedRepliesOnly {
    pub viewer: String,
}

impl TuneRule for FollowedRepliesOnly {
    fn rule_name(&self) -> &'static str {
        "followed_replies_only"
    }

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        items
            .into_iter()
            .filter(|item| match &item.reply {
                None => true,
                Some(reply) => match &reply.parent.author {
                    Some(parent) => parent.did == self.viewer || parent.did == item.post.author.did,
                    None => false,
                },
            })
            .collect()
    }
}

/// Keeps items in one of the preferred languages, plus items that declare no
/// language. A batch that would be emptied entirely is passed through.
#[derive(Debug)]
pub struct PreferredLanguages {
    pub langs: Vec<String>,
}

impl TuneRule for PreferredLanguages {
    fn rule_name(&self) -> &'static str {
        "preferred_languages"
    }

    fn apply(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        if self.langs.is_empty() {
            return items;
        }
        let matches = |item: &FeedItem| {
            let declared = item.langs();
            declared.is_empty()
                || declared
                    .iter()
                    .any(|l| self.langs.iter().any(|pref| lang_matches(pref, l)))
        };
        if items.iter().any(matches) {
            items.into_iter().filter(|item| matches(item)).collect()
        } else {
            items
        }
    }
}

/// `en` matches `en`, `en-US` and `EN`.
fn lang_matches(preferred: &str, declared: &str) -> bool {
    let primary = declared.split('-').next().unwrap_or(declared);
    primary.eq_ignore_ascii_case(preferred) || declared.eq_ignore_ascii_case(preferred)
}

/// Ordered list of rules whose state lives as long as one pagination session.
pub struct FeedTuner {
    rules: Vec<Box<dyn TuneRule>>,
}

impl FeedTuner {
    pub fn new(rules: Vec<Box<dyn TuneRule>>) -> Self {
        Self { rules }
    }

    /// Tuning used for the chronological following feed.
    pub fn following() -> Self {
        Self::new(vec![Box::new(DedupReposts::default())])
    }

    pub fn with_rule(mut self, rule: Box<dyn TuneRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.rule_name()).collect()
    }

    pub fn tune(&mut self, items: Vec<FeedItem>) -> Vec<FeedItem> {
        let before = items.len();
        let tuned = self.rules.iter_mut().fold(items, |items, rule| rule.apply(items));
        if tuned.len() != before {
            debug!("Tuner dropped {} of {} items", before - tuned.len(), before);
        }
        tuned
    }
}

impl Default for FeedTuner {
    fn default() -> Self {
        Self::following()
    }
}
