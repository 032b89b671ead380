/// Feed generator URI helpers
pub mod feeds {
    const GENERATOR_COLLECTION: &str = "app.bsky.feed.generator";

    /// Split `at://<did>/app.bsky.feed.generator/<rkey>` into its parts.
    pub fn parse_generator_uri(uri: &str) -> Option<(&str, &str)> {
        let rest = uri.strip_prefix("at://")?;
        let mut parts = rest.splitn(3, '/');
        let did = parts.next().filter(|s| !s.is_empty())?;
        let collection = parts.next()?;
        let rkey = parts.next().filter(|s| !s.is_empty() && !s.contains('/'))?;
        (collection == GENERATOR_COLLECTION).then_some((did, rkey))
    }

    /// Display URL of a generator, e.g. `/profile/<did>/feed/<rkey>`.
    /// Falls back to the URI itself when it is not a generator URI.
    pub fn generator_href(uri: &str) -> String {
        match parse_generator_uri(uri) {
            Some((did, rkey)) => format!("/profile/{did}/feed/{rkey}"),
            None => uri.to_string(),
        }
    }

    pub fn is_first_party(uri: &str, publishers: &[String]) -> bool {
        parse_generator_uri(uri)
            .map(|(did, _)| publishers.iter().any(|p| p == did))
            .unwrap_or(false)
    }
}

/// Header value builders
pub mod headers {
    /// `Accept-Language` value from the content-language preference.
    pub fn content_languages(langs: &[String]) -> String {
        langs.join(",")
    }

    /// Labelers header asking the service to redact content labelled by each authority.
    pub fn redacting_labelers(labelers: &[String]) -> String {
        labelers
            .iter()
            .map(|did| format!("{did};redact"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Time utilities
pub mod time {
    use chrono::{DateTime, Duration, Utc};

    /// Whether `indexed_at` is strictly newer than `now - max_age`.
    pub fn is_fresh(indexed_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
        indexed_at > now - max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    const WHATS_HOT: &str = "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";

    #[test]
    fn generator_href_from_uri() {
        assert_eq!(
            feeds::generator_href(WHATS_HOT),
            "/profile/did:plc:z72i7hdynmk6r22z27h6tvur/feed/whats-hot"
        );
        assert_eq!(feeds::generator_href("https://example.com/feed"), "https://example.com/feed");
        assert_eq!(
            feeds::generator_href("at://did:plc:x/app.bsky.feed.post/1"),
            "at://did:plc:x/app.bsky.feed.post/1"
        );
    }

    #[test]
    fn first_party_by_publisher_did() {
        let publishers = vec!["did:plc:z72i7hdynmk6r22z27h6tvur".to_string()];
        assert!(feeds::is_first_party(WHATS_HOT, &publishers));
        assert!(!feeds::is_first_party("at://did:plc:other/app.bsky.feed.generator/cats", &publishers));
        assert!(!feeds::is_first_party("garbage", &publishers));
    }

    #[test]
    fn header_values() {
        let langs = vec!["en".to_string(), "de".to_string()];
        assert_eq!(headers::content_languages(&langs), "en,de");

        let labelers = vec!["did:plc:a".to_string(), "did:plc:b".to_string()];
        assert_eq!(headers::redacting_labelers(&labelers), "did:plc:a;redact, did:plc:b;redact");
    }

    #[test]
    fn freshness_cutoff_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let day = Duration::hours(24);
        assert!(time::is_fresh(now - Duration::hours(23), day, now));
        assert!(!time::is_fresh(now - day, day, now));
        assert!(!time::is_fresh(now - Duration::hours(48), day, now));
    }
}
