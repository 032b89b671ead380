mod common;

use common::*;
use feed_aggregator::{FeedConfig, FeedContract, FetchRequest, MixingParams, Source, UserInterests, WeightedAggregator};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn mixing<S: AsRef<str>>(sources: &[S]) -> MixingParams {
    MixingParams {
        enabled: true,
        sources: sources.iter().map(|s| s.as_ref().to_string()).collect(),
    }
}

fn aggregator(api: &Arc<ScriptedApi>, mixing: MixingParams) -> WeightedAggregator {
    WeightedAggregator::new(api.clone(), FeedConfig::default(), mixing, UserInterests::default())
}

fn is_sampled_slot(slot: usize) -> bool {
    slot >= 15 && (slot % 4 == 0 || slot % 5 == 0)
}

#[tokio::test]
async fn warmup_then_samples_every_fourth_or_fifth_slot() {
    init_tracing();
    let generators = [generator("a"), generator("b"), generator("c")];
    let mut api = ScriptedApi::new().timeline_page(page(posts("p", 60), Some("c1")));
    for uri in &generators {
        api = api.feed_page(uri, page(posts(uri, 10), Some("g1")));
    }
    let api = Arc::new(api);
    let mut agg = aggregator(&api, mixing(&generators[..]));

    let page = agg.fetch(FetchRequest::first_page(30)).await;
    info!("page: {} items, cursor {:?}", page.feed.len(), page.cursor);

    assert_eq!(page.feed.len(), 30);
    assert_eq!(page.cursor.as_deref(), Some("30"));

    let order = agg.state().sources;
    let mut primary = 0;
    let mut sampled = 0;
    for (slot, item) in page.feed.iter().enumerate() {
        if is_sampled_slot(slot) {
            let origin = item.origin.as_ref().map(|o| o.generator_uri.as_str());
            assert_eq!(origin, Some(order[sampled % order.len()].as_str()), "slot {slot}");
            sampled += 1;
        } else {
            assert!(item.origin.is_none(), "slot {slot} should come from the timeline");
            assert_eq!(item.post.uri, format!("p-{primary}"));
            primary += 1;
        }
    }
    assert_eq!(sampled, 6);
    assert_eq!(agg.state().item_cursor, 30);
    assert_eq!(agg.state().sample_cursor, 6);
}

#[tokio::test]
async fn single_ready_source_is_not_sampled() {
    let only = generator("only");
    let api = Arc::new(
        ScriptedApi::new()
            .timeline_page(page(posts("p", 60), Some("c1")))
            .feed_page(&only, page(posts("g", 10), Some("g1"))),
    );
    let mut agg = aggregator(&api, mixing(&[only.as_str()]));

    let page = agg.fetch(FetchRequest::first_page(30)).await;

    assert_eq!(page.feed.len(), 30);
    assert!(page.feed.iter().all(|i| i.origin.is_none()));
}

#[tokio::test(start_paused = true)]
async fn slow_generator_does_not_hold_up_the_page() {
    init_tracing();
    let fast = generator("fast");
    let slow = generator("slow");
    let api = Arc::new(
        ScriptedApi::new()
            .timeline_page(page(posts("p", 40), Some("c1")))
            .feed_page(&fast, page(posts("fast", 10), Some("f1")))
            .slow_feed_page(&slow, Duration::from_secs(2), page(posts("slow", 10), Some("s1"))),
    );
    let mut agg = aggregator(&api, mixing(&[fast.as_str(), slow.as_str()]));

    let started = tokio::time::Instant::now();
    let page = agg.fetch(FetchRequest::first_page(20)).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(500), "waited {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    assert_eq!(page.feed.len(), 20);
    assert!(page.feed.iter().all(|i| i.origin.is_none()));

    let slow_source = agg
        .sources()
        .iter()
        .find(|s| s.generator_uri() == slow)
        .expect("slow source is configured");
    assert_eq!(slow_source.num_ready(), 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(slow_source.num_ready(), 10, "abandoned fetch still lands in the queue");
    assert_eq!(api.feed_calls_for(&slow), 1);
}

#[tokio::test]
async fn exhausted_timeline_is_filled_from_generators_without_mixing() {
    let a = generator("a");
    let b = generator("b");
    let api = Arc::new(
        ScriptedApi::new()
            .timeline_page(page(posts("p", 5), None))
            .feed_page(&a, page(posts("a", 10), Some("a1")))
            .feed_page(&b, page(posts("b", 10), Some("b1"))),
    );
    let params = MixingParams { enabled: false, ..mixing(&[a.as_str(), b.as_str()]) };
    let mut agg = aggregator(&api, params);

    let page = agg.fetch(FetchRequest::first_page(10)).await;

    assert_eq!(page.feed.len(), 10);
    assert!(page.feed[..5].iter().all(|i| i.origin.is_none()));
    assert!(page.feed[5..].iter().all(|i| i.origin.is_some()));
    assert_eq!(page.cursor.as_deref(), Some("10"));
}

#[tokio::test]
async fn mixing_disabled_leaves_generators_alone() {
    let a = generator("a");
    let b = generator("b");
    let api = Arc::new(
        ScriptedApi::new()
            .timeline_page(page(posts("p", 60), Some("c1")))
            .feed_page(&a, page(posts("a", 10), Some("a1")))
            .feed_page(&b, page(posts("b", 10), Some("b1"))),
    );
    let params = MixingParams { enabled: false, ..mixing(&[a.as_str(), b.as_str()]) };
    let mut agg = aggregator(&api, params);

    let page = agg.fetch(FetchRequest::first_page(30)).await;

    assert_eq!(page.feed.len(), 30);
    assert!(page.feed.iter().all(|i| i.origin.is_none()));
    assert!(api.calls_to(Endpoint::Feed).is_empty());
}

#[tokio::test]
async fn top_ups_rotate_through_sources() {
    let generators: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|n| generator(n)).collect();
    let mut api = ScriptedApi::new().timeline_page(page(posts("p", 60), Some("c1")));
    for uri in &generators {
        api = api.feed_page(uri, page(posts(uri, 10), Some("g1")));
    }
    let api = Arc::new(api);
    let mut agg = aggregator(&api, mixing(&generators[..]));

    agg.fetch(FetchRequest::first_page(10)).await;
    // the first page reshuffles, so read the order it settled on
    let order = agg.state().sources;
    assert_eq!(agg.state().feed_cursor, 3);
    for (i, uri) in order.iter().enumerate() {
        assert_eq!(api.feed_calls_for(uri), usize::from(i < 3), "{uri} after first page");
    }

    agg.fetch(FetchRequest::next_page("10", 10)).await;
    assert_eq!(agg.state().feed_cursor, 0);
    for uri in &order {
        assert_eq!(api.feed_calls_for(uri), 1, "{uri} after second page");
    }

    agg.fetch(FetchRequest::next_page("20", 10)).await;
    assert_eq!(agg.state().feed_cursor, 3);
    assert_eq!(api.calls_to(Endpoint::Feed).len(), 5, "well-stocked sources are not topped up");
    assert_eq!(agg.state().sources, order);
}

#[tokio::test]
async fn first_page_resets_session_state() {
    let generators = [generator("a"), generator("b"), generator("c")];
    let params = mixing(&generators[..]);

    let mut used_api = ScriptedApi::new().timeline_page(page(posts("p", 60), Some("c1")));
    for uri in &generators {
        used_api = used_api.feed_page(uri, page(posts(uri, 10), Some("g1")));
    }
    let used_api = Arc::new(used_api);
    let mut used = aggregator(&used_api, params.clone());
    used.fetch(FetchRequest::first_page(30)).await;
    used.fetch(FetchRequest::next_page("30", 30)).await;
    assert!(used.state().item_cursor > 0);
    assert!(used.primary().num_ready() > 0);
    let session = used.session_id();

    let fresh_api = Arc::new(ScriptedApi::new());
    let mut fresh = aggregator(&fresh_api, params);

    let used_page = used.fetch(FetchRequest::first_page(30)).await;
    let fresh_page = fresh.fetch(FetchRequest::first_page(30)).await;

    assert_ne!(used.session_id(), session);
    assert_eq!(used.primary().num_ready(), 0, "old queue is discarded");
    assert_eq!(used_page, fresh_page);

    let mut used_state = used.state();
    let mut fresh_state = fresh.state();
    used_state.sources.sort();
    fresh_state.sources.sort();
    assert_eq!(used_state, fresh_state);
    assert_eq!((used_state.item_cursor, used_state.sample_cursor), (0, 0));
}

#[tokio::test]
async fn drained_sources_end_pagination() {
    let a = generator("a");
    let api = Arc::new(
        ScriptedApi::new()
            .timeline_page(page(posts("p", 3), None))
            .feed_page(&a, page(Vec::new(), None)),
    );
    let mut agg = aggregator(&api, mixing(&[a.as_str()]));

    let first = agg.fetch(FetchRequest::first_page(30)).await;
    assert_eq!(first.feed.len(), 3);
    assert_eq!(first.cursor.as_deref(), Some("3"));

    let last = agg.fetch(FetchRequest::next_page("3", 30)).await;
    assert!(last.feed.is_empty());
    assert_eq!(last.cursor, None);
}

#[tokio::test]
async fn peek_latest_reads_the_timeline() {
    let api = Arc::new(ScriptedApi::new().timeline_page(page(vec![post("newest")], Some("c1"))));
    let agg = aggregator(&api, MixingParams::default());

    let latest = agg.peek_latest().await.map(|i| i.post.uri);

    assert_eq!(latest.as_deref(), Some("newest"));
    assert_eq!(api.calls_to(Endpoint::Timeline)[0].query.limit, 1);
}
