use anyhow::Context;
use clap::{Parser, ValueEnum};
use feed_aggregator::{
    DebugOverrides, FeedConfig, FeedContract, FetchConfig, FetchRequest, HttpFeedApi, MixingParams,
    TwoSourceAggregator, UserInterests, WeightedAggregator,
};
use std::sync::Arc;
use tracing::info;

const WHATS_HOT: &str = "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Following timeline with generator content sampled in
    Weighted,
    /// Following timeline, then a fallback generator once it runs dry
    Fallback,
}

#[derive(Parser)]
#[command(name = "feed-aggregator", about = "Page through an aggregated home feed")]
struct Cli {
    #[arg(long, value_enum, default_value = "weighted")]
    mode: Mode,

    /// Supplementary generator URI (repeatable)
    #[arg(long = "feed")]
    feeds: Vec<String>,

    /// Generator used once the following timeline is exhausted
    #[arg(long, default_value = WHATS_HOT)]
    fallback_feed: String,

    /// Disable sampling generator content into the timeline
    #[arg(long)]
    no_mixing: bool,

    #[arg(long, default_value_t = 30)]
    limit: usize,

    #[arg(long, default_value_t = 3)]
    pages: usize,

    /// Interest tag sent to first-party generators (repeatable)
    #[arg(long = "interest")]
    interests: Vec<String>,

    /// Launch URL; its `debug_topics` parameter overrides interests
    #[arg(long)]
    launch_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = FeedConfig::from_env();
    if let Some(launch_url) = &cli.launch_url {
        config = config.with_debug(DebugOverrides::parse(launch_url));
    }
    let fetch_config = FetchConfig::from_env();
    info!(
        "Starting feed aggregator against {} (session: {})",
        fetch_config.service_url,
        if fetch_config.access_token.is_some() { "authenticated" } else { "anonymous" }
    );

    let api = Arc::new(HttpFeedApi::new(fetch_config).context("failed to build HTTP client")?);
    let interests = UserInterests::new(cli.interests.clone());

    let mut feed: Box<dyn FeedContract> = match cli.mode {
        Mode::Weighted => {
            let mixing = MixingParams { enabled: !cli.no_mixing, sources: cli.feeds.clone() };
            Box::new(WeightedAggregator::new(api, config, mixing, interests))
        }
        Mode::Fallback => Box::new(TwoSourceAggregator::new(api, config, cli.fallback_feed.clone(), interests)),
    };

    let mut request = FetchRequest::first_page(cli.limit);
    for page_number in 1..=cli.pages {
        let page = feed.fetch(request.clone()).await;
        info!("Page {}: {} items, cursor {:?}", page_number, page.feed.len(), page.cursor);
        println!("{}", serde_json::to_string_pretty(&page)?);

        match page.cursor {
            Some(cursor) => request = FetchRequest::next_page(cursor, cli.limit),
            None => break,
        }
    }

    Ok(())
}
