//! Demonstration of the Privacy Origin aggregator.
//!
//! This example shows how to:
//! 1. Start the aggregator with an in-memory store
//! 2. Push synthetic browser events through its sink
//! 3. Read the per-tab snapshot and the global tracker report
//! 4. See what was persisted
//!
//! Run with: cargo run --example replay_demo

use std::sync::Arc;
use std::time::Duration;

use privacy_origin::{
    collector::{
        CanvasReadMethod, FieldDescriptor, FingerprintSignal, FormSignal, InboundMessage,
        RawEvent, RawPayload,
    },
    engine::Engine,
    runtime::{now_ms, AggregatorHandle, RuntimeConfig},
    store::{MemoryStore, PersistQueue, PersistedState},
    OBSERVATION_NOTICE,
};

const NEWS_TAB: i64 = 1;
const SHOP_TAB: i64 = 2;

fn main() {
    println!("Privacy Origin - Replay Demo");
    println!("============================");
    println!();
    println!("{OBSERVATION_NOTICE}");

    let store = Arc::new(MemoryStore::new());
    let persist = match PersistQueue::spawn(store.clone()) {
        Ok(queue) => queue,
        Err(e) => {
            eprintln!("Could not start writer: {e}");
            return;
        }
    };
    let aggregator =
        match AggregatorHandle::spawn(Engine::default(), RuntimeConfig::default(), Some(persist)) {
            Ok(handle) => handle,
            Err(e) => {
                eprintln!("Could not start aggregator: {e}");
                return;
            }
        };
    let sink = aggregator.sink();

    for message in synthetic_session(now_ms()) {
        sink.notify(message);
    }

    // Let the worker drain the queue.
    std::thread::sleep(Duration::from_millis(300));

    for tab in [NEWS_TAB, SHOP_TAB] {
        let snapshot = aggregator.get_snapshot(tab);
        println!(
            "Tab {} ({}): {} requests, {} third-party, {} cookies, {} fingerprinting",
            tab,
            snapshot.current_site.as_deref().unwrap_or("unknown"),
            snapshot.counts.network,
            snapshot.counts.third_party_requests,
            snapshot.counts.cookies,
            snapshot.counts.fingerprinting
        );
        for tip in &snapshot.tips {
            println!("  - {:?}: {}", tip.level, tip.text);
        }
        println!();
    }

    let report = aggregator.get_global_report();
    println!(
        "{} tracker domains, {}% of sites contacted at least one",
        report.total_tracker_domains, report.percent_sites_with_trackers
    );
    for tracker in &report.ranked {
        println!(
            "  {:<28} {} sites, {} contacts",
            tracker.domain, tracker.sites, tracker.count
        );
    }

    aggregator.shutdown();

    let persisted = PersistedState::load(store.as_ref());
    println!();
    println!(
        "Persisted {} network requests and {} tracker domains",
        persisted.network_requests.len(),
        persisted.global_stats.tracker_count()
    );
}

/// Two tabs browsing a news site and a shop.
fn synthetic_session(start: i64) -> Vec<InboundMessage> {
    let news = Some("https://news.example/today");
    let shop = Some("https://shop.example/cart");

    let mut messages = vec![
        InboundMessage::TabNavigationStart {
            tab_id: NEWS_TAB,
            url: news.map(str::to_string),
        },
        InboundMessage::TabNavigationStart {
            tab_id: SHOP_TAB,
            url: shop.map(str::to_string),
        },
    ];

    let news_requests = [
        "https://news.example/styles.css",
        "https://www.google-analytics.com/collect",
        "https://securepubads.g.doubleclick.net/gampad/ads",
        "https://cdn.news-static.net/app.js",
    ];
    for (i, url) in news_requests.iter().enumerate() {
        messages.push(RawEvent::network(NEWS_TAB, start + i as i64, url, news).into());
    }
    messages.push(RawEvent::cookie(NEWS_TAB, start + 10, "https://doubleclick.net/", "IDE=abc", news).into());

    for i in 0..5 {
        messages.push(
            RawEvent::new(
                NEWS_TAB,
                start + 20 + i,
                news,
                RawPayload::Fingerprint {
                    signal: FingerprintSignal::CanvasRead {
                        canvas_id: "fp".to_string(),
                        method: CanvasReadMethod::ToDataUrl,
                        width: 220,
                        height: 30,
                    },
                },
            )
            .into(),
        );
    }

    messages.push(RawEvent::network(SHOP_TAB, start + 30, "https://www.google-analytics.com/collect", shop).into());
    messages.push(
        RawEvent::new(
            SHOP_TAB,
            start + 40,
            shop,
            RawPayload::Form {
                signal: FormSignal::Submit { field_count: 4 },
            },
        )
        .into(),
    );
    messages.push(
        RawEvent::new(
            SHOP_TAB,
            start + 41,
            shop,
            RawPayload::Form {
                signal: FormSignal::Input {
                    form_id: "checkout".to_string(),
                    field: FieldDescriptor {
                        field_type: Some("text".to_string()),
                        name: Some("cc-number".to_string()),
                        autocomplete: Some("cc-number".to_string()),
                    },
                },
            },
        )
        .into(),
    );

    messages
}
