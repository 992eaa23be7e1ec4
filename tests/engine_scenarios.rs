//! End-to-end scenarios through the engine's public API.

use privacy_origin::collector::{
    AudioNodeKind, ClearScope, FieldDescriptor, FingerprintSignal, FormSignal, InboundMessage,
    RawEvent, RawPayload,
};
use privacy_origin::core::{report::NO_CONCERNS_TIP, Category, TipLevel};
use privacy_origin::{Config, Engine, IngestOutcome};

fn fingerprint(tab: i64, t: i64, signal: FingerprintSignal) -> RawEvent {
    RawEvent::new(tab, t, Some("https://a.com/"), RawPayload::Fingerprint { signal })
}

#[test]
fn test_third_party_scenario() {
    let mut engine = Engine::default();
    for target in ["https://a.com/", "https://b-cdn.com/x.js", "https://b-cdn.com/y.js"] {
        engine.notify_raw_event(RawEvent::network(1, 0, target, Some("https://a.com/")));
    }

    let snapshot = engine.get_snapshot(1, 1);
    let third_party: Vec<&str> = snapshot
        .third_party_requests
        .iter()
        .filter_map(|e| e.domain.as_deref())
        .collect();
    assert_eq!(third_party, vec!["b-cdn.com", "b-cdn.com"]);

    let stats = engine.global_stats();
    assert_eq!(stats.tracker_count(), 1);
    let entry = stats.tracker("b-cdn.com").unwrap();
    assert_eq!(entry.count, 2);
    assert!(entry.sites.contains("a.com"));
    assert_eq!(entry.breadth(), 1);
}

#[test]
fn test_clear_tab_scenario() {
    let mut engine = Engine::default();
    engine.notify_raw_event(RawEvent::network(5, 0, "https://t.net/1", Some("https://a.com/")));
    engine.notify_raw_event(RawEvent::cookie(5, 1, "https://t.net/", "id=1", Some("https://a.com/")));
    engine.notify_raw_event(RawEvent::network(7, 2, "https://t.net/2", Some("https://c.com/")));
    let stats_before = engine.global_stats().clone();

    engine.apply(InboundMessage::ClearRequest {
        scope: ClearScope::Tab(5),
    });

    for category in Category::ALL {
        assert!(engine.event_log().read(category, 5).is_empty());
    }
    assert_eq!(engine.event_log().read(Category::Network, 7).len(), 1);
    assert_eq!(engine.global_stats(), &stats_before);
}

#[test]
fn test_credit_card_field_scenario() {
    let mut engine = Engine::default();
    let raw = RawEvent::new(
        3,
        0,
        Some("https://shop.example/"),
        RawPayload::Form {
            signal: FormSignal::Input {
                form_id: "pay".to_string(),
                field: FieldDescriptor {
                    field_type: Some("tel".to_string()),
                    name: Some("card".to_string()),
                    autocomplete: Some("cc-number".to_string()),
                },
            },
        },
    );
    assert_eq!(engine.notify_raw_event(raw), IngestOutcome::Deferred);
    engine.tick(10_000);

    let snapshot = engine.get_snapshot(3, 10_000);
    assert_eq!(snapshot.forms.len(), 1);
    let value = serde_json::to_value(&snapshot.forms[0]).unwrap();
    assert_eq!(value["detail"]["field_type"], "credit-card");
}

#[test]
fn test_fingerprinting_signals_coalesced() {
    let mut engine = Engine::default();
    let canvas = |t| {
        fingerprint(
            1,
            t,
            FingerprintSignal::CanvasRead {
                canvas_id: "c".to_string(),
                method: privacy_origin::collector::CanvasReadMethod::GetImageData,
                width: 16,
                height: 16,
            },
        )
    };
    for t in 0..10 {
        engine.notify_raw_event(canvas(t));
    }
    for t in 0..60 {
        engine.notify_raw_event(fingerprint(1, 100 + t, FingerprintSignal::FontCheck));
    }
    engine.notify_raw_event(fingerprint(
        1,
        200,
        FingerprintSignal::AudioNode {
            context_id: "ctx".to_string(),
            node: AudioNodeKind::Oscillator,
        },
    ));
    engine.notify_raw_event(fingerprint(
        1,
        201,
        FingerprintSignal::AudioNode {
            context_id: "ctx".to_string(),
            node: AudioNodeKind::DynamicsCompressor,
        },
    ));
    engine.notify_raw_event(fingerprint(1, 300, FingerprintSignal::GpuParameter { param: 37445 }));
    engine.notify_raw_event(fingerprint(1, 301, FingerprintSignal::GpuParameter { param: 37446 }));

    let snapshot = engine.get_snapshot(1, 1_000);
    // 3 canvas reads, 1 font enumeration, 1 audio pattern, 1 GPU query
    assert_eq!(snapshot.counts.fingerprinting, 6);
    assert_eq!(
        snapshot.fingerprint_methods(),
        vec!["canvas.getImageData", "fontEnumeration", "audioContext", "webgl.getParameter"]
    );
    assert_eq!(snapshot.tips[0].level, TipLevel::Danger);

    // A new page load re-arms every per-page policy.
    engine.notify_tab_navigation_start(1, None);
    engine.notify_raw_event(fingerprint(1, 400, FingerprintSignal::GpuParameter { param: 37445 }));
    assert_eq!(engine.get_snapshot(1, 1_000).counts.fingerprinting, 1);
}

#[test]
fn test_quiet_tab_gets_single_affirmation() {
    let engine = Engine::default();
    let snapshot = engine.get_snapshot(9, 0);
    assert_eq!(snapshot.tips.len(), 1);
    assert_eq!(snapshot.tips[0].level, TipLevel::Success);
    assert_eq!(snapshot.tips[0].text, NO_CONCERNS_TIP);
    assert_eq!(snapshot.histogram.map(|h| h.total()), Some(0));
}

#[test]
fn test_histogram_failure_hides_histogram() {
    let mut engine = Engine::default();
    engine.notify_raw_event(RawEvent::network(1, i64::MIN, "https://a.com/", None));

    assert!(engine.get_histogram(1, 0).is_none());
    let snapshot = engine.get_snapshot(1, 0);
    assert!(snapshot.histogram.is_none());
    assert_eq!(snapshot.counts.network, 1);
}

#[test]
fn test_configured_limits_apply() {
    let config = Config {
        log_capacity: 5,
        report_list_limit: 2,
        canvas_report_limit: 1,
        ..Config::default()
    };
    let mut engine = Engine::new(&config).unwrap();

    for i in 0..8 {
        engine.notify_raw_event(RawEvent::network(
            1,
            i,
            &format!("https://t{i}.net/"),
            Some("https://a.com/"),
        ));
    }
    assert_eq!(engine.event_log().len(Category::Network), 5);

    let report = engine.get_global_report();
    assert_eq!(report.total_tracker_domains, 8);
    assert_eq!(report.ranked.len(), 2);
    assert_eq!(engine.transparency().stats().capacity_evictions, 3);
}

#[test]
fn test_inbound_message_wire_format() {
    let line = r#"{"message":"raw_event","tabId":2,"timestampMs":5,"originUrl":"https://a.com/","payload":{"type":"fingerprint","signal":{"signal":"battery_query"}}}"#;
    let message: InboundMessage = serde_json::from_str(line).unwrap();

    let mut engine = Engine::default();
    engine.apply(message);
    let snapshot = engine.get_snapshot(2, 10);
    assert_eq!(snapshot.fingerprint_methods(), vec!["battery"]);

    let clear: InboundMessage =
        serde_json::from_str(r#"{"message":"clear_request","scope":"all"}"#).unwrap();
    engine.apply(clear);
    assert!(engine.event_log().is_empty());
}
