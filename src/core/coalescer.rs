//! Per-page coalescing of form and fingerprinting signals.
//!
//! Each signal is mapped to one suppression [`Policy`]:
//!
//! | Signal                  | Policy            | Key                    |
//! |-------------------------|-------------------|------------------------|
//! | form input              | trailing debounce | (tab, form)            |
//! | canvas read             | first-N count     | (tab, canvas element)  |
//! | font check              | once-above count  | tab                    |
//! | GPU vendor/renderer     | one-shot latch    | tab                    |
//! | oscillator + compressor | one-shot latch    | tab                    |
//! | form submit, battery    | pass-through      |                        |
//!
//! All per-page state for a tab is dropped when the tab navigates or closes.
//! Per-element state is bounded by [`MAX_TRACKED_ELEMENTS`]; signals from
//! elements past the bound are suppressed.

use crate::collector::types::{
    AudioNodeKind, FingerprintSignal, FormSignal, RawEvent, RawPayload, TabId, GPU_RENDERER_PARAM,
    GPU_VENDOR_PARAM,
};
use crate::core::debounce::{CountThreshold, OneShotLatch, Policy, ThresholdMode, TrailingDebounce};
use crate::core::event::{ClassifiedEvent, EventDetail};
use std::collections::HashMap;

/// Canvas elements and audio contexts tracked at once, across all tabs.
pub const MAX_TRACKED_ELEMENTS: usize = 4096;

/// Tunables for the coalescing policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescingConfig {
    pub form_input_debounce_ms: i64,
    pub canvas_report_limit: u32,
    pub font_check_threshold: u32,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            form_input_debounce_ms: 2000,
            canvas_report_limit: 3,
            font_check_threshold: 50,
        }
    }
}

/// Outcome of offering one classified event to the coalescer.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Log this event now
    Pass(ClassifiedEvent),
    /// Held back by a debounce timer; `flushed` is an earlier event for the
    /// same key whose timer had already run out
    Deferred { flushed: Option<ClassifiedEvent> },
    /// Dropped as a duplicate low-information signal
    Suppressed,
}

/// Select the suppression policy for a raw event.
pub fn policy_for(payload: &RawPayload) -> Policy {
    match payload {
        RawPayload::Form {
            signal: FormSignal::Input { .. },
        } => Policy::TrailingDebounce,
        RawPayload::Fingerprint { signal } => match signal {
            FingerprintSignal::CanvasRead { .. } | FingerprintSignal::FontCheck => {
                Policy::CountThreshold
            }
            FingerprintSignal::GpuParameter { .. } | FingerprintSignal::AudioNode { .. } => {
                Policy::OneShotLatch
            }
            FingerprintSignal::BatteryQuery => Policy::PassThrough,
        },
        _ => Policy::PassThrough,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct AudioGraph {
    oscillator: bool,
    compressor: bool,
}

/// Applies the per-signal policies for every open page.
#[derive(Debug)]
pub struct Coalescer {
    form_input: TrailingDebounce<(TabId, String), ClassifiedEvent>,
    canvas_reads: CountThreshold<(TabId, String)>,
    font_checks: CountThreshold<TabId>,
    gpu_queries: OneShotLatch<TabId>,
    audio_pattern: OneShotLatch<TabId>,
    audio_graphs: HashMap<(TabId, String), AudioGraph>,
}

impl Coalescer {
    pub fn new(config: CoalescingConfig) -> Self {
        Self {
            form_input: TrailingDebounce::new(config.form_input_debounce_ms),
            canvas_reads: CountThreshold::new(ThresholdMode::FirstN(config.canvas_report_limit)),
            font_checks: CountThreshold::new(ThresholdMode::OnceAbove(config.font_check_threshold)),
            gpu_queries: OneShotLatch::new(),
            audio_pattern: OneShotLatch::new(),
            audio_graphs: HashMap::new(),
        }
    }

    /// Offer a classified event; `raw` is the event it was classified from.
    ///
    /// Debounce timers are scheduled from `now_ms`, the clock `poll` is
    /// driven by. The event's own timestamp is carried as data only.
    pub fn admit(&mut self, raw: &RawEvent, classified: ClassifiedEvent, now_ms: i64) -> Admission {
        let tab = raw.tab_id;

        match (&raw.payload, policy_for(&raw.payload)) {
            (_, Policy::PassThrough) => Admission::Pass(classified),
            (
                RawPayload::Form {
                    signal: FormSignal::Input { form_id, .. },
                },
                Policy::TrailingDebounce,
            ) => {
                let flushed = self
                    .form_input
                    .report((tab, form_id.clone()), classified, now_ms);
                Admission::Deferred { flushed }
            }
            (RawPayload::Fingerprint { signal }, _) => self.admit_fingerprint(tab, signal, classified),
            _ => Admission::Pass(classified),
        }
    }

    fn admit_fingerprint(
        &mut self,
        tab: TabId,
        signal: &FingerprintSignal,
        mut classified: ClassifiedEvent,
    ) -> Admission {
        let report = match signal {
            FingerprintSignal::CanvasRead {
                canvas_id,
                width,
                height,
                ..
            } => {
                let key = (tab, canvas_id.clone());
                if self.canvas_reads.count(&key) == 0
                    && self.canvas_reads.len() >= MAX_TRACKED_ELEMENTS
                {
                    tracing::debug!("Canvas tracking full, ignoring element on tab {}", tab);
                    return Admission::Suppressed;
                }
                *width > 0 && *height > 0 && self.canvas_reads.observe(key).is_some()
            }
            FingerprintSignal::FontCheck => match self.font_checks.observe(tab) {
                Some(count) => {
                    if let EventDetail::Fingerprint { detail, .. } = &mut classified.detail {
                        *detail = Some(format!("Checked {count}+ fonts"));
                    }
                    true
                }
                None => false,
            },
            FingerprintSignal::GpuParameter { param } => {
                (*param == GPU_VENDOR_PARAM || *param == GPU_RENDERER_PARAM)
                    && self.gpu_queries.trip(tab)
            }
            FingerprintSignal::AudioNode { context_id, node } => {
                let key = (tab, context_id.clone());
                if !self.audio_graphs.contains_key(&key)
                    && self.audio_graphs.len() >= MAX_TRACKED_ELEMENTS
                {
                    tracing::debug!("Audio tracking full, ignoring context on tab {}", tab);
                    return Admission::Suppressed;
                }
                let graph = self.audio_graphs.entry(key).or_default();
                match node {
                    AudioNodeKind::Oscillator => graph.oscillator = true,
                    AudioNodeKind::DynamicsCompressor => graph.compressor = true,
                    AudioNodeKind::Other => {}
                }
                graph.oscillator && graph.compressor && self.audio_pattern.trip(tab)
            }
            FingerprintSignal::BatteryQuery => true,
        };

        if report {
            Admission::Pass(classified)
        } else {
            Admission::Suppressed
        }
    }

    /// Events whose debounce timers have fired by `now_ms`.
    pub fn poll(&mut self, now_ms: i64) -> Vec<ClassifiedEvent> {
        self.form_input
            .poll(now_ms)
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    /// Earliest moment `poll` can return something.
    pub fn next_deadline(&self) -> Option<i64> {
        self.form_input.next_deadline()
    }

    /// Forget all per-page state of `tab` and cancel its pending timers.
    pub fn reset_tab(&mut self, tab: TabId) -> usize {
        let cancelled = self.form_input.cancel_where(|(t, _)| *t == tab);
        self.canvas_reads.reset_where(|(t, _)| *t == tab);
        self.font_checks.reset_where(|t| *t == tab);
        self.gpu_queries.reset_where(|t| *t == tab);
        self.audio_pattern.reset_where(|t| *t == tab);
        self.audio_graphs.retain(|(t, _), _| *t != tab);
        cancelled
    }

    pub fn pending_len(&self) -> usize {
        self.form_input.pending_len()
    }

    /// Canvas elements and audio contexts currently tracked.
    pub fn tracked_elements(&self) -> usize {
        self.canvas_reads.len() + self.audio_graphs.len()
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new(CoalescingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{CanvasReadMethod, FieldDescriptor};
    use crate::core::classifier::classify;

    fn offer(coalescer: &mut Coalescer, raw: RawEvent) -> Admission {
        let classified = classify(&raw);
        coalescer.admit(&raw, classified, raw.timestamp_ms)
    }

    fn fingerprint(tab: TabId, t: i64, signal: FingerprintSignal) -> RawEvent {
        RawEvent::new(tab, t, Some("https://a.com"), RawPayload::Fingerprint { signal })
    }

    fn input(tab: TabId, t: i64, form: &str, name: &str) -> RawEvent {
        RawEvent::new(
            tab,
            t,
            Some("https://a.com/login"),
            RawPayload::Form {
                signal: FormSignal::Input {
                    form_id: form.to_string(),
                    field: FieldDescriptor {
                        field_type: Some("text".to_string()),
                        name: Some(name.to_string()),
                        autocomplete: None,
                    },
                },
            },
        )
    }

    fn canvas(id: &str, width: u32) -> FingerprintSignal {
        FingerprintSignal::CanvasRead {
            canvas_id: id.to_string(),
            method: CanvasReadMethod::ToDataUrl,
            width,
            height: 16,
        }
    }

    #[test]
    fn test_policy_selection() {
        assert_eq!(
            policy_for(&RawPayload::Fingerprint {
                signal: FingerprintSignal::FontCheck
            }),
            Policy::CountThreshold
        );
        assert_eq!(
            policy_for(&RawPayload::Geolocation {
                method: "watchPosition".to_string()
            }),
            Policy::PassThrough
        );
    }

    #[test]
    fn test_canvas_reads_capped_per_element() {
        let mut c = Coalescer::default();
        let passed = (0..5)
            .filter(|_| matches!(offer(&mut c, fingerprint(1, 0, canvas("a", 64))), Admission::Pass(_)))
            .count();
        assert_eq!(passed, 3);

        // A different element has its own count.
        assert!(matches!(offer(&mut c, fingerprint(1, 0, canvas("b", 64))), Admission::Pass(_)));
        // Empty canvases are not fingerprinting.
        assert_eq!(offer(&mut c, fingerprint(1, 0, canvas("c", 0))), Admission::Suppressed);
    }

    #[test]
    fn test_font_checks_report_once_after_threshold() {
        let mut c = Coalescer::default();
        let reports: Vec<ClassifiedEvent> = (0..120)
            .filter_map(|_| match offer(&mut c, fingerprint(1, 0, FingerprintSignal::FontCheck)) {
                Admission::Pass(e) => Some(e),
                _ => None,
            })
            .collect();

        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].detail,
            EventDetail::Fingerprint {
                method: "fontEnumeration".to_string(),
                detail: Some("Checked 51+ fonts".to_string()),
            }
        );
    }

    #[test]
    fn test_gpu_latch_only_for_identifying_params() {
        let mut c = Coalescer::default();
        let other = FingerprintSignal::GpuParameter { param: 3379 };
        let vendor = FingerprintSignal::GpuParameter { param: GPU_VENDOR_PARAM };
        let renderer = FingerprintSignal::GpuParameter { param: GPU_RENDERER_PARAM };

        assert_eq!(offer(&mut c, fingerprint(1, 0, other)), Admission::Suppressed);
        assert!(matches!(offer(&mut c, fingerprint(1, 0, vendor)), Admission::Pass(_)));
        assert_eq!(offer(&mut c, fingerprint(1, 0, renderer)), Admission::Suppressed);
    }

    #[test]
    fn test_audio_pattern_needs_both_nodes_on_same_context() {
        let mut c = Coalescer::default();
        let node = |ctx: &str, node| FingerprintSignal::AudioNode {
            context_id: ctx.to_string(),
            node,
        };

        assert_eq!(
            offer(&mut c, fingerprint(1, 0, node("x", AudioNodeKind::Oscillator))),
            Admission::Suppressed
        );
        assert_eq!(
            offer(&mut c, fingerprint(1, 0, node("y", AudioNodeKind::DynamicsCompressor))),
            Admission::Suppressed
        );
        assert!(matches!(
            offer(&mut c, fingerprint(1, 0, node("x", AudioNodeKind::DynamicsCompressor))),
            Admission::Pass(_)
        ));
        assert_eq!(
            offer(&mut c, fingerprint(1, 0, node("y", AudioNodeKind::Oscillator))),
            Admission::Suppressed
        );
    }

    #[test]
    fn test_form_input_debounced_per_form() {
        let mut c = Coalescer::default();
        for (t, name) in [(0, "user"), (500, "email"), (1000, "password")] {
            assert_eq!(
                offer(&mut c, input(1, t, "login", name)),
                Admission::Deferred { flushed: None }
            );
        }
        offer(&mut c, input(1, 1200, "search", "q"));

        assert!(c.poll(2999).is_empty());
        let fired = c.poll(3000);
        assert_eq!(fired.len(), 1);
        assert_eq!(
            fired[0].detail,
            EventDetail::Form {
                action: crate::core::event::FormAction::Input,
                field_type: Some("password".to_string()),
                field_count: None,
            }
        );
        assert_eq!(c.poll(3200).len(), 1);
    }

    #[test]
    fn test_debounce_scheduled_on_admission_clock() {
        let mut c = Coalescer::default();
        // Producer timestamps lag the agent clock by far more than the window.
        for (t, name) in [(1_000, "user"), (1_500, "email")] {
            let raw = input(1, t, "login", name);
            let classified = classify(&raw);
            assert_eq!(
                c.admit(&raw, classified, 100_000),
                Admission::Deferred { flushed: None }
            );
        }

        assert!(c.poll(100_100).is_empty());
        let fired = c.poll(102_000);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].timestamp_ms, 1_500);
    }

    #[test]
    fn test_element_tracking_is_bounded() {
        let mut c = Coalescer::default();
        for i in 0..MAX_TRACKED_ELEMENTS {
            offer(&mut c, fingerprint(1, 0, canvas(&format!("c{i}"), 64)));
        }
        assert_eq!(c.tracked_elements(), MAX_TRACKED_ELEMENTS);

        assert_eq!(offer(&mut c, fingerprint(1, 0, canvas("extra", 64))), Admission::Suppressed);
        assert_eq!(c.tracked_elements(), MAX_TRACKED_ELEMENTS);
        // Known elements keep their own count.
        assert!(matches!(offer(&mut c, fingerprint(1, 0, canvas("c0", 64))), Admission::Pass(_)));

        c.reset_tab(1);
        assert_eq!(c.tracked_elements(), 0);
    }

    #[test]
    fn test_navigation_resets_page_state() {
        let mut c = Coalescer::default();
        let vendor = FingerprintSignal::GpuParameter { param: GPU_VENDOR_PARAM };
        offer(&mut c, fingerprint(1, 0, vendor.clone()));
        offer(&mut c, fingerprint(2, 0, vendor.clone()));
        offer(&mut c, input(1, 0, "login", "user"));

        assert_eq!(c.reset_tab(1), 1);
        assert_eq!(c.pending_len(), 0);
        assert!(matches!(offer(&mut c, fingerprint(1, 10, vendor.clone())), Admission::Pass(_)));
        assert_eq!(offer(&mut c, fingerprint(2, 10, vendor)), Admission::Suppressed);
    }
}
