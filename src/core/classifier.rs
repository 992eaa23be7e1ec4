//! Event classification.
//!
//! Assigns a log category and, for network and cookie events, a
//! first/third-party verdict. Everything here is pure.
//!
//! The third-party rule is textual: a target host is third-party unless it
//! contains the initiator host as a substring. This treats `cdn.a.com` as
//! first-party on `a.com`, but also `evil-a.com`; downstream tracker counts
//! are defined relative to this rule, so it is kept as is.

use crate::collector::types::{
    AudioNodeKind, FieldDescriptor, FingerprintSignal, FormSignal, RawEvent, RawPayload,
};
use crate::core::event::{ClassifiedEvent, EventDetail, FormAction};
use url::Url;

/// Sensitive field categories, checked in order. Each entry lists
/// autocomplete tokens; `name` attributes are matched with dashes removed.
const SENSITIVE_FIELDS: &[(&str, &[&str])] = &[
    ("password", &["password"]),
    ("email", &["email"]),
    ("phone", &["tel", "phone"]),
    ("ssn", &["ssn"]),
    ("credit-card", &["credit-card", "cc-number"]),
    ("cc-exp", &["cc-exp"]),
    ("cc-csc", &["cc-csc"]),
    ("address", &["address"]),
    ("postal-code", &["postal-code"]),
];

/// Extract the lowercase hostname of a URL.
///
/// Returns `None` when the URL does not parse or has no host.
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Third-party verdict for a target host contacted by an initiator host.
pub fn is_third_party_host(target: &str, initiator: &str) -> bool {
    !target.is_empty() && !initiator.is_empty() && !target.contains(initiator)
}

/// Classify a raw event.
pub fn classify(raw: &RawEvent) -> ClassifiedEvent {
    let initiator_host = raw.origin_url.as_deref().and_then(hostname);

    let (detail, domain, is_third_party) = match &raw.payload {
        RawPayload::Network { url, resource_type } => {
            let domain = hostname(url);
            let third_party = third_party(domain.as_deref(), initiator_host.as_deref());
            (
                EventDetail::Network {
                    url: url.clone(),
                    resource_type: resource_type.clone(),
                },
                domain,
                third_party,
            )
        }
        RawPayload::Cookie { url, cookie } => {
            let domain = hostname(url);
            let third_party = third_party(domain.as_deref(), initiator_host.as_deref());
            (
                EventDetail::Cookie {
                    url: url.clone(),
                    cookie: cookie.clone(),
                },
                domain,
                third_party,
            )
        }
        RawPayload::Geolocation { method } => (
            EventDetail::Geolocation {
                method: method.clone(),
            },
            initiator_host,
            false,
        ),
        RawPayload::Fingerprint { signal } => {
            let (method, detail) = describe_fingerprint(signal);
            (
                EventDetail::Fingerprint {
                    method: method.to_string(),
                    detail,
                },
                initiator_host,
                false,
            )
        }
        RawPayload::Form { signal } => {
            let detail = match signal {
                FormSignal::Submit { field_count } => EventDetail::Form {
                    action: FormAction::Submit,
                    field_type: None,
                    field_count: Some(*field_count),
                },
                FormSignal::Input { field, .. } => EventDetail::Form {
                    action: FormAction::Input,
                    field_type: Some(classify_field(field)),
                    field_count: None,
                },
            };
            (detail, initiator_host, false)
        }
    };

    ClassifiedEvent {
        tab_id: raw.tab_id,
        timestamp_ms: raw.timestamp_ms,
        origin_url: raw.origin_url.clone(),
        detail,
        is_third_party,
        domain,
    }
}

fn third_party(target: Option<&str>, initiator: Option<&str>) -> bool {
    match (target, initiator) {
        (Some(target), Some(initiator)) => is_third_party_host(target, initiator),
        _ => false,
    }
}

/// Method name and detail string reported for a fingerprinting signal.
pub fn describe_fingerprint(signal: &FingerprintSignal) -> (&'static str, Option<String>) {
    match signal {
        FingerprintSignal::CanvasRead {
            method,
            width,
            height,
            ..
        } => (method.as_str(), Some(format!("{width}x{height}"))),
        FingerprintSignal::GpuParameter { .. } => {
            ("webgl.getParameter", Some("GPU info requested".to_string()))
        }
        FingerprintSignal::AudioNode { node, .. } => {
            let detail = match node {
                AudioNodeKind::Oscillator | AudioNodeKind::DynamicsCompressor => {
                    "Audio fingerprinting pattern detected"
                }
                AudioNodeKind::Other => "Audio node created",
            };
            ("audioContext", Some(detail.to_string()))
        }
        FingerprintSignal::FontCheck => ("fontEnumeration", None),
        FingerprintSignal::BatteryQuery => {
            ("battery", Some("Battery status requested".to_string()))
        }
    }
}

/// Classify a form field by its declared attributes.
///
/// The first sensitive category whose token appears in the autocomplete
/// attribute (or, without dashes, in the name) wins. Otherwise the declared
/// type is returned, defaulting to `"text"`.
pub fn classify_field(field: &FieldDescriptor) -> String {
    let autocomplete = field
        .autocomplete
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let name = field.name.as_deref().unwrap_or_default().to_lowercase();

    for (category, tokens) in SENSITIVE_FIELDS {
        let matched = tokens.iter().any(|token| {
            autocomplete.contains(token) || name.contains(&token.replace('-', ""))
        });
        if matched {
            return category.to_string();
        }
    }

    match field.field_type.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_lowercase(),
        _ => "text".to_string(),
    }
}
