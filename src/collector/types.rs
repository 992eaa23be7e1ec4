//! Inbound event types for the Privacy Origin agent.
//!
//! Raw events are produced by collaborators (extension hooks, test harnesses,
//! replay files). They describe *that* something privacy-sensitive happened,
//! never what the user typed or which cookie values mean.

use serde::{Deserialize, Serialize};

/// Browser tab identifier. Negative ids belong to background requests.
pub type TabId = i64;

/// Semantic kind of a raw event, derived from its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NetworkRequest,
    CookieSet,
    GeoAttempt,
    FingerprintAttempt,
    FormAction,
}

/// A raw event as delivered by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub tab_id: TabId,
    /// Wall-clock milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Initiator for network/cookie events, the page URL otherwise
    #[serde(default)]
    pub origin_url: Option<String>,
    pub payload: RawPayload,
}

impl RawEvent {
    pub fn new(
        tab_id: TabId,
        timestamp_ms: i64,
        origin_url: Option<&str>,
        payload: RawPayload,
    ) -> Self {
        Self {
            tab_id,
            timestamp_ms,
            origin_url: origin_url.map(str::to_string),
            payload,
        }
    }

    /// Network request from `initiator` to `url`.
    pub fn network(tab_id: TabId, timestamp_ms: i64, url: &str, initiator: Option<&str>) -> Self {
        Self::new(
            tab_id,
            timestamp_ms,
            initiator,
            RawPayload::Network {
                url: url.to_string(),
                resource_type: None,
            },
        )
    }

    /// A Set-Cookie header observed on a response to `url`.
    pub fn cookie(
        tab_id: TabId,
        timestamp_ms: i64,
        url: &str,
        cookie: &str,
        initiator: Option<&str>,
    ) -> Self {
        Self::new(
            tab_id,
            timestamp_ms,
            initiator,
            RawPayload::Cookie {
                url: url.to_string(),
                cookie: cookie.to_string(),
            },
        )
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Whether the event can be attributed to a tab.
    pub fn has_tab(&self) -> bool {
        self.tab_id >= 0
    }
}

/// Kind-specific fields of a raw event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawPayload {
    Network {
        url: String,
        #[serde(default)]
        resource_type: Option<String>,
    },
    Cookie {
        url: String,
        cookie: String,
    },
    Geolocation {
        method: String,
    },
    Fingerprint {
        signal: FingerprintSignal,
    },
    Form {
        signal: FormSignal,
    },
}

impl RawPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            RawPayload::Network { .. } => EventKind::NetworkRequest,
            RawPayload::Cookie { .. } => EventKind::CookieSet,
            RawPayload::Geolocation { .. } => EventKind::GeoAttempt,
            RawPayload::Fingerprint { .. } => EventKind::FingerprintAttempt,
            RawPayload::Form { .. } => EventKind::FormAction,
        }
    }
}

/// WebGL parameter id for the unmasked GPU vendor string.
pub const GPU_VENDOR_PARAM: u32 = 37445;
/// WebGL parameter id for the unmasked GPU renderer string.
pub const GPU_RENDERER_PARAM: u32 = 37446;

/// Low-level fingerprinting-API signals, before coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum FingerprintSignal {
    /// `toDataURL` or `getImageData` on a canvas element
    CanvasRead {
        canvas_id: String,
        method: CanvasReadMethod,
        width: u32,
        height: u32,
    },
    /// `getParameter` on a WebGL context
    GpuParameter { param: u32 },
    /// Node creation on an audio context
    AudioNode {
        context_id: String,
        node: AudioNodeKind,
    },
    /// One `document.fonts.check` call
    FontCheck,
    /// `navigator.getBattery`
    BatteryQuery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasReadMethod {
    ToDataUrl,
    GetImageData,
}

impl CanvasReadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasReadMethod::ToDataUrl => "canvas.toDataURL",
            CanvasReadMethod::GetImageData => "canvas.getImageData",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioNodeKind {
    Oscillator,
    DynamicsCompressor,
    Other,
}

/// Form interaction signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FormSignal {
    Submit {
        field_count: u32,
    },
    /// A keystroke-level input event inside `form_id` (or the document)
    Input {
        form_id: String,
        field: FieldDescriptor,
    },
}

/// Declared attributes of an input field. Never its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub autocomplete: Option<String>,
}

/// Which entries a clear request removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    Tab(TabId),
    All,
}

/// Everything a collaborator can push into the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum InboundMessage {
    RawEvent(RawEvent),
    TabNavigationStart {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    /// The tab no longer exists; its per-page state can go.
    TabClosed {
        tab_id: TabId,
    },
    ClearRequest {
        scope: ClearScope,
    },
}

impl From<RawEvent> for InboundMessage {
    fn from(event: RawEvent) -> Self {
        InboundMessage::RawEvent(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_payload() {
        let event = RawEvent::network(1, 0, "https://a.com/x", Some("https://a.com"));
        assert_eq!(event.kind(), EventKind::NetworkRequest);

        let event = RawEvent::cookie(1, 0, "https://a.com", "id=1", None);
        assert_eq!(event.kind(), EventKind::CookieSet);
    }

    #[test]
    fn test_tab_closed_message() {
        let message: InboundMessage =
            serde_json::from_str(r#"{"message": "tab_closed", "tab_id": 9}"#).unwrap();
        assert_eq!(message, InboundMessage::TabClosed { tab_id: 9 });
    }

    #[test]
    fn test_background_requests_have_no_tab() {
        let event = RawEvent::network(-1, 0, "https://a.com", None);
        assert!(!event.has_tab());
    }

    #[test]
    fn test_inbound_message_json_shape() {
        let json = r#"{
            "message": "raw_event",
            "tabId": 4,
            "timestampMs": 1000,
            "originUrl": "https://news.example",
            "payload": {"type": "geolocation", "method": "getCurrentPosition"}
        }"#;
        let message: InboundMessage = serde_json::from_str(json).unwrap();
        match message {
            InboundMessage::RawEvent(event) => {
                assert_eq!(event.tab_id, 4);
                assert_eq!(event.kind(), EventKind::GeoAttempt);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let json = r#"{"message": "clear_request", "scope": {"tab": 5}}"#;
        let message: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message,
            InboundMessage::ClearRequest {
                scope: ClearScope::Tab(5)
            }
        );
    }

    #[test]
    fn test_field_descriptor_uses_type_key() {
        let field: FieldDescriptor =
            serde_json::from_str(r#"{"type": "password", "name": "pw"}"#).unwrap();
        assert_eq!(field.field_type.as_deref(), Some("password"));
        assert!(field.autocomplete.is_none());
    }
}
