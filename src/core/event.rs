//! Classified events and the categories they are logged under.

use crate::collector::types::TabId;
use serde::{Deserialize, Serialize};

/// Tracked categories, one bounded log each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Cookie,
    Geolocation,
    Fingerprint,
    Form,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Network,
        Category::Cookie,
        Category::Geolocation,
        Category::Fingerprint,
        Category::Form,
    ];

    /// Key this category is persisted under.
    pub fn store_key(&self) -> &'static str {
        match self {
            Category::Network => "networkRequests",
            Category::Cookie => "cookies",
            Category::Geolocation => "geolocationAttempts",
            Category::Fingerprint => "fingerprintingAttempts",
            Category::Form => "formData",
        }
    }

    pub fn from_store_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.store_key() == key)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Category::Network => 0,
            Category::Cookie => 1,
            Category::Geolocation => 2,
            Category::Fingerprint => 3,
            Category::Form => 4,
        }
    }
}

/// Form actions as they appear in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormAction {
    Submit,
    Input,
}

/// Category-specific fields of a classified event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    Network {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
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
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Form {
        action: FormAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_count: Option<u32>,
    },
}

impl EventDetail {
    pub fn category(&self) -> Category {
        match self {
            EventDetail::Network { .. } => Category::Network,
            EventDetail::Cookie { .. } => Category::Cookie,
            EventDetail::Geolocation { .. } => Category::Geolocation,
            EventDetail::Fingerprint { .. } => Category::Fingerprint,
            EventDetail::Form { .. } => Category::Form,
        }
    }
}

/// A raw event plus derived classification. Never mutated after logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedEvent {
    pub tab_id: TabId,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_url: Option<String>,
    pub detail: EventDetail,
    /// Only ever true for network and cookie events
    #[serde(default)]
    pub is_third_party: bool,
    /// Hostname of the event URL, absent when it did not parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ClassifiedEvent {
    pub fn category(&self) -> Category {
        self.detail.category()
    }

    /// Request or response URL for network and cookie events.
    pub fn target_url(&self) -> Option<&str> {
        match &self.detail {
            EventDetail::Network { url, .. } | EventDetail::Cookie { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Fingerprinting method name, if this is a fingerprint report.
    pub fn fingerprint_method(&self) -> Option<&str> {
        match &self.detail {
            EventDetail::Fingerprint { method, .. } => Some(method),
            _ => None,
        }
    }

    pub fn form_action(&self) -> Option<FormAction> {
        match &self.detail {
            EventDetail::Form { action, .. } => Some(*action),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keys_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_store_key(category.store_key()), Some(category));
        }
        assert_eq!(Category::from_store_key("globalStats"), None);
    }

    #[test]
    fn test_record_shape() {
        let event = ClassifiedEvent {
            tab_id: 3,
            timestamp_ms: 42,
            origin_url: Some("https://a.com".to_string()),
            detail: EventDetail::Cookie {
                url: "https://b.com/p".to_string(),
                cookie: "id=1".to_string(),
            },
            is_third_party: true,
            domain: Some("b.com".to_string()),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["tabId"], 3);
        assert_eq!(value["isThirdParty"], true);
        assert_eq!(value["detail"]["kind"], "cookie");
        assert_eq!(event.target_url(), Some("https://b.com/p"));
    }
}
