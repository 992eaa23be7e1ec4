//! Static table of well-known tracker domains.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerCategory {
    Analytics,
    Social,
    Advertising,
}

impl TrackerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerCategory::Analytics => "analytics",
            TrackerCategory::Social => "social",
            TrackerCategory::Advertising => "advertising",
        }
    }
}

impl std::fmt::Display for TrackerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KnownTracker {
    pub domain: &'static str,
    pub name: &'static str,
    pub category: TrackerCategory,
}

const fn tracker(domain: &'static str, name: &'static str, category: TrackerCategory) -> KnownTracker {
    KnownTracker {
        domain,
        name,
        category,
    }
}

pub const KNOWN_TRACKERS: &[KnownTracker] = &[
    tracker("google-analytics.com", "Google Analytics", TrackerCategory::Analytics),
    tracker("googletagmanager.com", "Google Tag Manager", TrackerCategory::Analytics),
    tracker("facebook.net", "Facebook Pixel", TrackerCategory::Social),
    tracker("facebook.com", "Facebook", TrackerCategory::Social),
    tracker("doubleclick.net", "Google Ads", TrackerCategory::Advertising),
    tracker("googlesyndication.com", "Google Ads", TrackerCategory::Advertising),
    tracker("amazon-adsystem.com", "Amazon Ads", TrackerCategory::Advertising),
    tracker("criteo.com", "Criteo", TrackerCategory::Advertising),
    tracker("hotjar.com", "Hotjar", TrackerCategory::Analytics),
    tracker("mixpanel.com", "Mixpanel", TrackerCategory::Analytics),
    tracker("clarity.ms", "Microsoft Clarity", TrackerCategory::Analytics),
    tracker("linkedin.com", "LinkedIn Insight", TrackerCategory::Social),
    tracker("twitter.com", "Twitter/X Pixel", TrackerCategory::Social),
    tracker("tiktok.com", "TikTok Pixel", TrackerCategory::Social),
];

/// First table entry whose domain occurs in `hostname`.
pub fn lookup(hostname: &str) -> Option<&'static KnownTracker> {
    let hostname = hostname.to_ascii_lowercase();
    KNOWN_TRACKERS.iter().find(|t| hostname.contains(t.domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_substring() {
        let t = lookup("www.google-analytics.com").unwrap();
        assert_eq!(t.name, "Google Analytics");
        assert_eq!(t.category, TrackerCategory::Analytics);

        assert_eq!(lookup("stats.g.doubleclick.net").unwrap().name, "Google Ads");
        assert!(lookup("example.org").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        // Both facebook.net and facebook.com could match a crafted host.
        let t = lookup("facebook.net.facebook.com").unwrap();
        assert_eq!(t.name, "Facebook Pixel");
    }
}
