use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Most recent alerts kept client-side; the oldest entry is evicted beyond
/// this.
pub const ALERT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Delay,
    PlatformChange,
    Arrival,
    RouteDeviation,
}

impl AlertKind {
    /// Human-readable label used when the history is rendered.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Delay => "Delay Notification",
            AlertKind::PlatformChange => "Platform Change",
            AlertKind::Arrival => "Arrival Notification",
            AlertKind::RouteDeviation => "Route Deviation",
        }
    }

    /// Kinds applied when a subscriber picks none explicitly.
    pub fn default_set() -> BTreeSet<AlertKind> {
        [AlertKind::Delay, AlertKind::PlatformChange, AlertKind::Arrival]
            .into_iter()
            .collect()
    }
}

/// Server-owned subscription; the client keeps a cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    pub id: String,
    pub pnr: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub alert_types: BTreeSet<AlertKind>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a subscription server-side.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    pub pnr: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub alert_types: BTreeSet<AlertKind>,
}

/// One entry in the local alert history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub kind: AlertKind,
    pub pnr: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl AlertRecord {
    pub fn new(kind: AlertKind, pnr: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            pnr: pnr.into(),
            message: message.into(),
            created_at: Utc::now(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_covers_the_three_basic_kinds() {
        let kinds = AlertKind::default_set();
        assert_eq!(kinds.len(), 3);
        assert!(kinds.contains(&AlertKind::Delay));
        assert!(kinds.contains(&AlertKind::PlatformChange));
        assert!(kinds.contains(&AlertKind::Arrival));
        assert!(!kinds.contains(&AlertKind::RouteDeviation));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&AlertKind::PlatformChange).expect("serialize");
        assert_eq!(json, "\"platform_change\"");
        let back: AlertKind = serde_json::from_str("\"route_deviation\"").expect("deserialize");
        assert_eq!(back, AlertKind::RouteDeviation);
    }

    #[test]
    fn test_new_records_start_unread() {
        let record = AlertRecord::new(AlertKind::Delay, "9001", "Train delayed by 20 minutes");
        assert!(!record.read);
        assert_eq!(record.kind.label(), "Delay Notification");
    }
}
