use serde::{Deserialize, Serialize};

/// Snapshot returned by the tracking endpoint; seeds the journey monitor
/// before live updates take over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub progress: f64,
    pub status: String,
    #[serde(default)]
    pub current_station: Option<String>,
    #[serde(default)]
    pub next_station: Option<String>,
    #[serde(default)]
    pub delay_minutes: Option<i64>,
}
