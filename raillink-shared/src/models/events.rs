/// Position report for a running train, scoped by train id.
///
/// `progress` is the percentage of the journey completed (0-100). Station
/// and delay fields are optional; consumers keep their previous values when
/// an update omits them.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TrainPositionEvent {
    pub train_id: i64,
    pub progress: f64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub current_station: Option<String>,
    #[serde(default)]
    pub next_station: Option<String>,
    #[serde(default)]
    pub delay_minutes: Option<i64>,
}

/// Platform-level position of a single coach at a station.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CoachPositionEvent {
    pub train_id: i64,
    pub coach_number: String,
    #[serde(default)]
    pub platform_number: Option<i32>,
    #[serde(default)]
    pub position_on_platform: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
}

/// Announcement that a train has left its scheduled route or timetable.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct RouteDeviationEvent {
    pub train_id: i64,
    pub message: String,
    pub created_at: i64,
}

/// A single message from the live push channel.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    TrainPosition(TrainPositionEvent),
    CoachPosition(CoachPositionEvent),
    RouteDeviation(RouteDeviationEvent),
}

impl LiveEvent {
    /// Train the event refers to, for per-train filtering.
    pub fn train_id(&self) -> i64 {
        match self {
            LiveEvent::TrainPosition(event) => event.train_id,
            LiveEvent::CoachPosition(event) => event.train_id,
            LiveEvent::RouteDeviation(event) => event.train_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_event_deserialization() {
        let json = r#"
            {
                "train_id": 12301,
                "progress": 42.5,
                "status": "On time",
                "current_station": "Kanpur Central",
                "next_station": "Allahabad Jn",
                "delay_minutes": 0
            }
        "#;
        let event: TrainPositionEvent = serde_json::from_str(json).expect("Failed to deserialize");
        assert_eq!(event.train_id, 12301);
        assert_eq!(event.progress, 42.5);
        assert_eq!(event.next_station.as_deref(), Some("Allahabad Jn"));
    }

    #[test]
    fn test_position_event_with_missing_optionals() {
        let json = r#"{ "train_id": 12301, "progress": 10.0, "status": null,
                        "current_station": null, "next_station": null, "delay_minutes": null }"#;
        let event: TrainPositionEvent = serde_json::from_str(json).expect("Failed to deserialize");
        assert!(event.current_station.is_none());
        assert!(event.delay_minutes.is_none());
    }
}
