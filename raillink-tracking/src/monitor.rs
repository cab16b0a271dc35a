use crate::route::{GeoPoint, RoutePath};
use chrono::{Duration, NaiveTime};
use raillink_core::tracking::TrackingSnapshot;
use raillink_shared::{CoachPositionEvent, TrainPositionEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scheduled halt on the monitored journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationStop {
    pub name: String,
    pub scheduled_arrival: Option<NaiveTime>,
    pub scheduled_departure: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Departed,
    Current,
    Upcoming,
}

#[derive(Debug, Clone)]
pub struct StationState {
    pub name: String,
    pub status: StopStatus,
    pub scheduled_arrival: Option<NaiveTime>,
}

/// Rendered tracking state for one train.
#[derive(Debug, Clone)]
pub struct JourneyView {
    pub train_id: i64,
    pub progress: f64,
    pub status: String,
    pub current_station: Option<String>,
    pub next_station: Option<String>,
    pub delay_minutes: Option<i64>,
    pub coach_positions: Vec<CoachPositionEvent>,
}

/// Tracks one train's journey from the seed snapshot plus live push events.
///
/// Two progress values are kept. The authoritative one only ever moves
/// forward and comes from the server; duplicate or out-of-order events are
/// dropped against it. The displayed one is what renders, advanced a little
/// on every animation tick so the marker keeps moving between updates.
pub struct JourneyMonitor {
    train_id: i64,
    stations: Vec<StationStop>,
    authoritative: f64,
    displayed: f64,
    status: String,
    current_station: Option<String>,
    next_station: Option<String>,
    delay_minutes: Option<i64>,
    coach_positions: BTreeMap<String, CoachPositionEvent>,
    tick_step: f64,
}

impl JourneyMonitor {
    pub fn new(train_id: i64, stations: Vec<StationStop>, tick_step: f64) -> Self {
        Self {
            train_id,
            stations,
            authoritative: 0.0,
            displayed: 0.0,
            status: "Scheduled".to_string(),
            current_station: None,
            next_station: None,
            delay_minutes: None,
            coach_positions: BTreeMap::new(),
            tick_step,
        }
    }

    pub fn train_id(&self) -> i64 {
        self.train_id
    }

    /// Load the authoritative snapshot fetched before the stream attaches.
    pub fn seed(&mut self, snapshot: &TrackingSnapshot) {
        self.authoritative = snapshot.progress.clamp(0.0, 100.0);
        self.displayed = self.authoritative;
        self.status = snapshot.status.clone();
        self.current_station = snapshot.current_station.clone();
        self.next_station = snapshot.next_station.clone();
        self.delay_minutes = snapshot.delay_minutes;
    }

    /// Apply a position event. Returns false when the event was dropped
    /// (wrong train, duplicate, or behind the authoritative progress).
    pub fn apply_position(&mut self, event: &TrainPositionEvent) -> bool {
        if event.train_id != self.train_id {
            return false;
        }
        let progress = event.progress.clamp(0.0, 100.0);
        if progress <= self.authoritative {
            tracing::debug!(
                "Dropping stale position {:.1} for train {} (at {:.1})",
                progress,
                self.train_id,
                self.authoritative
            );
            return false;
        }

        self.authoritative = progress;
        if progress > self.displayed {
            self.displayed = progress;
        }
        if let Some(status) = &event.status {
            self.status = status.clone();
        }
        if event.current_station.is_some() {
            self.current_station = event.current_station.clone();
        }
        if event.next_station.is_some() {
            self.next_station = event.next_station.clone();
        }
        if event.delay_minutes.is_some() {
            self.delay_minutes = event.delay_minutes;
        }
        true
    }

    pub fn apply_coach(&mut self, event: CoachPositionEvent) -> bool {
        if event.train_id != self.train_id {
            return false;
        }
        self.coach_positions.insert(event.coach_number.clone(), event);
        true
    }

    /// Animation tick: nudge the displayed progress forward.
    pub fn tick(&mut self) {
        if self.displayed < 100.0 {
            self.displayed = (self.displayed + self.tick_step).min(100.0);
        }
    }

    pub fn displayed_progress(&self) -> f64 {
        self.displayed
    }

    pub fn authoritative_progress(&self) -> f64 {
        self.authoritative
    }

    /// Per-station status derived from displayed progress over the route,
    /// with the event-carried current station taking precedence when named.
    pub fn station_states(&self) -> Vec<StationState> {
        let count = self.stations.len();
        if count == 0 {
            return Vec::new();
        }
        if count == 1 {
            return vec![StationState {
                name: self.stations[0].name.clone(),
                status: StopStatus::Current,
                scheduled_arrival: self.stations[0].scheduled_arrival,
            }];
        }

        let named_current = self.current_station.as_ref().and_then(|name| {
            self.stations.iter().position(|stop| &stop.name == name)
        });
        let current_index = named_current.unwrap_or_else(|| {
            // Stations sit at evenly spaced fractions of the journey.
            let span = 100.0 / (count as f64 - 1.0);
            ((self.displayed / span).floor() as usize).min(count - 1)
        });

        self.stations
            .iter()
            .enumerate()
            .map(|(index, stop)| StationState {
                name: stop.name.clone(),
                status: match index.cmp(&current_index) {
                    std::cmp::Ordering::Less => StopStatus::Departed,
                    std::cmp::Ordering::Equal => StopStatus::Current,
                    std::cmp::Ordering::Greater => StopStatus::Upcoming,
                },
                scheduled_arrival: stop.scheduled_arrival,
            })
            .collect()
    }

    /// Estimated arrival at the next upcoming stop: its scheduled arrival
    /// shifted by the reported delay.
    pub fn eta(&self) -> Option<NaiveTime> {
        let states = self.station_states();
        let scheduled = states
            .iter()
            .find(|state| state.status == StopStatus::Upcoming)
            .and_then(|state| state.scheduled_arrival)?;
        let delay = Duration::minutes(self.delay_minutes.unwrap_or(0));
        Some(scheduled + delay)
    }

    /// Map marker for the displayed progress: interpolated position plus
    /// heading along the current segment.
    pub fn marker(&self, route: &RoutePath) -> (GeoPoint, f64) {
        let fraction = self.displayed / 100.0;
        (route.position_at(fraction), route.bearing_at(fraction))
    }

    pub fn view(&self) -> JourneyView {
        JourneyView {
            train_id: self.train_id,
            progress: self.displayed,
            status: self.status.clone(),
            current_station: self.current_station.clone(),
            next_station: self.next_station.clone(),
            delay_minutes: self.delay_minutes,
            coach_positions: self.coach_positions.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<StationStop> {
        ["New Delhi", "Kanpur Central", "Mughalsarai", "Howrah"]
            .iter()
            .map(|name| StationStop {
                name: name.to_string(),
                scheduled_arrival: NaiveTime::from_hms_opt(12, 0, 0),
                scheduled_departure: NaiveTime::from_hms_opt(12, 10, 0),
            })
            .collect()
    }

    fn position(train_id: i64, progress: f64) -> TrainPositionEvent {
        TrainPositionEvent {
            train_id,
            progress,
            status: None,
            current_station: None,
            next_station: None,
            delay_minutes: None,
        }
    }

    #[test]
    fn test_stale_and_duplicate_positions_are_dropped() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        assert!(monitor.apply_position(&position(12301, 40.0)));
        assert!(!monitor.apply_position(&position(12301, 40.0)));
        assert!(!monitor.apply_position(&position(12301, 35.0)));
        assert_eq!(monitor.authoritative_progress(), 40.0);
        assert!(monitor.apply_position(&position(12301, 41.0)));
    }

    #[test]
    fn test_other_trains_events_are_ignored() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        assert!(!monitor.apply_position(&position(999, 80.0)));
        assert_eq!(monitor.authoritative_progress(), 0.0);
    }

    #[test]
    fn test_tick_advances_display_and_caps_at_hundred() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        assert!(monitor.apply_position(&position(12301, 99.8)));
        monitor.tick();
        assert_eq!(monitor.displayed_progress(), 100.0);
        monitor.tick();
        assert_eq!(monitor.displayed_progress(), 100.0);
        // Authoritative value is untouched by animation
        assert_eq!(monitor.authoritative_progress(), 99.8);
    }

    #[test]
    fn test_station_states_follow_displayed_progress() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        assert!(monitor.apply_position(&position(12301, 50.0)));

        let states = monitor.station_states();
        assert_eq!(states[0].status, StopStatus::Departed);
        assert_eq!(states[1].status, StopStatus::Current);
        assert_eq!(states[2].status, StopStatus::Upcoming);
        assert_eq!(states[3].status, StopStatus::Upcoming);
    }

    #[test]
    fn test_named_current_station_overrides_derived_one() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        let mut event = position(12301, 10.0);
        event.current_station = Some("Mughalsarai".to_string());
        assert!(monitor.apply_position(&event));

        let states = monitor.station_states();
        assert_eq!(states[2].status, StopStatus::Current);
        assert_eq!(states[1].status, StopStatus::Departed);
    }

    #[test]
    fn test_eta_applies_reported_delay() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        let mut event = position(12301, 50.0);
        event.delay_minutes = Some(25);
        assert!(monitor.apply_position(&event));

        assert_eq!(monitor.eta(), NaiveTime::from_hms_opt(12, 25, 0));
    }

    #[test]
    fn test_seed_loads_snapshot() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        monitor.seed(&TrackingSnapshot {
            progress: 61.0,
            status: "Delayed by 15 min".to_string(),
            current_station: Some("Kanpur Central".to_string()),
            next_station: Some("Mughalsarai".to_string()),
            delay_minutes: Some(15),
        });

        let view = monitor.view();
        assert_eq!(view.progress, 61.0);
        assert_eq!(view.status, "Delayed by 15 min");
        assert_eq!(view.delay_minutes, Some(15));
    }

    #[test]
    fn test_coach_positions_upsert_by_coach() {
        let mut monitor = JourneyMonitor::new(12301, stations(), 0.5);
        let coach = |platform| CoachPositionEvent {
            train_id: 12301,
            coach_number: "B4".to_string(),
            platform_number: Some(platform),
            position_on_platform: Some("Front".to_string()),
            station: Some("Kanpur Central".to_string()),
            eta: None,
        };
        assert!(monitor.apply_coach(coach(3)));
        assert!(monitor.apply_coach(coach(5)));

        let view = monitor.view();
        assert_eq!(view.coach_positions.len(), 1);
        assert_eq!(view.coach_positions[0].platform_number, Some(5));
    }
}
