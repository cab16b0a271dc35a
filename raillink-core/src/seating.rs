use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A coach in the consist, as returned by the coach list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachInfo {
    pub coach_number: String,
    #[serde(rename = "class")]
    pub coach_class: String,
}

/// Server-side seat availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatStatus {
    Available,
    Unavailable,
}

impl SeatStatus {
    /// Anything the backend does not explicitly mark unavailable is bookable.
    pub fn from_wire(value: &str) -> Self {
        if value.eq_ignore_ascii_case("unavailable") {
            SeatStatus::Unavailable
        } else {
            SeatStatus::Available
        }
    }
}

/// Immutable seat-availability snapshot for one coach.
///
/// Re-fetched whenever the user switches coaches; never mutated in place.
#[derive(Debug, Clone)]
pub struct SeatMapSnapshot {
    pub train_id: i64,
    pub coach_number: String,
    pub seats: BTreeMap<String, SeatStatus>,
}

/// A seat claim, unique by (coach, seat).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatRef {
    pub coach: String,
    pub seat: String,
}

impl SeatRef {
    pub fn new(coach: impl Into<String>, seat: impl Into<String>) -> Self {
        Self {
            coach: coach.into(),
            seat: seat.into(),
        }
    }

    /// "coach-seat" form used in booking requests, e.g. "A1-12".
    pub fn label(&self) -> String {
        format!("{}-{}", self.coach, self.seat)
    }

    /// Parse the "coach-seat" form back into a reference.
    pub fn parse(label: &str) -> CoreResult<Self> {
        let malformed =
            || CoreError::ValidationError(format!("Malformed seat label: {}", label));
        let (coach, seat) = label.split_once('-').ok_or_else(malformed)?;
        if coach.is_empty() || seat.is_empty() {
            return Err(malformed());
        }
        Ok(SeatRef::new(coach, seat))
    }
}
