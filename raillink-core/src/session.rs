use chrono::NaiveDate;
use raillink_shared::Masked;
use serde::{Deserialize, Serialize};

/// Role granted by the backend after OTP verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Passenger,
    Admin,
}

/// Verified identity held for the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Identity {
    pub phone: Masked<String>,
    pub user_id: i64,
    pub role: Role,
}

/// Train chosen from the search results, carried through the booking flow.
///
/// `fare` is the per-passenger fare quoted by search; `total_price` is
/// recomputed every time the seat selection changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedTrain {
    pub train_id: i64,
    pub name: String,
    pub fare: f64,
    pub origin: String,
    pub destination: String,
    pub departure: String,
    pub arrival: String,
    pub travel_date: NaiveDate,
    pub passengers: u32,
    pub passenger_email: Option<String>,
    pub total_price: f64,
}

impl SelectedTrain {
    /// Fare for the whole party before seat fees.
    pub fn base_fare(&self) -> f64 {
        self.fare * self.passengers as f64
    }
}

/// Typed session state replacing ad hoc key-value session storage.
///
/// Created empty at session start and cleared explicitly at session end or
/// after a confirmed booking hands off to the confirmation view.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub email: Option<String>,
    pub identity: Option<Identity>,
    pub selected_train: Option<SelectedTrain>,
    pub booking_id: Option<i64>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Booking actions are gated on this: either a verified phone identity
    /// or an email attached by the account login surface.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() || self.email.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
