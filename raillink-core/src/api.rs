use crate::alerts::{AlertSubscription, SubscriptionRequest};
use crate::booking::{BookingConfirmation, BookingRequest};
use crate::search::{TrainOffer, TrainQuery};
use crate::seating::{CoachInfo, SeatMapSnapshot, SeatStatus};
use crate::session::Role;
use crate::tracking::TrackingSnapshot;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Outcome of OTP verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: i64,
    pub role: Role,
}

/// Failure talking to the reservation backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {status}")]
    Status { status: u16, message: Option<String> },
    #[error("malformed server response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Message shown to the user: the server's own error text when it sent
    /// one, otherwise the caller's fallback.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, ApiError::Status { status, .. } if *status == code)
    }
}

/// Client-side view of the reservation backend.
///
/// One method per consumed endpoint; implementations must not retry on
/// their own, the flows decide what a failure means.
#[async_trait]
pub trait ReservationApi: Send + Sync {
    async fn send_otp(&self, phone: &str) -> Result<(), ApiError>;

    async fn verify_otp(&self, phone: &str, code: &str) -> Result<VerifiedIdentity, ApiError>;

    async fn search_trains(&self, query: &TrainQuery) -> Result<Vec<TrainOffer>, ApiError>;

    async fn tracking_snapshot(&self, train_id: i64) -> Result<TrackingSnapshot, ApiError>;

    async fn list_coaches(&self, train_id: i64) -> Result<Vec<CoachInfo>, ApiError>;

    async fn seat_map(&self, train_id: i64, coach_number: &str)
        -> Result<SeatMapSnapshot, ApiError>;

    async fn lock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError>;

    async fn unlock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError>;

    async fn user_id_by_email(&self, email: &str) -> Result<i64, ApiError>;

    async fn create_booking(&self, request: &BookingRequest)
        -> Result<BookingConfirmation, ApiError>;

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError>;

    async fn maps_key(&self) -> Result<String, ApiError>;

    async fn create_alert_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<AlertSubscription, ApiError>;

    async fn delete_alert_subscription(&self, id: &str) -> Result<(), ApiError>;

    async fn list_alert_subscriptions(&self) -> Result<Vec<AlertSubscription>, ApiError>;
}

/// Canned in-memory backend for tests and offline demos.
///
/// Lock failures and booking failures are configured up front; every call
/// that mutates server state is recorded so tests can assert on the exact
/// request sequence.
pub struct MockReservationApi {
    trains: Vec<TrainOffer>,
    coaches: HashMap<i64, Vec<CoachInfo>>,
    seat_maps: HashMap<(i64, String), BTreeMap<String, SeatStatus>>,
    tracking: HashMap<i64, TrackingSnapshot>,
    users: HashMap<String, i64>,
    lock_failures: HashMap<String, ApiError>,
    booking_failures: Mutex<VecDeque<ApiError>>,
    subscriptions: Mutex<Vec<AlertSubscription>>,
    calls: Mutex<Vec<String>>,
    next_booking_id: AtomicI64,
    next_subscription_id: AtomicI64,
}

impl MockReservationApi {
    pub fn new() -> Self {
        Self {
            trains: Vec::new(),
            coaches: HashMap::new(),
            seat_maps: HashMap::new(),
            tracking: HashMap::new(),
            users: HashMap::new(),
            lock_failures: HashMap::new(),
            booking_failures: Mutex::new(VecDeque::new()),
            subscriptions: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_booking_id: AtomicI64::new(9001),
            next_subscription_id: AtomicI64::new(1),
        }
    }

    pub fn with_train(mut self, offer: TrainOffer) -> Self {
        self.trains.push(offer);
        self
    }

    pub fn with_coaches(mut self, train_id: i64, coaches: Vec<CoachInfo>) -> Self {
        self.coaches.insert(train_id, coaches);
        self
    }

    pub fn with_seat_map(
        mut self,
        train_id: i64,
        coach_number: &str,
        seats: &[(&str, SeatStatus)],
    ) -> Self {
        let map = seats
            .iter()
            .map(|(seat, status)| (seat.to_string(), *status))
            .collect();
        self.seat_maps
            .insert((train_id, coach_number.to_string()), map);
        self
    }

    pub fn with_tracking(mut self, train_id: i64, snapshot: TrackingSnapshot) -> Self {
        self.tracking.insert(train_id, snapshot);
        self
    }

    pub fn with_user(mut self, email: &str, user_id: i64) -> Self {
        self.users.insert(email.to_string(), user_id);
        self
    }

    /// Make the lock call for one seat label (e.g. "A1-12") fail.
    pub fn with_lock_failure(mut self, seat_label: &str, error: ApiError) -> Self {
        self.lock_failures.insert(seat_label.to_string(), error);
        self
    }

    /// Queue a failure consumed by the next create_booking call.
    pub fn queue_booking_failure(&self, error: ApiError) {
        if let Ok(mut queue) = self.booking_failures.lock() {
            queue.push_back(error);
        }
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, entry: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(entry);
        }
    }
}

impl Default for MockReservationApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationApi for MockReservationApi {
    async fn send_otp(&self, phone: &str) -> Result<(), ApiError> {
        self.record(format!("send_otp {}", phone));
        Ok(())
    }

    async fn verify_otp(&self, phone: &str, code: &str) -> Result<VerifiedIdentity, ApiError> {
        self.record(format!("verify_otp {}", phone));
        tracing::info!(
            "Verifying OTP for {}",
            raillink_shared::Masked::new(phone.to_string())
        );
        // "000000" is the canned rejection trigger
        if code == "000000" {
            return Err(ApiError::Status {
                status: 400,
                message: Some("Invalid OTP".to_string()),
            });
        }
        Ok(VerifiedIdentity {
            user_id: 7001,
            role: Role::Passenger,
        })
    }

    async fn search_trains(&self, _query: &TrainQuery) -> Result<Vec<TrainOffer>, ApiError> {
        Ok(self.trains.clone())
    }

    async fn tracking_snapshot(&self, train_id: i64) -> Result<TrackingSnapshot, ApiError> {
        self.tracking
            .get(&train_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: Some("Train not found".to_string()),
            })
    }

    async fn list_coaches(&self, train_id: i64) -> Result<Vec<CoachInfo>, ApiError> {
        Ok(self.coaches.get(&train_id).cloned().unwrap_or_default())
    }

    async fn seat_map(
        &self,
        train_id: i64,
        coach_number: &str,
    ) -> Result<SeatMapSnapshot, ApiError> {
        let seats = self
            .seat_maps
            .get(&(train_id, coach_number.to_string()))
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: Some("Seat map not found".to_string()),
            })?;
        Ok(SeatMapSnapshot {
            train_id,
            coach_number: coach_number.to_string(),
            seats,
        })
    }

    async fn lock_seat(
        &self,
        _train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        let label = format!("{}-{}", coach_number, seat_number);
        self.record(format!("lock {}", label));
        match self.lock_failures.get(&label) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn unlock_seat(
        &self,
        _train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        self.record(format!("unlock {}-{}", coach_number, seat_number));
        Ok(())
    }

    async fn user_id_by_email(&self, email: &str) -> Result<i64, ApiError> {
        self.record(format!("user_by_email {}", email));
        self.users.get(email).copied().ok_or_else(|| ApiError::Status {
            status: 404,
            message: Some("User not found".to_string()),
        })
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ApiError> {
        self.record(format!(
            "create_booking train={} seats={} key={}",
            request.train_id,
            request.seats.join(","),
            request.idempotency_key
        ));
        let queued = self
            .booking_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        if let Some(error) = queued {
            return Err(error);
        }
        Ok(BookingConfirmation {
            booking_id: self.next_booking_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError> {
        self.record(format!("cancel_booking {}", booking_id));
        Ok(())
    }

    async fn maps_key(&self) -> Result<String, ApiError> {
        Ok("demo-maps-key".to_string())
    }

    async fn create_alert_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<AlertSubscription, ApiError> {
        let subscription = AlertSubscription {
            id: format!(
                "sub-{}",
                self.next_subscription_id.fetch_add(1, Ordering::SeqCst)
            ),
            pnr: request.pnr.clone(),
            phone: request.phone.clone(),
            email: request.email.clone(),
            alert_types: request.alert_types.clone(),
            created_at: chrono::Utc::now(),
        };
        self.record(format!("subscribe {}", subscription.id));
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            subscriptions.push(subscription.clone());
        }
        Ok(subscription)
    }

    async fn delete_alert_subscription(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("unsubscribe {}", id));
        let removed = self
            .subscriptions
            .lock()
            .map(|mut subscriptions| {
                let before = subscriptions.len();
                subscriptions.retain(|subscription| subscription.id != id);
                before != subscriptions.len()
            })
            .unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: 404,
                message: Some("Subscription not found".to_string()),
            })
        }
    }

    async fn list_alert_subscriptions(&self) -> Result<Vec<AlertSubscription>, ApiError> {
        Ok(self
            .subscriptions
            .lock()
            .map(|subscriptions| subscriptions.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_server_text() {
        let with_body = ApiError::Status {
            status: 409,
            message: Some("Seat already locked".to_string()),
        };
        assert_eq!(with_body.user_message("Seat lock failed"), "Seat already locked");

        let bare = ApiError::Status {
            status: 500,
            message: None,
        };
        assert_eq!(bare.user_message("Seat lock failed"), "Seat lock failed");

        let transport = ApiError::Transport("connection refused".to_string());
        assert_eq!(transport.user_message("Booking failed"), "Booking failed");
    }

    #[tokio::test]
    async fn test_mock_lock_failure_configuration() {
        let api = MockReservationApi::new().with_lock_failure(
            "A1-12",
            ApiError::Status {
                status: 409,
                message: Some("Seat already locked".to_string()),
            },
        );

        assert!(api.lock_seat(12301, "A1", "14").await.is_ok());
        let denied = api.lock_seat(12301, "A1", "12").await.unwrap_err();
        assert!(denied.is_status(409));
        assert_eq!(
            api.recorded_calls(),
            vec!["lock A1-14".to_string(), "lock A1-12".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mock_booking_failure_queue_drains() {
        let api = MockReservationApi::new();
        api.queue_booking_failure(ApiError::Status {
            status: 409,
            message: Some("Seats no longer available".to_string()),
        });

        let request = BookingRequest {
            user_id: 7001,
            train_id: 12301,
            seats: vec!["A1-12".to_string()],
            date: chrono::NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
            payment_method: "card".to_string(),
            idempotency_key: uuid::Uuid::new_v4(),
        };
        assert!(api.create_booking(&request).await.is_err());
        let confirmation = api.create_booking(&request).await.unwrap();
        assert_eq!(confirmation.booking_id, 9001);
    }
}
