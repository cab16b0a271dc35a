use crate::notify::{NoticeLevel, Notifier};
use crate::seating::SeatSelectionSummary;
use crate::session::SessionHandle;
use raillink_core::api::{ApiError, ReservationApi};
use raillink_core::booking::{
    BookingConfirmation, BookingRequest, BookingStatus, LocalBookingRecord, PaymentMethod,
};
use raillink_core::CoreError;
use raillink_gateway::local_store::LocalStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One booking attempt: its idempotency key lives as long as the attempt.
///
/// A retry of the same summary reuses the key, so the server can collapse
/// duplicates; a different summary (or a success) starts a new attempt.
struct BookingAttempt {
    key: Uuid,
    fingerprint: String,
}

fn attempt_fingerprint(summary: &SeatSelectionSummary) -> String {
    let seats: Vec<String> = summary.seats.iter().map(|seat| seat.label()).collect();
    format!(
        "{}|{}|{}",
        summary.train.train_id,
        seats.join(","),
        summary.train.travel_date
    )
}

struct SubmitState {
    attempt: Option<BookingAttempt>,
    in_flight: bool,
}

/// Payment stage: validate the instrument, submit the booking, record the
/// confirmation.
pub struct BookingFlow {
    api: Arc<dyn ReservationApi>,
    session: SessionHandle,
    store: Arc<LocalStore>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SubmitState>,
}

impl BookingFlow {
    pub fn new(
        api: Arc<dyn ReservationApi>,
        session: SessionHandle,
        store: Arc<LocalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            session,
            store,
            notifier,
            state: Mutex::new(SubmitState {
                attempt: None,
                in_flight: false,
            }),
        }
    }

    /// Submit the booking. Exactly one submission runs at a time; a failure
    /// leaves the attempt (and its idempotency key) in place for retry.
    pub async fn submit(
        &self,
        summary: &SeatSelectionSummary,
        method: &PaymentMethod,
    ) -> Result<BookingConfirmation, BookingError> {
        method.validate().map_err(BookingError::InvalidPayment)?;

        let key = {
            let mut state = self.state.lock().await;
            if state.in_flight {
                return Err(BookingError::SubmissionInFlight);
            }
            state.in_flight = true;

            let fingerprint = attempt_fingerprint(summary);
            match &state.attempt {
                Some(attempt) if attempt.fingerprint == fingerprint => attempt.key,
                _ => {
                    let key = Uuid::new_v4();
                    state.attempt = Some(BookingAttempt { key, fingerprint });
                    key
                }
            }
        };

        let result = self.submit_inner(summary, method, key).await;

        let mut state = self.state.lock().await;
        state.in_flight = false;
        if result.is_ok() {
            state.attempt = None;
        }
        result
    }

    async fn submit_inner(
        &self,
        summary: &SeatSelectionSummary,
        method: &PaymentMethod,
        key: Uuid,
    ) -> Result<BookingConfirmation, BookingError> {
        let user_id = self.resolve_user_id().await?;

        let request = BookingRequest {
            user_id,
            train_id: summary.train.train_id,
            seats: summary.seats.iter().map(|seat| seat.label()).collect(),
            date: summary.train.travel_date,
            payment_method: method.wire_name().to_string(),
            idempotency_key: key,
        };

        match self.api.create_booking(&request).await {
            Ok(confirmation) => {
                self.session.set_booking_id(confirmation.booking_id).await;
                let record = LocalBookingRecord {
                    booking_id: confirmation.booking_id,
                    pnr: confirmation.booking_id.to_string(),
                    train_id: summary.train.train_id,
                    train_name: summary.train.name.clone(),
                    date: summary.train.travel_date,
                    status: BookingStatus::Confirmed,
                };
                if let Err(error) = self.store.push_booking(record).await {
                    self.notifier.notify(
                        NoticeLevel::Warning,
                        &format!("Could not save the booking locally: {}", error),
                    );
                }
                self.notifier.notify(NoticeLevel::Success, "Booking confirmed!");
                Ok(confirmation)
            }
            Err(error) => {
                let message = error.user_message("Booking failed");
                self.notifier.notify(NoticeLevel::Error, &message);
                Err(BookingError::Api(error))
            }
        }
    }

    /// The acting user: the verified identity when present, otherwise the
    /// account email resolved server-side.
    async fn resolve_user_id(&self) -> Result<i64, BookingError> {
        let session = self.session.snapshot().await;
        if let Some(identity) = &session.identity {
            return Ok(identity.user_id);
        }
        let Some(email) = session.email.as_deref() else {
            self.notifier
                .notify(NoticeLevel::Error, "Please login to continue");
            return Err(BookingError::NotAuthenticated);
        };
        match self.api.user_id_by_email(email).await {
            Ok(user_id) => Ok(user_id),
            Err(error) if error.is_status(404) => {
                self.notifier
                    .notify(NoticeLevel::Error, "Please login to continue");
                Err(BookingError::NotAuthenticated)
            }
            Err(error) => {
                self.notifier
                    .notify(NoticeLevel::Error, &error.user_message("Booking failed"));
                Err(BookingError::Api(error))
            }
        }
    }

    /// Cancel a confirmed booking; the backend releases its seats.
    pub async fn cancel_booking(&self, booking_id: i64) -> Result<(), BookingError> {
        if let Err(error) = self.api.cancel_booking(booking_id).await {
            let message = error.user_message("Could not cancel the booking");
            self.notifier.notify(NoticeLevel::Error, &message);
            return Err(BookingError::Api(error));
        }
        if let Err(error) = self
            .store
            .set_booking_status(booking_id, BookingStatus::Cancelled)
            .await
        {
            self.notifier.notify(
                NoticeLevel::Warning,
                &format!("Could not update the local booking: {}", error),
            );
        }
        self.notifier.notify(NoticeLevel::Info, "Booking cancelled");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    InvalidPayment(CoreError),

    #[error("Please login to continue")]
    NotAuthenticated,

    #[error("A booking submission is already in progress")]
    SubmissionInFlight,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl BookingError {
    pub fn user_message(&self) -> String {
        match self {
            BookingError::InvalidPayment(error) => error.detail().to_string(),
            BookingError::Api(error) => error.user_message("Booking failed"),
            other => other.to_string(),
        }
    }
}
