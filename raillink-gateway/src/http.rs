use crate::app_config::ApiConfig;
use async_trait::async_trait;
use raillink_core::alerts::{AlertSubscription, SubscriptionRequest};
use raillink_core::api::{ApiError, ReservationApi, VerifiedIdentity};
use raillink_core::booking::{BookingConfirmation, BookingRequest};
use raillink_core::search::{TrainOffer, TrainQuery};
use raillink_core::seating::{CoachInfo, SeatMapSnapshot, SeatStatus};
use raillink_core::tracking::TrackingSnapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// HTTP implementation of the reservation API.
#[derive(Clone)]
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        decode_response(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode_response(response).await
    }

    async fn post_expect_ok<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }
}

fn transport(error: reqwest::Error) -> ApiError {
    ApiError::Transport(error.to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Map a response to the typed error model. Non-2xx carries the server's
/// "error" field verbatim when the body has one.
async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|error| ApiError::Decode(error.to_string()))
    } else {
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error);
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

/// Like `decode_response` but the success body is irrelevant.
async fn expect_ok(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error);
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

fn snapshot_from_wire(
    train_id: i64,
    coach_number: &str,
    seats: BTreeMap<String, String>,
) -> SeatMapSnapshot {
    let seats = seats
        .into_iter()
        .map(|(seat, status)| (seat, SeatStatus::from_wire(&status)))
        .collect();
    SeatMapSnapshot {
        train_id,
        coach_number: coach_number.to_string(),
        seats,
    }
}

// ============================================================================
// Wire Envelopes
// ============================================================================

#[derive(Serialize)]
struct OtpBody<'a> {
    phone: &'a str,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    phone: &'a str,
    otp: &'a str,
}

#[derive(Serialize)]
struct SeatLockBody<'a> {
    train_id: i64,
    coach_number: &'a str,
    seat_number: &'a str,
}

#[derive(Deserialize)]
struct TrainsEnvelope {
    trains: Vec<TrainOffer>,
}

#[derive(Deserialize)]
struct CoachesEnvelope {
    coaches: Vec<CoachInfo>,
}

#[derive(Deserialize)]
struct SeatMapEnvelope {
    seat_map: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user_id: i64,
}

#[derive(Deserialize)]
struct MapsEnvelope {
    #[serde(rename = "apiKey")]
    api_key: String,
}

#[derive(Deserialize)]
struct SubscriptionsEnvelope {
    subscriptions: Vec<AlertSubscription>,
}

#[async_trait]
impl ReservationApi for HttpApiClient {
    async fn send_otp(&self, phone: &str) -> Result<(), ApiError> {
        self.post_expect_ok("/api/passenger/send_otp", &OtpBody { phone })
            .await
    }

    async fn verify_otp(&self, phone: &str, code: &str) -> Result<VerifiedIdentity, ApiError> {
        self.post_json("/api/passenger/verify_otp", &VerifyBody { phone, otp: code })
            .await
    }

    async fn search_trains(&self, query: &TrainQuery) -> Result<Vec<TrainOffer>, ApiError> {
        let envelope: TrainsEnvelope = self.post_json("/api/trains/search", query).await?;
        Ok(envelope.trains)
    }

    async fn tracking_snapshot(&self, train_id: i64) -> Result<TrackingSnapshot, ApiError> {
        self.get_json(&format!("/api/tracking/{}", train_id)).await
    }

    async fn list_coaches(&self, train_id: i64) -> Result<Vec<CoachInfo>, ApiError> {
        let envelope: CoachesEnvelope = self
            .get_json(&format!("/api/trains/{}/coaches", train_id))
            .await?;
        Ok(envelope.coaches)
    }

    async fn seat_map(
        &self,
        train_id: i64,
        coach_number: &str,
    ) -> Result<SeatMapSnapshot, ApiError> {
        let envelope: SeatMapEnvelope = self
            .get_json(&format!(
                "/api/trains/{}/coaches/{}/seatmap",
                train_id, coach_number
            ))
            .await?;
        Ok(snapshot_from_wire(train_id, coach_number, envelope.seat_map))
    }

    async fn lock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        tracing::debug!("Locking seat {}-{} on train {}", coach_number, seat_number, train_id);
        self.post_expect_ok(
            "/api/bookings/lock",
            &SeatLockBody {
                train_id,
                coach_number,
                seat_number,
            },
        )
        .await
    }

    async fn unlock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        tracing::debug!(
            "Releasing seat {}-{} on train {}",
            coach_number,
            seat_number,
            train_id
        );
        self.post_expect_ok(
            "/api/bookings/unlock",
            &SeatLockBody {
                train_id,
                coach_number,
                seat_number,
            },
        )
        .await
    }

    async fn user_id_by_email(&self, email: &str) -> Result<i64, ApiError> {
        let response = self
            .http
            .get(self.url("/api/users/by_email"))
            .query(&[("email", email)])
            .send()
            .await
            .map_err(transport)?;
        let envelope: UserEnvelope = decode_response(response).await?;
        Ok(envelope.user_id)
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ApiError> {
        self.post_json("/api/bookings", request).await
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError> {
        self.post_expect_ok(
            &format!("/api/bookings/{}/cancel", booking_id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn maps_key(&self) -> Result<String, ApiError> {
        let envelope: MapsEnvelope = self.get_json("/api/config/maps").await?;
        Ok(envelope.api_key)
    }

    async fn create_alert_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<AlertSubscription, ApiError> {
        self.post_json("/api/alerts/subscriptions", request).await
    }

    async fn delete_alert_subscription(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/alerts/subscriptions/{}", id)))
            .send()
            .await
            .map_err(transport)?;
        expect_ok(response).await
    }

    async fn list_alert_subscriptions(&self) -> Result<Vec<AlertSubscription>, ApiError> {
        let envelope: SubscriptionsEnvelope = self.get_json("/api/alerts/subscriptions").await?;
        Ok(envelope.subscriptions)
    }
}
