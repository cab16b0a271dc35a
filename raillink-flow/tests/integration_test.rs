use async_trait::async_trait;
use chrono::NaiveDate;
use raillink_core::alerts::{AlertSubscription, SubscriptionRequest};
use raillink_core::api::{ApiError, MockReservationApi, ReservationApi, VerifiedIdentity};
use raillink_core::booking::{BookingConfirmation, BookingRequest, PaymentMethod};
use raillink_core::pricing;
use raillink_core::search::{TrainOffer, TrainQuery};
use raillink_core::seating::{CoachInfo, SeatMapSnapshot, SeatRef, SeatStatus};
use raillink_core::session::{Identity, Role, SelectedTrain};
use raillink_core::tracking::TrackingSnapshot;
use raillink_flow::booking::BookingError;
use raillink_flow::seating::SeatingError;
use raillink_flow::{
    BookingFlow, PhoneVerification, RecordingNotifier, SearchStage, SeatSelectionStage,
    SeatSelectionSummary, SeatView, SelectOutcome, SessionHandle,
};
use raillink_gateway::app_config::{FlowRules, StorageConfig};
use raillink_gateway::LocalStore;
use raillink_shared::Masked;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn seeded_api() -> MockReservationApi {
    MockReservationApi::new()
        .with_train(TrainOffer {
            id: 12301,
            name: "Rajdhani Express".to_string(),
            origin: "New Delhi".to_string(),
            destination: "Mumbai Central".to_string(),
            departure: "16:55".to_string(),
            arrival: "08:15".to_string(),
            duration: "15h 20m".to_string(),
            price: 450.0,
            available_seats: 72,
        })
        .with_coaches(
            12301,
            vec![CoachInfo {
                coach_number: "A1".to_string(),
                coach_class: "3A".to_string(),
            }],
        )
        .with_seat_map(
            12301,
            "A1",
            &[
                ("12", SeatStatus::Available),
                ("14", SeatStatus::Available),
                ("16", SeatStatus::Unavailable),
            ],
        )
}

fn selected_train() -> SelectedTrain {
    SelectedTrain {
        train_id: 12301,
        name: "Rajdhani Express".to_string(),
        fare: 450.0,
        origin: "New Delhi".to_string(),
        destination: "Mumbai Central".to_string(),
        departure: "16:55".to_string(),
        arrival: "08:15".to_string(),
        travel_date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
        passengers: 2,
        passenger_email: None,
        total_price: 900.0,
    }
}

fn store_in(dir: &tempfile::TempDir) -> Arc<LocalStore> {
    Arc::new(LocalStore::open(&StorageConfig {
        path: dir.path().join("store.json").to_string_lossy().to_string(),
    }))
}

fn booking_keys(api: &MockReservationApi) -> Vec<String> {
    api.recorded_calls()
        .into_iter()
        .filter(|call| call.starts_with("create_booking"))
        .filter_map(|call| call.split("key=").last().map(str::to_string))
        .collect()
}

/// Delegating backend whose lock and booking calls can be held at a gate,
/// so tests can observe the flows mid-request.
struct GatedApi {
    inner: MockReservationApi,
    lock_gate: Option<(Arc<Notify>, Arc<Notify>)>,
    booking_gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl GatedApi {
    fn new(inner: MockReservationApi) -> Self {
        Self {
            inner,
            lock_gate: None,
            booking_gate: None,
        }
    }
}

fn gate() -> (Arc<Notify>, Arc<Notify>) {
    (Arc::new(Notify::new()), Arc::new(Notify::new()))
}

async fn hold_at(gate: &Option<(Arc<Notify>, Arc<Notify>)>) {
    if let Some((entered, release)) = gate {
        entered.notify_one();
        release.notified().await;
    }
}

#[async_trait]
impl ReservationApi for GatedApi {
    async fn send_otp(&self, phone: &str) -> Result<(), ApiError> {
        self.inner.send_otp(phone).await
    }

    async fn verify_otp(&self, phone: &str, code: &str) -> Result<VerifiedIdentity, ApiError> {
        self.inner.verify_otp(phone, code).await
    }

    async fn search_trains(&self, query: &TrainQuery) -> Result<Vec<TrainOffer>, ApiError> {
        self.inner.search_trains(query).await
    }

    async fn tracking_snapshot(&self, train_id: i64) -> Result<TrackingSnapshot, ApiError> {
        self.inner.tracking_snapshot(train_id).await
    }

    async fn list_coaches(&self, train_id: i64) -> Result<Vec<CoachInfo>, ApiError> {
        self.inner.list_coaches(train_id).await
    }

    async fn seat_map(
        &self,
        train_id: i64,
        coach_number: &str,
    ) -> Result<SeatMapSnapshot, ApiError> {
        self.inner.seat_map(train_id, coach_number).await
    }

    async fn lock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        hold_at(&self.lock_gate).await;
        self.inner.lock_seat(train_id, coach_number, seat_number).await
    }

    async fn unlock_seat(
        &self,
        train_id: i64,
        coach_number: &str,
        seat_number: &str,
    ) -> Result<(), ApiError> {
        self.inner.unlock_seat(train_id, coach_number, seat_number).await
    }

    async fn user_id_by_email(&self, email: &str) -> Result<i64, ApiError> {
        self.inner.user_id_by_email(email).await
    }

    async fn create_booking(
        &self,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, ApiError> {
        hold_at(&self.booking_gate).await;
        self.inner.create_booking(request).await
    }

    async fn cancel_booking(&self, booking_id: i64) -> Result<(), ApiError> {
        self.inner.cancel_booking(booking_id).await
    }

    async fn maps_key(&self) -> Result<String, ApiError> {
        self.inner.maps_key().await
    }

    async fn create_alert_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<AlertSubscription, ApiError> {
        self.inner.create_alert_subscription(request).await
    }

    async fn delete_alert_subscription(&self, id: &str) -> Result<(), ApiError> {
        self.inner.delete_alert_subscription(id).await
    }

    async fn list_alert_subscriptions(&self) -> Result<Vec<AlertSubscription>, ApiError> {
        self.inner.list_alert_subscriptions().await
    }
}

#[tokio::test]
async fn test_search_to_booking_flow() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);
    let api = Arc::new(seeded_api());
    let session = SessionHandle::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let search = SearchStage::new(
        api.clone(),
        session.clone(),
        notifier.clone(),
        Duration::from_secs(2),
    );

    let query = TrainQuery {
        origin: "New Delhi".to_string(),
        destination: "Mumbai Central".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
        passengers: 2,
    };
    let offers = search.search(&query).await.expect("search");
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].total_fare, 900.0);

    // Anonymous user: picking an offer opens the login prompt and the stage
    // waits on the gate while OTP login runs on the side.
    let login_api = api.clone();
    let login_session = session.clone();
    let login_notifier = notifier.clone();
    let login = tokio::spawn(async move {
        while login_notifier.login_requests() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let mut verification =
            PhoneVerification::new(login_api, login_session, &FlowRules::default());
        verification.request_otp("+919876543210").await.expect("request otp");
        verification.verify("123456").await.expect("verify otp")
    });

    let stage = search
        .select_offer(&offers[0].offer, &query)
        .await
        .expect("seat stage");
    let identity = login.await.expect("login task");
    assert_eq!(identity.user_id, 7001);
    assert_eq!(notifier.login_requests(), 1);
    assert!(session.is_authenticated().await);

    // Seat selection: two locks, one released again
    stage.load_coaches().await.expect("coaches");
    stage.open_coach("A1").await.expect("open");
    assert_eq!(
        stage.attempt_select("12").await.expect("select"),
        SelectOutcome::Selected(pricing::quote(450.0, 2, 1))
    );
    stage.attempt_select("14").await.expect("select");
    assert_eq!(stage.total().await.total, 1000.0);
    stage.deselect("14").await.expect("deselect");

    let summary = stage.confirm().await.expect("confirm");
    assert_eq!(summary.price.total, 950.0);
    assert_eq!(summary.seats.len(), 1);

    // Payment: the first submission fails with the server's own message and
    // the retry reuses the idempotency key.
    let flow = BookingFlow::new(api.clone(), session.clone(), store.clone(), notifier.clone());
    let card = PaymentMethod::Card {
        number: "4539148803436467".to_string(),
        expiry: "12/99".to_string(),
        cvv: "123".to_string(),
    };
    api.queue_booking_failure(ApiError::Status {
        status: 500,
        message: Some("Payment gateway unavailable".to_string()),
    });
    assert!(flow.submit(&summary, &card).await.is_err());
    assert!(notifier
        .messages()
        .contains(&"Payment gateway unavailable".to_string()));
    assert!(session.snapshot().await.booking_id.is_none());

    let confirmation = flow.submit(&summary, &card).await.expect("retry");
    assert_eq!(confirmation.booking_id, 9001);
    assert!(notifier.messages().contains(&"Booking confirmed!".to_string()));

    let keys = booking_keys(&api);
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);

    // The booking lands in the local records for tracking and alerts
    let record = store.find_booking_by_pnr("9001").await.expect("record");
    assert_eq!(record.train_id, 12301);
    assert_eq!(session.snapshot().await.booking_id, Some(9001));
}

#[tokio::test]
async fn test_seat_stays_pending_while_lock_is_in_flight() {
    let (entered, release) = gate();
    let mut api = GatedApi::new(seeded_api());
    api.lock_gate = Some((entered.clone(), release.clone()));

    let stage = Arc::new(SeatSelectionStage::new(
        Arc::new(api),
        SessionHandle::new(),
        Arc::new(RecordingNotifier::new()),
        selected_train(),
    ));
    stage.open_coach("A1").await.expect("open");

    let first = {
        let stage = stage.clone();
        tokio::spawn(async move { stage.attempt_select("12").await })
    };
    entered.notified().await;

    // While the server holds the first lock call, the seat renders pending,
    // re-clicking it is refused, and the rest of the board stays usable.
    let board = stage.board().await.expect("board");
    assert!(board.contains(&("12".to_string(), SeatView::Pending)));
    assert!(matches!(
        stage.attempt_select("12").await.unwrap_err(),
        SeatingError::SeatPending(_)
    ));
    assert_eq!(stage.total().await.total, 900.0);

    release.notify_one();
    let outcome = first.await.expect("join").expect("select");
    assert!(matches!(outcome, SelectOutcome::Selected(_)));
    assert_eq!(stage.selection().await, vec![SeatRef::new("A1", "12")]);
}

#[tokio::test]
async fn test_second_submission_is_refused_while_one_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(&dir);
    let (entered, release) = gate();
    let mut api = GatedApi::new(seeded_api());
    api.booking_gate = Some((entered.clone(), release.clone()));

    let session = SessionHandle::new();
    session
        .complete_login(Identity {
            phone: Masked::new("+919876543210".to_string()),
            user_id: 7001,
            role: Role::Passenger,
        })
        .await;

    let flow = Arc::new(BookingFlow::new(
        Arc::new(api),
        session,
        store,
        Arc::new(RecordingNotifier::new()),
    ));
    let summary = SeatSelectionSummary {
        train: selected_train(),
        seats: vec![SeatRef::new("A1", "12")],
        price: pricing::quote(450.0, 2, 1),
    };
    let payment = PaymentMethod::Upi {
        vpa: "traveller@upi".to_string(),
    };

    let first = {
        let flow = flow.clone();
        let summary = summary.clone();
        let payment = payment.clone();
        tokio::spawn(async move { flow.submit(&summary, &payment).await })
    };
    entered.notified().await;

    assert!(matches!(
        flow.submit(&summary, &payment).await.unwrap_err(),
        BookingError::SubmissionInFlight
    ));

    release.notify_one();
    let confirmation = first.await.expect("join").expect("submit");
    assert_eq!(confirmation.booking_id, 9001);
}
