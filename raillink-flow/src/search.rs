use crate::notify::{NoticeLevel, Notifier};
use crate::seating::SeatSelectionStage;
use crate::session::{AuthWaitError, SessionHandle};
use raillink_core::api::{ApiError, ReservationApi};
use raillink_core::search::{TrainOffer, TrainQuery};
use raillink_core::session::SelectedTrain;
use raillink_core::CoreError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A search result with the derived fare for the whole party.
#[derive(Debug, Clone)]
pub struct TrainOfferView {
    pub offer: TrainOffer,
    pub total_fare: f64,
}

/// Train search plus the hand-off into seat selection.
pub struct SearchStage {
    api: Arc<dyn ReservationApi>,
    session: SessionHandle,
    notifier: Arc<dyn Notifier>,
    login_wait: Duration,
    generation: AtomicU64,
}

impl SearchStage {
    pub fn new(
        api: Arc<dyn ReservationApi>,
        session: SessionHandle,
        notifier: Arc<dyn Notifier>,
        login_wait: Duration,
    ) -> Self {
        Self {
            api,
            session,
            notifier,
            login_wait,
            generation: AtomicU64::new(0),
        }
    }

    /// Run a search. A response belonging to a superseded query is dropped
    /// so late results cannot overwrite newer ones.
    pub async fn search(&self, query: &TrainQuery) -> Result<Vec<TrainOfferView>, SearchError> {
        if query.origin.trim().is_empty()
            || query.destination.trim().is_empty()
            || query.passengers == 0
        {
            return Err(SearchError::Validation(CoreError::ValidationError(
                "Please fill in all required fields".to_string(),
            )));
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let offers = self.api.search_trains(query).await?;
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(SearchError::Superseded);
        }

        Ok(offers
            .into_iter()
            .map(|offer| {
                let total_fare = offer.total_fare(query.passengers);
                TrainOfferView { offer, total_fare }
            })
            .collect())
    }

    /// Choose an offer and move on to seat selection.
    ///
    /// Booking requires an authenticated session. An anonymous user gets the
    /// login prompt and this call waits on the gate, bounded by the login
    /// window, until login completes, the prompt is dismissed, or time runs
    /// out.
    pub async fn select_offer(
        &self,
        offer: &TrainOffer,
        query: &TrainQuery,
    ) -> Result<SeatSelectionStage, SearchError> {
        if !self.session.is_authenticated().await {
            self.notifier.request_login();
            if let Err(error) = self.session.wait_for_login(self.login_wait).await {
                self.notifier.notify(
                    NoticeLevel::Warning,
                    "Please login or register to book tickets",
                );
                return Err(match error {
                    AuthWaitError::TimedOut => SearchError::LoginTimedOut,
                    AuthWaitError::Dismissed => SearchError::LoginDismissed,
                });
            }
        }

        let passenger_email = self.session.snapshot().await.email;
        let selected = SelectedTrain {
            train_id: offer.id,
            name: offer.name.clone(),
            fare: offer.price,
            origin: offer.origin.clone(),
            destination: offer.destination.clone(),
            departure: offer.departure.clone(),
            arrival: offer.arrival.clone(),
            travel_date: query.date,
            passengers: query.passengers,
            passenger_email,
            total_price: offer.total_fare(query.passengers),
        };
        self.session.set_selected_train(selected.clone()).await;

        Ok(SeatSelectionStage::new(
            self.api.clone(),
            self.session.clone(),
            self.notifier.clone(),
            selected,
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("Search results superseded by a newer query")]
    Superseded,

    #[error("Please login or register to book tickets")]
    LoginTimedOut,

    #[error("Please login or register to book tickets")]
    LoginDismissed,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SearchError {
    pub fn user_message(&self) -> String {
        match self {
            SearchError::Validation(error) => error.detail().to_string(),
            SearchError::Api(error) => error.user_message("Search failed, please try again"),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use chrono::NaiveDate;
    use raillink_core::api::MockReservationApi;

    fn offer() -> TrainOffer {
        TrainOffer {
            id: 12301,
            name: "Rajdhani Express".to_string(),
            origin: "New Delhi".to_string(),
            destination: "Mumbai Central".to_string(),
            departure: "16:55".to_string(),
            arrival: "08:15".to_string(),
            duration: "15h 20m".to_string(),
            price: 450.0,
            available_seats: 120,
        }
    }

    fn query() -> TrainQuery {
        TrainQuery {
            origin: "New Delhi".to_string(),
            destination: "Mumbai Central".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
            passengers: 2,
        }
    }

    fn stage(
        api: Arc<MockReservationApi>,
        session: SessionHandle,
        notifier: Arc<RecordingNotifier>,
        login_wait: Duration,
    ) -> SearchStage {
        SearchStage::new(api, session, notifier, login_wait)
    }

    #[tokio::test]
    async fn test_search_requires_all_fields() {
        let api = Arc::new(MockReservationApi::new());
        let stage = stage(
            api,
            SessionHandle::new(),
            Arc::new(RecordingNotifier::new()),
            Duration::from_secs(1),
        );

        let mut bad = query();
        bad.origin = "  ".to_string();
        let error = stage.search(&bad).await.unwrap_err();
        assert_eq!(error.user_message(), "Please fill in all required fields");
    }

    #[tokio::test]
    async fn test_search_derives_party_fare() {
        let api = Arc::new(MockReservationApi::new().with_train(offer()));
        let stage = stage(
            api,
            SessionHandle::new(),
            Arc::new(RecordingNotifier::new()),
            Duration::from_secs(1),
        );

        let results = stage.search(&query()).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].total_fare, 900.0);
    }

    #[tokio::test]
    async fn test_select_offer_waits_for_login() {
        let api = Arc::new(MockReservationApi::new());
        let session = SessionHandle::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = stage(api, session.clone(), notifier.clone(), Duration::from_secs(2));

        let login = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            login.attach_email("traveller@example.com").await;
        });

        stage.select_offer(&offer(), &query()).await.expect("select");
        assert_eq!(notifier.login_requests(), 1);

        let selected = session.selected_train().await.expect("selected train");
        assert_eq!(selected.train_id, 12301);
        assert_eq!(selected.travel_date, query().date);
        assert_eq!(selected.total_price, 900.0);
        assert_eq!(
            selected.passenger_email.as_deref(),
            Some("traveller@example.com")
        );
    }

    #[tokio::test]
    async fn test_select_offer_times_out_without_login() {
        let api = Arc::new(MockReservationApi::new());
        let session = SessionHandle::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = stage(api, session.clone(), notifier.clone(), Duration::from_millis(30));

        let error = stage.select_offer(&offer(), &query()).await.unwrap_err();
        assert!(matches!(error, SearchError::LoginTimedOut));
        assert!(notifier
            .messages()
            .contains(&"Please login or register to book tickets".to_string()));
        assert!(session.selected_train().await.is_none());
    }

    #[tokio::test]
    async fn test_select_offer_observes_dismissal() {
        let api = Arc::new(MockReservationApi::new());
        let session = SessionHandle::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = stage(api, session.clone(), notifier, Duration::from_secs(2));

        let dismisser = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            dismisser.dismiss_login();
        });

        let error = stage.select_offer(&offer(), &query()).await.unwrap_err();
        assert!(matches!(error, SearchError::LoginDismissed));
    }

    #[tokio::test]
    async fn test_authenticated_session_skips_the_gate() {
        let api = Arc::new(MockReservationApi::new());
        let session = SessionHandle::new();
        session.attach_email("traveller@example.com").await;
        let notifier = Arc::new(RecordingNotifier::new());
        let stage = stage(api, session, notifier.clone(), Duration::from_millis(1));

        stage.select_offer(&offer(), &query()).await.expect("select");
        assert_eq!(notifier.login_requests(), 0);
    }
}
