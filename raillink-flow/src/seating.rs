use crate::notify::{NoticeLevel, Notifier};
use crate::session::SessionHandle;
use raillink_core::api::{ApiError, ReservationApi};
use raillink_core::pricing::{self, PriceBreakdown};
use raillink_core::seating::{CoachInfo, SeatMapSnapshot, SeatRef, SeatStatus};
use raillink_core::session::SelectedTrain;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How a seat renders on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatView {
    Available,
    Selected,
    Pending,
    Booked,
}

/// Result of a seat click.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    Selected(PriceBreakdown),
    Deselected(PriceBreakdown),
    AlreadySelected,
    Rejected { message: String },
}

/// Everything the payment stage needs from seat selection.
#[derive(Debug, Clone)]
pub struct SeatSelectionSummary {
    pub train: SelectedTrain,
    pub seats: Vec<SeatRef>,
    pub price: PriceBreakdown,
}

struct SelectionState {
    train: SelectedTrain,
    coaches: Vec<CoachInfo>,
    snapshot: Option<SeatMapSnapshot>,
    selection: BTreeSet<SeatRef>,
    pending: BTreeSet<SeatRef>,
    denied: BTreeSet<SeatRef>,
}

impl SelectionState {
    /// Reprice after a selection change and keep the carried train in sync.
    fn recompute(&mut self) -> PriceBreakdown {
        let price = pricing::quote(self.train.fare, self.train.passengers, self.selection.len());
        self.train.total_price = price.total;
        price
    }
}

/// Seat selection with server-confirmed locks.
///
/// A seat enters the selection set only after the server grants its lock.
/// While a lock call is in flight the seat is pending and further clicks on
/// it are rejected. The selection spans coaches; switching coaches only
/// swaps the visible snapshot.
pub struct SeatSelectionStage {
    api: Arc<dyn ReservationApi>,
    session: SessionHandle,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SelectionState>,
}

impl std::fmt::Debug for SeatSelectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatSelectionStage").finish_non_exhaustive()
    }
}

impl SeatSelectionStage {
    pub fn new(
        api: Arc<dyn ReservationApi>,
        session: SessionHandle,
        notifier: Arc<dyn Notifier>,
        train: SelectedTrain,
    ) -> Self {
        Self {
            api,
            session,
            notifier,
            state: Mutex::new(SelectionState {
                train,
                coaches: Vec::new(),
                snapshot: None,
                selection: BTreeSet::new(),
                pending: BTreeSet::new(),
                denied: BTreeSet::new(),
            }),
        }
    }

    pub async fn load_coaches(&self) -> Result<Vec<CoachInfo>, SeatingError> {
        let train_id = self.state.lock().await.train.train_id;
        let coaches = self.api.list_coaches(train_id).await?;
        if coaches.is_empty() {
            self.notifier
                .notify(NoticeLevel::Warning, "No coaches available for this train");
        }
        self.state.lock().await.coaches = coaches.clone();
        Ok(coaches)
    }

    /// Fetch and display one coach's seat map. The selection set is kept;
    /// per-snapshot denial marks are dropped with the stale snapshot.
    pub async fn open_coach(&self, coach_number: &str) -> Result<SeatMapSnapshot, SeatingError> {
        let train_id = self.state.lock().await.train.train_id;
        let snapshot = self.api.seat_map(train_id, coach_number).await?;

        let mut state = self.state.lock().await;
        state.denied.clear();
        state.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Try to claim a seat in the open coach.
    ///
    /// The lock request runs without holding the stage state, so other seats
    /// stay clickable; this seat is pending until the server answers. A
    /// rejected lock marks the seat booked locally and surfaces the server's
    /// message, but is not an error of the stage itself.
    pub async fn attempt_select(&self, seat_number: &str) -> Result<SelectOutcome, SeatingError> {
        let (seat, train_id) = {
            let mut state = self.state.lock().await;
            let snapshot = state.snapshot.as_ref().ok_or(SeatingError::NoCoachOpen)?;
            let status = snapshot
                .seats
                .get(seat_number)
                .copied()
                .ok_or_else(|| SeatingError::UnknownSeat(seat_number.to_string()))?;
            let seat = SeatRef::new(snapshot.coach_number.clone(), seat_number);

            if state.selection.contains(&seat) {
                return Ok(SelectOutcome::AlreadySelected);
            }
            if state.pending.contains(&seat) {
                return Err(SeatingError::SeatPending(seat.label()));
            }
            if status == SeatStatus::Unavailable || state.denied.contains(&seat) {
                return Err(SeatingError::SeatUnavailable(seat.label()));
            }

            state.pending.insert(seat.clone());
            (seat, state.train.train_id)
        };

        let locked = self.api.lock_seat(train_id, &seat.coach, &seat.seat).await;

        let mut state = self.state.lock().await;
        state.pending.remove(&seat);
        match locked {
            Ok(()) => {
                state.selection.insert(seat);
                let price = state.recompute();
                let train = state.train.clone();
                drop(state);
                self.session.set_selected_train(train).await;
                Ok(SelectOutcome::Selected(price))
            }
            Err(error @ ApiError::Status { .. }) => {
                state.denied.insert(seat);
                drop(state);
                let message = error.user_message("Seat lock failed");
                self.notifier.notify(NoticeLevel::Error, &message);
                Ok(SelectOutcome::Rejected { message })
            }
            Err(error) => {
                // Transport failure: the seat's server state is unknown,
                // leave the local view untouched.
                drop(state);
                self.notifier
                    .notify(NoticeLevel::Error, &error.user_message("Seat lock failed"));
                Err(SeatingError::Api(error))
            }
        }
    }

    /// Release a selected seat in the open coach. Returns the new price, or
    /// `None` when the seat was not selected.
    pub async fn deselect(&self, seat_number: &str) -> Result<Option<PriceBreakdown>, SeatingError> {
        let (seat, train_id, train, price) = {
            let mut state = self.state.lock().await;
            let snapshot = state.snapshot.as_ref().ok_or(SeatingError::NoCoachOpen)?;
            let seat = SeatRef::new(snapshot.coach_number.clone(), seat_number);
            if !state.selection.remove(&seat) {
                return Ok(None);
            }
            let price = state.recompute();
            (seat, state.train.train_id, state.train.clone(), price)
        };
        self.session.set_selected_train(train).await;

        // Unlock is best-effort; the server-side lock TTL is the backstop.
        if let Err(error) = self.api.unlock_seat(train_id, &seat.coach, &seat.seat).await {
            self.notifier.notify(
                NoticeLevel::Warning,
                &error.user_message("Could not release the seat"),
            );
        }
        Ok(Some(price))
    }

    /// Click handler: deselect when selected, otherwise try to select.
    pub async fn toggle(&self, seat_number: &str) -> Result<SelectOutcome, SeatingError> {
        if let Some(price) = self.deselect(seat_number).await? {
            return Ok(SelectOutcome::Deselected(price));
        }
        self.attempt_select(seat_number).await
    }

    /// The open coach's seats with their render states.
    pub async fn board(&self) -> Result<Vec<(String, SeatView)>, SeatingError> {
        let state = self.state.lock().await;
        let snapshot = state.snapshot.as_ref().ok_or(SeatingError::NoCoachOpen)?;
        Ok(snapshot
            .seats
            .iter()
            .map(|(seat_number, status)| {
                let seat = SeatRef::new(snapshot.coach_number.clone(), seat_number.clone());
                let view = if state.selection.contains(&seat) {
                    SeatView::Selected
                } else if state.pending.contains(&seat) {
                    SeatView::Pending
                } else if *status == SeatStatus::Unavailable || state.denied.contains(&seat) {
                    SeatView::Booked
                } else {
                    SeatView::Available
                };
                (seat_number.clone(), view)
            })
            .collect())
    }

    pub async fn selection(&self) -> Vec<SeatRef> {
        self.state.lock().await.selection.iter().cloned().collect()
    }

    pub async fn total(&self) -> PriceBreakdown {
        let state = self.state.lock().await;
        pricing::quote(state.train.fare, state.train.passengers, state.selection.len())
    }

    /// Hand the selection off to payment. At least one seat is required.
    pub async fn confirm(&self) -> Result<SeatSelectionSummary, SeatingError> {
        let state = self.state.lock().await;
        if state.selection.is_empty() {
            drop(state);
            self.notifier
                .notify(NoticeLevel::Warning, "Please select at least one seat");
            return Err(SeatingError::EmptySelection);
        }
        Ok(SeatSelectionSummary {
            train: state.train.clone(),
            seats: state.selection.iter().cloned().collect(),
            price: pricing::quote(state.train.fare, state.train.passengers, state.selection.len()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SeatingError {
    #[error("No coach is open")]
    NoCoachOpen,

    #[error("Unknown seat: {0}")]
    UnknownSeat(String),

    #[error("Seat {0} is already being locked")]
    SeatPending(String),

    #[error("Seat {0} is not available")]
    SeatUnavailable(String),

    #[error("Please select at least one seat")]
    EmptySelection,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SeatingError {
    pub fn user_message(&self) -> String {
        match self {
            SeatingError::Api(error) => error.user_message("Seat lock failed"),
            other => other.to_string(),
        }
    }
}
