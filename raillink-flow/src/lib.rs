pub mod alerts;
pub mod booking;
pub mod notify;
pub mod otp;
pub mod search;
pub mod seating;
pub mod session;

pub use alerts::AlertCenter;
pub use booking::BookingFlow;
pub use notify::{NoticeLevel, Notifier, RecordingNotifier};
pub use otp::PhoneVerification;
pub use search::{SearchStage, TrainOfferView};
pub use seating::{SeatSelectionStage, SeatSelectionSummary, SeatView, SelectOutcome};
pub use session::SessionHandle;
