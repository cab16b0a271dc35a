pub mod models;
pub mod pii;

pub use models::events::{
    CoachPositionEvent, LiveEvent, RouteDeviationEvent, TrainPositionEvent,
};
pub use pii::Masked;
