pub mod animator;
pub mod map;
pub mod monitor;
pub mod route;

pub use animator::TrainAnimator;
pub use map::{provider_from_config, MapProvider, StaticMapProvider, StaticMapStyle};
pub use monitor::{JourneyMonitor, JourneyView, StationState, StationStop, StopStatus};
pub use route::{GeoPoint, RoutePath};
