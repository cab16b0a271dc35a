pub mod app_config;
pub mod http;
pub mod local_store;
pub mod stream;

pub use http::HttpApiClient;
pub use local_store::LocalStore;
pub use stream::{LiveFeed, SseFeedClient};
