use serde::{Deserialize, Serialize};

/// Query submitted to the train search endpoint.
///
/// Wire names follow the backend contract ("from"/"to").
#[derive(Debug, Clone, Serialize)]
pub struct TrainQuery {
    #[serde(rename = "from")]
    pub origin: String,
    #[serde(rename = "to")]
    pub destination: String,
    pub date: chrono::NaiveDate,
    pub passengers: u32,
}

/// One train offer returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainOffer {
    pub id: i64,
    pub name: String,
    #[serde(rename = "from")]
    pub origin: String,
    #[serde(rename = "to")]
    pub destination: String,
    pub departure: String,
    pub arrival: String,
    pub duration: String,
    pub price: f64,
    pub available_seats: i32,
}

impl TrainOffer {
    /// Total base fare for the whole party, as shown on the result card.
    pub fn total_fare(&self, passengers: u32) -> f64 {
        self.price * passengers as f64
    }
}
