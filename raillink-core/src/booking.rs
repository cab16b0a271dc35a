use crate::{validate, CoreError, CoreResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment instrument collected in the payment stage.
///
/// Card/UPI details are validated client-side and never leave the client;
/// only the method name travels in the booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethod {
    Card {
        number: String,
        expiry: String,
        cvv: String,
    },
    Upi {
        vpa: String,
    },
    NetBanking {
        bank: String,
    },
}

impl PaymentMethod {
    /// The backend's lowercase payment_method value.
    pub fn wire_name(&self) -> &'static str {
        match self {
            PaymentMethod::Card { .. } => "card",
            PaymentMethod::Upi { .. } => "upi",
            PaymentMethod::NetBanking { .. } => "netbanking",
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            PaymentMethod::Card {
                number,
                expiry,
                cvv,
            } => {
                validate::card_number(number)?;
                validate::card_expiry(expiry)?;
                validate::cvv(cvv)
            }
            PaymentMethod::Upi { vpa } => validate::upi_vpa(vpa),
            PaymentMethod::NetBanking { bank } => {
                if bank.trim().is_empty() {
                    Err(CoreError::ValidationError(
                        "Please select your bank".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Booking submission payload; seats are "coach-seat" labels.
///
/// The idempotency key is generated client-side per booking attempt so a
/// double submission cannot create duplicate bookings.
#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest {
    pub user_id: i64,
    pub train_id: i64,
    pub seats: Vec<String>,
    pub date: NaiveDate,
    pub payment_method: String,
    pub idempotency_key: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfirmation {
    pub booking_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// Local record of a completed booking, kept so tracking and alerts can
/// resolve a PNR to a train without a server round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBookingRecord {
    pub booking_id: i64,
    pub pnr: String,
    pub train_id: i64,
    pub train_name: String,
    pub date: NaiveDate,
    pub status: BookingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_are_lowercase() {
        let card = PaymentMethod::Card {
            number: "4539148803436467".to_string(),
            expiry: "12/99".to_string(),
            cvv: "123".to_string(),
        };
        assert_eq!(card.wire_name(), "card");
        assert_eq!(
            PaymentMethod::Upi {
                vpa: "traveller@okaxis".to_string()
            }
            .wire_name(),
            "upi"
        );
        assert_eq!(
            PaymentMethod::NetBanking {
                bank: "sbi".to_string()
            }
            .wire_name(),
            "netbanking"
        );
    }

    #[test]
    fn test_card_validation_dispatch() {
        let good = PaymentMethod::Card {
            number: "4539 1488 0343 6467".to_string(),
            expiry: "12/99".to_string(),
            cvv: "123".to_string(),
        };
        assert!(good.validate().is_ok());

        let bad_checksum = PaymentMethod::Card {
            number: "4539148803436468".to_string(),
            expiry: "12/99".to_string(),
            cvv: "123".to_string(),
        };
        assert!(bad_checksum.validate().is_err());
    }

    #[test]
    fn test_netbanking_requires_a_bank() {
        let missing = PaymentMethod::NetBanking {
            bank: "  ".to_string(),
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_booking_request_wire_shape() {
        let request = BookingRequest {
            user_id: 7001,
            train_id: 12301,
            seats: vec!["A1-12".to_string(), "A1-14".to_string()],
            date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
            payment_method: "card".to_string(),
            idempotency_key: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&request).expect("Failed to serialize");
        assert_eq!(json["seats"][0], "A1-12");
        assert_eq!(json["payment_method"], "card");
        assert!(json["idempotency_key"].is_string());
    }
}
