use serde::Serialize;

/// Flat reservation fee charged per selected seat, in rupees.
pub const SEAT_RESERVATION_FEE: f64 = 50.0;

/// Running total shown during seat selection and carried into payment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub base_fare: f64,
    pub seat_fees: f64,
    pub total: f64,
}

/// Per-passenger fare times party size, plus the flat fee per selected seat.
pub fn quote(fare_per_passenger: f64, passengers: u32, selected_seats: usize) -> PriceBreakdown {
    let base_fare = fare_per_passenger * passengers as f64;
    let seat_fees = SEAT_RESERVATION_FEE * selected_seats as f64;
    PriceBreakdown {
        base_fare,
        seat_fees,
        total: base_fare + seat_fees,
    }
}
