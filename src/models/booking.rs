use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::SeatId;

/// Сервисный сбор, который добавляется к стоимости билетов при оплате.
pub const SERVICE_FEE_PERCENT: i64 = 5;
/// Допустимое расхождение суммы из-за округления на клиенте.
pub const AMOUNT_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Статусы, в которых бронь занимает свои места.
    pub fn holds_seats(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "paid" => Ok(BookingStatus::Paid),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub showtime_id: Uuid,
    pub seat_ids: Vec<SeatId>,
    pub seat_count: u32,
    pub total_amount: i64,
    pub status: BookingStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Новая бронь в статусе pending. Места сортируются в канонический порядок.
    pub fn new_pending(
        user_id: String,
        showtime_id: Uuid,
        mut seat_ids: Vec<SeatId>,
        total_amount: i64,
    ) -> Self {
        seat_ids.sort();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            showtime_id,
            seat_count: seat_ids.len() as u32,
            seat_ids,
            total_amount,
            status: BookingStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Сумма к оплате: стоимость билетов + сервисный сбор, округлённый до целого.
    pub fn expected_charge(&self) -> i64 {
        expected_charge(self.total_amount)
    }

    pub fn lists_seat(&self, seat: &SeatId) -> bool {
        self.seat_ids.contains(seat)
    }
}

/// `total + round(total * 5%)`, половина округляется вверх.
pub fn expected_charge(total_amount: i64) -> i64 {
    let fee = (total_amount * SERVICE_FEE_PERCENT + 50).div_euclid(100);
    total_amount + fee
}

pub fn amount_matches(claimed: f64, expected: i64) -> bool {
    claimed.is_finite() && (claimed - expected as f64).abs() <= AMOUNT_TOLERANCE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Debit,
    Credit,
    Upi,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Debit => "debit",
            PaymentMethod::Credit => "credit",
            PaymentMethod::Upi => "upi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Debit => "Debit Card",
            PaymentMethod::Credit => "Credit Card",
            PaymentMethod::Upi => "UPI",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_fee_rounds_half_up() {
        assert_eq!(expected_charge(100), 105);
        assert_eq!(expected_charge(10), 11); // 0.5 -> 1
        assert_eq!(expected_charge(9), 9); // 0.45 -> 0
        assert_eq!(expected_charge(250), 263); // 12.5 -> 13
        assert_eq!(expected_charge(0), 0);
    }

    #[test]
    fn amount_tolerance_is_one_unit() {
        assert!(amount_matches(105.0, 105));
        assert!(amount_matches(104.0, 105));
        assert!(amount_matches(106.0, 105));
        assert!(amount_matches(105.4, 105));
        assert!(!amount_matches(103.9, 105));
        assert!(!amount_matches(106.5, 105));
        assert!(!amount_matches(f64::NAN, 105));
    }

    #[test]
    fn new_pending_sorts_seats_and_counts_them() {
        let seats = vec!["C8".parse().unwrap(), "C10".parse().unwrap(), "A1".parse().unwrap()];
        let booking = Booking::new_pending("user-1".into(), Uuid::new_v4(), seats, 300);
        let shown: Vec<String> = booking.seat_ids.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["A1", "C8", "C10"]);
        assert_eq!(booking.seat_count, 3);
        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.lists_seat(&"C10".parse().unwrap()));
    }

    #[test]
    fn status_round_trips_through_storage_names() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Paid,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>(), Ok(status));
        }
        assert!("refunded".parse::<BookingStatus>().is_err());
        assert!(!BookingStatus::Cancelled.holds_seats());
        assert!(BookingStatus::Confirmed.holds_seats());
    }
}
