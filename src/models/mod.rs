pub mod seat;
pub mod booking;
pub mod showtime;

pub use seat::{SeatId, SeatIdError, SeatMap};
pub use booking::{Booking, BookingStatus, PaymentMethod};
pub use showtime::Showtime;
