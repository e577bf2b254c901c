//! Клиентская часть: выбор мест, опрос журнала, экран выбора и HTTP-клиент API.

pub mod api;
pub mod poller;
pub mod selector;
pub mod session;

pub use api::{ApiClient, ClientError, CreateBooking, PaymentRequest, PaymentResult};
pub use poller::{PollStatus, SeatPoller, SeatView, POLL_INTERVAL};
pub use selector::{SeatSelector, ToggleOutcome};
pub use session::{SeatSession, SessionUpdate};
