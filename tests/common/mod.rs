#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use cinema_booking::config::Config;
use cinema_booking::locks::{LocalShowtimeLocks, ShowtimeLocks};
use cinema_booking::middleware::AuthUser;
use cinema_booking::models::{Booking, PaymentMethod, SeatId, Showtime};
use cinema_booking::services::notification::{BookingConfirmation, Notifier, NotifyError};
use cinema_booking::services::payment::{ChargeRequest, GatewayError, GatewayOutcome, PaymentGateway};
use cinema_booking::services::{FinalizeRequest, NewBooking};
use cinema_booking::store::{BookingStore, MemoryBookingStore};
use cinema_booking::{AppState, Backends};

pub const JWT_SECRET: &str = "integration-secret";
pub const TICKET_PRICE: i64 = 250;

#[derive(Debug, Clone)]
pub enum Script {
    Approve,
    Decline,
    Fail,
    /// Не отвечает дольше любого разумного таймаута.
    Hang,
}

/// Шлюз с заранее заданными ответами; по умолчанию одобряет.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Script>>,
    delay: Duration,
    pub charges: AtomicUsize,
    pub amounts: Mutex<Vec<i64>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    pub fn with_delay(script: Vec<Script>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay,
            charges: AtomicUsize::new(0),
            amounts: Mutex::new(Vec::new()),
        })
    }

    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for ScriptedGateway {
    fn charge(&self, request: ChargeRequest) -> BoxFuture<'static, Result<GatewayOutcome, GatewayError>> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.amounts.lock().unwrap().push(request.amount);
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Approve);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match step {
                Script::Approve => Ok(GatewayOutcome::Approved {
                    transaction_id: format!("TXN_TEST_{}", request.booking_id.simple()),
                }),
                Script::Decline => Ok(GatewayOutcome::Declined {
                    reason: "card declined".to_string(),
                }),
                Script::Fail => Err(GatewayError::InvalidResponse("boom".to_string())),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(GatewayError::InvalidResponse("hung".to_string()))
                }
            }
        })
    }
}

pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<BookingConfirmation>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, confirmation: BookingConfirmation) -> BoxFuture<'static, Result<(), NotifyError>> {
        let _ = self.tx.send(confirmation);
        Box::pin(async { Ok(()) })
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: MemoryBookingStore,
    pub gateway: Arc<ScriptedGateway>,
    pub notifications: mpsc::UnboundedReceiver<BookingConfirmation>,
    pub showtime: Showtime,
}

pub fn showtime() -> Showtime {
    Showtime {
        id: Uuid::new_v4(),
        movie_id: Uuid::new_v4(),
        theater_id: Uuid::new_v4(),
        show_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        show_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
        price: TICKET_PRICE,
    }
}

pub async fn harness(gateway: Arc<ScriptedGateway>) -> Harness {
    harness_with(Config::in_memory(JWT_SECRET), gateway).await
}

pub async fn harness_with(config: Config, gateway: Arc<ScriptedGateway>) -> Harness {
    let store = MemoryBookingStore::new();
    let showtime = showtime();
    store.insert_showtime(showtime.clone()).await;

    let (state, notifications) = app(
        config,
        Arc::new(store.clone()),
        Arc::new(LocalShowtimeLocks::new()),
        gateway.clone(),
    );

    Harness {
        state,
        store,
        gateway,
        notifications,
        showtime,
    }
}

/// Приложение поверх произвольного хранилища и блокировок.
pub fn app(
    config: Config,
    store: Arc<dyn BookingStore>,
    locks: Arc<dyn ShowtimeLocks>,
    gateway: Arc<ScriptedGateway>,
) -> (Arc<AppState>, mpsc::UnboundedReceiver<BookingConfirmation>) {
    let (tx, notifications) = mpsc::unbounded_channel();
    let state = AppState::from_parts(
        config,
        Backends {
            store,
            locks,
            gateway,
            notifier: Arc::new(ChannelNotifier { tx }),
            redis: None,
        },
    );
    (state, notifications)
}

pub async fn book_on(state: &AppState, showtime_id: Uuid, who: &AuthUser, ids: &[&str]) -> Booking {
    state
        .intents
        .create_booking(
            who,
            NewBooking {
                showtime_id,
                seat_ids: seats(ids),
                seat_count: ids.len() as u32,
                total_amount: TICKET_PRICE * ids.len() as i64,
            },
        )
        .await
        .unwrap()
}

/// Оплата ровно той суммы, которую ждёт сервер.
pub fn full_payment(booking: &Booking) -> FinalizeRequest {
    FinalizeRequest {
        booking_id: booking.id,
        amount: booking.expected_charge() as f64,
        payment_method: PaymentMethod::Debit,
        movie_title: Some("Interstellar".to_string()),
        seat_count: Some(booking.seat_count),
        show_date: Some("2025-03-14".to_string()),
    }
}

pub fn user(id: &str) -> AuthUser {
    AuthUser { user_id: id.to_string() }
}

pub fn seats(ids: &[&str]) -> Vec<SeatId> {
    ids.iter().map(|s| s.parse().unwrap()).collect()
}
