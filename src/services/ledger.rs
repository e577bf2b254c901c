//! Журнал занятых мест сеанса.
//!
//! Производное чтение по броням: место занято, если его перечисляет хотя бы
//! одна бронь в статусе pending, confirmed или paid. Ошибка хранилища
//! никогда не превращается в "всё свободно".

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::data_unavailable;
use crate::error::BookingError;
use crate::models::SeatId;
use crate::store::BookingStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub showtime_id: Uuid,
    pub taken: Vec<SeatId>,
    pub fetched_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    pub fn is_taken(&self, seat: &SeatId) -> bool {
        self.taken.binary_search(seat).is_ok()
    }
}

/// Источник снимков журнала: сервер читает хранилище, клиент ходит по HTTP.
pub trait LedgerSource: Send + Sync {
    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<LedgerSnapshot, BookingError>>;
}

#[derive(Clone)]
pub struct SeatLedger {
    store: Arc<dyn BookingStore>,
}

impl SeatLedger {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self, showtime_id: Uuid) -> Result<LedgerSnapshot, BookingError> {
        self.store
            .find_showtime(showtime_id)
            .await
            .map_err(data_unavailable("find_showtime"))?
            .ok_or(BookingError::NotFound("Showtime"))?;

        let taken = self
            .store
            .taken_seats(showtime_id)
            .await
            .map_err(data_unavailable("taken_seats"))?;

        debug!(%showtime_id, taken = taken.len(), "seat ledger read");
        Ok(LedgerSnapshot {
            showtime_id,
            taken,
            fetched_at: Utc::now(),
        })
    }
}

impl LedgerSource for SeatLedger {
    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<LedgerSnapshot, BookingError>> {
        let ledger = self.clone();
        Box::pin(async move { ledger.snapshot(showtime_id).await })
    }
}
