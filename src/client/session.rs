//! Экран выбора мест: селектор, который следует за опросом журнала.
//!
//! Пока последнее чтение не удалось, новые места не выбираются: неизвестное
//! состояние не считается свободным. Снять выбор можно всегда.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::poller::{PollStatus, SeatPoller};
use super::selector::{SeatSelector, ToggleOutcome};
use crate::models::SeatId;
use crate::services::LedgerSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpdate {
    /// Выбранные места, которые оказались заняты.
    pub dropped: Vec<SeatId>,
    pub status: PollStatus,
}

pub struct SeatSession {
    showtime_id: Uuid,
    selector: SeatSelector,
    poller: SeatPoller,
    status: PollStatus,
}

impl SeatSession {
    pub fn start(
        source: Arc<dyn LedgerSource>,
        showtime_id: Uuid,
        selector: SeatSelector,
        interval: Duration,
    ) -> Self {
        Self {
            showtime_id,
            selector,
            poller: SeatPoller::spawn(source, showtime_id, interval),
            status: PollStatus::Loading,
        }
    }

    pub fn status(&self) -> &PollStatus {
        &self.status
    }

    pub fn selector(&self) -> &SeatSelector {
        &self.selector
    }

    pub fn selection(&self) -> Vec<SeatId> {
        self.selector.current_selection()
    }

    /// Ждёт следующего опроса и переносит свежие занятые места в селектор.
    /// `None`, если опрос остановлен.
    pub async fn refresh(&mut self) -> Option<SessionUpdate> {
        let view = self.poller.changed().await?;
        let dropped = match view.status {
            PollStatus::Fresh => self.selector.apply_snapshot(view.taken),
            _ => Vec::new(),
        };
        if !dropped.is_empty() {
            info!(
                showtime_id = %self.showtime_id,
                dropped = ?dropped.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Selected seats were taken elsewhere"
            );
        }
        self.status = view.status;
        Some(SessionUpdate {
            dropped,
            status: self.status.clone(),
        })
    }

    pub fn toggle(&mut self, seat: SeatId) -> ToggleOutcome {
        if self.status != PollStatus::Fresh && !self.selector.is_selected(&seat) {
            return ToggleOutcome::Ignored;
        }
        self.selector.toggle(seat)
    }

    /// Можно переходить к созданию брони: выбрано K мест по свежему снимку.
    pub fn can_book(&self) -> bool {
        self.status == PollStatus::Fresh && self.selector.is_complete()
    }
}
