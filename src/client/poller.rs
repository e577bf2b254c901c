use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::SeatId;
use crate::services::LedgerSource;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Loading,
    Fresh,
    /// Последнее чтение не удалось; `taken` остался от предыдущего снимка.
    Unavailable(String),
}

/// То, что видит экран выбора мест.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatView {
    pub showtime_id: Uuid,
    pub taken: Vec<SeatId>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub status: PollStatus,
}

/// Периодически перечитывает занятые места сеанса и публикует их в watch-канал.
/// Опрос останавливается, когда poller выброшен.
pub struct SeatPoller {
    rx: watch::Receiver<SeatView>,
    task: JoinHandle<()>,
}

impl SeatPoller {
    pub fn spawn(source: Arc<dyn LedgerSource>, showtime_id: Uuid, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(SeatView {
            showtime_id,
            taken: Vec::new(),
            fetched_at: None,
            status: PollStatus::Loading,
        });

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = source.taken_seats(showtime_id).await;
                tx.send_modify(|view| match result {
                    Ok(snapshot) => {
                        debug!(%showtime_id, taken = snapshot.taken.len(), "seat view refreshed");
                        view.taken = snapshot.taken;
                        view.fetched_at = Some(snapshot.fetched_at);
                        view.status = PollStatus::Fresh;
                    }
                    Err(e) => {
                        warn!(%showtime_id, error = %e, "seat refresh failed, keeping last view");
                        view.status = PollStatus::Unavailable(e.to_string());
                    }
                });
                if tx.is_closed() {
                    break;
                }
            }
        });

        Self { rx, task }
    }

    pub fn current(&self) -> SeatView {
        self.rx.borrow().clone()
    }

    /// Ждёт следующей публикации.
    pub async fn changed(&mut self) -> Option<SeatView> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

impl Drop for SeatPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookingError;
    use crate::services::LedgerSnapshot;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<Result<Vec<&'static str>, BookingError>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Vec<&'static str>, BookingError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                replies: Mutex::new(replies.into()),
            })
        }
    }

    impl LedgerSource for Scripted {
        fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<LedgerSnapshot, BookingError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Ok(vec![]));
            Box::pin(async move {
                reply.map(|seats| LedgerSnapshot {
                    showtime_id,
                    taken: seats.iter().map(|s| s.parse().unwrap()).collect(),
                    fetched_at: Utc::now(),
                })
            })
        }
    }

    fn seats(ids: &[&str]) -> Vec<SeatId> {
        ids.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_interval() {
        let source = Scripted::new(vec![Ok(vec!["C7"]), Ok(vec!["C7", "C8"])]);
        let mut poller = SeatPoller::spawn(source.clone(), Uuid::new_v4(), POLL_INTERVAL);

        let first = poller.changed().await.unwrap();
        assert_eq!(first.status, PollStatus::Fresh);
        assert_eq!(first.taken, seats(&["C7"]));

        let started = tokio::time::Instant::now();
        let second = poller.changed().await.unwrap();
        assert_eq!(second.taken, seats(&["C7", "C8"]));
        assert!(started.elapsed() >= POLL_INTERVAL);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_last_known_taken_seats() {
        let source = Scripted::new(vec![Ok(vec!["A1", "A2"]), Err(BookingError::DataUnavailable)]);
        let mut poller = SeatPoller::spawn(source, Uuid::new_v4(), POLL_INTERVAL);

        poller.changed().await.unwrap();
        let degraded = poller.changed().await.unwrap();
        assert_eq!(degraded.taken, seats(&["A1", "A2"]));
        assert!(matches!(degraded.status, PollStatus::Unavailable(_)));
        assert_eq!(poller.current(), degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poller_stops_requests() {
        let source = Scripted::new(vec![]);
        let mut poller = SeatPoller::spawn(source.clone(), Uuid::new_v4(), POLL_INTERVAL);
        poller.changed().await.unwrap();
        drop(poller);

        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(POLL_INTERVAL * 4).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }
}
