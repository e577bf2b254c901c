use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{BookingStore, CancelOutcome, CommitOutcome, StoreError, StoreResult};
use crate::models::{Booking, BookingStatus, SeatId, Showtime};

const BOOKING_COLUMNS: &str = "id, user_id, showtime_id, seat_ids, seat_count, total_amount, \
                               status, transaction_id, created_at, updated_at";

// Ограничение на размер одной пачки для фоновой очистки
const STALE_BATCH: i64 = 500;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    showtime_id: Uuid,
    seat_ids: Vec<String>,
    seat_count: i32,
    total_amount: i64,
    status: String,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: row.id, reason };
        let seat_ids = parse_seats(&row.seat_ids).map_err(&corrupt)?;
        let status = row.status.parse::<BookingStatus>().map_err(&corrupt)?;
        let seat_count = u32::try_from(row.seat_count)
            .map_err(|_| corrupt(format!("negative seat_count {}", row.seat_count)))?;

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            showtime_id: row.showtime_id,
            seat_ids,
            seat_count,
            total_amount: row.total_amount,
            status,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_seats(raw: &[String]) -> Result<Vec<SeatId>, String> {
    raw.iter()
        .map(|s| s.parse::<SeatId>().map_err(|e| format!("seat '{}': {}", s, e)))
        .collect()
}

fn seat_strings(seats: &[SeatId]) -> Vec<String> {
    seats.iter().map(ToString::to_string).collect()
}

fn parse_seat_column(raw: Vec<String>, context: Uuid) -> StoreResult<Vec<SeatId>> {
    let mut seats = parse_seats(&raw).map_err(|reason| StoreError::Corrupt { id: context, reason })?;
    seats.sort();
    seats.dedup();
    Ok(seats)
}

async fn lock_booking_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking_id: Uuid,
) -> StoreResult<Option<Booking>> {
    let row: Option<BookingRow> = sqlx::query_as(&format!(
        "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
        BOOKING_COLUMNS
    ))
    .bind(booking_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Booking::try_from).transpose()
}

impl BookingStore for PgBookingStore {
    fn find_showtime(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Showtime>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let showtime = sqlx::query_as::<_, Showtime>(
                "SELECT id, movie_id, theater_id, show_date, show_time, price
                 FROM showtimes
                 WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&pool)
            .await?;
            Ok(showtime)
        })
    }

    fn insert_booking(&self, booking: Booking) -> BoxFuture<'static, StoreResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let seats = seat_strings(&booking.seat_ids);
            let mut tx = pool.begin().await?;

            sqlx::query(
                "INSERT INTO bookings
                     (id, user_id, showtime_id, seat_ids, seat_count, total_amount, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(booking.id)
            .bind(&booking.user_id)
            .bind(booking.showtime_id)
            .bind(seats.clone())
            .bind(booking.seat_count as i32)
            .bind(booking.total_amount)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await?;

            // Уже занятые места остаются за прежним владельцем, вставка не падает
            sqlx::query(
                "INSERT INTO seat_locks (showtime_id, seat_id, booking_id)
                 SELECT $1, seat, $2 FROM UNNEST($3::text[]) AS seat
                 ON CONFLICT (showtime_id, seat_id) DO NOTHING",
            )
            .bind(booking.showtime_id)
            .bind(booking.id)
            .bind(seats)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
    }

    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Booking>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let row: Option<BookingRow> = sqlx::query_as(&format!(
                "SELECT {} FROM bookings WHERE id = $1",
                BOOKING_COLUMNS
            ))
            .bind(id)
            .fetch_optional(&pool)
            .await?;
            row.map(Booking::try_from).transpose()
        })
    }

    fn list_user_bookings(&self, user_id: String) -> BoxFuture<'static, StoreResult<Vec<Booking>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
                BOOKING_COLUMNS
            ))
            .bind(&user_id)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(Booking::try_from).collect()
        })
    }

    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<SeatId>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let raw: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT seat
                 FROM bookings, UNNEST(seat_ids) AS seat
                 WHERE showtime_id = $1
                   AND status IN ('pending', 'confirmed', 'paid')",
            )
            .bind(showtime_id)
            .fetch_all(&pool)
            .await?;
            parse_seat_column(raw, showtime_id)
        })
    }

    fn claim_seats(&self, booking: Booking) -> BoxFuture<'static, StoreResult<Vec<SeatId>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let seats = seat_strings(&booking.seat_ids);
            let mut tx = pool.begin().await?;

            sqlx::query(
                "INSERT INTO seat_locks (showtime_id, seat_id, booking_id)
                 SELECT $1, seat, $2 FROM UNNEST($3::text[]) AS seat
                 ON CONFLICT (showtime_id, seat_id) DO NOTHING",
            )
            .bind(booking.showtime_id)
            .bind(booking.id)
            .bind(seats.clone())
            .execute(&mut *tx)
            .await?;

            let foreign_locks: Vec<String> = sqlx::query_scalar(
                "SELECT seat_id FROM seat_locks
                 WHERE showtime_id = $1 AND seat_id = ANY($2) AND booking_id <> $3
                 FOR UPDATE",
            )
            .bind(booking.showtime_id)
            .bind(seats.clone())
            .bind(booking.id)
            .fetch_all(&mut *tx)
            .await?;

            // Оплаченные брони конфликтуют всегда, даже без записи в seat_locks
            let paid_elsewhere: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT seat
                 FROM bookings, UNNEST(seat_ids) AS seat
                 WHERE showtime_id = $1
                   AND id <> $2
                   AND status IN ('confirmed', 'paid')
                   AND seat = ANY($3)",
            )
            .bind(booking.showtime_id)
            .bind(booking.id)
            .bind(seats)
            .fetch_all(&mut *tx)
            .await?;

            tx.commit().await?;

            let conflicts: BTreeSet<String> = foreign_locks.into_iter().chain(paid_elsewhere).collect();
            parse_seat_column(conflicts.into_iter().collect(), booking.id)
        })
    }

    fn commit_payment(
        &self,
        booking_id: Uuid,
        transaction_id: String,
    ) -> BoxFuture<'static, StoreResult<CommitOutcome>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await?;

            let booking = match lock_booking_row(&mut tx, booking_id).await? {
                Some(b) => b,
                None => return Ok(CommitOutcome::Missing),
            };
            match booking.status {
                BookingStatus::Pending => {}
                BookingStatus::Paid | BookingStatus::Confirmed => return Ok(CommitOutcome::AlreadyPaid),
                BookingStatus::Cancelled => return Ok(CommitOutcome::Cancelled),
            }

            let owned: Vec<String> = sqlx::query_scalar(
                "SELECT seat_id FROM seat_locks
                 WHERE showtime_id = $1 AND booking_id = $2 AND seat_id = ANY($3)
                 FOR SHARE",
            )
            .bind(booking.showtime_id)
            .bind(booking.id)
            .bind(seat_strings(&booking.seat_ids))
            .fetch_all(&mut *tx)
            .await?;

            let owned = parse_seat_column(owned, booking.id)?;
            let lost: Vec<SeatId> = booking
                .seat_ids
                .iter()
                .filter(|seat| !owned.contains(seat))
                .cloned()
                .collect();
            if !lost.is_empty() {
                tx.rollback().await?;
                return Ok(CommitOutcome::SeatsLost(lost));
            }

            let row: BookingRow = sqlx::query_as(&format!(
                "UPDATE bookings
                 SET status = 'paid', transaction_id = $2, updated_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                BOOKING_COLUMNS
            ))
            .bind(booking_id)
            .bind(&transaction_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(CommitOutcome::Committed(Booking::try_from(row)?))
        })
    }

    fn cancel_pending(&self, booking_id: Uuid) -> BoxFuture<'static, StoreResult<CancelOutcome>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let mut tx = pool.begin().await?;

            let booking = match lock_booking_row(&mut tx, booking_id).await? {
                Some(b) => b,
                None => return Ok(CancelOutcome::Missing),
            };
            if booking.status != BookingStatus::Pending {
                return Ok(CancelOutcome::NotPending(booking.status));
            }

            sqlx::query("UPDATE bookings SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
                .bind(booking_id)
                .execute(&mut *tx)
                .await?;

            let released: Vec<String> =
                sqlx::query_scalar("DELETE FROM seat_locks WHERE booking_id = $1 RETURNING seat_id")
                    .bind(booking_id)
                    .fetch_all(&mut *tx)
                    .await?;

            tx.commit().await?;
            Ok(CancelOutcome::Cancelled(parse_seat_column(released, booking_id)?))
        })
    }

    fn stale_pending(&self, older_than: DateTime<Utc>) -> BoxFuture<'static, StoreResult<Vec<Booking>>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let rows: Vec<BookingRow> = sqlx::query_as(&format!(
                "SELECT {} FROM bookings
                 WHERE status = 'pending' AND created_at < $1
                 ORDER BY created_at
                 LIMIT $2",
                BOOKING_COLUMNS
            ))
            .bind(older_than)
            .bind(STALE_BATCH)
            .fetch_all(&pool)
            .await?;
            rows.into_iter().map(Booking::try_from).collect()
        })
    }
}
