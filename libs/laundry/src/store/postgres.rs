//! PostgreSQL slot store
//!
//! Read-modify-write operations lock the target slot row with
//! `SELECT ... FOR UPDATE` inside a transaction, so two requests touching the
//! same slot run one after the other. Inserts rely on the
//! `(booking_date, time_slot)` unique constraint to turn a lost race into a
//! [`SlotError::DuplicateSlot`]. A transaction dropped without `commit` is
//! rolled back by sqlx.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::{error, info};

use crate::error::{SlotError, SlotResult};
use crate::slot::{
    Booking, BookingQuota, NewSlot, Slot, SlotView, StudentContact, ensure_bookable,
    ensure_cancellable, ensure_unbooked, ensure_within_quota,
};
use crate::store::SlotStore;

const VIEW_COLUMNS: &str = r#"
    w.id, w.booking_date, w.booking_day, w.time_slot, w.is_slot_open,
    w.student_id, s.name AS student_name
"#;

#[derive(Clone)]
pub struct PgSlotStore {
    pool: PgPool,
}

impl PgSlotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_slot(
        tx: &mut Transaction<'static, Postgres>,
        id: i64,
    ) -> SlotResult<Slot> {
        let row = sqlx::query(
            r#"
            SELECT id, booking_date, booking_day, time_slot, is_slot_open, student_id
            FROM washing_slots
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(|row| slot_from_row(&row))
            .ok_or(SlotError::SlotNotFound(id))
    }

    async fn find_student(
        tx: &mut Transaction<'static, Postgres>,
        id: i64,
        lock: bool,
    ) -> SlotResult<StudentContact> {
        let sql = if lock {
            "SELECT id, name, contact FROM students WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, name, contact FROM students WHERE id = $1"
        };

        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        row.map(|row| StudentContact {
            id: row.get("id"),
            name: row.get("name"),
            contact: row.get("contact"),
        })
        .ok_or(SlotError::StudentNotFound(id))
    }
}

fn slot_from_row(row: &PgRow) -> Slot {
    Slot {
        id: row.get("id"),
        booking_date: row.get("booking_date"),
        booking_day: row.get("booking_day"),
        time_slot: row.get("time_slot"),
        is_slot_open: row.get("is_slot_open"),
        student_id: row.get("student_id"),
    }
}

fn view_from_row(row: &PgRow) -> SlotView {
    SlotView {
        id: row.get("id"),
        booking_date: row.get("booking_date"),
        booking_day: row.get("booking_day"),
        time_slot: row.get("time_slot"),
        is_slot_open: row.get("is_slot_open"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
    }
}

/// Map constraint violations that slipped past the application checks
fn translate(
    err: sqlx::Error,
    on_unique: impl FnOnce() -> SlotError,
    on_foreign_key: impl FnOnce() -> SlotError,
) -> SlotError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return on_unique();
        }
        if db.is_foreign_key_violation() {
            return on_foreign_key();
        }
    }
    error!("Slot store query failed: {}", err);
    SlotError::Store(err)
}

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn list_slots(&self) -> SlotResult<Vec<SlotView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VIEW_COLUMNS}
            FROM washing_slots w
            LEFT JOIN students s ON w.student_id = s.id
            ORDER BY w.booking_date, w.time_slot, w.id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(view_from_row).collect())
    }

    async fn student_bookings(&self, student_id: i64) -> SlotResult<Vec<SlotView>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VIEW_COLUMNS}
            FROM washing_slots w
            LEFT JOIN students s ON w.student_id = s.id
            WHERE w.student_id = $1
            ORDER BY w.booking_date, w.time_slot, w.id
            "#
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(view_from_row).collect())
    }

    async fn create_slot(&self, slot: &NewSlot) -> SlotResult<i64> {
        let duplicate = || SlotError::DuplicateSlot {
            date: slot.booking_date,
            time: slot.time_slot.clone(),
        };

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT id FROM washing_slots WHERE booking_date = $1 AND time_slot = $2",
        )
        .bind(slot.booking_date)
        .bind(&slot.time_slot)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(duplicate());
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO washing_slots (booking_date, booking_day, time_slot, is_slot_open)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(slot.booking_date)
        .bind(&slot.booking_day)
        .bind(&slot.time_slot)
        .bind(slot.is_slot_open)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| translate(e, duplicate, duplicate))?;

        tx.commit().await.map_err(|e| translate(e, duplicate, duplicate))?;

        info!("Created slot {} for {} {}", id, slot.booking_date, slot.time_slot);
        Ok(id)
    }

    async fn toggle_slot(&self, id: i64) -> SlotResult<bool> {
        let mut tx = self.pool.begin().await?;

        let slot = Self::lock_slot(&mut tx, id).await?;
        ensure_unbooked(id, slot.student_id)?;

        let new_state = !slot.is_slot_open;
        let updated = sqlx::query(
            "UPDATE washing_slots SET is_slot_open = $1 WHERE id = $2 AND student_id IS NULL",
        )
        .bind(new_state)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(SlotError::SlotBooked(id));
        }

        tx.commit().await?;
        Ok(new_state)
    }

    async fn book_slot(
        &self,
        student_id: i64,
        slot_id: i64,
        quota: BookingQuota,
    ) -> SlotResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let student = Self::find_student(&mut tx, student_id, quota.serialize_per_student).await?;
        let slot = Self::lock_slot(&mut tx, slot_id).await?;
        ensure_bookable(&slot, quota.today)?;

        let this_week: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM washing_slots
            WHERE student_id = $1 AND booking_date >= $2 AND booking_date < $3
            "#,
        )
        .bind(student_id)
        .bind(quota.week.start)
        .bind(quota.week.end)
        .fetch_one(&mut *tx)
        .await?;
        ensure_within_quota(this_week, quota.max_per_week)?;

        let row = sqlx::query(
            r#"
            UPDATE washing_slots
            SET student_id = $1, is_slot_open = FALSE
            WHERE id = $2 AND student_id IS NULL AND is_slot_open AND booking_date >= $3
            RETURNING id, booking_date, booking_day, time_slot, is_slot_open, student_id
            "#,
        )
        .bind(student_id)
        .bind(slot_id)
        .bind(quota.today)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            translate(
                e,
                || SlotError::SlotClosed(slot_id),
                || SlotError::StudentNotFound(student_id),
            )
        })?
        .ok_or(SlotError::SlotClosed(slot_id))?;

        tx.commit().await?;

        Ok(Booking {
            slot: slot_from_row(&row),
            student,
        })
    }

    async fn cancel_booking(&self, slot_id: i64, student_id: Option<i64>) -> SlotResult<Slot> {
        let mut tx = self.pool.begin().await?;

        let slot = Self::lock_slot(&mut tx, slot_id).await?;
        ensure_cancellable(&slot, student_id)?;

        let row = sqlx::query(
            r#"
            UPDATE washing_slots
            SET student_id = NULL, is_slot_open = TRUE
            WHERE id = $1
            RETURNING id, booking_date, booking_day, time_slot, is_slot_open, student_id
            "#,
        )
        .bind(slot_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(slot_from_row(&row))
    }

    async fn delete_slot(&self, id: i64) -> SlotResult<()> {
        let mut tx = self.pool.begin().await?;

        let slot = Self::lock_slot(&mut tx, id).await?;
        ensure_unbooked(id, slot.student_id)?;

        let deleted = sqlx::query("DELETE FROM washing_slots WHERE id = $1 AND student_id IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(SlotError::SlotBooked(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_expired(&self, today: NaiveDate) -> SlotResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM washing_slots WHERE booking_date < $1")
            .bind(today)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected())
    }
}
