//! Slot persistence
//!
//! Each [`SlotStore`] method is one atomic unit: either everything it changes
//! is committed or nothing is. Callers pass "today" and the current [`Week`]
//! explicitly so every store applies the same calendar.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::SlotResult;
use crate::slot::{Booking, BookingQuota, NewSlot, Slot, SlotView};

pub mod memory;
pub mod postgres;

pub use memory::MemorySlotStore;
pub use postgres::PgSlotStore;

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// All slots ordered by `(booking_date, time_slot)`
    async fn list_slots(&self) -> SlotResult<Vec<SlotView>>;

    /// Slots currently held by `student_id`, same order as [`SlotStore::list_slots`]
    async fn student_bookings(&self, student_id: i64) -> SlotResult<Vec<SlotView>>;

    /// Insert unless a slot exists for the same date and time; returns the new id
    async fn create_slot(&self, slot: &NewSlot) -> SlotResult<i64>;

    /// Flip `is_slot_open` on an unbooked slot; returns the new value
    async fn toggle_slot(&self, id: i64) -> SlotResult<bool>;

    /// Assign `slot_id` to `student_id` if the slot is open and the quota allows it
    async fn book_slot(
        &self,
        student_id: i64,
        slot_id: i64,
        quota: BookingQuota,
    ) -> SlotResult<Booking>;

    /// Clear the booking on `slot_id` and reopen it
    async fn cancel_booking(&self, slot_id: i64, student_id: Option<i64>) -> SlotResult<Slot>;

    /// Remove an unbooked slot
    async fn delete_slot(&self, id: i64) -> SlotResult<()>;

    /// Remove every slot dated before `today`, booked or not; returns the count
    async fn delete_expired(&self, today: NaiveDate) -> SlotResult<u64>;
}
