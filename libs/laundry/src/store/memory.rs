//! In-process slot store
//!
//! All operations run under one async mutex, which gives the same
//! all-or-nothing behaviour as a database transaction and serializes
//! concurrent bookings completely.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;

use crate::error::{SlotError, SlotResult};
use crate::slot::{
    Booking, BookingQuota, NewSlot, Slot, SlotView, StudentContact, ensure_bookable,
    ensure_cancellable, ensure_unbooked, ensure_within_quota,
};
use crate::store::SlotStore;

#[derive(Debug, Default)]
struct State {
    students: BTreeMap<i64, StudentContact>,
    slots: BTreeMap<i64, Slot>,
    next_slot_id: i64,
}

impl State {
    fn view(&self, slot: &Slot) -> SlotView {
        let student_name = slot
            .student_id
            .and_then(|id| self.students.get(&id))
            .map(|s| s.name.clone());

        SlotView {
            id: slot.id,
            booking_date: slot.booking_date,
            booking_day: slot.booking_day.clone(),
            time_slot: slot.time_slot.clone(),
            is_slot_open: slot.is_slot_open,
            student_id: slot.student_id,
            student_name,
        }
    }

    fn sorted_views<'a>(&self, slots: impl Iterator<Item = &'a Slot>) -> Vec<SlotView> {
        let mut views: Vec<SlotView> = slots.map(|slot| self.view(slot)).collect();
        views.sort_by(|a, b| {
            (a.booking_date, &a.time_slot, a.id).cmp(&(b.booking_date, &b.time_slot, b.id))
        });
        views
    }

    fn slot_mut(&mut self, id: i64) -> SlotResult<&mut Slot> {
        self.slots.get_mut(&id).ok_or(SlotError::SlotNotFound(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySlotStore {
    state: Arc<Mutex<State>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a student directory entry
    pub async fn add_student(&self, id: i64, name: impl Into<String>, contact: Option<&str>) {
        let student = StudentContact {
            id,
            name: name.into(),
            contact: contact.map(str::to_string),
        };
        self.state.lock().await.students.insert(id, student);
    }

    /// Current state of one slot
    pub async fn slot(&self, id: i64) -> Option<Slot> {
        self.state.lock().await.slots.get(&id).cloned()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn list_slots(&self) -> SlotResult<Vec<SlotView>> {
        let state = self.state.lock().await;
        Ok(state.sorted_views(state.slots.values()))
    }

    async fn student_bookings(&self, student_id: i64) -> SlotResult<Vec<SlotView>> {
        let state = self.state.lock().await;
        Ok(state.sorted_views(
            state
                .slots
                .values()
                .filter(|slot| slot.student_id == Some(student_id)),
        ))
    }

    async fn create_slot(&self, slot: &NewSlot) -> SlotResult<i64> {
        let mut state = self.state.lock().await;

        let duplicate = state
            .slots
            .values()
            .any(|s| s.booking_date == slot.booking_date && s.time_slot == slot.time_slot);
        if duplicate {
            return Err(SlotError::DuplicateSlot {
                date: slot.booking_date,
                time: slot.time_slot.clone(),
            });
        }

        state.next_slot_id += 1;
        let id = state.next_slot_id;
        state.slots.insert(
            id,
            Slot {
                id,
                booking_date: slot.booking_date,
                booking_day: slot.booking_day.clone(),
                time_slot: slot.time_slot.clone(),
                is_slot_open: slot.is_slot_open,
                student_id: None,
            },
        );
        Ok(id)
    }

    async fn toggle_slot(&self, id: i64) -> SlotResult<bool> {
        let mut state = self.state.lock().await;
        let slot = state.slot_mut(id)?;
        ensure_unbooked(id, slot.student_id)?;

        slot.is_slot_open = !slot.is_slot_open;
        Ok(slot.is_slot_open)
    }

    async fn book_slot(
        &self,
        student_id: i64,
        slot_id: i64,
        quota: BookingQuota,
    ) -> SlotResult<Booking> {
        let mut state = self.state.lock().await;

        let student = state
            .students
            .get(&student_id)
            .cloned()
            .ok_or(SlotError::StudentNotFound(student_id))?;

        let slot = state
            .slots
            .get(&slot_id)
            .ok_or(SlotError::SlotNotFound(slot_id))?;
        ensure_bookable(slot, quota.today)?;

        let this_week = state
            .slots
            .values()
            .filter(|s| s.student_id == Some(student_id) && quota.week.contains(s.booking_date))
            .count();
        ensure_within_quota(this_week as i64, quota.max_per_week)?;

        let slot = state.slot_mut(slot_id)?;
        slot.student_id = Some(student_id);
        slot.is_slot_open = false;

        Ok(Booking {
            slot: slot.clone(),
            student,
        })
    }

    async fn cancel_booking(&self, slot_id: i64, student_id: Option<i64>) -> SlotResult<Slot> {
        let mut state = self.state.lock().await;
        let slot = state.slot_mut(slot_id)?;
        ensure_cancellable(slot, student_id)?;

        slot.student_id = None;
        slot.is_slot_open = true;
        Ok(slot.clone())
    }

    async fn delete_slot(&self, id: i64) -> SlotResult<()> {
        let mut state = self.state.lock().await;
        let slot = state.slot_mut(id)?;
        ensure_unbooked(id, slot.student_id)?;

        state.slots.remove(&id);
        Ok(())
    }

    async fn delete_expired(&self, today: NaiveDate) -> SlotResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.slots.len();
        state.slots.retain(|_, slot| slot.booking_date >= today);
        Ok((before - state.slots.len()) as u64)
    }
}
