//! Slot model and the booking rules both stores enforce

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{SlotError, SlotResult};

/// A bookable laundry time window as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub booking_date: NaiveDate,
    pub booking_day: String,
    pub time_slot: String,
    pub is_slot_open: bool,
    pub student_id: Option<i64>,
}

/// A slot joined with the display name of the student holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub id: i64,
    pub booking_date: NaiveDate,
    pub booking_day: String,
    pub time_slot: String,
    pub is_slot_open: bool,
    pub student_id: Option<i64>,
    pub student_name: Option<String>,
}

/// A validated slot ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    pub booking_date: NaiveDate,
    pub booking_day: String,
    pub time_slot: String,
    pub is_slot_open: bool,
}

impl NewSlot {
    /// Open slot at `time_slot` on `date`, with the weekday filled in
    pub fn open(date: NaiveDate, time_slot: impl Into<String>) -> Self {
        Self {
            booking_date: date,
            booking_day: weekday_name(date.weekday()).to_string(),
            time_slot: time_slot.into(),
            is_slot_open: true,
        }
    }
}

/// The directory fields the manager reads for a student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentContact {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
}

/// A committed booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub slot: Slot,
    pub student: StudentContact,
}

/// Monday-based calendar week, `start` inclusive and `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Week {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Week {
    pub fn containing(date: NaiveDate) -> Self {
        let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// Booking parameters handed to the store for a single booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingQuota {
    /// Slots dated before this day have expired
    pub today: NaiveDate,
    pub max_per_week: u32,
    pub week: Week,
    /// Lock the student row as well as the slot row
    pub serialize_per_student: bool,
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Toggle and delete only touch slots nobody holds
pub fn ensure_unbooked(id: i64, student_id: Option<i64>) -> SlotResult<()> {
    match student_id {
        Some(_) => Err(SlotError::SlotBooked(id)),
        None => Ok(()),
    }
}

/// A slot can be booked only while open, unassigned and not expired
pub fn ensure_bookable(slot: &Slot, today: NaiveDate) -> SlotResult<()> {
    if !slot.is_slot_open || slot.student_id.is_some() || slot.booking_date < today {
        return Err(SlotError::SlotClosed(slot.id));
    }
    Ok(())
}

pub fn ensure_within_quota(bookings_this_week: i64, limit: u32) -> SlotResult<()> {
    if bookings_this_week >= i64::from(limit) {
        return Err(SlotError::QuotaExceeded { limit });
    }
    Ok(())
}

/// Cancel needs a current booking, held by `expected` when one is given
pub fn ensure_cancellable(slot: &Slot, expected: Option<i64>) -> SlotResult<()> {
    match (slot.student_id, expected) {
        (None, _) => Err(SlotError::NotBooked(slot.id)),
        (Some(holder), Some(expected)) if holder != expected => Err(SlotError::NotBooked(slot.id)),
        _ => Ok(()),
    }
}
