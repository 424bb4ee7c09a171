//! Input validation for slot requests
//!
//! Every parser collects all field problems before failing, so a caller gets
//! the full list of invalid fields in one [`SlotError::Validation`].

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{FieldError, SlotError, SlotResult};
use crate::slot::{NewSlot, weekday_name};

/// Raw create-slot input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotDraft {
    pub booking_date: Option<String>,
    pub booking_day: Option<String>,
    pub time_slot: Option<String>,
    pub is_slot_open: Option<bool>,
}

/// Raw booking input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingDraft {
    pub student_id: Option<i64>,
    pub slot_id: Option<i64>,
}

/// Raw manual notification input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoticeDraft {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub day: Option<String>,
    pub time: Option<String>,
}

/// A validated manual booking notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingNotice {
    pub name: String,
    pub contact: String,
    pub day: String,
    pub time: String,
}

/// `HH:MM`, 24-hour clock
pub fn is_valid_time(time: &str) -> bool {
    static TIME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TIME_REGEX
        .get_or_init(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("Failed to compile time regex"));

    regex.is_match(time)
}

/// Calendar date in `YYYY-MM-DD` form
pub fn parse_date(field: &'static str, value: Option<&str>) -> Result<NaiveDate, FieldError> {
    let value = match value.map(str::trim) {
        None | Some("") => return Err(FieldError::new(field, "is required")),
        Some(value) => value,
    };

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| FieldError::new(field, "must be a valid date (YYYY-MM-DD)"))
}

impl SlotDraft {
    pub fn validate(self) -> SlotResult<NewSlot> {
        let mut errors = Vec::new();

        let date = parse_date("booking_date", self.booking_date.as_deref())
            .map_err(|e| errors.push(e))
            .ok();

        let time_slot = match self.time_slot.as_deref().map(str::trim) {
            None | Some("") => {
                errors.push(FieldError::new("time_slot", "is required"));
                None
            }
            Some(time) if !is_valid_time(time) => {
                errors.push(FieldError::new("time_slot", "must be HH:MM (00:00-23:59)"));
                None
            }
            Some(time) => Some(time.to_string()),
        };

        if self.is_slot_open.is_none() {
            errors.push(FieldError::new("is_slot_open", "must be a boolean"));
        }

        let booking_day = date.map(|d| weekday_name(d.weekday()));
        if let (Some(given), Some(derived)) = (self.booking_day.as_deref(), booking_day) {
            let given = given.trim();
            if !given.is_empty() && !given.eq_ignore_ascii_case(derived) {
                errors.push(FieldError::new(
                    "booking_day",
                    format!("does not match booking_date ({derived})"),
                ));
            }
        }

        match (date, time_slot, self.is_slot_open, booking_day) {
            (Some(booking_date), Some(time_slot), Some(is_slot_open), Some(booking_day))
                if errors.is_empty() =>
            {
                Ok(NewSlot {
                    booking_date,
                    booking_day: booking_day.to_string(),
                    time_slot,
                    is_slot_open,
                })
            }
            _ => Err(SlotError::Validation(errors)),
        }
    }
}

impl BookingDraft {
    /// Returns `(student_id, slot_id)`
    pub fn validate(self) -> SlotResult<(i64, i64)> {
        let mut errors = Vec::new();
        let student_id = positive_id("student_id", self.student_id, &mut errors);
        let slot_id = positive_id("slot_id", self.slot_id, &mut errors);

        match (student_id, slot_id) {
            (Some(student_id), Some(slot_id)) => Ok((student_id, slot_id)),
            _ => Err(SlotError::Validation(errors)),
        }
    }
}

impl NoticeDraft {
    pub fn validate(self) -> SlotResult<BookingNotice> {
        let mut errors = Vec::new();
        let name = required_text("name", self.name, &mut errors);
        let contact = required_text("contact", self.contact, &mut errors);
        let day = required_text("day", self.day, &mut errors);
        let time = required_text("time", self.time, &mut errors);

        match (name, contact, day, time) {
            (Some(name), Some(contact), Some(day), Some(time)) => Ok(BookingNotice {
                name,
                contact,
                day,
                time,
            }),
            _ => Err(SlotError::Validation(errors)),
        }
    }
}

fn positive_id(field: &'static str, value: Option<i64>, errors: &mut Vec<FieldError>) -> Option<i64> {
    match value {
        Some(id) if id > 0 => Some(id),
        Some(_) => {
            errors.push(FieldError::new(field, "must be a positive integer"));
            None
        }
        None => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

fn required_text(
    field: &'static str,
    value: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Some(v),
        _ => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}
