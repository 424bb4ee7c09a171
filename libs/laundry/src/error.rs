//! Errors raised by the slot booking manager

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::notify::NotifyError;

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Everything that can go wrong while reading or changing slots
#[derive(Error, Debug)]
pub enum SlotError {
    /// Malformed input, nothing was written
    #[error("Invalid input: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Student {0} not found")]
    StudentNotFound(i64),

    #[error("Slot {0} not found")]
    SlotNotFound(i64),

    /// Cancel on a slot nobody (or somebody else) holds
    #[error("Slot {0} has no booking to cancel")]
    NotBooked(i64),

    #[error("Slot already exists for {date} at {time}")]
    DuplicateSlot { date: NaiveDate, time: String },

    /// Toggle or delete attempted while a student holds the slot
    #[error("Slot {0} is booked and cannot be changed")]
    SlotBooked(i64),

    #[error("Slot {0} is not available for booking")]
    SlotClosed(i64),

    #[error("You can only book {limit} slot(s) per week")]
    QuotaExceeded { limit: u32 },

    /// Some hours of a full-day roster already existed
    #[error("Created {} slot(s) for {date}, {} already existed", .created.len(), .skipped.len())]
    FullDayIncomplete {
        date: NaiveDate,
        created: Vec<i64>,
        skipped: Vec<String>,
    },

    #[error("Notification failed: {0}")]
    Notification(#[from] NotifyError),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} ({})", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type SlotResult<T> = Result<T, SlotError>;
