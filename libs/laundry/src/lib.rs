//! Hostel laundry slot booking
//!
//! Washing-machine slots are created by administrators, booked by students
//! subject to a weekly quota and cleaned up once their date has passed. The
//! [`SlotBookingManager`] is the entry point; persistence sits behind
//! [`SlotStore`] and outbound messages behind [`Notifier`].

pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod notify;
pub mod slot;
pub mod store;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BookingConfig;
pub use error::{FieldError, SlotError, SlotResult};
pub use manager::SlotBookingManager;
pub use notify::{LogNotifier, Notifier, NotifyError, notifier_from_env};
pub use slot::{Booking, Slot, SlotView, Week};
pub use store::{MemorySlotStore, PgSlotStore, SlotStore};
pub use validation::{BookingDraft, NoticeDraft, SlotDraft};
