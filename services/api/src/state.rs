//! Application state shared across handlers

use laundry::SlotBookingManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub booking: SlotBookingManager,
}
