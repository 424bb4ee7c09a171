//! Booking policy configuration
//!
//! Read from `LAUNDRY_*` environment variables through the `config` crate,
//! e.g. `LAUNDRY_MAX_BOOKINGS_PER_WEEK=2`.

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Booking policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingConfig {
    /// Slots one student may hold within a calendar week
    #[serde(default = "default_max_bookings_per_week")]
    pub max_bookings_per_week: u32,
    /// Lock the student row during booking so the weekly quota is a hard cap
    #[serde(default)]
    pub serialize_per_student: bool,
    /// First hour of the full-day roster
    #[serde(default = "default_first_hour")]
    pub first_hour: u32,
    /// Last hour of the full-day roster, inclusive
    #[serde(default = "default_last_hour")]
    pub last_hour: u32,
}

fn default_max_bookings_per_week() -> u32 {
    1
}

fn default_first_hour() -> u32 {
    9
}

fn default_last_hour() -> u32 {
    20
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_bookings_per_week: default_max_bookings_per_week(),
            serialize_per_student: false,
            first_hour: default_first_hour(),
            last_hour: default_last_hour(),
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("LAUNDRY").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.last_hour > 23 {
            return Err(ConfigError::Message(format!(
                "last_hour must be at most 23, got {}",
                self.last_hour
            )));
        }
        if self.first_hour > self.last_hour {
            return Err(ConfigError::Message(format!(
                "first_hour ({}) is after last_hour ({})",
                self.first_hour, self.last_hour
            )));
        }
        Ok(())
    }

    /// `HH:00` for every hour of the full-day roster
    pub fn roster(&self) -> Vec<String> {
        (self.first_hour..=self.last_hour)
            .map(|hour| format!("{hour:02}:00"))
            .collect()
    }
}
