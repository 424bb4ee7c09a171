//! Common library for the hostel services
//!
//! Database connectivity, schema migrations and the shared error types used by
//! the API and the cleanup janitor.

pub mod database;
pub mod error;
