//! Error types shared by the hostel services
//!
//! Database setup failures are reported through [`DatabaseError`] so the
//! binaries can tell a bad configuration apart from an unreachable server.

use sqlx::Error as SqlxError;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Error raised while setting up or probing the database
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not reach the server
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// A query failed
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Applying the embedded migrations failed
    #[error("Database migration error: {0}")]
    Migration(#[source] MigrateError),

    /// The connection settings are unusable
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;
