//! Utility functions for identifiers and timestamps.

pub mod timestamps;

pub use timestamps::{display_date, elapsed_ms, format_iso8601, iso_timestamp, now_utc, Timestamp};

/// Generates a random run identifier (UUID v4).
#[must_use]
pub fn generate_run_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}
