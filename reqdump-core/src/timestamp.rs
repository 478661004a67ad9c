//! Capture timestamps for dump records.
//!
//! Format: `dd-MM-yyyy (zone) HH:mm:ss.SSS`, e.g. `05-03-2024 (UTC) 14:07:09.042`.
//! For the local zone the zone field is the UTC offset (`+02:00`).

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

/// `strftime` pattern used for every dump timestamp.
pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y (%Z) %H:%M:%S%.3f";

/// Format an instant in its own time zone.
pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current wall-clock time in the process's local zone.
pub fn current_timestamp() -> String {
    format_timestamp(&Local::now())
}
