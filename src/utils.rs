use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

use crate::error::ValidationError;

/// Storage format for timestamps. Lexicographic order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "salonbook-dev",
            Profile::Prod => "salonbook",
        }
    }
}

/// Get the configuration directory path.
/// The dev profile uses "salonbook-dev" so it never touches production data.
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "salonbook", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (where the SQLite file lives)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "salonbook", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(date_str.to_string()))
}

/// Parse a wall-clock time, with or without seconds (HH:MM or HH:MM:SS)
pub fn parse_time(time_str: &str) -> Result<NaiveTime, ValidationError> {
    let trimmed = time_str.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ValidationError::InvalidTime(time_str.to_string()))
}

/// Combine a calendar date and a wall-clock time into one local instant
pub fn combine(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
}

/// Current local wall-clock time, truncated to whole seconds
pub fn now_local() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `now_local` in the stored text form, for `created_at`/`updated_at` columns
pub fn timestamp_now() -> String {
    format_timestamp(&now_local())
}

/// Current local date as an ISO 8601 string (YYYY-MM-DD)
pub fn get_current_date_string() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}
