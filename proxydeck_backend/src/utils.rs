//! Shared helpers used across the backend.

use chrono::{FixedOffset, Offset, Utc};

pub const APP_NAME: &str = "proxydeck";

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats the current wall-clock time for the given whole-hour UTC offset.
/// Offsets chrono cannot represent (|hours| >= 24) degrade to UTC.
pub fn timestamp_with_offset(offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(offset_hours.saturating_mul(3600))
        .unwrap_or_else(|| Utc.fix());
    Utc::now()
        .with_timezone(&offset)
        .format(STAMP_FORMAT)
        .to_string()
}
