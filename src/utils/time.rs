//! Time utilities for XMLTV timestamps and offset parsing

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// Length of the `YYYYMMDDHHMMSS` prefix of an XMLTV timestamp
const XMLTV_DATETIME_LEN: usize = 14;

fn fixed_offset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("static regex is valid"))
}

/// Parse an XMLTV timestamp such as `20240101120000 +0100` into UTC
///
/// Only the first 14 characters are read as the local date and time. A
/// trailing `+HHMM`, `-HH:MM` or `Z` offset is applied; anything else after
/// the date (including nothing) is treated as UTC.
///
/// Returns `None` when the date part cannot be parsed.
pub fn parse_xmltv_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let date_part = value.get(..XMLTV_DATETIME_LEN)?;
    let naive = NaiveDateTime::parse_from_str(date_part, "%Y%m%d%H%M%S").ok()?;

    let remainder = value[XMLTV_DATETIME_LEN..].trim();
    let offset = match remainder {
        "" | "Z" | "z" => None,
        other => parse_fixed_offset(other).ok(),
    };

    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Parse fixed offset timezone formats like "+01:00", "+0100", etc.
pub fn parse_fixed_offset(offset_str: &str) -> Result<FixedOffset, String> {
    let offset_str = offset_str.trim();

    let caps = fixed_offset_regex()
        .captures(offset_str)
        .ok_or_else(|| format!("Invalid offset format: '{offset_str}'"))?;

    let sign = if &caps[1] == "+" { 1 } else { -1 };
    let hours: i32 = caps[2]
        .parse()
        .map_err(|_| "Invalid hours in offset".to_string())?;
    let minutes: i32 = caps[3]
        .parse()
        .map_err(|_| "Invalid minutes in offset".to_string())?;

    if hours > 23 || minutes > 59 {
        return Err("Invalid time values in offset".to_string());
    }

    let total_seconds = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_seconds)
        .ok_or_else(|| format!("Offset out of range: '{offset_str}'"))
}
