//! Line formatting for terminal chat clients.

use chrono::{DateTime, Local, TimeZone};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats an inbound payload as a display line.
///
/// With a timestamp the line reads `2024-01-31 12:00:00 ~ payload`; without
/// one it reads ` ~ payload`.
pub fn format_inbound<Tz>(payload: &str, timestamp: Option<&DateTime<Tz>>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match timestamp {
        Some(at) => format!("{} ~ {payload}", at.format(TIMESTAMP_FORMAT)),
        None => format!(" ~ {payload}"),
    }
}

/// Formats inbound lines according to display settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct LineFormatter {
    pub display_current_time: bool,
}

impl LineFormatter {
    pub fn new(display_current_time: bool) -> Self {
        Self {
            display_current_time,
        }
    }

    /// Formats `payload`, stamping it with the local clock when enabled.
    pub fn format(&self, payload: &str) -> String {
        if self.display_current_time {
            format_inbound(payload, Some(&Local::now()))
        } else {
            format_inbound::<Local>(payload, None)
        }
    }
}
