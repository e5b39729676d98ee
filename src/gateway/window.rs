//! Buy-hour windows
//!
//! Comma-separated `HH:MM-HH:MM` ranges in local time. A range whose end is
//! before its start wraps past midnight. An empty string allows every minute.

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

/// Buy-hours string could not be parsed
#[derive(Debug, Error)]
#[error("invalid time range {0:?}, expected HH:MM-HH:MM")]
pub struct WindowParseError(pub String);

/// Minute-of-day range, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MinuteRange {
    start: u32,
    end: u32,
}

impl MinuteRange {
    fn contains(&self, minute: u32) -> bool {
        if self.start <= self.end {
            self.start <= minute && minute <= self.end
        } else {
            minute >= self.start || minute <= self.end
        }
    }
}

/// Parsed set of local-time windows where opening is allowed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyWindow {
    ranges: Vec<MinuteRange>,
}

fn parse_clock(s: &str) -> Option<u32> {
    let (h, m) = s.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some(h * 60 + m)
}

impl BuyWindow {
    /// Window that never blocks
    pub fn always() -> Self {
        Self { ranges: vec![] }
    }

    /// Parse a buy-hours string
    pub fn parse(hours: &str) -> Result<Self, WindowParseError> {
        let mut ranges = Vec::new();
        for part in hours.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = part
                .split_once('-')
                .ok_or_else(|| WindowParseError(part.to_string()))?;
            let start = parse_clock(start).ok_or_else(|| WindowParseError(part.to_string()))?;
            let end = parse_clock(end).ok_or_else(|| WindowParseError(part.to_string()))?;
            ranges.push(MinuteRange { start, end });
        }
        Ok(Self { ranges })
    }

    /// Whether opening is allowed at local time `t` (minute resolution)
    pub fn allows(&self, t: NaiveTime) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        let minute = t.hour() * 60 + t.minute();
        self.ranges.iter().any(|r| r.contains(minute))
    }
}
