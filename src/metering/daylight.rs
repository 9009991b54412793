use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Local hours during which a system is worth metering.
///
/// Reads outside the window are skipped to save upstream quota. When `start`
/// is later than `end` the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaylightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for DaylightWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl DaylightWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, local: NaiveTime) -> bool {
        // sub-second precision never matters here
        let t = local.with_nanosecond(0).unwrap_or(local);
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}
