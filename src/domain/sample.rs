use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of one metering interval.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 15;

/// Upstream telemetry can take this long to show up.
pub const DATA_LATENCY_MINUTES: i64 = 5;

/// The fully closed 15-minute interval a sample covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SampleWindow {
    /// The last full interval whose data should be available at `now`.
    ///
    /// The window ends between 5 and 20 minutes before `now`, so its start is
    /// 20 to 35 minutes back.
    pub fn last_closed(now: DateTime<Utc>) -> Self {
        let interval = Duration::minutes(SAMPLE_INTERVAL_MINUTES);
        let lagged = now - Duration::minutes(DATA_LATENCY_MINUTES);
        let into_interval = Duration::seconds(lagged.timestamp().rem_euclid(interval.num_seconds()))
            + Duration::nanoseconds(i64::from(lagged.timestamp_subsec_nanos()));
        let start = lagged - into_interval - interval;
        Self {
            start,
            end: start + interval,
        }
    }
}

/// Average production and consumption over one [`SampleWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub produced_watts: i64,
    pub consumed_watts: i64,
    pub window: SampleWindow,
}

impl Sample {
    /// Positive when the installation exports.
    pub fn net_watts(&self) -> i64 {
        self.produced_watts.saturating_sub(self.consumed_watts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_is_last_closed_interval() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 7, 30).unwrap();
        let window = SampleWindow::last_closed(now);
        // 12:02:30 truncates to 12:00, one interval back is 11:45.
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 1, 11, 45, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_window_respects_data_latency() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 4, 59).unwrap();
        let window = SampleWindow::last_closed(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 1, 11, 30, 0).unwrap());

        let end_age = now - window.end;
        assert!(end_age >= Duration::minutes(5) && end_age < Duration::minutes(20));
    }

    #[test]
    fn test_window_on_exact_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 5, 0).unwrap();
        let window = SampleWindow::last_closed(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 6, 1, 11, 45, 0).unwrap());
        assert_eq!(window.end - window.start, Duration::minutes(15));
    }
}
