use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{DaylightWindow, MeteringError, MeteringProvider};
use crate::domain::{Sample, SampleWindow, SolarSystem};

/// Per-system, per-cycle metering with single-flight memoization.
///
/// The first caller performs the upstream reads; concurrent and later callers
/// wait for and reuse that outcome, errors included. Create one per system
/// per cycle and drop it with the cycle.
pub struct MeteringSource {
    provider: Arc<dyn MeteringProvider>,
    system: SolarSystem,
    daylight: DaylightWindow,
    now: DateTime<Utc>,
    outcome: OnceCell<Result<Sample, MeteringError>>,
}

impl MeteringSource {
    pub fn new(
        provider: Arc<dyn MeteringProvider>,
        system: SolarSystem,
        daylight: DaylightWindow,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            provider,
            system,
            daylight,
            now,
            outcome: OnceCell::new(),
        }
    }

    pub async fn fetch(&self) -> Result<Sample, MeteringError> {
        self.outcome
            .get_or_init(|| self.fetch_upstream())
            .await
            .clone()
    }

    async fn fetch_upstream(&self) -> Result<Sample, MeteringError> {
        let system_id = self.system.system_id;
        let tz: Tz = self.system.timezone.parse().map_err(|e| {
            MeteringError::Failure(format!(
                "failed to load timezone {:?}: {e}",
                self.system.timezone
            ))
        })?;

        let local = self.now.with_timezone(&tz);
        if !self.daylight.contains(local.time()) {
            return Err(MeteringError::Skipped(format!(
                "time at system ({}) is outside of primary solar hours",
                local.format("%Y-%m-%d %H:%M:%S %Z")
            )));
        }

        // Both reads use the same interval so the numbers are comparable.
        let window = SampleWindow::last_closed(self.now);

        let produced_watts = self
            .provider
            .fetch_production(system_id, &self.system.access_token, window.start)
            .await
            .map_err(|e| {
                MeteringError::Failure(format!(
                    "failed to query production for system {system_id} of user {}: {e:#}",
                    self.system.user_id
                ))
            })?;
        debug!(system_id, produced_watts, start = %window.start, end = %window.end, "production read");

        let consumed_watts = self
            .provider
            .fetch_consumption(system_id, &self.system.access_token, window.start)
            .await
            .map_err(|e| {
                MeteringError::Failure(format!(
                    "failed to query consumption for system {system_id} of user {}: {e:#}",
                    self.system.user_id
                ))
            })?;

        info!(
            system_id,
            produced_watts,
            consumed_watts,
            start = %window.start,
            end = %window.end,
            "metered system"
        );

        Ok(Sample {
            produced_watts,
            consumed_watts,
            window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::domain::SystemId;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
        starts: Mutex<Vec<DateTime<Utc>>>,
        fail: bool,
    }

    #[async_trait]
    impl MeteringProvider for CountingProvider {
        async fn fetch_production(&self, _: SystemId, _: &str, start: DateTime<Utc>) -> Result<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.starts.lock().push(start);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail {
                anyhow::bail!("HTTP 503");
            }
            Ok(3000)
        }

        async fn fetch_consumption(&self, _: SystemId, _: &str, start: DateTime<Utc>) -> Result<i64> {
            self.starts.lock().push(start);
            Ok(1500)
        }
    }

    fn system(timezone: &str) -> SolarSystem {
        SolarSystem {
            user_id: "user-1".into(),
            system_id: 42,
            timezone: timezone.into(),
            access_token: "token".into(),
        }
    }

    // 17:00 UTC is 13:00 in New York during daylight saving time.
    fn midday_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_upstream_call() {
        let provider = Arc::new(CountingProvider::default());
        let source = MeteringSource::new(
            provider.clone(),
            system("America/New_York"),
            DaylightWindow::default(),
            midday_utc(),
        );

        let (a, b, c) = tokio::join!(source.fetch(), source.fetch(), source.fetch());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);

        let sample = a.unwrap();
        assert_eq!(sample.produced_watts, 3000);
        assert_eq!(sample.consumed_watts, 1500);
    }

    #[tokio::test]
    async fn test_production_and_consumption_share_window_start() {
        let provider = Arc::new(CountingProvider::default());
        let source = MeteringSource::new(
            provider.clone(),
            system("America/New_York"),
            DaylightWindow::default(),
            midday_utc(),
        );
        let sample = source.fetch().await.unwrap();

        let starts = provider.starts.lock().clone();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0], starts[1]);
        assert_eq!(starts[0], sample.window.start);
    }

    #[tokio::test]
    async fn test_failure_is_memoized_too() {
        let provider = Arc::new(CountingProvider {
            fail: true,
            ..Default::default()
        });
        let source = MeteringSource::new(
            provider.clone(),
            system("America/New_York"),
            DaylightWindow::default(),
            midday_utc(),
        );

        let first = source.fetch().await.unwrap_err();
        let second = source.fetch().await.unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, MeteringError::Failure(ref msg) if msg.contains("HTTP 503")));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outside_daylight_skips_without_upstream_call() {
        let provider = Arc::new(CountingProvider::default());
        // 03:00 UTC is 23:00 the previous evening in New York.
        let night = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let source = MeteringSource::new(
            provider.clone(),
            system("America/New_York"),
            DaylightWindow::default(),
            night,
        );

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, MeteringError::Skipped(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_timezone_is_a_failure() {
        let provider = Arc::new(CountingProvider::default());
        let source = MeteringSource::new(
            provider.clone(),
            system("Mars/Olympus_Mons"),
            DaylightWindow::default(),
            midday_utc(),
        );

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, MeteringError::Failure(ref msg) if msg.contains("timezone")));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
