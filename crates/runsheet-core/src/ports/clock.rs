//! Clock port - 時刻と待機の抽象化
//!
//! claim protocol の settle 待ち（既定 2 秒）はここを経由する。
//!
//! # 実装
//! - SystemClock（本番用）: tokio の timer で実際に待つ
//! - FixedClock（テスト用）: 時刻は固定、sleep は待たずに記録だけする

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Clock は現在時刻と待機を提供
///
/// # テスト容易性
/// - trait により時刻・待機を差し替え可能
/// - テストでは FixedClock や、sleep 中に table を書き換える独自 Clock を使う
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Always returns the same instant; `sleep` returns immediately.
#[derive(Debug)]
pub struct FixedClock {
    now: DateTime<Utc>,
    slept: Mutex<Vec<Duration>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Durations passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|slept| slept.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn fixed_clock_records_sleeps_without_waiting() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(fixed_time);

        clock.sleep(Duration::from_secs(3600)).await;
        clock.sleep(Duration::from_secs(2)).await;

        assert_eq!(clock.now(), fixed_time);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3600), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn system_clock_sleeps_for_short_durations() {
        let clock = SystemClock;
        let before = std::time::Instant::now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(before.elapsed() >= Duration::from_millis(5));
    }
}
