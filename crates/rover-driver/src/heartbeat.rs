//! Chassis link liveness
//!
//! The telemetry loop only replaces a cached snapshot, so a stalled link looks like a snapshot
//! that stops changing. `ConnectionMonitor` records when the last decodable record arrived and
//! turns that into a staleness check readers can poll without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Last-record tracker for the chassis link
pub struct ConnectionMonitor {
    origin: Instant,
    /// Microseconds after `origin`; 0 means "no record yet"
    last_record_us: AtomicU64,
    records: AtomicU64,
    stale_after: Duration,
}

impl ConnectionMonitor {
    /// # Example
    /// ```
    /// # use rover_driver::ConnectionMonitor;
    /// # use std::time::Duration;
    /// let monitor = ConnectionMonitor::new(Duration::from_secs(1));
    /// assert_eq!(monitor.records(), 0);
    /// assert!(monitor.is_alive());
    /// ```
    pub fn new(stale_after: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_record_us: AtomicU64::new(0),
            records: AtomicU64::new(0),
            stale_after,
        }
    }

    fn now_us(&self) -> u64 {
        // +1 keeps a record at the origin instant distinguishable from "none"
        self.origin.elapsed().as_micros() as u64 + 1
    }

    /// Called by the telemetry path for every decoded chassis record
    pub fn record_seen(&self) {
        self.last_record_us.store(self.now_us(), Ordering::Release);
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    /// Records decoded so far
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Time since the last record, `None` before the first one
    pub fn since_last_record(&self) -> Option<Duration> {
        match self.last_record_us.load(Ordering::Acquire) {
            0 => None,
            last => Some(Duration::from_micros(self.now_us().saturating_sub(last))),
        }
    }

    /// Link is alive while the last record is younger than `stale_after`.
    ///
    /// Before the first record the grace period runs from construction.
    pub fn is_alive(&self) -> bool {
        let age = self
            .since_last_record()
            .unwrap_or_else(|| self.origin.elapsed());
        age < self.stale_after
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_no_record_yet() {
        let monitor = ConnectionMonitor::new(Duration::from_secs(1));
        assert!(monitor.is_alive());
        assert_eq!(monitor.since_last_record(), None);
        assert_eq!(monitor.stale_after(), Duration::from_secs(1));
    }

    #[test]
    fn test_grace_period_expires_without_records() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(30));
        thread::sleep(Duration::from_millis(60));
        assert!(!monitor.is_alive());
    }

    #[test]
    fn test_record_refreshes_liveness() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(100));
        thread::sleep(Duration::from_millis(60));
        monitor.record_seen();
        thread::sleep(Duration::from_millis(60));
        assert!(monitor.is_alive());
        assert_eq!(monitor.records(), 1);
        assert!(monitor.since_last_record().unwrap() >= Duration::from_millis(60));
    }

    #[test]
    fn test_goes_stale_after_last_record() {
        let monitor = ConnectionMonitor::new(Duration::from_millis(30));
        monitor.record_seen();
        assert!(monitor.is_alive());
        thread::sleep(Duration::from_millis(60));
        assert!(!monitor.is_alive());
    }
}
