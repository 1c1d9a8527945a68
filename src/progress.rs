//! Progress aggregation
//!
//! Workers report the absolute byte count of their segment; the aggregator
//! sums the slots under a single lock so a snapshot never sees half of a
//! concurrent update. Throughput is measured between consecutive snapshots.

use crate::types::ProgressSnapshot;
use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Per-job progress accumulator
#[derive(Debug)]
pub struct ProgressAggregator {
    /// Total size, 0 when unknown
    total_size: u64,
    /// Latest reported bytes per segment
    slots: RwLock<Vec<u64>>,
    /// When transfer started
    started: Instant,
    /// (time, total) of the previous snapshot
    last_sample: Mutex<(Instant, u64)>,
}

impl ProgressAggregator {
    /// Create an aggregator for `segments` slots
    pub fn new(total_size: u64, segments: usize) -> Self {
        let now = Instant::now();
        Self {
            total_size,
            slots: RwLock::new(vec![0; segments]),
            started: now,
            last_sample: Mutex::new((now, 0)),
        }
    }

    /// Total size, `None` when unknown
    pub fn total_size(&self) -> Option<u64> {
        (self.total_size > 0).then_some(self.total_size)
    }

    /// Record the absolute number of bytes written for a segment
    pub fn report(&self, segment: usize, bytes_written: u64) {
        let mut slots = self.slots.write();
        match slots.get_mut(segment) {
            Some(slot) => *slot = bytes_written,
            None => tracing::warn!("Progress report for unknown segment {}", segment),
        }
    }

    /// Consistent sum of all segment slots
    pub fn bytes_written(&self) -> u64 {
        self.slots.read().iter().sum()
    }

    /// Build a snapshot and advance the throughput sample
    pub fn snapshot(&self, active_workers: usize) -> ProgressSnapshot {
        self.snapshot_at(Instant::now(), active_workers)
    }

    fn snapshot_at(&self, now: Instant, active_workers: usize) -> ProgressSnapshot {
        let bytes_written = self.bytes_written();

        let throughput = {
            let mut last = self.last_sample.lock();
            let (last_time, last_bytes) = *last;
            let elapsed = now.saturating_duration_since(last_time).as_secs_f64();
            *last = (now, bytes_written);
            if elapsed > 0.0 {
                (bytes_written.saturating_sub(last_bytes) as f64 / elapsed) as u64
            } else {
                0
            }
        };

        let total_size = self.total_size();
        let eta = match total_size {
            Some(total) if throughput > 0 => Some(Duration::from_secs_f64(
                total.saturating_sub(bytes_written) as f64 / throughput as f64,
            )),
            _ => None,
        };

        ProgressSnapshot {
            total_size,
            bytes_written,
            elapsed: now.saturating_duration_since(self.started),
            throughput,
            eta,
            active_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latest_report_wins() {
        let agg = ProgressAggregator::new(1000, 4);
        agg.report(0, 100);
        agg.report(0, 100); // duplicate
        agg.report(1, 200);
        agg.report(0, 150);
        agg.report(3, 50);
        assert_eq!(agg.bytes_written(), 150 + 200 + 50);
        agg.report(3, 0);
        assert_eq!(agg.bytes_written(), 150 + 200);
    }

    #[test]
    fn test_out_of_range_report_is_ignored() {
        let agg = ProgressAggregator::new(1000, 2);
        agg.report(5, 999);
        assert_eq!(agg.bytes_written(), 0);
    }

    #[test]
    fn test_concurrent_reports_sum_latest_values() {
        let agg = Arc::new(ProgressAggregator::new(8 * 10_000, 8));
        std::thread::scope(|s| {
            for seg in 0..8 {
                let agg = Arc::clone(&agg);
                s.spawn(move || {
                    for bytes in 1..=10_000u64 {
                        agg.report(seg, bytes);
                    }
                });
            }
            // Snapshots taken mid-flight must never exceed the final total
            for _ in 0..100 {
                assert!(agg.snapshot(8).bytes_written <= 80_000);
            }
        });
        assert_eq!(agg.snapshot(0).bytes_written, 80_000);
    }

    #[test]
    fn test_throughput_and_eta() {
        let agg = ProgressAggregator::new(1000, 1);
        let start = agg.started;
        agg.report(0, 250);
        let snap = agg.snapshot_at(start + Duration::from_secs(1), 1);
        assert_eq!(snap.throughput, 250);
        assert_eq!(snap.eta, Some(Duration::from_secs(3)));
        assert_eq!(snap.elapsed, Duration::from_secs(1));

        // No new bytes: throughput drops to zero and ETA is unavailable
        let snap = agg.snapshot_at(start + Duration::from_secs(2), 1);
        assert_eq!(snap.throughput, 0);
        assert_eq!(snap.eta, None);
    }

    #[test]
    fn test_unknown_size_has_no_eta() {
        let agg = ProgressAggregator::new(0, 1);
        let start = agg.started;
        agg.report(0, 4096);
        let snap = agg.snapshot_at(start + Duration::from_secs(1), 1);
        assert_eq!(snap.total_size, None);
        assert_eq!(snap.throughput, 4096);
        assert_eq!(snap.eta, None);
        assert_eq!(snap.percentage(), None);
    }
}
