use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, gauge, histogram};

/// Counter of action invocations, labelled by action and status
pub const ACTIONS_TOTAL: &str = "salon_actions_total";
/// Action latency in seconds
pub const ACTION_DURATION: &str = "salon_action_duration_seconds";
/// Loyalty points moved, labelled by transaction type
pub const POINTS_MOVED_TOTAL: &str = "salon_loyalty_points_total";
/// Candidate slots produced by availability queries
pub const SLOTS_GENERATED_TOTAL: &str = "salon_slots_generated_total";
/// Live feed messages published, labelled by message type
pub const FEED_MESSAGES_TOTAL: &str = "salon_feed_messages_total";
/// Open feed subscriptions
pub const FEED_SUBSCRIBERS: &str = "salon_feed_subscribers";

/// Metrics collection and management
///
/// Everything is forwarded to the `metrics` facade; the collector also keeps
/// local totals so health output and tests can read them back.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    actions_total: AtomicU64,
    action_errors_total: AtomicU64,
    points_moved_total: AtomicU64,
    slots_generated_total: AtomicU64,
    feed_messages_total: AtomicU64,
}

/// Point-in-time copy of the local totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Actions run
    pub actions_total: u64,
    /// Actions that failed
    pub action_errors_total: u64,
    /// Absolute loyalty points moved
    pub points_moved_total: u64,
    /// Slots generated
    pub slots_generated_total: u64,
    /// Feed messages published
    pub feed_messages_total: u64,
}

impl MetricsCollector {
    /// Initialize metrics collection
    pub fn init() -> Result<()> {
        metrics::set_global_recorder(metrics::NoopRecorder)
            .map_err(|e| anyhow::anyhow!("Failed to initialize metrics recorder: {e}"))
    }

    /// Record one action outcome
    pub fn record_action(&self, action: &str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(ACTIONS_TOTAL, "action" => action.to_string(), "status" => status).increment(1);
        histogram!(ACTION_DURATION, "action" => action.to_string()).record(duration.as_secs_f64());

        self.actions_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.action_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a ledger movement
    pub fn record_points(&self, transaction_type: &str, points: i64) {
        let moved = points.unsigned_abs();
        counter!(POINTS_MOVED_TOTAL, "type" => transaction_type.to_string()).increment(moved);
        self.points_moved_total.fetch_add(moved, Ordering::Relaxed);
    }

    /// Record an availability computation
    pub fn record_slots(&self, count: usize) {
        let count = u64::try_from(count).unwrap_or(u64::MAX);
        counter!(SLOTS_GENERATED_TOTAL).increment(count);
        self.slots_generated_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a published feed message
    pub fn record_feed_message(&self, message_type: &'static str) {
        counter!(FEED_MESSAGES_TOTAL, "type" => message_type).increment(1);
        self.feed_messages_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the number of open feed connections
    pub fn set_feed_subscribers(&self, count: usize) {
        gauge!(FEED_SUBSCRIBERS).set(count as f64);
    }

    /// Current local totals
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            actions_total: self.actions_total.load(Ordering::Relaxed),
            action_errors_total: self.action_errors_total.load(Ordering::Relaxed),
            points_moved_total: self.points_moved_total.load(Ordering::Relaxed),
            slots_generated_total: self.slots_generated_total.load(Ordering::Relaxed),
            feed_messages_total: self.feed_messages_total.load(Ordering::Relaxed),
        }
    }
}

/// Performance timing wrapper for metrics
#[derive(Debug)]
pub struct MetricsTimer {
    collector: Arc<MetricsCollector>,
    action: &'static str,
    start: Instant,
}

impl MetricsTimer {
    /// Start timing `action`
    pub fn new(collector: Arc<MetricsCollector>, action: &'static str) -> Self {
        Self {
            collector,
            action,
            start: Instant::now(),
        }
    }

    /// Stop timing and record the outcome
    pub fn finish(self, success: bool) {
        self.collector
            .record_action(self.action, self.start.elapsed(), success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_are_counted_by_magnitude() {
        let collector = MetricsCollector::default();
        collector.record_points("adjusted", -40);
        collector.record_points("earned", 10);
        assert_eq!(collector.snapshot().points_moved_total, 50);
    }
}
