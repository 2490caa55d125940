use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{BookingUpdate, BookingUpdateType, FeedMessage, FeedStats};
use crate::availability::{CapacityInfo, ScheduleConflict};
use crate::metrics::MetricsCollector;

/// Per-salon broadcast channels plus today's counters
#[derive(Debug, Clone)]
pub struct FeedHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<FeedMessage>>>,
    stats: Mutex<HashMap<String, (NaiveDate, FeedStats)>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FeedHub {
    /// Hub whose channels buffer `capacity` messages per salon
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Hub that also counts published messages
    #[must_use]
    pub fn with_metrics(capacity: usize, metrics: Arc<MetricsCollector>) -> Self {
        Self::build(capacity, Some(metrics))
    }

    fn build(capacity: usize, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
                stats: Mutex::new(HashMap::new()),
                metrics,
            }),
        }
    }

    fn sender(&self, salon_id: &str) -> broadcast::Sender<FeedMessage> {
        let mut channels = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(salon_id.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }

    /// Receive every message published for `salon_id` from now on
    pub fn subscribe(&self, salon_id: &str) -> broadcast::Receiver<FeedMessage> {
        let receiver = self.sender(salon_id).subscribe();
        if let Some(metrics) = &self.inner.metrics {
            metrics.set_feed_subscribers(self.total_subscribers());
        }
        debug!(salon_id, "Feed subscriber joined");
        receiver
    }

    /// Open subscriptions for one salon
    pub fn subscriber_count(&self, salon_id: &str) -> usize {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(salon_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Open subscriptions across every salon
    pub fn total_subscribers(&self) -> usize {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(broadcast::Sender::receiver_count)
            .sum()
    }

    /// Send a message to every subscriber of `salon_id`; returns how many
    /// received it. Nobody listening is not an error.
    pub fn publish(&self, salon_id: &str, message: FeedMessage) -> usize {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_feed_message(message.type_name());
        }
        trace!(salon_id, kind = message.type_name(), "Publishing feed message");
        self.sender(salon_id).send(message).unwrap_or(0)
    }

    /// Announce a booking change and the refreshed counters
    pub fn publish_update(
        &self,
        salon_id: &str,
        kind: BookingUpdateType,
        appointment_id: &str,
        timestamp: DateTime<Utc>,
    ) -> FeedStats {
        let today = timestamp.with_timezone(&Local).date_naive();
        let stats = {
            let mut all = self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = all
                .entry(salon_id.to_string())
                .or_insert_with(|| (today, FeedStats::default()));
            if entry.0 != today {
                *entry = (today, FeedStats::default());
            }
            entry.1.record(kind);
            entry.1
        };

        self.publish(
            salon_id,
            FeedMessage::BookingUpdate(BookingUpdate {
                kind,
                appointment_id: appointment_id.to_string(),
                timestamp,
            }),
        );
        self.publish(salon_id, FeedMessage::Stats(stats));
        stats
    }

    /// Announce a scheduling conflict
    pub fn publish_conflict(&self, salon_id: &str, conflict: ScheduleConflict) -> usize {
        self.publish(salon_id, FeedMessage::Conflict(conflict))
    }

    /// Announce a capacity snapshot
    pub fn publish_capacity(&self, salon_id: &str, capacity: CapacityInfo) -> usize {
        self.publish(salon_id, FeedMessage::Capacity(capacity))
    }

    /// Today's counters for `salon_id`
    pub fn stats(&self, salon_id: &str, today: NaiveDate) -> FeedStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(salon_id)
            .filter(|(day, _)| *day == today)
            .map(|(_, stats)| *stats)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_is_followed_by_stats() {
        let hub = FeedHub::new(8);
        let mut rx = hub.subscribe("s1");
        let now = Utc::now();

        hub.publish_update("s1", BookingUpdateType::New, "a1", now);

        let first = rx.recv().await.expect("update");
        assert!(matches!(first, FeedMessage::BookingUpdate(ref u) if u.appointment_id == "a1"));
        let second = rx.recv().await.expect("stats");
        assert!(matches!(second, FeedMessage::Stats(s) if s.new_bookings == 1));
    }

    #[test]
    fn test_salons_are_isolated() {
        let hub = FeedHub::new(8);
        let _rx = hub.subscribe("s1");
        assert_eq!(hub.publish("s2", FeedMessage::Stats(FeedStats::default())), 0);
        assert_eq!(hub.subscriber_count("s1"), 1);
        assert_eq!(hub.subscriber_count("s2"), 0);
    }
}
