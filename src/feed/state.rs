use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{BookingUpdate, BookingUpdateType, FeedMessage, FeedStats};
use crate::availability::{CapacityInfo, ScheduleConflict};

/// How loudly an update should be surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Routine changes
    Low,
    /// Reschedules
    Medium,
    /// New bookings and cancellations
    High,
}

impl From<BookingUpdateType> for Priority {
    fn from(kind: BookingUpdateType) -> Self {
        match kind {
            BookingUpdateType::New | BookingUpdateType::Cancelled => Self::High,
            BookingUpdateType::Rescheduled => Self::Medium,
            BookingUpdateType::Updated => Self::Low,
        }
    }
}

/// Update as kept in the feed list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// `<appointment id>-<received millis>`
    pub id: String,
    /// The update
    #[serde(flatten)]
    pub update: BookingUpdate,
    /// Acknowledged by the user
    pub read: bool,
    /// Derived from the update kind
    pub priority: Priority,
}

/// Client-side view of the feed
#[derive(Debug, Clone)]
pub struct FeedState {
    items: Vec<FeedItem>,
    conflicts: Vec<ScheduleConflict>,
    capacity: Option<CapacityInfo>,
    stats: FeedStats,
    filter: HashSet<BookingUpdateType>,
    max_items: usize,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new(100)
    }
}

impl FeedState {
    /// Empty state keeping at most `max_items` updates
    #[must_use]
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            conflicts: Vec::new(),
            capacity: None,
            stats: FeedStats::default(),
            filter: BookingUpdateType::ALL.into_iter().collect(),
            max_items,
        }
    }

    /// Fold one message in. `received_millis` disambiguates repeated
    /// updates for the same appointment.
    pub fn apply(&mut self, message: FeedMessage, received_millis: i64) {
        match message {
            FeedMessage::BookingUpdate(update) => {
                self.stats.record(update.kind);
                let item = FeedItem {
                    id: format!("{}-{received_millis}", update.appointment_id),
                    priority: Priority::from(update.kind),
                    read: false,
                    update,
                };
                self.items.insert(0, item);
                self.items.truncate(self.max_items);
            }
            FeedMessage::Conflict(conflict) => self.conflicts.insert(0, conflict),
            FeedMessage::Capacity(capacity) => self.capacity = Some(capacity),
            FeedMessage::Stats(stats) => self.stats = stats,
        }
    }

    /// Newest first
    #[must_use]
    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    /// Items whose kind passes the filter
    pub fn visible_items(&self) -> impl Iterator<Item = &FeedItem> {
        self.items
            .iter()
            .filter(|item| self.filter.contains(&item.update.kind))
    }

    /// Newest first
    #[must_use]
    pub fn conflicts(&self) -> &[ScheduleConflict] {
        &self.conflicts
    }

    /// Latest capacity snapshot
    #[must_use]
    pub const fn capacity(&self) -> Option<&CapacityInfo> {
        self.capacity.as_ref()
    }

    /// Current counters
    #[must_use]
    pub const fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Unread items
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.read).count()
    }

    /// Mark one item read; false when no item has that id
    pub fn mark_as_read(&mut self, item_id: &str) -> bool {
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .map(|item| item.read = true)
            .is_some()
    }

    /// Mark everything read
    pub fn mark_all_read(&mut self) {
        for item in &mut self.items {
            item.read = true;
        }
    }

    /// Show or hide one kind of update
    pub fn set_filter(&mut self, kind: BookingUpdateType, visible: bool) {
        if visible {
            self.filter.insert(kind);
        } else {
            self.filter.remove(&kind);
        }
    }

    /// Drop items and conflicts; counters and capacity stay
    pub fn clear(&mut self) {
        self.items.clear();
        self.conflicts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn update(kind: BookingUpdateType, id: &str) -> FeedMessage {
        FeedMessage::BookingUpdate(BookingUpdate {
            kind,
            appointment_id: id.into(),
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_items_are_newest_first_and_capped() {
        let mut state = FeedState::new(2);
        state.apply(update(BookingUpdateType::New, "a1"), 1);
        state.apply(update(BookingUpdateType::Updated, "a2"), 2);
        state.apply(update(BookingUpdateType::Cancelled, "a3"), 3);

        let ids: Vec<_> = state.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a3-3", "a2-2"]);
        assert_eq!(state.stats().total_today, 3);
        assert_eq!(state.items()[0].priority, Priority::High);
    }

    #[test]
    fn test_read_and_filter() {
        let mut state = FeedState::default();
        state.apply(update(BookingUpdateType::New, "a1"), 1);
        state.apply(update(BookingUpdateType::Updated, "a2"), 2);
        assert_eq!(state.unread_count(), 2);
        assert!(state.mark_as_read("a1-1"));
        assert!(!state.mark_as_read("missing"));
        assert_eq!(state.unread_count(), 1);

        state.set_filter(BookingUpdateType::Updated, false);
        assert_eq!(state.visible_items().count(), 1);

        state.clear();
        assert!(state.items().is_empty());
        assert_eq!(state.stats().total_today, 2);
    }
}
