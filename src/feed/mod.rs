//! Live booking feed.
//!
//! The server side is a [`FeedHub`] of per-salon broadcast channels that
//! actions publish into and WebSocket connections subscribe to. The client
//! side folds received messages into a [`FeedState`] and keeps a
//! [`FeedSource`] connected through a [`FeedSubscriber`], falling back to a
//! [`DemoFeed`] when the server cannot be reached.

mod client;
mod hub;
mod state;

pub use client::{
    unreachable, DemoFeed, FeedSource, FeedSubscriber, HubSource, ReconnectPolicy, SubscriberExit,
    DEMO_CONFLICT_PERIOD, DEMO_TOTAL_SLOTS,
};
pub use hub::FeedHub;
pub use state::{FeedItem, FeedState, Priority};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::{CapacityInfo, ScheduleConflict};

/// What happened to an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingUpdateType {
    /// Created
    New,
    /// Status, notes or payment changed
    Updated,
    /// Cancelled
    Cancelled,
    /// Moved to another time or staff member
    Rescheduled,
}

impl BookingUpdateType {
    /// All kinds, in display order
    pub const ALL: [Self; 4] = [Self::New, Self::Updated, Self::Cancelled, Self::Rescheduled];
}

/// Booking change announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    /// What happened
    #[serde(rename = "type")]
    pub kind: BookingUpdateType,
    /// Appointment concerned
    pub appointment_id: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Running counters for the current day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStats {
    /// Updates of any kind
    pub total_today: u32,
    /// New bookings
    pub new_bookings: u32,
    /// Cancellations
    pub cancellations: u32,
    /// Updates and reschedules
    pub modifications: u32,
}

impl FeedStats {
    /// Count one update.
    pub fn record(&mut self, kind: BookingUpdateType) {
        self.total_today += 1;
        match kind {
            BookingUpdateType::New => self.new_bookings += 1,
            BookingUpdateType::Cancelled => self.cancellations += 1,
            BookingUpdateType::Updated | BookingUpdateType::Rescheduled => self.modifications += 1,
        }
    }
}

/// Server to client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedMessage {
    /// An appointment changed
    BookingUpdate(BookingUpdate),
    /// A scheduling conflict was detected
    Conflict(ScheduleConflict),
    /// Capacity snapshot
    Capacity(CapacityInfo),
    /// Counter snapshot
    Stats(FeedStats),
}

impl FeedMessage {
    /// Wire `type` tag
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::BookingUpdate(_) => "booking_update",
            Self::Conflict(_) => "conflict",
            Self::Capacity(_) => "capacity",
            Self::Stats(_) => "stats",
        }
    }
}

/// Client to server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sent right after the socket opens
    Auth {
        /// Salon the client wants updates for
        #[serde(rename = "salonId")]
        salon_id: String,
    },
}
