use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use super::{BookingUpdate, BookingUpdateType, FeedHub, FeedMessage};
use crate::availability::{CapacityInfo, ConflictKind, ScheduleConflict};
use crate::config::FeedConfig;
use crate::error::{Result, SalonError};

/// Exponential backoff between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for ReconnectPolicy {
    fn from(config: &FeedConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_delay: Duration::from_millis(config.base_reconnect_delay_ms),
            max_delay: Duration::from_millis(config.max_reconnect_delay_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based): `min(base × 2^attempt, max)`.
    /// `None` once the attempts are used up.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(
            self.base_delay
                .checked_mul(factor)
                .map_or(self.max_delay, |delay| delay.min(self.max_delay)),
        )
    }
}

/// Something that delivers feed messages for one salon
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSource: Send {
    /// Open the connection and announce the salon
    async fn connect(&mut self, salon_id: &str) -> Result<()>;

    /// Next message; `None` once the connection closed
    async fn next_message(&mut self) -> Option<FeedMessage>;
}

/// In-process source reading straight from a [`FeedHub`]
#[derive(Debug)]
pub struct HubSource {
    hub: FeedHub,
    receiver: Option<broadcast::Receiver<FeedMessage>>,
}

impl HubSource {
    /// Source over `hub`
    #[must_use]
    pub const fn new(hub: FeedHub) -> Self {
        Self { hub, receiver: None }
    }
}

#[async_trait]
impl FeedSource for HubSource {
    async fn connect(&mut self, salon_id: &str) -> Result<()> {
        self.receiver = Some(self.hub.subscribe(salon_id));
        Ok(())
    }

    async fn next_message(&mut self) -> Option<FeedMessage> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Feed receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }
}

/// Fabricates plausible feed traffic when no server is reachable
#[derive(Debug)]
pub struct DemoFeed {
    rng: StdRng,
}

impl Default for DemoFeed {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

/// Slots offered per day in the demo capacity snapshot
pub const DEMO_TOTAL_SLOTS: u32 = 40;
/// Seconds between demo conflict rolls
pub const DEMO_CONFLICT_PERIOD: Duration = Duration::from_secs(30);

impl DemoFeed {
    /// Deterministic feed for tests and reproducible demos
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `APT` followed by nine upper-case base-36 characters
    pub fn appointment_id(&mut self) -> String {
        const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let suffix: String = (0..9)
            .map(|_| char::from(DIGITS[self.rng.gen_range(0..DIGITS.len())]))
            .collect();
        format!("APT{suffix}")
    }

    /// A random update stamped now
    pub fn update(&mut self) -> BookingUpdate {
        let kind = BookingUpdateType::ALL[self.rng.gen_range(0..BookingUpdateType::ALL.len())];
        BookingUpdate {
            kind,
            appointment_id: self.appointment_id(),
            timestamp: Utc::now(),
        }
    }

    /// A double booking roughly three times in ten
    pub fn maybe_conflict(&mut self) -> Option<ScheduleConflict> {
        (self.rng.gen::<f64>() > 0.7).then(|| ScheduleConflict {
            kind: ConflictKind::DoubleBooking,
            severity: ConflictKind::DoubleBooking.severity(),
            appointment_ids: vec![self.appointment_id(), self.appointment_id()],
            description: "Time slot 14:00-15:00 is already booked for Sarah Johnson".to_string(),
        })
    }

    /// Capacity snapshot with a random number of booked slots
    pub fn capacity(&mut self, date: NaiveDate) -> CapacityInfo {
        let booked = self.rng.gen_range(0..=DEMO_TOTAL_SLOTS);
        CapacityInfo::new(date, DEMO_TOTAL_SLOTS, booked)
    }

    /// Wait before the next update: five to fifteen seconds
    pub fn next_delay(&mut self) -> Duration {
        Duration::from_millis(self.rng.gen_range(5_000..=15_000))
    }

    /// Emit demo traffic into `tx` until the receiver goes away.
    pub async fn run(mut self, tx: mpsc::Sender<FeedMessage>) {
        let today = Utc::now().date_naive();
        if tx.send(FeedMessage::Capacity(self.capacity(today))).await.is_err() {
            return;
        }

        let mut conflicts = tokio::time::interval(DEMO_CONFLICT_PERIOD);
        conflicts.tick().await;
        loop {
            let delay = self.next_delay();
            let message = tokio::select! {
                () = tokio::time::sleep(delay) => Some(FeedMessage::BookingUpdate(self.update())),
                _ = conflicts.tick() => self.maybe_conflict().map(FeedMessage::Conflict),
            };
            if let Some(message) = message {
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// How a subscriber run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberExit {
    /// The consumer dropped its receiver
    ConsumerGone,
    /// Reconnect attempts ran out and the demo fallback was disabled
    GaveUp,
}

/// Keeps a [`FeedSource`] connected and forwards its messages
#[derive(Debug)]
pub struct FeedSubscriber<S> {
    source: S,
    salon_id: String,
    policy: ReconnectPolicy,
    demo_fallback: bool,
}

impl<S: FeedSource> FeedSubscriber<S> {
    /// Subscriber for `salon_id`
    pub fn new(source: S, salon_id: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            source,
            salon_id: salon_id.into(),
            policy,
            demo_fallback: true,
        }
    }

    /// Whether to switch to [`DemoFeed`] after giving up
    #[must_use]
    pub const fn with_demo_fallback(mut self, enabled: bool) -> Self {
        self.demo_fallback = enabled;
        self
    }

    /// Forward messages into `tx`, reconnecting with backoff whenever the
    /// source fails or closes. A successful connection resets the attempt
    /// counter.
    pub async fn run(mut self, tx: mpsc::Sender<FeedMessage>) -> SubscriberExit {
        let mut attempt = 0;
        loop {
            match self.source.connect(&self.salon_id).await {
                Ok(()) => {
                    info!(salon_id = %self.salon_id, "Feed connected");
                    attempt = 0;
                    while let Some(message) = self.source.next_message().await {
                        if tx.send(message).await.is_err() {
                            return SubscriberExit::ConsumerGone;
                        }
                    }
                    warn!(salon_id = %self.salon_id, "Feed connection closed");
                }
                Err(e) => warn!(salon_id = %self.salon_id, error = %e, "Feed connection failed"),
            }

            let Some(delay) = self.policy.delay_for(attempt) else {
                break;
            };
            attempt += 1;
            tokio::time::sleep(delay).await;
        }

        warn!(salon_id = %self.salon_id, "Giving up on live feed");
        if !self.demo_fallback {
            return SubscriberExit::GaveUp;
        }
        info!("Switching to demo feed");
        DemoFeed::default().run(tx).await;
        SubscriberExit::ConsumerGone
    }
}

/// Error used by sources that cannot reach their server
#[must_use]
pub fn unreachable(reason: impl Into<String>) -> SalonError {
    SalonError::Other(format!("Feed unreachable: {}", reason.into()))
}
