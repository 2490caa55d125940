//! Live feed: hub fan-out, subscriber reconnects and client state

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::mpsc;

use salon_ops::availability::CapacityInfo;
use salon_ops::error::Result;
use salon_ops::feed::{
    unreachable, BookingUpdate, BookingUpdateType, DemoFeed, FeedHub, FeedMessage, FeedSource,
    FeedState, FeedSubscriber, HubSource, Priority, ReconnectPolicy, SubscriberExit, DEMO_TOTAL_SLOTS,
};

fn update(kind: BookingUpdateType, id: &str) -> FeedMessage {
    FeedMessage::BookingUpdate(BookingUpdate {
        kind,
        appointment_id: id.to_string(),
        timestamp: Utc::now(),
    })
}

fn quick_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Each connect opens the next scripted session; `None` sessions refuse.
struct ScriptedSource {
    sessions: VecDeque<Option<Vec<FeedMessage>>>,
    current: VecDeque<FeedMessage>,
}

impl ScriptedSource {
    fn new(sessions: Vec<Option<Vec<FeedMessage>>>) -> Self {
        Self {
            sessions: sessions.into(),
            current: VecDeque::new(),
        }
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn connect(&mut self, _salon_id: &str) -> Result<()> {
        match self.sessions.pop_front().flatten() {
            Some(messages) => {
                self.current = messages.into();
                Ok(())
            }
            None => Err(unreachable("connection refused")),
        }
    }

    async fn next_message(&mut self) -> Option<FeedMessage> {
        self.current.pop_front()
    }
}

#[tokio::test]
async fn test_hub_isolates_salons() {
    let hub = FeedHub::new(16);
    let mut first = hub.subscribe("salon-a");
    let mut second = hub.subscribe("salon-b");
    assert_eq!(hub.subscriber_count("salon-a"), 1);
    assert_eq!(hub.total_subscribers(), 2);

    assert_eq!(hub.publish("salon-a", update(BookingUpdateType::New, "a1")), 1);
    assert!(matches!(first.recv().await, Ok(FeedMessage::BookingUpdate(u)) if u.appointment_id == "a1"));
    assert!(second.try_recv().is_err());

    drop(first);
    assert_eq!(hub.publish("salon-a", update(BookingUpdateType::New, "a2")), 0);
}

#[tokio::test]
async fn test_hub_counts_today_per_salon() {
    let hub = FeedHub::new(16);
    let now = Utc::now();
    hub.publish_update("salon-a", BookingUpdateType::New, "a1", now);
    hub.publish_update("salon-a", BookingUpdateType::Cancelled, "a1", now);
    hub.publish_update("salon-a", BookingUpdateType::Rescheduled, "a2", now);

    let today = now.with_timezone(&chrono::Local).date_naive();
    let stats = hub.stats("salon-a", today);
    assert_eq!(stats.total_today, 3);
    assert_eq!(stats.new_bookings, 1);
    assert_eq!(stats.cancellations, 1);
    assert_eq!(stats.modifications, 1);

    assert_eq!(hub.stats("salon-b", today).total_today, 0);
    let yesterday = today.pred_opt().expect("date");
    assert_eq!(hub.stats("salon-a", yesterday).total_today, 0);
}

#[tokio::test]
async fn test_subscriber_forwards_hub_messages() {
    let hub = FeedHub::new(16);
    let (tx, mut rx) = mpsc::channel(8);
    let subscriber = FeedSubscriber::new(HubSource::new(hub.clone()), "salon-a", quick_policy(1))
        .with_demo_fallback(false);
    let handle = tokio::spawn(subscriber.run(tx));

    while hub.subscriber_count("salon-a") == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    hub.publish("salon-a", update(BookingUpdateType::New, "a1"));
    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("message in time")
        .expect("open channel");
    assert_eq!(received.type_name(), "booking_update");

    drop(rx);
    hub.publish("salon-a", update(BookingUpdateType::Updated, "a1"));
    let exit = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("subscriber stopped")
        .expect("task");
    assert_eq!(exit, SubscriberExit::ConsumerGone);
}

#[tokio::test]
async fn test_subscriber_reconnects_between_sessions() {
    let source = ScriptedSource::new(vec![
        None,
        Some(vec![update(BookingUpdateType::New, "a1")]),
        Some(vec![update(BookingUpdateType::Cancelled, "a1")]),
    ]);
    let (tx, mut rx) = mpsc::channel(8);
    let exit = FeedSubscriber::new(source, "salon-a", quick_policy(2))
        .with_demo_fallback(false)
        .run(tx)
        .await;
    assert_eq!(exit, SubscriberExit::GaveUp);

    let mut kinds = Vec::new();
    while let Ok(FeedMessage::BookingUpdate(u)) = rx.try_recv() {
        kinds.push(u.kind);
    }
    assert_eq!(kinds, vec![BookingUpdateType::New, BookingUpdateType::Cancelled]);
}

#[tokio::test]
async fn test_subscriber_falls_back_to_demo_feed() {
    let source = ScriptedSource::new(Vec::new());
    let (tx, mut rx) = mpsc::channel(1);
    let handle = tokio::spawn(FeedSubscriber::new(source, "salon-a", quick_policy(1)).run(tx));

    let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("demo message in time")
        .expect("open channel");
    match first {
        FeedMessage::Capacity(info) => assert_eq!(info.total_slots, DEMO_TOTAL_SLOTS),
        other => panic!("unexpected message {other:?}"),
    }
    drop(rx);
    handle.abort();
}

#[test]
fn test_seeded_demo_is_reproducible() {
    let date = NaiveDate::from_ymd_opt(2026, 11, 2).expect("date");
    let mut a = DemoFeed::seeded(42);
    let mut b = DemoFeed::seeded(42);
    for _ in 0..5 {
        assert_eq!(a.appointment_id(), b.appointment_id());
        assert_eq!(a.capacity(date), b.capacity(date));
        let delay = a.next_delay();
        assert_eq!(delay, b.next_delay());
        assert!((Duration::from_secs(5)..=Duration::from_secs(15)).contains(&delay));
    }
}

#[test]
fn test_policy_from_config() {
    let config = salon_ops::config::FeedConfig {
        max_reconnect_attempts: 3,
        base_reconnect_delay_ms: 500,
        max_reconnect_delay_ms: 1_500,
        ..salon_ops::config::FeedConfig::default()
    };
    let policy = ReconnectPolicy::from(&config);
    assert_eq!(policy.delay_for(0), Some(Duration::from_millis(500)));
    assert_eq!(policy.delay_for(2), Some(Duration::from_millis(1_500)));
    assert_eq!(policy.delay_for(3), None);
}

#[test]
fn test_state_folds_messages() {
    let mut state = FeedState::new(2);
    state.apply(update(BookingUpdateType::New, "a1"), 1);
    state.apply(update(BookingUpdateType::Updated, "a2"), 2);
    state.apply(update(BookingUpdateType::Rescheduled, "a3"), 3);
    state.apply(
        FeedMessage::Capacity(CapacityInfo::new(
            NaiveDate::from_ymd_opt(2026, 11, 2).expect("date"),
            10,
            4,
        )),
        4,
    );

    let ids: Vec<_> = state.items().iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a3-3", "a2-2"]);
    assert_eq!(state.items()[0].priority, Priority::Medium);
    assert_eq!(state.stats().total_today, 3);
    assert_eq!(state.capacity().map(|c| c.available_slots), Some(6));

    assert!(state.mark_as_read("a2-2"));
    assert!(!state.mark_as_read("a1-1"));
    assert_eq!(state.unread_count(), 1);

    state.set_filter(BookingUpdateType::Rescheduled, false);
    assert_eq!(state.visible_items().count(), 1);

    state.clear();
    assert!(state.items().is_empty());
    assert_eq!(state.stats().total_today, 3);
}
