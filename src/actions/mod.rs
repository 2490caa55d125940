//! Server actions.
//!
//! Every action follows the same cycle: check the caller, validate the input,
//! run the data access call on the blocking pool, revalidate the cached reads
//! it affects, publish feed messages, record metrics, and wrap the outcome
//! in an [`ActionResponse`].

mod booking;
mod loyalty;
mod staff;

pub use booking::{
    occurrence_dates, CalendarFile, GroupOutcome, RecurringOutcome, SkippedBooking,
};

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};

use crate::auth::UserContext;
use crate::cache::RevalidationCache;
use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{FieldErrors, Result, SalonError};
use crate::feed::FeedHub;
use crate::logging::OperationTimer;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::utils::{Clock, SystemClock};

/// Uniform envelope returned by every action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse<T> {
    /// Whether the action succeeded
    pub success: bool,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error code on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Per-field messages for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
    /// Human readable summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ActionResponse<T> {
    /// Successful response
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            field_errors: None,
            message: None,
        }
    }

    /// Failed response carrying the error's code and field errors
    pub fn from_error(err: &SalonError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            field_errors: err.field_errors().cloned(),
            message: None,
        }
    }

    /// Attach a summary built from the data, on success only
    #[must_use]
    pub fn with_message(mut self, message: impl FnOnce(&T) -> String) -> Self {
        if let Some(data) = &self.data {
            self.message = Some(message(data));
        }
        self
    }

    /// Data, or the error message when the action failed
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(self.error.unwrap_or_else(|| "Unknown error".to_string())),
        }
    }
}

/// Shared state behind every action
#[derive(Clone)]
pub struct Actions {
    db: Database,
    cache: Arc<RevalidationCache>,
    feed: FeedHub,
    config: Arc<AppConfig>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actions")
            .field("db", &self.db)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Actions {
    /// Actions over `db` using the wall clock
    #[must_use]
    pub fn new(db: Database, config: AppConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::default());
        Self {
            feed: FeedHub::with_metrics(config.feed.channel_capacity, Arc::clone(&metrics)),
            db,
            cache: Arc::new(RevalidationCache::with_limits(
                config.cache.max_entries,
                std::time::Duration::from_secs(config.cache.ttl_secs),
            )),
            config: Arc::new(config),
            metrics,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Database handle
    pub const fn db(&self) -> &Database {
        &self.db
    }

    /// Response cache
    pub fn cache(&self) -> &RevalidationCache {
        &self.cache
    }

    /// Live feed hub
    pub const fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Loaded configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn now_local(&self) -> NaiveDateTime {
        self.clock.now().naive_local()
    }

    /// Current salon-local day
    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }

    /// Resolve a bearer token to a caller
    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserContext> {
        let token = token.ok_or(SalonError::Unauthorized)?.to_string();
        self.with_db(move |db| db.resolve_token(&token))
            .await?
            .ok_or(SalonError::Unauthorized)
    }

    /// Run a data access call on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// Time, log, count and wrap one action.
    async fn run<T, F>(&self, action: &'static str, fut: F) -> ActionResponse<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timer = MetricsTimer::new(Arc::clone(&self.metrics), action);
        let _op = OperationTimer::new(action);
        match fut.await {
            Ok(data) => {
                timer.finish(true);
                ActionResponse::ok(data)
            }
            Err(e) => {
                timer.finish(false);
                match e {
                    SalonError::Unauthorized
                    | SalonError::PermissionDenied(_)
                    | SalonError::Validation(_)
                    | SalonError::NotFound(_)
                    | SalonError::InvalidTransition { .. }
                    | SalonError::SlotConflict(_)
                    | SalonError::InsufficientPoints { .. }
                    | SalonError::AlreadyEnrolled => warn!(action, error = %e, "Action rejected"),
                    _ => error!(action, error = %e, "Action failed"),
                }
                ActionResponse::from_error(&e)
            }
        }
    }

    /// Serve a read from the cache, or compute and store it.
    async fn cached<T, F>(&self, key: String, tags: Vec<String>, load: F) -> Result<T>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get(&key) {
            if let Ok(value) = serde_json::from_value::<T>(hit) {
                return Ok(value);
            }
        }
        let value = load.await?;
        let json: Value = serde_json::to_value(&value)?;
        self.cache.insert(&key, tags, json);
        Ok(value)
    }

    fn revalidate(&self, paths: &[String], tags: &[String]) {
        for path in paths {
            self.cache.revalidate_path(path);
        }
        for tag in tags {
            self.cache.revalidate_tag(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope() {
        let response: ActionResponse<()> =
            ActionResponse::from_error(&SalonError::invalid("email", "bad"));
        assert!(!response.success);
        assert_eq!(response.code.as_deref(), Some("VALIDATION_ERROR"));
        assert!(response.field_errors.is_some_and(|f| f.contains_key("email")));
    }

    #[test]
    fn test_envelope_json_shape() {
        let value = serde_json::to_value(ActionResponse::ok(3).with_message(|n| format!("{n} done")))
            .expect("serialize");
        assert_eq!(value, serde_json::json!({"success": true, "data": 3, "message": "3 done"}));
    }

    #[test]
    fn test_today_follows_clock() {
        use chrono::{Local, TimeZone, Timelike};

        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("t.db").to_str().expect("utf8")).expect("db");
        let mut clock = crate::utils::MockClock::new();
        clock.expect_now().returning(|| {
            Local
                .with_ymd_and_hms(2026, 12, 24, 18, 30, 0)
                .single()
                .expect("local time")
        });

        let actions = Actions::new(db, AppConfig::default()).with_clock(Arc::new(clock));
        assert_eq!(actions.today(), NaiveDate::from_ymd_opt(2026, 12, 24).expect("date"));
        assert_eq!(actions.now_local().hour(), 18);
    }
}
