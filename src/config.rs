use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::utils::parse_hhmm;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub booking: BookingConfig,
    pub loyalty: LoyaltyConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Booking and availability knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Distance between candidate slot starts
    pub slot_interval_minutes: u32,
    /// Tax applied on top of the subtotal
    pub tax_rate: f64,
    /// Salon-wide opening time used when no staff member is selected
    pub default_open: String,
    /// Salon-wide closing time used when no staff member is selected
    pub default_close: String,
    pub max_recurring_occurrences: u32,
    pub max_recurring_days: u32,
    /// Denominator for the capacity report
    pub slots_per_day: u32,
    /// Maximum rows returned by booking list queries
    pub list_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyConfig {
    pub default_points_per_dollar: f64,
}

/// Live booking feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub channel_capacity: usize,
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub max_feed_items: usize,
}

/// Response cache bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            booking: BookingConfig::default(),
            loyalty: LoyaltyConfig::default(),
            feed: FeedConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl_secs: 300,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "data/salon.db".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            default_points_per_dollar: 1.0,
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_interval_minutes: 30,
            tax_rate: 0.10,
            default_open: "09:00".to_string(),
            default_close: "19:00".to_string(),
            max_recurring_occurrences: 52,
            max_recurring_days: 365,
            slots_per_day: 32,
            list_limit: 100,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            max_reconnect_attempts: 5,
            base_reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            max_feed_items: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?;

        let config = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("salon").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("SALON_OPS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate booking config
        let booking = &self.booking;
        if booking.slot_interval_minutes == 0 || booking.slot_interval_minutes > 240 {
            return Err(anyhow::anyhow!("slot_interval_minutes must be between 1 and 240"));
        }
        if !(0.0..1.0).contains(&booking.tax_rate) {
            return Err(anyhow::anyhow!("tax_rate must be in [0, 1)"));
        }
        let open = parse_hhmm(&booking.default_open)
            .ok_or_else(|| anyhow::anyhow!("Invalid default_open: {}", booking.default_open))?;
        let close = parse_hhmm(&booking.default_close)
            .ok_or_else(|| anyhow::anyhow!("Invalid default_close: {}", booking.default_close))?;
        if open >= close {
            return Err(anyhow::anyhow!("default_open must be before default_close"));
        }
        if booking.max_recurring_occurrences == 0 || booking.max_recurring_days == 0 {
            return Err(anyhow::anyhow!("recurring limits must be greater than 0"));
        }
        if booking.slots_per_day == 0 || booking.list_limit == 0 {
            return Err(anyhow::anyhow!("slots_per_day and list_limit must be greater than 0"));
        }

        // Validate loyalty config
        if self.loyalty.default_points_per_dollar < 0.0 {
            return Err(anyhow::anyhow!("default_points_per_dollar cannot be negative"));
        }

        // Validate feed config
        if self.feed.channel_capacity == 0 || self.feed.max_feed_items == 0 {
            return Err(anyhow::anyhow!("feed capacities must be greater than 0"));
        }
        if self.feed.base_reconnect_delay_ms > self.feed.max_reconnect_delay_ms {
            return Err(anyhow::anyhow!(
                "base_reconnect_delay_ms cannot exceed max_reconnect_delay_ms"
            ));
        }

        // Validate cache config
        if self.cache.max_entries == 0 || self.cache.ttl_secs == 0 {
            return Err(anyhow::anyhow!("cache max_entries and ttl_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Get database URL from environment or config
    #[must_use]
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Socket address the HTTP server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "data/salon.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.booking.slot_interval_minutes, 30);
        assert_eq!(config.feed.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_open_after_close_rejected() {
        let mut config = AppConfig::default();
        config.booking.default_open = "20:00".to_string();
        assert!(config.validate().is_err());
    }
}
