use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::auth::UserContext;
use crate::config::DatabaseConfig;
use crate::error::{Result, SalonError};
use crate::models::{NewProfile, NewSalon, NewService, Profile, Salon, Service};
use crate::schema::{profiles, salons, services};
use crate::utils::new_id;

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// Pooled connection handle
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and operations
///
/// Cloning is cheap; clones share the same pool. Feature-specific queries
/// live in `crate::dal`.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

/// Strip an optional `sqlite:` / `sqlite://` scheme from a database url.
#[must_use]
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

impl Database {
    /// Create a new database connection pool with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
    }

    /// Create a new database connection pool
    pub fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = sqlite_path(&config.url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path, "Database ready");

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2026-10-01-000000_create_tables/up.sql"
        ))?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside a transaction, committing only when it succeeds.
    ///
    /// The write lock is taken up front, so concurrent writers wait on
    /// `busy_timeout` instead of failing on lock upgrade.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Resolve a bearer token to the caller's context.
    pub fn resolve_token(&self, token: &str) -> Result<Option<UserContext>> {
        let conn = self.get_connection()?;
        let ctx = conn
            .query_row(
                &format!(
                    "SELECT id, salon_id, role FROM {} WHERE {} = ?",
                    profiles::TABLE,
                    profiles::API_TOKEN
                ),
                params![token],
                |row| {
                    Ok(UserContext {
                        user_id: row.get(0)?,
                        salon_id: row.get(1)?,
                        role: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(ctx)
    }

    /// Create a salon
    pub fn create_salon(&self, new_salon: &NewSalon) -> Result<Salon> {
        let salon = Salon {
            id: new_id(),
            name: new_salon.name.clone(),
            address: new_salon.address.clone(),
            phone: new_salon.phone.clone(),
            email: new_salon.email.clone(),
            created_at: Utc::now(),
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?)",
                salons::TABLE,
                salons::COLUMNS
            ),
            params![
                salon.id,
                salon.name,
                salon.address,
                salon.phone,
                salon.email,
                salon.created_at
            ],
        )?;
        Ok(salon)
    }

    /// Get a salon by id
    pub fn get_salon(&self, salon_id: &str) -> Result<Option<Salon>> {
        let conn = self.get_connection()?;
        let salon = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?", salons::COLUMNS, salons::TABLE),
                params![salon_id],
                map_salon,
            )
            .optional()?;
        Ok(salon)
    }

    /// Add a service to a salon's menu
    pub fn create_service(&self, new_service: &NewService) -> Result<Service> {
        let service = Service {
            id: new_id(),
            salon_id: new_service.salon_id.clone(),
            name: new_service.name.clone(),
            duration_minutes: new_service.duration_minutes,
            price: new_service.price,
            is_active: true,
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?)",
                services::TABLE,
                services::COLUMNS
            ),
            params![
                service.id,
                service.salon_id,
                service.name,
                service.duration_minutes,
                service.price,
                service.is_active
            ],
        )?;
        Ok(service)
    }

    /// Get a service by id
    pub fn get_service(&self, service_id: &str) -> Result<Option<Service>> {
        let conn = self.get_connection()?;
        let service = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?", services::COLUMNS, services::TABLE),
                params![service_id],
                map_service,
            )
            .optional()?;
        Ok(service)
    }

    /// Create a profile
    pub fn create_profile(&self, new_profile: &NewProfile) -> Result<Profile> {
        let profile = Profile {
            id: new_id(),
            email: new_profile.email.clone(),
            display_name: new_profile.display_name.clone(),
            role: new_profile.role,
            salon_id: new_profile.salon_id.clone(),
            created_at: Utc::now(),
        };
        self.get_connection()?.execute(
            &format!(
                "INSERT INTO {} ({}, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                profiles::TABLE,
                profiles::COLUMNS,
                profiles::API_TOKEN
            ),
            params![
                profile.id,
                profile.email,
                profile.display_name,
                profile.role,
                profile.salon_id,
                profile.created_at,
                new_profile.api_token
            ],
        )?;
        Ok(profile)
    }

    /// Get a profile by id
    pub fn get_profile(&self, profile_id: &str) -> Result<Option<Profile>> {
        let conn = self.get_connection()?;
        let profile = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE id = ?", profiles::COLUMNS, profiles::TABLE),
                params![profile_id],
                map_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Find a profile by email
    pub fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let conn = self.get_connection()?;
        let profile = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE email = ? COLLATE NOCASE",
                    profiles::COLUMNS,
                    profiles::TABLE
                ),
                params![email],
                map_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Find the customer profile for `email`, creating one without a usable
    /// token when none exists.
    pub fn ensure_customer(&self, email: &str, display_name: &str) -> Result<Profile> {
        if let Some(profile) = self.find_profile_by_email(email)? {
            return Ok(profile);
        }
        debug!(email, "Creating customer profile");
        self.create_profile(&NewProfile {
            email: email.to_string(),
            display_name: display_name.to_string(),
            role: crate::auth::Role::Customer,
            salon_id: None,
            api_token: format!("unissued-{}", new_id()),
        })
    }
}

/// Map a database row to a Salon
fn map_salon(row: &Row<'_>) -> rusqlite::Result<Salon> {
    Ok(Salon {
        id: row.get("id")?,
        name: row.get("name")?,
        address: row.get("address")?,
        phone: row.get("phone")?,
        email: row.get("email")?,
        created_at: row.get("created_at")?,
    })
}

/// Map a database row to a Service
pub(crate) fn map_service(row: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get("id")?,
        salon_id: row.get("salon_id")?,
        name: row.get("name")?,
        duration_minutes: row.get("duration_minutes")?,
        price: row.get("price")?,
        is_active: row.get("is_active")?,
    })
}

/// Map a database row to a Profile
fn map_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        role: row.get("role")?,
        salon_id: row.get("salon_id")?,
        created_at: row.get("created_at")?,
    })
}

/// Read a JSON-encoded TEXT column.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|e| {
        let idx = row.as_ref().column_index(column).unwrap_or_default();
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

/// Collect a `query_map` iterator into a `Vec`.
pub(crate) fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(SalonError::from)
}

/// Initialize the database connection from configuration
pub fn establish_connection(config: &crate::config::AppConfig) -> anyhow::Result<Database> {
    use anyhow::Context;

    let mut db_config = config.database.clone();
    db_config.url = config.get_database_url();
    Database::with_config(&db_config).context("Failed to open the salon database")
}
