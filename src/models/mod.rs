//! Data models for bookings, staff and the loyalty program
//!
//! This module contains all data structures used throughout the application,
//! including database rows, insert payloads and query filters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display`, `FromStr` and the rusqlite conversions for
/// a fieldless enum stored as TEXT.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stored and wire representation
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} value: {other}", stringify!($ty))),
                }
            }
        }

        impl rusqlite::types::ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $ty {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

pub(crate) use text_enum;

mod booking;
mod loyalty;
mod staff;

pub use booking::*;
pub use loyalty::*;
pub use staff::*;

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Construct a range.
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Iterate every day in the range.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// A salon (tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salon {
    /// Primary key
    pub id: String,
    /// Display name
    pub name: String,
    /// Street address
    pub address: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new salon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSalon {
    /// Display name
    pub name: String,
    /// Street address
    pub address: Option<String>,
    /// Contact phone
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
}

/// A service on a salon's menu
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Primary key
    pub id: String,
    /// Owning salon
    pub salon_id: String,
    /// Display name
    pub name: String,
    /// Default length of the service
    pub duration_minutes: u32,
    /// List price
    pub price: f64,
    /// Whether the service can be booked
    pub is_active: bool,
}

/// Data for creating a new service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    /// Owning salon
    pub salon_id: String,
    /// Display name
    pub name: String,
    /// Default length of the service
    pub duration_minutes: u32,
    /// List price
    pub price: f64,
}

/// User profile row, the identity behind an API token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Primary key, also the user id
    pub id: String,
    /// Login email
    pub email: String,
    /// Name shown in listings
    pub display_name: String,
    /// Access role
    pub role: crate::auth::Role,
    /// Salon the user belongs to (staff and owners)
    pub salon_id: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for creating a new profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    /// Login email
    pub email: String,
    /// Name shown in listings
    pub display_name: String,
    /// Access role
    pub role: crate::auth::Role,
    /// Salon the user belongs to
    pub salon_id: Option<String>,
    /// Bearer token used to authenticate requests
    pub api_token: String,
}
