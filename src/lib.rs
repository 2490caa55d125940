//! Salon Ops - Booking, Staff and Loyalty Backend
//!
//! A Rust library for running the day-to-day operations of a salon or spa
//! on top of a SQLite database.
//!
//! # Features
//!
//! - Appointment booking with slot generation and conflict detection
//! - Recurring, group and waiting-list bookings
//! - Staff profiles, weekly schedules, blocked time and bulk updates
//! - Loyalty programs with tiers and an append-only points ledger
//! - Tag and path based cache revalidation
//! - Live booking feed over WebSocket and `.ics` calendar export

/// Server actions returning the uniform response envelope
pub mod actions;
/// Caller identity and permissions
pub mod auth;
/// Slot generation, conflicts and capacity
pub mod availability;
/// Revalidation cache for read actions
pub mod cache;
/// Configuration management
pub mod config;
/// Data access layer
pub mod dal;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Live booking feed
pub mod feed;
/// iCalendar export
pub mod ics;
/// Loyalty ledger arithmetic
pub mod ledger;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Database schema definitions
pub mod schema;
/// HTTP and WebSocket surface
pub mod server;
/// Clock and small helpers
pub mod utils;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use actions::{ActionResponse, Actions};
pub use auth::{Role, UserContext};
pub use db::Database;
pub use error::{Result, SalonError};
pub use models::{Appointment, AppointmentStatus, DateRange};
