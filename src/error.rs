//! Error types for the salon-ops library.
//!
//! This module provides custom error types using `thiserror`. Every variant
//! maps onto one of the wire codes returned in the action envelope, see
//! [`SalonError::code`].

use std::collections::BTreeMap;

use thiserror::Error;

/// Field name to validation messages, as returned to callers.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Errors that can occur in the salon-ops application.
#[derive(Error, Debug)]
pub enum SalonError {
    /// No valid user context could be resolved
    #[error("Authentication required")]
    Unauthorized,

    /// The caller is authenticated but may not touch this resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Input failed validation
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// Requested row does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Appointment status change that the lifecycle does not allow
    #[error("Cannot change booking status from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Staff member already has an overlapping appointment
    #[error("Time slot already booked: {0}")]
    SlotConflict(String),

    /// Redemption or adjustment would drive a balance below zero
    #[error("Insufficient points balance: have {balance}, need {requested}")]
    InsufficientPoints {
        /// Balance before the transaction
        balance: i64,
        /// Points requested
        requested: i64,
    },

    /// Customer is already enrolled in the program
    #[error("Customer is already enrolled in this program")]
    AlreadyEnrolled,

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `SalonError`
pub type Result<T> = std::result::Result<T, SalonError>;

impl SalonError {
    /// Wire code carried in the action envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "AUTH_REQUIRED",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Validation(_) => "VALIDATION_ERROR",
            _ => "OPERATION_FAILED",
        }
    }

    /// Build a validation error for a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::Validation(errors)
    }

    /// Field errors, when this is a validation failure.
    #[must_use]
    pub const fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SalonError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SalonError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Other(format!("Background task failed: {err}"))
    }
}
