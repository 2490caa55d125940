//! Caller identity and salon-scoped permission checks.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SalonError};
use crate::models::text_enum;

/// Access role of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Books for themselves
    #[default]
    Customer,
    /// Works at a salon
    Staff,
    /// Owns a salon
    Owner,
    /// Platform administrator
    Admin,
}

text_enum!(Role {
    Customer => "customer",
    Staff => "staff",
    Owner => "owner",
    Admin => "admin",
});

/// Authenticated caller, resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Profile id
    pub user_id: String,
    /// Salon the caller belongs to
    pub salon_id: Option<String>,
    /// Access role
    pub role: Role,
}

impl UserContext {
    /// Build a context.
    pub fn new(user_id: impl Into<String>, salon_id: Option<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            salon_id,
            role,
        }
    }

    fn belongs_to(&self, salon_id: &str) -> bool {
        self.salon_id.as_deref() == Some(salon_id)
    }

    /// Staff or owner of `salon_id`, or an admin.
    pub fn require_salon_member(&self, salon_id: &str) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Staff | Role::Owner if self.belongs_to(salon_id) => Ok(()),
            _ => Err(SalonError::PermissionDenied(format!(
                "not a member of salon {salon_id}"
            ))),
        }
    }

    /// Owner of `salon_id`, or an admin.
    pub fn require_salon_owner(&self, salon_id: &str) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Owner if self.belongs_to(salon_id) => Ok(()),
            _ => Err(SalonError::PermissionDenied(format!(
                "only the owner of salon {salon_id} can do this"
            ))),
        }
    }

    /// The customer themselves, or a member of the salon.
    pub fn require_customer_or_member(&self, customer_id: &str, salon_id: &str) -> Result<()> {
        if self.user_id == customer_id {
            return Ok(());
        }
        self.require_salon_member(salon_id)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: Role, salon: Option<&str>) -> UserContext {
        UserContext::new("u1", salon.map(str::to_string), role)
    }

    #[test]
    fn test_member_checks() {
        assert!(ctx(Role::Staff, Some("s1")).require_salon_member("s1").is_ok());
        assert!(ctx(Role::Staff, Some("s2")).require_salon_member("s1").is_err());
        assert!(ctx(Role::Customer, Some("s1")).require_salon_member("s1").is_err());
        assert!(ctx(Role::Admin, None).require_salon_member("s1").is_ok());
    }

    #[test]
    fn test_owner_checks() {
        assert!(ctx(Role::Owner, Some("s1")).require_salon_owner("s1").is_ok());
        let err = ctx(Role::Staff, Some("s1"))
            .require_salon_owner("s1")
            .expect_err("staff is not owner");
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_customer_can_see_own_records() {
        let customer = ctx(Role::Customer, None);
        assert!(customer.require_customer_or_member("u1", "s1").is_ok());
        assert!(customer.require_customer_or_member("u2", "s1").is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
