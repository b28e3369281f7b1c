//! Authenticated session context
//!
//! A session is created when the application starts, refreshed when the
//! access token rotates and closed at logout. It is passed explicitly to
//! whatever needs the current user: the builder checks it before every
//! mutation and the HTTP store reads the bearer token from it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::menu::{Restaurant, RestaurantId, UserId};

/// Error types for session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session expired")]
    Expired,

    #[error("Session closed")]
    Closed,

    #[error("User {user} may not edit restaurant {restaurant}")]
    Forbidden { user: UserId, restaurant: RestaurantId },
}

/// Role claim carried by the signed-in user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May edit every restaurant
    Admin,

    /// May edit the restaurants they own
    RestaurantOwner,

    /// Read-only
    Customer,
}

impl Role {
    /// Parse the role claim; anything unrecognised is a customer.
    pub fn from_claim(claim: &str) -> Self {
        match claim {
            "admin" => Role::Admin,
            "restaurant_owner" | "owner" => Role::RestaurantOwner,
            _ => Role::Customer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::RestaurantOwner => "restaurant_owner",
            Role::Customer => "customer",
        }
    }
}

/// The signed-in user and their credentials
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
    access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: UserId, role: Role, access_token: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            role,
            access_token: access_token.to_string(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check that this user may mutate `restaurant`'s menu
    pub fn authorize_edit(&self, restaurant: &Restaurant) -> Result<(), SessionError> {
        if self.is_expired() {
            return Err(SessionError::Expired);
        }

        let allowed = match self.role {
            Role::Admin => true,
            Role::RestaurantOwner => restaurant.owner_id == self.user_id,
            Role::Customer => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(SessionError::Forbidden {
                user: self.user_id,
                restaurant: restaurant.id,
            })
        }
    }
}

/// Shared, refreshable handle to the current session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// The live session, or why there is none
    pub async fn current(&self) -> Result<Session, SessionError> {
        let guard = self.inner.read().await;
        let session = guard.as_ref().ok_or(SessionError::Closed)?;
        if session.is_expired() {
            return Err(SessionError::Expired);
        }
        Ok(session.clone())
    }

    /// Swap in a rotated access token
    pub async fn refresh(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mut guard = self.inner.write().await;
        let session = guard.as_mut().ok_or(SessionError::Closed)?;
        session.access_token = access_token.to_string();
        session.expires_at = expires_at;
        log::debug!("Session refreshed for {}", session.user_id);
        Ok(())
    }

    /// Log out. Every later call fails with `SessionError::Closed`.
    pub async fn close(&self) {
        let mut guard = self.inner.write().await;
        if let Some(session) = guard.take() {
            log::info!("Session closed for {}", session.user_id);
        }
    }

    pub async fn authorize_edit(&self, restaurant: &Restaurant) -> Result<Session, SessionError> {
        let session = self.current().await?;
        session.authorize_edit(restaurant)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn restaurant_owned_by(owner: UserId) -> Restaurant {
        Restaurant::new(owner, "Cafe Roma", "cafe-roma").unwrap()
    }

    fn session(role: Role, user: UserId) -> Session {
        Session::new(user, role, "token-1", Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_role_from_claim() {
        assert_eq!(Role::from_claim("admin"), Role::Admin);
        assert_eq!(Role::from_claim("restaurant_owner"), Role::RestaurantOwner);
        assert_eq!(Role::from_claim("owner"), Role::RestaurantOwner);
        assert_eq!(Role::from_claim("customer"), Role::Customer);
        assert_eq!(Role::from_claim(""), Role::Customer);
    }

    #[test]
    fn test_owner_can_edit_own_restaurant_only() {
        let owner = Uuid::new_v4();
        let mine = restaurant_owned_by(owner);
        let theirs = restaurant_owned_by(Uuid::new_v4());
        let session = session(Role::RestaurantOwner, owner);

        assert!(session.authorize_edit(&mine).is_ok());
        assert_eq!(
            session.authorize_edit(&theirs),
            Err(SessionError::Forbidden { user: owner, restaurant: theirs.id })
        );
    }

    #[test]
    fn test_admin_and_customer() {
        let restaurant = restaurant_owned_by(Uuid::new_v4());
        assert!(session(Role::Admin, Uuid::new_v4()).authorize_edit(&restaurant).is_ok());
        assert!(session(Role::Customer, restaurant.owner_id).authorize_edit(&restaurant).is_err());
    }

    #[test]
    fn test_expired_session_cannot_edit() {
        let owner = Uuid::new_v4();
        let restaurant = restaurant_owned_by(owner);
        let past = Utc::now() - Duration::seconds(1);
        let expired = Session::new(owner, Role::RestaurantOwner, "t", past);
        assert_eq!(expired.authorize_edit(&restaurant), Err(SessionError::Expired));
    }

    #[tokio::test]
    async fn test_handle_lifecycle() {
        let owner = Uuid::new_v4();
        let restaurant = restaurant_owned_by(owner);
        let past = Utc::now() - Duration::seconds(1);
        let expired = Session::new(owner, Role::RestaurantOwner, "old", past);
        let handle = SessionHandle::new(expired);

        assert_eq!(handle.current().await.unwrap_err(), SessionError::Expired);

        handle.refresh("new", Utc::now() + Duration::hours(1)).await.unwrap();
        let current = handle.authorize_edit(&restaurant).await.unwrap();
        assert_eq!(current.access_token(), "new");

        handle.close().await;
        assert_eq!(handle.current().await.unwrap_err(), SessionError::Closed);
        assert_eq!(
            handle.refresh("again", Utc::now()).await,
            Err(SessionError::Closed)
        );
    }
}
