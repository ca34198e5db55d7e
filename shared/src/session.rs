use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use recycleme_atoms::users::User;

/// The signed-in user as the app sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub points: u64,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.user_email.clone(),
            points: user.user_points,
        }
    }
}

/// Single owner of "who is signed in" for one client session.
///
/// The points figure here is an optimistic mirror of the ledger: it only
/// ever goes up until the next sign-in reloads it.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<SessionUser>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self {
            current: RwLock::new(Some(user)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<SessionUser>> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionUser>> {
        self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sign_in(&self, user: SessionUser) {
        tracing::debug!("👤 Session signed in as {}", user.user_id);
        *self.write() = Some(user);
    }

    pub fn sign_out(&self) -> Option<SessionUser> {
        self.write().take()
    }

    pub fn current(&self) -> Option<SessionUser> {
        self.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().is_some()
    }

    /// Bump the mirrored balance. Returns the new figure, or `None` when signed out.
    pub fn award_local(&self, amount: u32) -> Option<u64> {
        let mut guard = self.write();
        let user = guard.as_mut()?;
        user.points = user.points.saturating_add(u64::from(amount));
        Some(user.points)
    }

    /// Adopt a server balance, never moving the mirror backwards
    pub fn sync_balance(&self, balance: u64) {
        if let Some(user) = self.write().as_mut() {
            user.points = user.points.max(balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(points: u64) -> SessionUser {
        SessionUser {
            user_id: "123456".to_string(),
            email: "kim@example.com".to_string(),
            points,
        }
    }

    #[test]
    fn sign_in_and_out() {
        let session = SessionStore::new();
        assert!(!session.is_signed_in());
        assert_eq!(session.award_local(10), None);

        session.sign_in(user(100));
        assert_eq!(session.current().unwrap().points, 100);

        assert_eq!(session.sign_out(), Some(user(100)));
        assert!(session.current().is_none());
    }

    #[test]
    fn balance_only_moves_up() {
        let session = SessionStore::signed_in(user(100));
        assert_eq!(session.award_local(15), Some(115));
        session.sync_balance(90);
        assert_eq!(session.current().unwrap().points, 115);
        session.sync_balance(130);
        assert_eq!(session.current().unwrap().points, 130);
    }
}
