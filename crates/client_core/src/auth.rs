use std::sync::{Arc, PoisonError, RwLock};

use shared::domain::UserProfile;
use storage::StoredAuth;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

impl From<StoredAuth> for AuthSession {
    fn from(value: StoredAuth) -> Self {
        Self {
            token: value.token,
            user: value.user,
        }
    }
}

impl From<AuthSession> for StoredAuth {
    fn from(value: AuthSession) -> Self {
        Self {
            token: value.token,
            user: value.user,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<AuthSession>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restored(session: AuthSession) -> Self {
        let context = Self::new();
        context.establish(session);
        context
    }

    pub fn establish(&self, session: AuthSession) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Drops the current session. Returns whether one was present.
    pub fn clear(&self) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn snapshot(&self) -> Option<AuthSession> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.snapshot().map(|session| session.token)
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.snapshot().map(|session| session.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
