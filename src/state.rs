//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Owned by [`crate::SessionClient`] and mutated only by login, logout,
//! start-up restore and the refresh path, so "authenticated" and "tokens in
//! storage" move together.

use serde::{Deserialize, Serialize};

/// Role assigned when the backend profile carries none.
pub const DEFAULT_ROLE: &str = "OPERADOR";

/// Lifecycle position of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Authenticated,
    /// A refresh exchange is in flight.
    Refreshing,
    LoggedOut,
}

/// Profile attached to a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perfil {
    #[serde(default)]
    pub rol: Option<String>,
}

/// User returned by `GET /user/current/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub perfil: Option<Perfil>,
}

impl UserProfile {
    /// Role from the profile, `OPERADOR` when absent.
    #[must_use]
    pub fn role(&self) -> &str {
        self.perfil
            .as_ref()
            .and_then(|p| p.rol.as_deref())
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE)
    }
}

/// Snapshot of who is logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    pub phase: SessionPhase,
}

impl SessionState {
    /// State at process start: authenticated iff an access token was found.
    #[must_use]
    pub fn initial(has_access_token: bool) -> Self {
        if has_access_token {
            Self { is_authenticated: true, user: None, phase: SessionPhase::Authenticated }
        } else {
            Self::logged_out()
        }
    }

    #[must_use]
    pub fn logged_out() -> Self {
        Self { is_authenticated: false, user: None, phase: SessionPhase::LoggedOut }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self { is_authenticated: true, user: Some(user), phase: SessionPhase::Authenticated }
    }

    /// Role of the logged-in user, if any.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.user.as_ref().map(UserProfile::role)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
