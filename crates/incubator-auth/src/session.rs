use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use tracing::debug;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

pub type SessionToken = String;

#[derive(Debug, Clone)]
struct Session {
    username: String,
    created_at: DateTime<Utc>,
}

/// Maps live session tokens to usernames.
///
/// Lookups fail closed: an unknown, revoked or expired token is simply
/// "not authenticated".
pub struct SessionGuard {
    sessions: RwLock<HashMap<SessionToken, Session>>,
    ttl: Duration,
}

impl SessionGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Start a session for a user who just passed `login`.
    pub fn establish(&self, username: &str) -> SessionToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.sessions.write().insert(
            token.clone(),
            Session {
                username: username.to_string(),
                created_at: Utc::now(),
            },
        );
        debug!("Session established for {}", username);
        token
    }

    /// Resolve a token to its username, or `None` if it is not a live session.
    pub fn authenticate(&self, token: &str) -> Option<String> {
        let session = self.sessions.read().get(token).cloned()?;
        if self.is_expired(&session) {
            self.sessions.write().remove(token);
            return None;
        }
        Some(session.username)
    }

    /// End one session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }

    /// End every session belonging to `username`.
    pub fn revoke_user(&self, username: &str) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.username != username);
        before - sessions.len()
    }

    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !self.is_expired(s));
        before - sessions.len()
    }

    pub fn active(&self) -> usize {
        self.sessions.read().len()
    }

    fn is_expired(&self, session: &Session) -> bool {
        let age = Utc::now().signed_duration_since(session.created_at);
        age.to_std().map_or(false, |age| age >= self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SessionGuard {
        SessionGuard::new(Duration::from_secs(3600))
    }

    #[test]
    fn established_token_resolves_to_user() {
        let guard = guard();
        let token = guard.establish("alice");
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert_eq!(guard.authenticate(&token).as_deref(), Some("alice"));
    }

    #[test]
    fn unknown_token_fails_closed() {
        let guard = guard();
        guard.establish("alice");
        assert!(guard.authenticate("").is_none());
        assert!(guard.authenticate("not-a-token").is_none());
    }

    #[test]
    fn revoked_token_fails_closed() {
        let guard = guard();
        let token = guard.establish("alice");
        assert!(guard.revoke(&token));
        assert!(!guard.revoke(&token));
        assert!(guard.authenticate(&token).is_none());
    }

    #[test]
    fn expired_token_fails_closed_and_is_dropped() {
        let guard = SessionGuard::new(Duration::ZERO);
        let token = guard.establish("alice");
        assert!(guard.authenticate(&token).is_none());
        assert_eq!(guard.active(), 0);
    }

    #[test]
    fn purge_removes_only_expired() {
        let expired = SessionGuard::new(Duration::ZERO);
        expired.establish("alice");
        expired.establish("bob");
        assert_eq!(expired.purge_expired(), 2);

        let live = guard();
        live.establish("alice");
        assert_eq!(live.purge_expired(), 0);
        assert_eq!(live.active(), 1);
    }

    #[test]
    fn revoke_user_drops_all_their_sessions() {
        let guard = guard();
        let a1 = guard.establish("alice");
        let a2 = guard.establish("alice");
        let b = guard.establish("bob");

        assert_eq!(guard.revoke_user("alice"), 2);
        assert!(guard.authenticate(&a1).is_none());
        assert!(guard.authenticate(&a2).is_none());
        assert_eq!(guard.authenticate(&b).as_deref(), Some("bob"));
    }
}
