//! Session Management
//!
//! Session token lifecycle for wallet actors:
//! - Secure token generation (32 OS-random bytes, hex encoded)
//! - Inactivity expiry enforced lazily on read
//! - Activity refresh on every successful validation
//! - Optional sweep for memory hygiene

use crate::error::{GuardError, GuardResult};
use crate::utils::clock::{elapsed_between, Clock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use std::time::Duration;

/// Individual session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Opaque session token
    pub token: String,
    /// Actor this session belongs to
    pub actor: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Session store keyed by token
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
            clock,
        }
    }

    /// Create a new session for an actor and return its token
    pub fn create(&self, actor: &str) -> GuardResult<String> {
        if actor.is_empty() {
            return Err(GuardError::invalid_session("Actor id required"));
        }

        let now = self.clock.now();
        let token = generate_session_token();
        let session = Session {
            token: token.clone(),
            actor: actor.to_string(),
            created_at: now,
            last_activity: now,
        };
        self.sessions.insert(token.clone(), session);
        Ok(token)
    }

    /// Validate a token and refresh its activity time.
    ///
    /// An expired session is removed before the error is returned.
    pub fn validate(&self, token: &str) -> GuardResult<Session> {
        if token.is_empty() {
            return Err(GuardError::invalid_session("Session token required"));
        }

        let now = self.clock.now();
        {
            let mut entry = self
                .sessions
                .get_mut(token)
                .ok_or_else(|| GuardError::invalid_session("Session not found"))?;

            if elapsed_between(entry.last_activity, now) <= self.timeout {
                entry.last_activity = now;
                return Ok(entry.value().clone());
            }
        }

        self.sessions.remove(token);
        Err(GuardError::invalid_session("Session expired due to inactivity"))
    }

    /// Remove a single session
    pub fn invalidate(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Remove every session owned by `actor`
    pub fn invalidate_actor(&self, actor: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.actor != actor);
        before - self.sessions.len()
    }

    /// Owner of a token, without refreshing it
    pub fn actor_of(&self, token: &str) -> Option<String> {
        self.sessions.get(token).map(|s| s.actor.clone())
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    /// Sweep sessions that are already past the inactivity timeout
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| elapsed_between(session.last_activity, now) <= self.timeout);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Generate a secure random session token
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::utils::clock::ManualClock;

    fn store(timeout_secs: u64) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = SessionStore::new(Duration::from_secs(timeout_secs), clock.clone());
        (store, clock)
    }

    #[test]
    fn test_create_session() {
        let (store, _) = store(3600);
        let token = store.create("wallet_123").unwrap();

        assert_eq!(token.len(), 64); // 32 bytes hex
        assert_eq!(store.actor_of(&token).as_deref(), Some("wallet_123"));
    }

    #[test]
    fn test_validate_refreshes_activity() {
        let (store, clock) = store(100);
        let token = store.create("wallet_123").unwrap();

        clock.advance(Duration::from_secs(99));
        let session = store.validate(&token).unwrap();
        assert_eq!(session.last_activity, clock.now());

        // Refreshed, so another 99s is still fine
        clock.advance(Duration::from_secs(99));
        assert!(store.validate(&token).is_ok());
    }

    #[test]
    fn test_expired_session_is_removed() {
        let (store, clock) = store(100);
        let token = store.create("wallet_123").unwrap();

        clock.advance(Duration::from_secs(101));
        let err = store.validate(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSession);
        assert!(store.get(&token).is_none());

        // Second attempt reports not found
        assert_eq!(store.validate(&token).unwrap_err().message, "Session not found");
    }

    #[test]
    fn test_exact_timeout_is_still_valid() {
        let (store, clock) = store(100);
        let token = store.create("wallet_123").unwrap();
        clock.advance(Duration::from_secs(100));
        assert!(store.validate(&token).is_ok());
    }

    #[test]
    fn test_invalid_tokens() {
        let (store, _) = store(100);
        assert!(store.validate("").is_err());
        assert!(store.validate("nonexistent").is_err());
        assert!(store.create("").is_err());
    }

    #[test]
    fn test_invalidate_actor() {
        let (store, _) = store(100);
        let a1 = store.create("alice").unwrap();
        store.create("alice").unwrap();
        let b = store.create("bob").unwrap();

        assert_eq!(store.invalidate_actor("alice"), 2);
        assert!(store.validate(&a1).is_err());
        assert!(store.validate(&b).is_ok());
        assert!(store.invalidate(&b));
        assert!(!store.invalidate(&b));
    }

    #[test]
    fn test_purge_expired() {
        let (store, clock) = store(100);
        store.create("alice").unwrap();
        clock.advance(Duration::from_secs(50));
        let fresh = store.create("bob").unwrap();
        clock.advance(Duration::from_secs(60));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn test_session_token_uniqueness() {
        let id1 = generate_session_token();
        let id2 = generate_session_token();
        assert_ne!(id1, id2);
    }
}
