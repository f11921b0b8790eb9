//! # SessionStore
//!
//! In-memory map from opaque login tokens to sessions. One mutex guards the
//! whole map and nothing inside the critical section does I/O or awaits.
//!
//! Expiry is lazy: `lookup` refuses expired sessions on its own, and expired
//! entries are physically swept on the next `add`. The sweep is O(n), which
//! is fine because `max_sessions` bounds n.

use chrono::{DateTime, TimeDelta, Utc};
use domains::{DomainError, Result, Session, User};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    login_expiry: TimeDelta,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(login_expiry: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            login_expiry: TimeDelta::from_std(login_expiry).unwrap_or(TimeDelta::MAX),
            max_sessions,
        }
    }

    /// The session for `token`, or None when unknown OR expired. The two
    /// cases are never distinguished.
    pub fn lookup(&self, token: &str) -> Option<Session> {
        self.lookup_at(token, Utc::now())
    }

    pub fn lookup_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let sessions = self.lock();
        sessions
            .get(token)
            .filter(|session| !self.is_expired(session, now))
            .cloned()
    }

    /// Creates a session for `user` and returns its fresh token. Fails with
    /// `CapacityExceeded` (inserting nothing) when the store is still full
    /// after sweeping expired entries.
    pub fn add(&self, user: &User) -> Result<String> {
        self.add_at(user, Utc::now())
    }

    pub fn add_at(&self, user: &User, now: DateTime<Utc>) -> Result<String> {
        let mut sessions = self.lock();

        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session, now));
        if sessions.len() < before {
            debug!(swept = before - sessions.len(), "expired sessions removed");
        }

        if sessions.len() >= self.max_sessions {
            warn!(max = self.max_sessions, "session store full, rejecting login");
            return Err(DomainError::CapacityExceeded(
                "too many active sessions, try again later".to_string(),
            ));
        }

        let mut token = Uuid::new_v4().to_string();
        while sessions.contains_key(&token) {
            token = Uuid::new_v4().to_string();
        }

        sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                user_id: user.id,
                username: user.username.clone(),
                avatar: user.avatar.clone(),
                created_at: now,
            },
        );
        Ok(token)
    }

    /// Logout. Removing an unknown token is not an error.
    pub fn remove(&self, token: &str) {
        self.lock().remove(token);
    }

    /// Entries currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match session.created_at.checked_add_signed(self.login_expiry) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    // A panic while holding the lock cannot leave the map half-updated, so
    // a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn alice() -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            avatar: "abc".to_string(),
            created: "2024-01-01".to_string(),
            is_super: false,
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_add_then_lookup() {
        let store = SessionStore::new(HOUR, 10);
        let token = store.add(&alice()).unwrap();

        assert!(!token.is_empty());
        let session = store.lookup(&token).unwrap();
        assert_eq!(session.user_id, 1);
        assert_eq!(session.username, "alice");
        assert_eq!(session.token, token);
    }

    #[test]
    fn test_tokens_are_unique() {
        let store = SessionStore::new(HOUR, 10);
        let a = store.add(&alice()).unwrap();
        let b = store.add(&alice()).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_token_absent() {
        let store = SessionStore::new(HOUR, 10);
        assert!(store.lookup("nope").is_none());
    }

    #[test]
    fn test_lookup_refuses_expired_without_sweep() {
        let store = SessionStore::new(HOUR, 10);
        let created = Utc::now();
        let token = store.add_at(&alice(), created).unwrap();

        assert!(store.lookup_at(&token, created + TimeDelta::minutes(59)).is_some());
        assert!(store.lookup_at(&token, created + TimeDelta::minutes(61)).is_none());
        // Still physically present until the next add sweeps it
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_rejects_without_insert() {
        let store = SessionStore::new(HOUR, 2);
        store.add(&alice()).unwrap();
        store.add(&alice()).unwrap();

        let err = store.add(&alice()).unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_add_sweeps_expired_before_capacity_check() {
        let store = SessionStore::new(HOUR, 2);
        let long_ago = Utc::now() - TimeDelta::hours(5);
        let stale = store.add_at(&alice(), long_ago).unwrap();
        store.add_at(&alice(), long_ago).unwrap();

        let fresh = store.add(&alice()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.lookup(&stale).is_none());
        assert!(store.lookup(&fresh).is_some());
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new(HOUR, 10);
        let token = store.add(&alice()).unwrap();
        store.remove(&token);
        store.remove(&token);
        assert!(store.lookup(&token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_adds_respect_capacity() {
        let store = Arc::new(SessionStore::new(HOUR, 50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..20).filter(|_| store.add(&alice()).is_ok()).count()
                })
            })
            .collect();

        let added: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(added, 50);
        assert_eq!(store.len(), 50);
    }
}
