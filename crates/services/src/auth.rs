//! # AuthService
//!
//! Login against the users table plus the session operations the HTTP
//! layer needs. Unknown usernames and wrong passwords fail identically.

use crate::session::SessionStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use domains::query::user_columns;
use domains::{
    DomainError, FromSqlRow, PasswordDigest, Query, Result, Session, SqlExecutor, User,
    UserCredentials,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

// Digested when the username is unknown so both failure paths do the same work
const DUMMY_SALT: &[u8] = b"canopy-dummy-salt";

#[derive(Clone)]
pub struct AuthService {
    db: Arc<dyn SqlExecutor>,
    digest: Arc<dyn PasswordDigest>,
    sessions: Arc<SessionStore>,
}

impl AuthService {
    pub fn new(
        db: Arc<dyn SqlExecutor>,
        digest: Arc<dyn PasswordDigest>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            db,
            digest,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Checks a username/password pair and returns the identity on success.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(DomainError::BadRequest(
                "username and password are required".to_string(),
            ));
        }

        let mut q = Query::select(&format!("{},password,salt", user_columns("")), "users");
        q.push_sql(" AND username = ? AND deleted = 0");
        q.add_param(username);
        q.finalize();

        let Some(row) = self.db.fetch_optional(&q).await? else {
            self.digest_off_thread(password, DUMMY_SALT.to_vec()).await?;
            info!("login failed");
            return Err(DomainError::Unauthorized);
        };
        let credentials = UserCredentials::from_row(&row)?;

        let (Ok(salt), Ok(stored)) = (
            STANDARD.decode(&credentials.salt),
            STANDARD.decode(&credentials.digest),
        ) else {
            warn!(user_id = credentials.user.id, "stored credentials are not valid base64");
            return Err(DomainError::Unauthorized);
        };

        let candidate = self.digest_off_thread(password, salt).await?;
        if !digests_match(&candidate, &stored) {
            info!("login failed");
            return Err(DomainError::Unauthorized);
        }

        info!(user_id = credentials.user.id, "login succeeded");
        Ok(credentials.user)
    }

    /// Digests are CPU-bound for tens of milliseconds, so they run on the
    /// blocking pool instead of an async worker.
    async fn digest_off_thread(&self, password: &str, salt: Vec<u8>) -> Result<Vec<u8>> {
        let digest = Arc::clone(&self.digest);
        let password = password.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || digest.digest(&password, &salt))
            .await
            .map_err(DomainError::internal)?
    }

    pub fn create_session(&self, user: &User) -> Result<String> {
        self.sessions.add(user)
    }

    pub fn resolve_user(&self, token: &str) -> Option<Session> {
        self.sessions.lookup(token)
    }

    pub fn destroy_session(&self, token: &str) {
        self.sessions.remove(token);
    }
}

fn digests_match(candidate: &[u8], stored: &[u8]) -> bool {
    candidate.len() == stored.len() && bool::from(candidate.ct_eq(stored))
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockPasswordDigest, MockSqlExecutor, SqlRow};
    use std::time::Duration;

    // Reversing password+salt stands in for the real digest
    fn fake_digest() -> MockPasswordDigest {
        let mut digest = MockPasswordDigest::new();
        digest.expect_digest().returning(|password, salt| {
            let mut out = [password, salt].concat();
            out.reverse();
            Ok(out)
        });
        digest
    }

    fn alice_row() -> SqlRow {
        let mut stored = [b"hunter2".as_slice(), b"salty"].concat();
        stored.reverse();
        SqlRow::new()
            .with("id", 1i64)
            .with("username", "alice")
            .with("avatar", "")
            .with("createDate", "2024-01-01")
            .with("super", false)
            .with("password", STANDARD.encode(stored))
            .with("salt", STANDARD.encode(b"salty"))
    }

    fn service(db: MockSqlExecutor) -> AuthService {
        AuthService::new(
            Arc::new(db),
            Arc::new(fake_digest()),
            Arc::new(SessionStore::new(Duration::from_secs(60), 10)),
        )
    }

    fn db_with(row: Option<SqlRow>) -> MockSqlExecutor {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional()
            .withf(|q| q.params().first() == Some(&domains::SqlValue::Text("alice".into())))
            .returning(move |_| Ok(row.clone()));
        db
    }

    #[tokio::test]
    async fn test_login_success_then_session() {
        let auth = service(db_with(Some(alice_row())));
        let user = auth.login("alice", "hunter2").await.unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");

        let token = auth.create_session(&user).unwrap();
        assert_eq!(auth.resolve_user(&token).unwrap().user_id, 1);

        auth.destroy_session(&token);
        assert!(auth.resolve_user(&token).is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let wrong = service(db_with(Some(alice_row())))
            .login("alice", "nope")
            .await
            .unwrap_err();
        let unknown = service(db_with(None))
            .login("alice", "hunter2")
            .await
            .unwrap_err();

        assert_eq!(wrong, DomainError::Unauthorized);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_empty_fields_are_bad_request() {
        let mut db = MockSqlExecutor::new();
        db.expect_fetch_optional().never();
        let err = service(db).login("  ", "x").await.unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
    }

    #[test]
    fn test_digests_match() {
        assert!(digests_match(b"abc", b"abc"));
        assert!(!digests_match(b"abc", b"abd"));
        assert!(!digests_match(b"abc", b"ab"));
        assert!(!digests_match(b"", b"a"));
    }

    #[tokio::test]
    async fn test_digest_runs_off_the_request_thread() {
        let caller = std::thread::current().id();
        let mut digest = MockPasswordDigest::new();
        digest.expect_digest().times(2).returning(move |password, salt| {
            assert_ne!(std::thread::current().id(), caller);
            let mut out = [password, salt].concat();
            out.reverse();
            Ok(out)
        });
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60), 10));

        let auth = AuthService::new(Arc::new(db_with(Some(alice_row()))), Arc::new(digest), sessions);
        auth.login("alice", "hunter2").await.unwrap();
        assert_eq!(auth.login("alice", "wrong").await.unwrap_err(), DomainError::Unauthorized);
    }

    #[tokio::test]
    async fn test_other_tasks_progress_during_slow_digest() {
        let mut digest = MockPasswordDigest::new();
        digest.expect_digest().returning(|password, salt| {
            std::thread::sleep(Duration::from_millis(200));
            let mut out = [password, salt].concat();
            out.reverse();
            Ok(out)
        });
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60), 10));
        let auth = AuthService::new(Arc::new(db_with(Some(alice_row()))), Arc::new(digest), sessions);

        let ticks = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            })
        };

        auth.login("alice", "hunter2").await.unwrap();
        ticker.abort();
        // on the single test thread the ticker only runs if login yields
        assert!(ticks.load(std::sync::atomic::Ordering::Relaxed) >= 5);
    }
}
