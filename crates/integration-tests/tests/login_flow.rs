//! Login through the real Argon2 digest and users table, then the session
//! lifecycle around it.

use domains::DomainError;
use integration_tests::TestDb;
use std::time::Duration;

async fn with_alice() -> TestDb {
    let db = TestDb::new().await.unwrap();
    db.user_with_password(2, "alice", "hunter2").await.unwrap();
    db.user_with_password(3, "mallory", "letmein").await.unwrap();
    db.exec("UPDATE users SET deleted = 1 WHERE id = 3").await.unwrap();
    db
}

#[tokio::test]
async fn test_alice_session_until_expiry() {
    let db = with_alice().await;
    let auth = db.auth(Duration::from_millis(300), 10).unwrap();

    let user = auth.login("alice", "hunter2").await.unwrap();
    assert_eq!(user.id, 2);

    let token = auth.create_session(&user).unwrap();
    let session = auth.resolve_user(&token).unwrap();
    assert_eq!(session.user_id, 2);
    assert_eq!(session.username, "alice");

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert!(auth.resolve_user(&token).is_none());
}

#[tokio::test]
async fn test_failures_are_indistinguishable() {
    let db = with_alice().await;
    let auth = db.auth(Duration::from_secs(60), 10).unwrap();

    let wrong = auth.login("alice", "hunter3").await.unwrap_err();
    let unknown = auth.login("bob", "hunter2").await.unwrap_err();
    let deleted = auth.login("mallory", "letmein").await.unwrap_err();

    assert_eq!(wrong, DomainError::Unauthorized);
    assert_eq!(unknown, DomainError::Unauthorized);
    assert_eq!(deleted, DomainError::Unauthorized);
}

#[tokio::test]
async fn test_capacity_and_logout() {
    let db = with_alice().await;
    let auth = db.auth(Duration::from_secs(60), 1).unwrap();
    let user = auth.login("alice", "hunter2").await.unwrap();

    let token = auth.create_session(&user).unwrap();
    let err = auth.create_session(&user).unwrap_err();
    assert!(matches!(err, DomainError::CapacityExceeded(_)));
    assert_eq!(auth.sessions().len(), 1);

    auth.destroy_session(&token);
    assert!(auth.resolve_user(&token).is_none());
    auth.create_session(&user).unwrap();
}
