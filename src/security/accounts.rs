//! In-memory user accounts and login sessions
//!
//! Accounts live for the lifetime of the process. Registration checks the
//! basics only: every field present, a plausible email, a password of at
//! least eight characters and a free username. Passwords are stored as
//! salted Argon2 PHC strings.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::RwLock;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("All fields are required")]
    MissingFields,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {} characters long", MIN_PASSWORD_LEN)]
    WeakPassword,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Stored password hash for '{0}' is unreadable")]
    CorruptHash(String),
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub email: String,
    password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub login_time: DateTime<Utc>,
    timeout: Duration,
}

impl Session {
    pub fn new(username: impl Into<String>, login_time: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            username: username.into(),
            login_time,
            timeout,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.login_time + self.timeout
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.login_time > self.timeout
    }

    /// Expiry check against the current time
    pub fn is_active(&self) -> bool {
        !self.is_expired(Utc::now())
    }
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").ok())
        .as_ref()
}

pub fn validate_email(email: &str) -> bool {
    email_pattern().is_some_and(|re| re.is_match(email))
}

pub struct UserManager {
    users: RwLock<HashMap<String, User>>,
    argon2: Argon2<'static>,
    session_timeout: Duration,
}

impl UserManager {
    pub fn new(session_timeout_hours: i64) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            argon2: Argon2::default(),
            session_timeout: Duration::hours(session_timeout_hours),
        }
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<(), AccountError> {
        let username = username.trim();
        let email = email.trim();

        if username.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AccountError::MissingFields);
        }
        if !validate_email(email) {
            return Err(AccountError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::WeakPassword);
        }

        // Hash outside the write lock
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AccountError::Hashing(e.to_string()))?
            .to_string();

        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(AccountError::UsernameTaken);
        }

        users.insert(
            username.to_string(),
            User {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                created_at: Utc::now(),
            },
        );

        tracing::info!("Registered user {}", username);
        Ok(())
    }

    /// Unknown users and wrong passwords fail the same way
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AccountError> {
        let password_hash = {
            let users = self.users.read().await;
            users
                .get(username.trim())
                .map(|u| u.password_hash.clone())
                .ok_or(AccountError::InvalidCredentials)?
        };

        let parsed = PasswordHash::new(&password_hash)
            .map_err(|_| AccountError::CorruptHash(username.trim().to_string()))?;
        if self.argon2.verify_password(password.as_bytes(), &parsed).is_err() {
            return Err(AccountError::InvalidCredentials);
        }

        tracing::debug!("User {} logged in", username.trim());
        Ok(Session::new(username.trim(), Utc::now(), self.session_timeout))
    }

    pub async fn get(&self, username: &str) -> Option<User> {
        self.users.read().await.get(username).cloned()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("ana.perez@example.com"));
        assert!(validate_email("dev-team@mail.example.co"));
        assert!(!validate_email("no-at-sign.example.com"));
        assert!(!validate_email("user@nodot"));
        assert!(!validate_email("spaces in@example.com"));
    }

    #[tokio::test]
    async fn test_register_rules() {
        let manager = UserManager::new(24);

        assert!(matches!(
            manager.register("", "a@b.co", "longenough").await,
            Err(AccountError::MissingFields)
        ));
        assert!(matches!(
            manager.register("ana", "bad-email", "longenough").await,
            Err(AccountError::InvalidEmail)
        ));
        assert!(matches!(
            manager.register("ana", "ana@example.com", "short").await,
            Err(AccountError::WeakPassword)
        ));

        manager.register("ana", "ana@example.com", "longenough").await.unwrap();
        assert!(matches!(
            manager.register("ana", "other@example.com", "longenough").await,
            Err(AccountError::UsernameTaken)
        ));
        assert_eq!(manager.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_login() {
        let manager = UserManager::new(24);
        manager.register("ana", "ana@example.com", "longenough").await.unwrap();

        let session = manager.login("ana", "longenough").await.unwrap();
        assert_eq!(session.username, "ana");
        assert!(session.is_active());
        assert_eq!(session.expires_at(), session.login_time + Duration::hours(24));

        assert!(matches!(
            manager.login("ana", "wrong-password").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            manager.login("bob", "longenough").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_passwords_are_salted() {
        let manager = UserManager::new(24);
        manager.register("ana", "ana@example.com", "same-password").await.unwrap();
        manager.register("bob", "bob@example.com", "same-password").await.unwrap();

        let ana = manager.get("ana").await.unwrap();
        let bob = manager.get("bob").await.unwrap();
        assert!(ana.password_hash.starts_with("$argon2"));
        assert_ne!(ana.password_hash, bob.password_hash);
    }

    #[test]
    fn test_session_expiry() {
        let login = Utc::now();
        let session = Session::new("ana", login, Duration::hours(24));

        assert!(!session.is_expired(login + Duration::hours(23)));
        assert!(session.is_expired(login + Duration::hours(25)));
        assert_eq!(session.expires_at(), login + Duration::hours(24));
    }
}
