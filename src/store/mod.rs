//! User store.
//!
//! Accounts live as one JSON document per user under
//! `<paths.data>/users/`, with argon2id password hashes. Writes go through
//! an exclusive file lock because the `euphio user` CLI may mutate the
//! store while the server is running.

use std::path::{Path, PathBuf};

use argon2::Argon2;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::info;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt user record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("password hashing failed: {0}")]
    Hash(password_hash::Error),
}

impl From<password_hash::Error> for StoreError {
    fn from(err: password_hash::Error) -> Self {
        StoreError::Hash(err)
    }
}

/// A stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

pub struct Store {
    users_dir: PathBuf,
    argon2: Argon2<'static>,
}

impl Store {
    /// Open (creating if needed) the store under `data_dir`.
    pub async fn open(data_dir: &str) -> Result<Self, StoreError> {
        let users_dir = Path::new(data_dir).join("users");
        fs::create_dir_all(&users_dir).await?;
        Ok(Store {
            users_dir,
            argon2: Argon2::default(),
        })
    }

    fn user_path(&self, username: &str) -> PathBuf {
        self.users_dir.join(format!("{}.json", username.to_lowercase()))
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, StoreError> {
        validate_username(username)?;
        let path = self.user_path(username);
        if fs::try_exists(&path).await? {
            return Err(StoreError::UserExists(username.to_string()));
        }

        let user = User {
            username: username.to_string(),
            password_hash: self.hash_password(password)?,
            created_at: Utc::now(),
            last_login: None,
        };
        self.write_user(&path, &user).await?;
        info!("user created username={username}");
        Ok(user)
    }

    pub async fn find_user(&self, username: &str) -> Result<User, StoreError> {
        let path = self.user_path(username);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::UserNotFound(username.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Verify credentials, stamping `last_login` on success.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let mut user = match self.find_user(username).await {
            Ok(user) => user,
            Err(StoreError::UserNotFound(_)) => return Err(StoreError::InvalidCredentials),
            Err(e) => return Err(e),
        };

        let parsed = PasswordHash::new(&user.password_hash)?;
        if self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Err(StoreError::InvalidCredentials);
        }

        user.last_login = Some(Utc::now());
        self.write_user(&self.user_path(username), &user).await?;
        Ok(user)
    }

    pub async fn update_password(&self, username: &str, password: &str) -> Result<(), StoreError> {
        let mut user = self.find_user(username).await?;
        user.password_hash = self.hash_password(password)?;
        self.write_user(&self.user_path(username), &user).await?;
        info!("password updated username={username}");
        Ok(())
    }

    pub async fn rename_user(&self, old: &str, new: &str) -> Result<(), StoreError> {
        validate_username(new)?;
        let new_path = self.user_path(new);
        if fs::try_exists(&new_path).await? {
            return Err(StoreError::UserExists(new.to_string()));
        }
        let mut user = self.find_user(old).await?;
        user.username = new.to_string();
        self.write_user(&new_path, &user).await?;
        fs::remove_file(self.user_path(old)).await?;
        info!("user renamed old={old} new={new}");
        Ok(())
    }

    pub async fn remove_user(&self, username: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.user_path(username)).await {
            Ok(()) => {
                info!("user removed username={username}");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::UserNotFound(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn hash_password(&self, password: &str) -> Result<String, StoreError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// Serialize and write a record under an exclusive file lock.
    async fn write_user(&self, path: &Path, user: &User) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(user)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?;
            file.lock_exclusive()?;
            file.write_all(&content)?;
            file.unlock()?;
            Ok(())
        })
        .await
        .expect("store write task panicked")
    }
}

fn validate_username(username: &str) -> Result<(), StoreError> {
    let ok_len = (3..=16).contains(&username.len());
    let ok_start = username.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let ok_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok_len && ok_start && ok_chars {
        Ok(())
    } else {
        Err(StoreError::InvalidUsername(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_authenticate() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store.create_user("alice", "hunter2hunter2").await.unwrap();
        let user = store.authenticate("alice", "hunter2hunter2").await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.last_login.is_some());

        assert!(matches!(
            store.authenticate("alice", "wrong").await,
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            store.authenticate("nobody", "whatever").await,
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_usernames_rejected() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_user("bob", "password1").await.unwrap();
        assert!(matches!(
            store.create_user("bob", "password2").await,
            Err(StoreError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn rename_and_remove() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_user("carol", "password1").await.unwrap();

        store.rename_user("carol", "carole").await.unwrap();
        assert!(store.find_user("carol").await.is_err());
        assert_eq!(store.find_user("carole").await.unwrap().username, "carole");

        store.remove_user("carole").await.unwrap();
        assert!(matches!(
            store.remove_user("carole").await,
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn password_update_invalidates_old() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.create_user("dave", "firstpass").await.unwrap();
        store.update_password("dave", "secondpass").await.unwrap();

        assert!(store.authenticate("dave", "firstpass").await.is_err());
        assert!(store.authenticate("dave", "secondpass").await.is_ok());
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a_1").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("1abc").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("waytoolongusername99").is_err());
    }
}
