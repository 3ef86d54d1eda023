//! Repositories for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{FavouriteList, NewUser, Reminder, User, toggle_membership};

pub mod media;

const USER_COLUMNS: &str = "id, email, name, surname, password_hash, fav_videos, \
     fav_meditations, reminder_time, reminder_days, created_at, updated_at";

/// Errors raised while registering a user
#[derive(Debug, Error)]
pub enum UserRepositoryError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Failed to hash password: {0}")]
    Hashing(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> Result<String, UserRepositoryError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserRepositoryError::Hashing(e.to_string()))
}

/// Check a password against a stored argon2 hash
pub fn verify_password(password_hash: &str, password: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Run the same argon2 work as a real check against a throwaway hash
///
/// Logins for unknown emails call this so they take as long as a wrong
/// password for a registered one.
pub fn verify_dummy_password(password: &str) -> Result<()> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    let hash = match DUMMY_HASH.get() {
        Some(hash) => hash,
        None => {
            let hash = hash_password("stillpoint-unused-password-1")?;
            DUMMY_HASH.get_or_init(|| hash)
        }
    };

    verify_password(hash, password)?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> User {
    let reminder_time: Option<String> = row.get("reminder_time");
    let reminder_days: Vec<String> = row.get("reminder_days");

    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        surname: row.get("surname"),
        password_hash: row.get("password_hash"),
        fav_videos: row.get("fav_videos"),
        fav_meditations: row.get("fav_meditations"),
        reminder: reminder_time.map(|time| Reminder {
            time,
            days: reminder_days,
        }),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, new_user: &NewUser) -> Result<User, UserRepositoryError> {
        info!("Creating new user: {}", new_user.email);

        let password_hash = hash_password(&new_user.password)?;

        let query = format!(
            "INSERT INTO users (email, name, surname, password_hash) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(&new_user.email)
            .bind(&new_user.name)
            .bind(&new_user.surname)
            .bind(&password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db_error) if db_error.is_unique_violation() => {
                    UserRepositoryError::DuplicateEmail
                }
                _ => UserRepositoryError::Database(e),
            })?;

        Ok(user_from_row(&row))
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Add `id` to a favourites list, or remove it when already present
    ///
    /// The row is locked while the list is toggled, so concurrent toggles
    /// of the same user serialize and the list stays a set.
    pub async fn toggle_favourite(
        &self,
        email: &str,
        list: FavouriteList,
        id: Uuid,
    ) -> Result<Option<User>> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM users WHERE email = $1 FOR UPDATE",
            list.column()
        );
        let current: Option<Vec<Uuid>> = sqlx::query_scalar(&select)
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(mut favourites) = current else {
            return Ok(None);
        };

        let outcome = toggle_membership(&mut favourites, id);
        info!("Favourite {} {:?} in {} for {}", id, outcome, list.column(), email);

        let update = format!(
            "UPDATE users SET {} = $2, updated_at = NOW() WHERE email = $1 RETURNING {USER_COLUMNS}",
            list.column()
        );
        let row = sqlx::query(&update)
            .bind(email)
            .bind(&favourites)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user_from_row(&row)))
    }

    /// Replace the reminder setting of a user
    pub async fn set_reminder(&self, email: &str, reminder: &Reminder) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET reminder_time = $2, reminder_days = $3, updated_at = NOW() \
             WHERE email = $1 RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(email)
            .bind(&reminder.time)
            .bind(&reminder.days)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }
}
