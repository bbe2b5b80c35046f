//! Profile repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewProfile, Profile};

/// Profile repository
#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    /// Create a new profile repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new profile with a hashed password
    pub async fn create(&self, new_profile: &NewProfile) -> Result<Profile> {
        info!("Creating new profile: {}", new_profile.email);

        let password_hash = hash_password(&new_profile.password)?;

        let row = sqlx::query(
            r#"
            INSERT INTO profiles (email, full_name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, full_name, avatar_url, password_hash, created_at, updated_at
            "#,
        )
        .bind(&new_profile.email)
        .bind(&new_profile.full_name)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_profile(&row))
    }

    /// Find a profile by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, full_name, avatar_url, password_hash, created_at, updated_at
            FROM profiles
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_profile(&row)))
    }

    /// Find a profile by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, full_name, avatar_url, password_hash, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row_to_profile(&row)))
    }

    /// Verify a profile's password
    pub async fn verify_password(&self, profile: &Profile, password: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(&profile.password_hash)
            .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

        let argon2 = Argon2::default();
        let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

        Ok(result.is_ok())
    }

    /// Replace a profile's password hash
    pub async fn update_password(&self, id: Uuid, password: &str) -> Result<()> {
        info!("Updating password for profile: {}", id);

        let password_hash = hash_password(password)?;

        sqlx::query(
            r#"
            UPDATE profiles
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(password_hash)
}

fn row_to_profile(row: &sqlx::postgres::PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        avatar_url: row.get("avatar_url"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
