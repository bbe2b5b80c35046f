//! Profile repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{Profile, UpdateProfile};

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

    /// Find a profile by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, full_name, avatar_url, created_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_profile))
    }

    /// Update a profile; absent fields keep their value
    pub async fn update(&self, id: Uuid, update: &UpdateProfile) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($2, full_name),
                avatar_url = COALESCE($3, avatar_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, full_name, avatar_url, created_at
            "#,
        )
        .bind(id)
        .bind(&update.full_name)
        .bind(&update.avatar_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_profile))
    }
}

pub(crate) fn row_to_profile(row: &PgRow) -> Profile {
    Profile {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        avatar_url: row.get("avatar_url"),
        created_at: row.get("created_at"),
    }
}
