//! Spot repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::DomainError;
use crate::models::{NewSpot, Spot, UpdateSpot};

/// Spot repository
#[derive(Clone)]
pub struct SpotRepository {
    pool: PgPool,
}

impl SpotRepository {
    /// Create a new spot repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get all spots ordered by name
    pub async fn list(&self) -> Result<Vec<Spot>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, latitude, longitude, description, difficulty, created_at
            FROM spots
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_spot).collect()
    }

    /// Find a spot by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Spot>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, latitude, longitude, description, difficulty, created_at
            FROM spots
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_spot).transpose()
    }

    /// Create a new spot
    pub async fn create(&self, new_spot: &NewSpot) -> Result<Spot> {
        let row = sqlx::query(
            r#"
            INSERT INTO spots (name, latitude, longitude, description, difficulty)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, latitude, longitude, description, difficulty, created_at
            "#,
        )
        .bind(&new_spot.name)
        .bind(new_spot.latitude)
        .bind(new_spot.longitude)
        .bind(&new_spot.description)
        .bind(new_spot.difficulty.map(|d| d.as_str()))
        .fetch_one(&self.pool)
        .await?;

        row_to_spot(&row)
    }

    /// Update a spot; absent fields keep their value
    pub async fn update(&self, id: Uuid, update: &UpdateSpot) -> Result<Option<Spot>> {
        let row = sqlx::query(
            r#"
            UPDATE spots
            SET name = COALESCE($2, name),
                latitude = COALESCE($3, latitude),
                longitude = COALESCE($4, longitude),
                description = COALESCE($5, description),
                difficulty = COALESCE($6, difficulty)
            WHERE id = $1
            RETURNING id, name, latitude, longitude, description, difficulty, created_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(update.latitude)
        .bind(update.longitude)
        .bind(&update.description)
        .bind(update.difficulty.map(|d| d.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_spot).transpose()
    }

    /// Delete a spot; fails with a conflict when trips still reference it
    pub async fn delete(&self, id: Uuid) -> Result<Spot, DomainError> {
        let row = sqlx::query(
            r#"
            DELETE FROM spots
            WHERE id = $1
            RETURNING id, name, latitude, longitude, description, difficulty, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DomainError::InvalidState("Spot is still referenced by trips".to_string())
            }
            _ => DomainError::Database(e),
        })?;

        match row {
            Some(row) => Ok(row_to_spot(&row)?),
            None => Err(DomainError::NotFound),
        }
    }
}

pub(crate) fn row_to_spot(row: &PgRow) -> Result<Spot> {
    let difficulty: Option<String> = row.get("difficulty");

    Ok(Spot {
        id: row.get("id"),
        name: row.get("name"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        description: row.get("description"),
        difficulty: difficulty.as_deref().map(str::parse).transpose()?,
        created_at: row.get("created_at"),
    })
}
