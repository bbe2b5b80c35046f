//! Trip repository for database operations

use anyhow::Result;
use sqlx::{PgPool, QueryBuilder, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use super::DomainError;
use crate::models::{
    DeparturePoint, NewTrip, Trip, TripDetail, TripSearchQuery, TripSummary, UpdateTrip,
    day_bounds,
};

/// Columns selected for a bare trip row
const TRIP_COLUMNS: &str = "id, spot_id, creator_id, departure_point, departure_time, \
     available_seats, difficulty, status, created_at, updated_at";

/// Trip repository
#[derive(Clone)]
pub struct TripRepository {
    pool: PgPool,
}

impl TripRepository {
    /// Create a new trip repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new trip owned by `creator_id`, starting out open
    pub async fn create(&self, creator_id: Uuid, new_trip: &NewTrip) -> Result<Trip> {
        info!("Creating trip to spot {} by {}", new_trip.spot_id, creator_id);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO trips
                (spot_id, creator_id, departure_point, departure_time, available_seats, difficulty)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(new_trip.spot_id)
        .bind(creator_id)
        .bind(Json(&new_trip.departure_point))
        .bind(new_trip.departure_time)
        .bind(new_trip.available_seats)
        .bind(new_trip.difficulty.map(|d| d.as_str()))
        .fetch_one(&self.pool)
        .await?;

        row_to_trip(&row)
    }

    /// All open trips ordered by departure time, with spot and creator names
    pub async fn list_open(&self) -> Result<Vec<TripSummary>> {
        self.search(&TripSearchQuery::default()).await
    }

    /// Search open trips by up to three optional predicates, combined
    /// with AND: spot identity, calendar day, difficulty. Ordered by
    /// departure time ascending.
    pub async fn search(&self, query: &TripSearchQuery) -> Result<Vec<TripSummary>> {
        let mut builder = QueryBuilder::new(
            "SELECT t.id, t.spot_id, t.creator_id, t.departure_point, t.departure_time, \
                    t.available_seats, t.difficulty, t.status, t.created_at, t.updated_at, \
                    s.name AS spot_name, p.full_name AS creator_name \
             FROM trips t \
             JOIN spots s ON s.id = t.spot_id \
             JOIN profiles p ON p.id = t.creator_id \
             WHERE t.status = 'open'",
        );

        if let Some(spot_id) = query.spot_id {
            builder.push(" AND t.spot_id = ");
            builder.push_bind(spot_id);
        }

        if let Some(date) = query.date {
            let (start, end) = day_bounds(date);
            builder.push(" AND t.departure_time >= ");
            builder.push_bind(start);
            builder.push(" AND t.departure_time <= ");
            builder.push_bind(end);
        }

        if let Some(difficulty) = query.difficulty {
            builder.push(" AND t.difficulty = ");
            builder.push_bind(difficulty.as_str());
        }

        builder.push(" ORDER BY t.departure_time ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        rows.iter().map(row_to_summary).collect()
    }

    /// All trips created by `creator_id`, any status, by departure time
    pub async fn list_by_creator(&self, creator_id: Uuid) -> Result<Vec<TripSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.spot_id, t.creator_id, t.departure_point, t.departure_time,
                   t.available_seats, t.difficulty, t.status, t.created_at, t.updated_at,
                   s.name AS spot_name, p.full_name AS creator_name
            FROM trips t
            JOIN spots s ON s.id = t.spot_id
            JOIN profiles p ON p.id = t.creator_id
            WHERE t.creator_id = $1
            ORDER BY t.departure_time ASC
            "#,
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_summary).collect()
    }

    /// Find a bare trip by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Trip>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TRIP_COLUMNS}
            FROM trips
            WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_trip).transpose()
    }

    /// Trip detail with the spot and creator embedded
    pub async fn detail(&self, id: Uuid) -> Result<Option<TripDetail>> {
        let Some(trip) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let spot_row = sqlx::query(
            r#"
            SELECT id, name, latitude, longitude, description, difficulty, created_at
            FROM spots
            WHERE id = $1
            "#,
        )
        .bind(trip.spot_id)
        .fetch_one(&self.pool)
        .await?;

        let creator_row = sqlx::query(
            r#"
            SELECT id, email, full_name, avatar_url, created_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(trip.creator_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(TripDetail {
            trip,
            spot: super::spots::row_to_spot(&spot_row)?,
            creator: super::profiles::row_to_profile(&creator_row),
        }))
    }

    /// Update a trip; creator-only and only while it is open
    pub async fn update(
        &self,
        id: Uuid,
        caller: Uuid,
        update: &UpdateTrip,
    ) -> Result<Trip, DomainError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT creator_id, status FROM trips WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::NotFound)?;

        let creator_id: Uuid = row.get("creator_id");
        let status: String = row.get("status");

        if creator_id != caller {
            return Err(DomainError::Forbidden);
        }
        if status != "open" {
            return Err(DomainError::InvalidState(
                "Only open trips can be edited".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE trips
            SET departure_point = COALESCE($2, departure_point),
                departure_time = COALESCE($3, departure_time),
                available_seats = COALESCE($4, available_seats),
                difficulty = COALESCE($5, difficulty),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.departure_point.as_ref().map(Json))
        .bind(update.departure_time)
        .bind(update.available_seats)
        .bind(update.difficulty.map(|d| d.as_str()))
        .fetch_one(&mut *tx)
        .await?;

        let trip = row_to_trip(&row)?;
        tx.commit().await?;

        Ok(trip)
    }

    /// Cancel a trip; creator-only, open → cancelled
    pub async fn cancel(&self, id: Uuid, caller: Uuid) -> Result<Trip, DomainError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT creator_id, status FROM trips WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::NotFound)?;

        let creator_id: Uuid = row.get("creator_id");
        let status: String = row.get("status");

        if creator_id != caller {
            return Err(DomainError::Forbidden);
        }
        if status != "open" {
            return Err(DomainError::InvalidState(
                "Only open trips can be cancelled".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE trips
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1
            RETURNING {TRIP_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let trip = row_to_trip(&row)?;
        tx.commit().await?;

        info!("Trip {} cancelled by its creator", id);

        Ok(trip)
    }
}

pub(crate) fn row_to_trip(row: &PgRow) -> Result<Trip> {
    let departure_point: Json<DeparturePoint> = row.get("departure_point");
    let difficulty: Option<String> = row.get("difficulty");
    let status: String = row.get("status");

    Ok(Trip {
        id: row.get("id"),
        spot_id: row.get("spot_id"),
        creator_id: row.get("creator_id"),
        departure_point: departure_point.0,
        departure_time: row.get("departure_time"),
        available_seats: row.get("available_seats"),
        difficulty: difficulty.as_deref().map(str::parse).transpose()?,
        status: status.parse()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub(crate) fn row_to_summary(row: &PgRow) -> Result<TripSummary> {
    Ok(TripSummary {
        trip: row_to_trip(row)?,
        spot_name: row.get("spot_name"),
        creator_name: row.get("creator_name"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TripStatus;
    use chrono::{TimeZone, Utc};
    use sqlx::PgPool;

    // Search tests against a real database; run them with a local stack
    // via `cargo test -- --ignored`.

    async fn test_pool() -> PgPool {
        let config = common::database::DatabaseConfig::from_env().expect("database config");
        let pool = common::database::init_pool(&config)
            .await
            .expect("database pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    async fn seed_profile(pool: &PgPool) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO profiles (email, full_name, password_hash)
             VALUES ($1, 'Test Surfer', 'x') RETURNING id",
        )
        .bind(format!("{}@example.com", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("profile fixture")
    }

    async fn seed_spot(pool: &PgPool) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO spots (name, latitude, longitude)
             VALUES ($1, 43.48, -1.56) RETURNING id",
        )
        .bind(format!("Test Spot {}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("spot fixture")
    }

    fn new_trip(spot_id: Uuid, departure_time: chrono::DateTime<Utc>) -> NewTrip {
        NewTrip {
            spot_id,
            departure_point: DeparturePoint {
                address: "Parking de la Côte des Basques".to_string(),
                latitude: 43.478,
                longitude: -1.567,
            },
            departure_time,
            available_seats: 3,
            difficulty: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_date_filter_keeps_only_that_day_sorted_by_departure() {
        let pool = test_pool().await;
        let repo = TripRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;

        let evening = Utc.with_ymd_and_hms(2031, 6, 1, 18, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2031, 6, 1, 7, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2031, 6, 2, 7, 0, 0).unwrap();

        repo.create(creator, &new_trip(spot, evening)).await.unwrap();
        repo.create(creator, &new_trip(spot, morning)).await.unwrap();
        repo.create(creator, &new_trip(spot, next_day)).await.unwrap();

        let query = TripSearchQuery {
            spot_id: Some(spot),
            date: Some(chrono::NaiveDate::from_ymd_opt(2031, 6, 1).unwrap()),
            difficulty: None,
        };
        let results = repo.search(&query).await.unwrap();

        let times: Vec<_> = results.iter().map(|t| t.trip.departure_time).collect();
        assert_eq!(times, vec![morning, evening]);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_search_only_returns_open_trips() {
        let pool = test_pool().await;
        let repo = TripRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;

        let when = Utc.with_ymd_and_hms(2031, 7, 14, 9, 0, 0).unwrap();
        let kept = repo.create(creator, &new_trip(spot, when)).await.unwrap();
        let cancelled = repo.create(creator, &new_trip(spot, when)).await.unwrap();
        repo.cancel(cancelled.id, creator).await.unwrap();

        let query = TripSearchQuery {
            spot_id: Some(spot),
            date: None,
            difficulty: None,
        };
        let results = repo.search(&query).await.unwrap();

        assert!(results.iter().any(|t| t.trip.id == kept.id));
        assert!(results.iter().all(|t| t.trip.id != cancelled.id));
        assert!(results.iter().all(|t| t.trip.status == TripStatus::Open));
    }
}
