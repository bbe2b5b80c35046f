//! Trip request repository: join, accept, reject, cancel
//!
//! All lifecycle transitions run inside one transaction with the request
//! row and its trip row locked, so the status change and the seat
//! accounting land together or not at all. Acceptance decrements the seat
//! count conditionally (`available_seats > 0`); cancelling a previously
//! accepted request restores exactly one seat.

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::DomainError;
use crate::models::{Participation, RequestStatus, Trip, TripRequest, TripRequestWithContext};

/// Trip request repository
#[derive(Clone)]
pub struct TripRequestRepository {
    pool: PgPool,
}

impl TripRequestRepository {
    /// Create a new trip request repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ask to join a trip
    ///
    /// The trip must be open, the caller must not be its creator, and at
    /// most one non-cancelled request may exist per (trip, user). The
    /// partial unique index backs up the existence check against
    /// concurrent joins.
    pub async fn create(&self, trip_id: Uuid, user_id: Uuid) -> Result<TripRequest, DomainError> {
        let mut tx = self.pool.begin().await?;

        let trip_row = sqlx::query("SELECT creator_id, status FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::NotFound)?;

        let creator_id: Uuid = trip_row.get("creator_id");
        let status: String = trip_row.get("status");

        if creator_id == user_id {
            return Err(DomainError::Forbidden);
        }
        if status != "open" {
            return Err(DomainError::InvalidState(
                "Trip is not open for requests".to_string(),
            ));
        }

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM trip_requests
                WHERE trip_id = $1 AND user_id = $2 AND status <> 'cancelled'
            )
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        if exists {
            return Err(DomainError::DuplicateRequest);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO trip_requests (trip_id, user_id)
            VALUES ($1, $2)
            RETURNING id, trip_id, user_id, status, created_at, updated_at
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::DuplicateRequest,
            _ => DomainError::Database(e),
        })?;

        let request = row_to_request(&row)?;
        tx.commit().await?;

        info!("User {} requested to join trip {}", user_id, trip_id);

        Ok(request)
    }

    /// Accept a pending request; trip-creator only
    ///
    /// The seat decrement is conditional on a seat being left. Zero rows
    /// affected rolls the whole transaction back, so the request never
    /// ends up accepted on a trip without seats.
    pub async fn accept(
        &self,
        request_id: Uuid,
        caller: Uuid,
    ) -> Result<(TripRequest, Trip), DomainError> {
        let mut tx = self.pool.begin().await?;

        let row = self.lock_request(&mut tx, request_id).await?;

        let trip_id: Uuid = row.get("trip_id");
        let creator_id: Uuid = row.get("creator_id");
        let status: RequestStatus = parse_status(&row)?;

        if creator_id != caller {
            return Err(DomainError::Forbidden);
        }
        if !status.can_be_decided() {
            return Err(DomainError::InvalidState(
                "Request is not pending".to_string(),
            ));
        }

        let request_row = sqlx::query(
            r#"
            UPDATE trip_requests
            SET status = 'accepted', updated_at = NOW()
            WHERE id = $1
            RETURNING id, trip_id, user_id, status, created_at, updated_at
            "#,
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        let trip_row = sqlx::query(
            r#"
            UPDATE trips
            SET available_seats = available_seats - 1, updated_at = NOW()
            WHERE id = $1 AND available_seats > 0
            RETURNING id, spot_id, creator_id, departure_point, departure_time,
                      available_seats, difficulty, status, created_at, updated_at
            "#,
        )
        .bind(trip_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DomainError::SeatsExhausted)?;

        let request = row_to_request(&request_row)?;
        let trip = super::trips::row_to_trip(&trip_row)?;
        tx.commit().await?;

        info!("Request {} accepted, trip {} has {} seats left",
            request_id, trip.id, trip.available_seats);

        Ok((request, trip))
    }

    /// Reject a pending request; trip-creator only, no side effects
    pub async fn reject(&self, request_id: Uuid, caller: Uuid) -> Result<TripRequest, DomainError> {
        let mut tx = self.pool.begin().await?;

        let row = self.lock_request(&mut tx, request_id).await?;

        let creator_id: Uuid = row.get("creator_id");
        let status: RequestStatus = parse_status(&row)?;

        if creator_id != caller {
            return Err(DomainError::Forbidden);
        }
        if !status.can_be_decided() {
            return Err(DomainError::InvalidState(
                "Request is not pending".to_string(),
            ));
        }

        let request_row = sqlx::query(
            r#"
            UPDATE trip_requests
            SET status = 'rejected', updated_at = NOW()
            WHERE id = $1
            RETURNING id, trip_id, user_id, status, created_at, updated_at
            "#,
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        let request = row_to_request(&request_row)?;
        tx.commit().await?;

        Ok(request)
    }

    /// Cancel the caller's own request
    ///
    /// Allowed while pending or accepted. Cancelling an accepted request
    /// gives its seat back to the trip in the same transaction.
    pub async fn cancel(
        &self,
        request_id: Uuid,
        caller: Uuid,
    ) -> Result<(TripRequest, Option<Trip>), DomainError> {
        let mut tx = self.pool.begin().await?;

        let row = self.lock_request(&mut tx, request_id).await?;

        let trip_id: Uuid = row.get("trip_id");
        let user_id: Uuid = row.get("user_id");
        let status: RequestStatus = parse_status(&row)?;

        if user_id != caller {
            return Err(DomainError::Forbidden);
        }
        if !status.can_be_cancelled() {
            return Err(DomainError::InvalidState(
                "Request can no longer be cancelled".to_string(),
            ));
        }

        let request_row = sqlx::query(
            r#"
            UPDATE trip_requests
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1
            RETURNING id, trip_id, user_id, status, created_at, updated_at
            "#,
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        // A seat was consumed on acceptance; hand it back.
        let trip = if status == RequestStatus::Accepted {
            let trip_row = sqlx::query(
                r#"
                UPDATE trips
                SET available_seats = available_seats + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING id, spot_id, creator_id, departure_point, departure_time,
                          available_seats, difficulty, status, created_at, updated_at
                "#,
            )
            .bind(trip_id)
            .fetch_one(&mut *tx)
            .await?;

            Some(super::trips::row_to_trip(&trip_row)?)
        } else {
            None
        };

        let request = row_to_request(&request_row)?;
        tx.commit().await?;

        info!("Request {} cancelled by its requester", request_id);

        Ok((request, trip))
    }

    /// The caller's live request for a trip, if any
    pub async fn find_for_trip_and_user(
        &self,
        trip_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TripRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, trip_id, user_id, status, created_at, updated_at
            FROM trip_requests
            WHERE trip_id = $1 AND user_id = $2 AND status <> 'cancelled'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    /// Pending requests across the caller's own trips, newest first
    pub async fn list_pending_for_creator(
        &self,
        creator_id: Uuid,
    ) -> Result<Vec<TripRequestWithContext>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.trip_id, r.user_id, r.status, r.created_at, r.updated_at,
                   s.name AS spot_name, p.full_name AS requester_name, t.departure_time
            FROM trip_requests r
            JOIN trips t ON t.id = r.trip_id
            JOIN spots s ON s.id = t.spot_id
            JOIN profiles p ON p.id = r.user_id
            WHERE t.creator_id = $1 AND r.status = 'pending'
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request_with_context).collect()
    }

    /// All requests the caller has sent, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<TripRequestWithContext>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.trip_id, r.user_id, r.status, r.created_at, r.updated_at,
                   s.name AS spot_name, p.full_name AS requester_name, t.departure_time
            FROM trip_requests r
            JOIN trips t ON t.id = r.trip_id
            JOIN spots s ON s.id = t.spot_id
            JOIN profiles p ON p.id = r.user_id
            WHERE r.user_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request_with_context).collect()
    }

    /// Trips the caller was accepted into, newest acceptance first
    pub async fn list_participations(&self, user_id: Uuid) -> Result<Vec<Participation>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.spot_id, t.creator_id, t.departure_point, t.departure_time,
                   t.available_seats, t.difficulty, t.status, t.created_at, t.updated_at,
                   s.name AS spot_name, p.full_name AS creator_name,
                   r.id AS request_id, r.status AS request_status,
                   r.created_at AS request_created_at, r.updated_at AS request_updated_at
            FROM trip_requests r
            JOIN trips t ON t.id = r.trip_id
            JOIN spots s ON s.id = t.spot_id
            JOIN profiles p ON p.id = t.creator_id
            WHERE r.user_id = $1 AND r.status = 'accepted'
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let trip = super::trips::row_to_summary(row)?;
                let request = TripRequest {
                    id: row.get("request_id"),
                    trip_id: row.get("id"),
                    user_id,
                    status: row.get::<String, _>("request_status").parse()?,
                    created_at: row.get("request_created_at"),
                    updated_at: row.get("request_updated_at"),
                };
                Ok(Participation { trip, request })
            })
            .collect()
    }

    /// Lock a request row together with its trip row
    async fn lock_request(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        request_id: Uuid,
    ) -> Result<PgRow, DomainError> {
        sqlx::query(
            r#"
            SELECT r.id, r.trip_id, r.user_id, r.status, t.creator_id
            FROM trip_requests r
            JOIN trips t ON t.id = r.trip_id
            WHERE r.id = $1
            FOR UPDATE OF r, t
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(DomainError::NotFound)
    }
}

fn parse_status(row: &PgRow) -> Result<RequestStatus> {
    row.get::<String, _>("status").parse()
}

pub(crate) fn row_to_request(row: &PgRow) -> Result<TripRequest> {
    Ok(TripRequest {
        id: row.get("id"),
        trip_id: row.get("trip_id"),
        user_id: row.get("user_id"),
        status: parse_status(row)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_request_with_context(row: &PgRow) -> Result<TripRequestWithContext> {
    Ok(TripRequestWithContext {
        request: row_to_request(row)?,
        spot_name: row.get("spot_name"),
        requester_name: row.get("requester_name"),
        departure_time: row.get("departure_time"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeparturePoint, NewTrip};
    use crate::repositories::trips::TripRepository;
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    // Lifecycle tests against a real database; run them with a local
    // stack via `cargo test -- --ignored`.

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

    async fn seed_trip(pool: &PgPool, creator: Uuid, spot: Uuid, seats: i32) -> Trip {
        TripRepository::new(pool.clone())
            .create(
                creator,
                &NewTrip {
                    spot_id: spot,
                    departure_point: DeparturePoint {
                        address: "Parking de la Côte des Basques".to_string(),
                        latitude: 43.478,
                        longitude: -1.567,
                    },
                    departure_time: Utc::now() + Duration::days(1),
                    available_seats: seats,
                    difficulty: None,
                },
            )
            .await
            .expect("trip fixture")
    }

    async fn seats_left(pool: &PgPool, trip_id: Uuid) -> i32 {
        sqlx::query_scalar("SELECT available_seats FROM trips WHERE id = $1")
            .bind(trip_id)
            .fetch_one(pool)
            .await
            .expect("trip row")
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_accept_consumes_exactly_one_seat() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let rider = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 3).await;

        let request = repo.create(trip.id, rider).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let (accepted, updated_trip) = repo.accept(request.id, creator).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(updated_trip.available_seats, 2);
        assert_eq!(seats_left(&pool, trip.id).await, 2);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_accept_with_no_seats_left_fails_and_changes_nothing() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let first = seed_profile(&pool).await;
        let second = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 1).await;

        let first_request = repo.create(trip.id, first).await.unwrap();
        let second_request = repo.create(trip.id, second).await.unwrap();

        repo.accept(first_request.id, creator).await.unwrap();
        assert_eq!(seats_left(&pool, trip.id).await, 0);

        let err = repo.accept(second_request.id, creator).await.unwrap_err();
        assert!(matches!(err, DomainError::SeatsExhausted));

        // The whole transaction rolled back: the request is still pending
        // and the seat count never went negative.
        let status: String =
            sqlx::query_scalar("SELECT status FROM trip_requests WHERE id = $1")
                .bind(second_request.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(seats_left(&pool, trip.id).await, 0);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_cancelling_accepted_request_restores_one_seat() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let rider = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 2).await;

        let request = repo.create(trip.id, rider).await.unwrap();
        repo.accept(request.id, creator).await.unwrap();
        assert_eq!(seats_left(&pool, trip.id).await, 1);

        let (cancelled, restored) = repo.cancel(request.id, rider).await.unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(restored.unwrap().available_seats, 2);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_cancelling_pending_request_leaves_seats_alone() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let rider = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 2).await;

        let request = repo.create(trip.id, rider).await.unwrap();
        let (cancelled, restored) = repo.cancel(request.id, rider).await.unwrap();

        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(restored.is_none());
        assert_eq!(seats_left(&pool, trip.id).await, 2);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_second_live_request_is_rejected() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let rider = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 2).await;

        repo.create(trip.id, rider).await.unwrap();
        let err = repo.create(trip.id, rider).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateRequest));

        // After cancelling, the rider may ask again.
        let request = repo.find_for_trip_and_user(trip.id, rider).await.unwrap();
        repo.cancel(request.unwrap().id, rider).await.unwrap();
        assert!(repo.create(trip.id, rider).await.is_ok());
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_only_the_creator_decides_and_only_the_requester_cancels() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let rider = seed_profile(&pool).await;
        let stranger = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 2).await;

        let request = repo.create(trip.id, rider).await.unwrap();

        assert!(matches!(
            repo.accept(request.id, stranger).await.unwrap_err(),
            DomainError::Forbidden
        ));
        assert!(matches!(
            repo.reject(request.id, rider).await.unwrap_err(),
            DomainError::Forbidden
        ));
        assert!(matches!(
            repo.cancel(request.id, creator).await.unwrap_err(),
            DomainError::Forbidden
        ));
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_creator_cannot_request_their_own_trip() {
        let pool = test_pool().await;
        let repo = TripRequestRepository::new(pool.clone());

        let creator = seed_profile(&pool).await;
        let spot = seed_spot(&pool).await;
        let trip = seed_trip(&pool, creator, spot, 2).await;

        assert!(matches!(
            repo.create(trip.id, creator).await.unwrap_err(),
            DomainError::Forbidden
        ));
    }
}
