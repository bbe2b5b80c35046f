//! Message repository and conversation aggregation
//!
//! Conversations are derived at read time: one per trip the user created
//! or was accepted into. The unread count is a correlated aggregate per
//! trip (messages with `read = false` from other senders) — linear in the
//! number of conversations, no persisted cursor.

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::DomainError;
use crate::models::{Conversation, Message, MessageWithSender, TripSummary};

/// Message repository
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    /// Create a new message repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Whether a user may read and write a trip's conversation: its
    /// creator and accepted participants only
    pub async fn ensure_participant(
        &self,
        trip_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), DomainError> {
        let trip_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM trips WHERE id = $1)")
                .bind(trip_id)
                .fetch_one(&self.pool)
                .await?;

        if !trip_exists {
            return Err(DomainError::NotFound);
        }

        let is_participant: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM trips WHERE id = $1 AND creator_id = $2)
                OR EXISTS (
                    SELECT 1 FROM trip_requests
                    WHERE trip_id = $1 AND user_id = $2 AND status = 'accepted'
                )
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        if !is_participant {
            return Err(DomainError::Forbidden);
        }

        Ok(())
    }

    /// A trip's messages, oldest first, with sender names
    pub async fn list_for_trip(&self, trip_id: Uuid) -> Result<Vec<MessageWithSender>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.trip_id, m.user_id, m.content, m.read, m.created_at,
                   p.full_name AS sender_name
            FROM messages m
            JOIN profiles p ON p.id = m.user_id
            WHERE m.trip_id = $1
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MessageWithSender {
                message: row_to_message(row),
                sender_name: row.get("sender_name"),
            })
            .collect())
    }

    /// Append a message to a trip's conversation
    pub async fn send(&self, trip_id: Uuid, user_id: Uuid, content: &str) -> Result<Message> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (trip_id, user_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, trip_id, user_id, content, read, created_at
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_message(&row))
    }

    /// Mark everyone else's messages on a trip as read for the caller;
    /// returns how many rows changed
    pub async fn mark_read(&self, trip_id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE
            WHERE trip_id = $1 AND user_id <> $2 AND read = FALSE
            "#,
        )
        .bind(trip_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// The caller's conversation list: one entry per trip they created or
    /// were accepted into, with the latest message and the unread count
    pub async fn conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.spot_id, t.creator_id, t.departure_point, t.departure_time,
                   t.available_seats, t.difficulty, t.status, t.created_at, t.updated_at,
                   s.name AS spot_name, p.full_name AS creator_name,
                   lm.id AS last_message_id, lm.user_id AS last_message_user_id,
                   lm.content AS last_message_content, lm.read AS last_message_read,
                   lm.created_at AS last_message_created_at,
                   (SELECT COUNT(*) FROM messages m
                    WHERE m.trip_id = t.id AND m.read = FALSE AND m.user_id <> $1
                   ) AS unread_count
            FROM trips t
            JOIN spots s ON s.id = t.spot_id
            JOIN profiles p ON p.id = t.creator_id
            LEFT JOIN LATERAL (
                SELECT id, user_id, content, read, created_at
                FROM messages m
                WHERE m.trip_id = t.id
                ORDER BY m.created_at DESC
                LIMIT 1
            ) lm ON TRUE
            WHERE t.creator_id = $1
               OR EXISTS (
                    SELECT 1 FROM trip_requests r
                    WHERE r.trip_id = t.id AND r.user_id = $1 AND r.status = 'accepted'
               )
            ORDER BY lm.created_at DESC NULLS LAST
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect()
    }
}

fn row_to_message(row: &PgRow) -> Message {
    Message {
        id: row.get("id"),
        trip_id: row.get("trip_id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        read: row.get("read"),
        created_at: row.get("created_at"),
    }
}

fn row_to_conversation(row: &PgRow) -> Result<Conversation> {
    let trip: TripSummary = super::trips::row_to_summary(row)?;

    let last_message = row
        .get::<Option<Uuid>, _>("last_message_id")
        .map(|id| Message {
            id,
            trip_id: trip.trip.id,
            user_id: row.get("last_message_user_id"),
            content: row.get("last_message_content"),
            read: row.get("last_message_read"),
            created_at: row.get("last_message_created_at"),
        });

    Ok(Conversation {
        trip,
        last_message,
        unread_count: row.get("unread_count"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeparturePoint, NewTrip};
    use crate::repositories::{TripRepository, TripRequestRepository};
    use chrono::{Duration, Utc};
    use sqlx::PgPool;

    // Conversation tests against a real database; run them with a local
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

    async fn seed_trip_with_participant(pool: &PgPool) -> (Uuid, Uuid, Uuid) {
        let creator = seed_profile(pool).await;
        let rider = seed_profile(pool).await;

        let spot: Uuid = sqlx::query_scalar(
            "INSERT INTO spots (name, latitude, longitude)
             VALUES ($1, 43.48, -1.56) RETURNING id",
        )
        .bind(format!("Test Spot {}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .expect("spot fixture");

        let trip = TripRepository::new(pool.clone())
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
                    available_seats: 2,
                    difficulty: None,
                },
            )
            .await
            .expect("trip fixture");

        let requests = TripRequestRepository::new(pool.clone());
        let request = requests.create(trip.id, rider).await.expect("join");
        requests.accept(request.id, creator).await.expect("accept");

        (trip.id, creator, rider)
    }

    fn unread_for(conversations: &[Conversation], trip_id: Uuid) -> i64 {
        conversations
            .iter()
            .find(|c| c.trip.trip.id == trip_id)
            .expect("conversation present")
            .unread_count
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_unread_count_ignores_own_messages() {
        let pool = test_pool().await;
        let repo = MessageRepository::new(pool.clone());

        let (trip_id, creator, rider) = seed_trip_with_participant(&pool).await;

        repo.send(trip_id, creator, "On part à 7h").await.unwrap();
        repo.send(trip_id, creator, "Pensez aux combis").await.unwrap();
        repo.send(trip_id, rider, "Bien reçu").await.unwrap();

        // The rider sees the creator's two messages as unread, never
        // their own.
        let rider_view = repo.conversations(rider).await.unwrap();
        assert_eq!(unread_for(&rider_view, trip_id), 2);

        let creator_view = repo.conversations(creator).await.unwrap();
        assert_eq!(unread_for(&creator_view, trip_id), 1);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_mark_read_clears_other_senders_messages_only() {
        let pool = test_pool().await;
        let repo = MessageRepository::new(pool.clone());

        let (trip_id, creator, rider) = seed_trip_with_participant(&pool).await;

        repo.send(trip_id, creator, "Salut").await.unwrap();
        repo.send(trip_id, rider, "Salut !").await.unwrap();

        let updated = repo.mark_read(trip_id, rider).await.unwrap();
        assert_eq!(updated, 1);

        let rider_view = repo.conversations(rider).await.unwrap();
        assert_eq!(unread_for(&rider_view, trip_id), 0);

        // The rider's own message is still unread for the creator.
        let creator_view = repo.conversations(creator).await.unwrap();
        assert_eq!(unread_for(&creator_view, trip_id), 1);
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_outsiders_cannot_touch_a_conversation() {
        let pool = test_pool().await;
        let repo = MessageRepository::new(pool.clone());

        let (trip_id, _creator, _rider) = seed_trip_with_participant(&pool).await;
        let stranger = seed_profile(&pool).await;

        assert!(matches!(
            repo.ensure_participant(trip_id, stranger).await.unwrap_err(),
            DomainError::Forbidden
        ));
        assert!(matches!(
            repo.ensure_participant(Uuid::new_v4(), stranger)
                .await
                .unwrap_err(),
            DomainError::NotFound
        ));
    }

    #[tokio::test]
    #[ignore = "requires a local PostgreSQL instance"]
    async fn test_conversation_carries_the_latest_message() {
        let pool = test_pool().await;
        let repo = MessageRepository::new(pool.clone());

        let (trip_id, creator, rider) = seed_trip_with_participant(&pool).await;

        repo.send(trip_id, creator, "Premier message").await.unwrap();
        repo.send(trip_id, rider, "Dernier message").await.unwrap();

        let view = repo.conversations(creator).await.unwrap();
        let conversation = view.iter().find(|c| c.trip.trip.id == trip_id).unwrap();
        assert_eq!(
            conversation.last_message.as_ref().unwrap().content,
            "Dernier message"
        );
    }
}
