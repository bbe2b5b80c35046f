//! Application state shared across handlers

use sqlx::PgPool;

use crate::{
    middleware::TokenVerifier,
    realtime::ChangeFeed,
    repositories::{
        MessageRepository, ProfileRepository, SpotRepository, TripRepository,
        TripRequestRepository,
    },
    storage::AvatarStorage,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub spot_repository: SpotRepository,
    pub trip_repository: TripRepository,
    pub request_repository: TripRequestRepository,
    pub message_repository: MessageRepository,
    pub profile_repository: ProfileRepository,
    pub change_feed: ChangeFeed,
    pub token_verifier: TokenVerifier,
    pub avatar_storage: AvatarStorage,
}
