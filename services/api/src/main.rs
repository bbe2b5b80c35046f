use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod middleware;
mod models;
mod realtime;
mod repositories;
mod routes;
mod state;
mod storage;

use aws_config::BehaviorVersion;

use crate::{
    config::ApiSettings,
    middleware::TokenVerifier,
    realtime::ChangeFeed,
    repositories::{
        MessageRepository, ProfileRepository, SpotRepository, TripRepository,
        TripRequestRepository,
    },
    state::AppState,
    storage::AvatarStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting API service");

    let settings = ApiSettings::load()?;

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Apply pending migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize token verification against the auth service's public key
    let token_verifier = TokenVerifier::from_env()?;

    // Initialize S3-backed avatar storage
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let avatar_storage = AvatarStorage::new(
        s3_client,
        settings.avatar_bucket.clone(),
        settings.avatar_public_base.clone(),
    );

    info!("API service initialized successfully");

    // Initialize repositories and the change feed
    let app_state = AppState {
        db_pool: pool.clone(),
        spot_repository: SpotRepository::new(pool.clone()),
        trip_repository: TripRepository::new(pool.clone()),
        request_repository: TripRequestRepository::new(pool.clone()),
        message_repository: MessageRepository::new(pool.clone()),
        profile_repository: ProfileRepository::new(pool),
        change_feed: ChangeFeed::new(),
        token_verifier,
        avatar_storage,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    info!("API service listening on {}", settings.bind_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
