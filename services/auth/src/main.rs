use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod jwt;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod session;
mod validation;

use sqlx::PgPool;

use crate::{
    config::AuthSettings, jwt::JwtService, rate_limiter::RateLimiter,
    repositories::ProfileRepository, session::SessionManager,
};
use common::cache::RedisPool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub profile_repository: ProfileRepository,
    pub session_manager: SessionManager,
    pub rate_limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting authentication service");

    // Initialize database connection pool
    let db_config = common::database::DatabaseConfig::from_env()?;
    let pool = common::database::init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    // Initialize JWT service
    let jwt_config = crate::jwt::JwtConfig::from_env()?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Initialize Redis connection pool
    let redis_config = common::cache::RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    let profile_repository = ProfileRepository::new(pool.clone());
    let session_manager = SessionManager::new(redis_pool.clone(), jwt_service.clone());
    let rate_limiter = RateLimiter::new(rate_limiter::RateLimiterConfig::default());

    let app_state = AppState {
        db_pool: pool,
        redis_pool,
        jwt_service,
        profile_repository,
        session_manager,
        rate_limiter,
    };

    // Start the web server
    let settings = AuthSettings::load()?;
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    info!("Authentication service listening on {}", settings.bind_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
