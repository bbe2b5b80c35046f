//! Repositories for database operations
//!
//! Plain reads return `anyhow::Result` like everywhere else; guarded
//! operations (anything that checks who the caller is or what state a row
//! is in) return a `DomainError` so handlers can answer with the right
//! status code.

use thiserror::Error;

pub mod messages;
pub mod profiles;
pub mod requests;
pub mod spots;
pub mod trips;

pub use messages::MessageRepository;
pub use profiles::ProfileRepository;
pub use requests::TripRequestRepository;
pub use spots::SpotRepository;
pub use trips::TripRepository;

/// Error produced by guarded repository operations
#[derive(Debug, Error)]
pub enum DomainError {
    /// The entity does not exist
    #[error("Not found")]
    NotFound,

    /// The caller is not allowed to perform this operation
    #[error("Operation not allowed for this user")]
    Forbidden,

    /// The entity is not in a state that allows this operation
    #[error("{0}")]
    InvalidState(String),

    /// Accepting would take the trip below zero seats
    #[error("No seats available on this trip")]
    SeatsExhausted,

    /// A live request already exists for this (trip, user) pair
    #[error("A request for this trip already exists")]
    DuplicateRequest,

    /// Database failure
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// Any other failure (row decoding, serialization)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
