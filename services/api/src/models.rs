//! API service models

pub mod message;
pub mod profile;
pub mod request;
pub mod spot;
pub mod trip;

// Re-export for convenience
pub use message::{Conversation, Message, MessageWithSender, NewMessage};
pub use profile::{Profile, UpdateProfile};
pub use request::{Participation, RequestStatus, TripRequest, TripRequestWithContext};
pub use spot::{DifficultyLevel, NewSpot, Spot, UpdateSpot};
pub use trip::{
    DeparturePoint, NewTrip, Trip, TripDetail, TripSearchQuery, TripStatus, TripSummary,
    UpdateTrip, day_bounds,
};
