//! Trip model and related payloads
//!
//! A trip is a scheduled carpool departure to a surf spot, owned by its
//! creator. Seat accounting happens exclusively through the trip request
//! repository so that `available_seats` can never go negative.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::profile::Profile;
use super::spot::{DifficultyLevel, Spot};

/// Where a trip leaves from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeparturePoint {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Trip lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Open,
    Full,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Open => "open",
            TripStatus::Full => "full",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TripStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TripStatus::Open),
            "full" => Ok(TripStatus::Full),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            other => Err(anyhow::anyhow!("Unknown trip status: {}", other)),
        }
    }
}

/// Trip entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub spot_id: Uuid,
    pub creator_id: Uuid,
    pub departure_point: DeparturePoint,
    pub departure_time: DateTime<Utc>,
    pub available_seats: i32,
    pub difficulty: Option<DifficultyLevel>,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trip creation payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewTrip {
    pub spot_id: Uuid,
    pub departure_point: DeparturePoint,
    pub departure_time: DateTime<Utc>,
    pub available_seats: i32,
    pub difficulty: Option<DifficultyLevel>,
}

/// Trip update payload; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTrip {
    pub departure_point: Option<DeparturePoint>,
    pub departure_time: Option<DateTime<Utc>>,
    pub available_seats: Option<i32>,
    pub difficulty: Option<DifficultyLevel>,
}

/// Trip as shown in lists, with the joined names a card needs
#[derive(Debug, Clone, Serialize)]
pub struct TripSummary {
    #[serde(flatten)]
    pub trip: Trip,
    pub spot_name: String,
    pub creator_name: String,
}

/// Trip as shown on its detail page, with the spot and creator embedded
#[derive(Debug, Clone, Serialize)]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub spot: Spot,
    pub creator: Profile,
}

/// Search filters; all optional, combined with AND
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripSearchQuery {
    pub spot_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub difficulty: Option<DifficultyLevel>,
}

/// The inclusive day window a calendar-date filter covers
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let end = date
        .and_hms_milli_opt(23, 59, 59, 999)
        .expect("end of day is always valid");
    (Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_covers_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (start, end) = day_bounds(date);

        assert_eq!(start.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-06-01T23:59:59.999+00:00");

        let inside: DateTime<Utc> = "2024-06-01T23:59:59Z".parse().unwrap();
        let before: DateTime<Utc> = "2024-05-31T23:59:59Z".parse().unwrap();
        let after: DateTime<Utc> = "2024-06-02T00:00:00Z".parse().unwrap();

        assert!(start <= inside && inside <= end);
        assert!(before < start);
        assert!(after > end);
    }

    #[test]
    fn test_trip_status_round_trip() {
        for status in [
            TripStatus::Open,
            TripStatus::Full,
            TripStatus::Completed,
            TripStatus::Cancelled,
        ] {
            let parsed: TripStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("paused".parse::<TripStatus>().is_err());
    }
}
