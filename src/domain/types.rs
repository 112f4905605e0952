//! Core data model: Passenger, Pool, Waypoint, SurgeZone, PoolLease, and
//! the static vehicle class table.
//!
//! Plain, serde-derived structs with no behaviour beyond what their
//! invariants demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::ids::{PassengerId, PoolId, SurgeZoneId, WaypointId};

/// WGS84 decimal-degree coordinate, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> DispatchResult<Self> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(DispatchError::Validation(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(DispatchError::Validation(format!(
                "longitude {lng} out of range [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }
}

/// Vehicle classes and their static capacity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleClass {
    Sedan,
    Suv,
    Van,
}

impl VehicleClass {
    /// All classes, ordered smallest-to-largest by capacity — the order
    /// `smallest_fitting` walks to find a dominating class.
    pub const ORDER: [VehicleClass; 3] = [VehicleClass::Sedan, VehicleClass::Suv, VehicleClass::Van];

    pub const fn max_seats(self) -> u32 {
        match self {
            VehicleClass::Sedan => 4,
            VehicleClass::Suv => 6,
            VehicleClass::Van => 8,
        }
    }

    pub const fn max_luggage(self) -> u32 {
        match self {
            VehicleClass::Sedan => 3,
            VehicleClass::Suv => 5,
            VehicleClass::Van => 8,
        }
    }

    pub const fn rate_per_km(self) -> f64 {
        match self {
            VehicleClass::Sedan => 2.50,
            VehicleClass::Suv => 3.50,
            VehicleClass::Van => 4.50,
        }
    }

    pub const fn rate_per_min(self) -> f64 {
        match self {
            VehicleClass::Sedan => 0.40,
            VehicleClass::Suv => 0.55,
            VehicleClass::Van => 0.70,
        }
    }

    pub const fn min_fare(self) -> f64 {
        match self {
            VehicleClass::Sedan => 8.00,
            VehicleClass::Suv => 12.00,
            VehicleClass::Van => 15.00,
        }
    }

    /// The smallest class whose (maxSeats, maxLuggage) dominates both totals,
    /// or `None` if no class does.
    pub fn smallest_fitting(seats: u32, luggage: u32) -> Option<VehicleClass> {
        Self::ORDER
            .into_iter()
            .find(|c| c.max_seats() >= seats && c.max_luggage() >= luggage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassengerState {
    Pending,
    Matched,
    InTransit,
    Completed,
    Cancelled,
}

impl PassengerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PassengerState::Completed | PassengerState::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub id: PassengerId,
    pub user_id: String,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub luggage_count: u32,
    pub seats_required: u32,
    pub max_detour_minutes: f64,
    pub state: PassengerState,
    pub pool_id: Option<PoolId>,
    pub base_fare: Option<f64>,
    pub final_fare: Option<f64>,
    pub surge_multiplier: Option<f64>,
    pub requested_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl Passenger {
    /// A non-null pool reference must exist iff state is one of
    /// {Matched, InTransit, Completed}.
    pub fn pool_reference_invariant_holds(&self) -> bool {
        let should_have_pool = matches!(
            self.state,
            PassengerState::Matched | PassengerState::InTransit | PassengerState::Completed
        );
        self.pool_id.is_some() == should_have_pool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    Forming,
    Matched,
    InTransit,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub driver_id: Option<String>,
    pub vehicle_class: VehicleClass,
    pub max_seats: u32,
    pub max_luggage: u32,
    pub current_seats: u32,
    pub current_luggage: u32,
    pub state: PoolState,
    pub total_distance_km: f64,
    /// Planned route, serialized as an ordered list of waypoint ids — the
    /// waypoints themselves are owned by the store, not embedded here.
    pub planned_route: Vec<WaypointId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Pool {
    pub fn capacity_invariant_holds(&self) -> bool {
        self.current_seats <= self.max_seats && self.current_luggage <= self.max_luggage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaypointKind {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: WaypointId,
    pub pool_id: PoolId,
    pub passenger_id: PassengerId,
    pub position: usize,
    pub kind: WaypointKind,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandTier {
    Low,
    Normal,
    High,
    VeryHigh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeZone {
    pub id: SurgeZoneId,
    pub name: String,
    pub center: Coordinate,
    pub radius_km: f64,
    pub multiplier: f64,
    pub demand_tier: DemandTier,
    pub active_requests: u32,
    pub available_drivers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolLease {
    pub pool_id: PoolId,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: u64,
}

impl PoolLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
