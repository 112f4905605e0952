//! The persistence interface: the narrow boundary between the dispatch
//! engine and whatever database backs it in production.
//!
//! The storage engine itself is treated as external, so this module is a
//! trait plus one in-process reference implementation
//! ([`memory::InMemoryStore`]), not a concrete database adapter.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use crate::domain::types::{Coordinate, Passenger, Pool, PoolLease, SurgeZone, Waypoint};
use crate::error::DispatchResult;
use crate::ids::{HolderId, PassengerId, PoolId, SurgeZoneId};

/// Outcome of a version-checked pool update.
#[derive(Debug, Clone, Copy)]
pub enum VersionUpdateOutcome {
    Ok { new_version: u64 },
    Conflict { actual_version: u64 },
}

/// A boxed mutation applied to an entity in place. Kept non-generic so the
/// trait stays object-safe (`dyn PersistenceStore`) for use behind an `Arc`.
pub type Mutator<T> = Box<dyn FnOnce(&mut T) + Send>;

/// The persistence operations the dispatch engine needs.
///
/// Every method that mutates shared state is `async` so an implementation
/// backed by a real database can suspend on I/O; the in-memory reference
/// implementation simply never needs to.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn insert_passenger(&self, passenger: Passenger) -> DispatchResult<()>;
    async fn get_passenger(&self, id: &PassengerId) -> DispatchResult<Option<Passenger>>;
    async fn update_passenger(&self, id: &PassengerId, mutator: Mutator<Passenger>) -> DispatchResult<Passenger>;

    async fn insert_pool(&self, pool: Pool) -> DispatchResult<()>;
    async fn get_pool(&self, id: &PoolId) -> DispatchResult<Option<Pool>>;
    /// Caller must already hold `id`'s lease; unconditional field update plus version bump.
    async fn update_pool_under_lease(&self, id: &PoolId, mutator: Mutator<Pool>) -> DispatchResult<Pool>;
    /// Conditional on `expected_version`; reports conflict instead of retrying.
    async fn update_pool_by_version(
        &self,
        id: &PoolId,
        expected_version: u64,
        mutator: Mutator<Pool>,
    ) -> DispatchResult<VersionUpdateOutcome>;
    /// Deletes the pool and cascades to its waypoints.
    async fn delete_pool(&self, id: &PoolId) -> DispatchResult<()>;

    async fn insert_waypoint(&self, waypoint: Waypoint) -> DispatchResult<()>;
    async fn waypoints_for_pool(&self, pool_id: &PoolId) -> DispatchResult<Vec<Waypoint>>;
    async fn delete_waypoints_for_passenger(&self, passenger_id: &PassengerId) -> DispatchResult<()>;

    /// FIFO order (ascending request timestamp), bounded by `limit`.
    async fn query_pending_passengers(&self, limit: usize) -> DispatchResult<Vec<Passenger>>;
    /// Pools in state Forming no older than `max_age`.
    async fn query_forming_pools(&self, max_age: ChronoDuration) -> DispatchResult<Vec<Pool>>;

    async fn acquire_lease(&self, pool_id: &PoolId, holder: &HolderId, ttl: Duration) -> DispatchResult<Option<PoolLease>>;
    async fn release_lease(&self, pool_id: &PoolId, holder: &HolderId) -> DispatchResult<()>;
    /// Deletes every lease whose expiry is in the past; bounds storage growth.
    async fn sweep_expired_leases(&self) -> DispatchResult<usize>;

    async fn insert_surge_zone(&self, zone: SurgeZone) -> DispatchResult<()>;
    async fn get_surge_zone(&self, id: &SurgeZoneId) -> DispatchResult<Option<SurgeZone>>;
    /// The zone whose radius contains `point`, if any.
    async fn surge_zone_containing(&self, point: &Coordinate) -> DispatchResult<Option<SurgeZone>>;
    async fn update_surge_zone(&self, id: &SurgeZoneId, mutator: Mutator<SurgeZone>) -> DispatchResult<SurgeZone>;
    async fn list_surge_zones(&self) -> DispatchResult<Vec<SurgeZone>>;
}
