//! In-process reference implementation of [`PersistenceStore`], backed by
//! `dashmap::DashMap` for lock-striped concurrent access — the idiomatic
//! choice in this corpus for shared mutable state touched from many tasks
//! at once (e.g. `hut8-soar`'s use of `dashmap` for its own in-process
//! tables), rather than a single `Mutex<HashMap<_>>` serializing everything.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::types::{Coordinate, Passenger, Pool, PoolLease, SurgeZone, Waypoint};
use crate::error::{DispatchError, DispatchResult};
use crate::geometry;
use crate::ids::{HolderId, PassengerId, PoolId, SurgeZoneId, WaypointId};

use super::{Mutator, PersistenceStore, VersionUpdateOutcome};

#[derive(Default)]
pub struct InMemoryStore {
    passengers: DashMap<PassengerId, Passenger>,
    pools: DashMap<PoolId, Pool>,
    waypoints: DashMap<WaypointId, Waypoint>,
    leases: DashMap<PoolId, PoolLease>,
    surge_zones: DashMap<SurgeZoneId, SurgeZone>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn insert_passenger(&self, passenger: Passenger) -> DispatchResult<()> {
        if self.passengers.contains_key(&passenger.id) {
            return Err(DispatchError::Persistence(format!(
                "passenger {} already exists",
                passenger.id
            )));
        }
        self.passengers.insert(passenger.id.clone(), passenger);
        Ok(())
    }

    async fn get_passenger(&self, id: &PassengerId) -> DispatchResult<Option<Passenger>> {
        Ok(self.passengers.get(id).map(|p| p.clone()))
    }

    async fn update_passenger(&self, id: &PassengerId, mutator: Mutator<Passenger>) -> DispatchResult<Passenger> {
        let mut entry = self
            .passengers
            .get_mut(id)
            .ok_or_else(|| DispatchError::NotFound(format!("passenger {id}")))?;
        mutator(&mut entry);
        Ok(entry.clone())
    }

    async fn insert_pool(&self, mut pool: Pool) -> DispatchResult<()> {
        pool.version = 0;
        if self.pools.contains_key(&pool.id) {
            return Err(DispatchError::Persistence(format!("pool {} already exists", pool.id)));
        }
        self.pools.insert(pool.id.clone(), pool);
        Ok(())
    }

    async fn get_pool(&self, id: &PoolId) -> DispatchResult<Option<Pool>> {
        Ok(self.pools.get(id).map(|p| p.clone()))
    }

    async fn update_pool_under_lease(&self, id: &PoolId, mutator: Mutator<Pool>) -> DispatchResult<Pool> {
        let mut entry = self
            .pools
            .get_mut(id)
            .ok_or_else(|| DispatchError::NotFound(format!("pool {id}")))?;
        mutator(&mut entry);
        entry.version += 1;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_pool_by_version(
        &self,
        id: &PoolId,
        expected_version: u64,
        mutator: Mutator<Pool>,
    ) -> DispatchResult<VersionUpdateOutcome> {
        let mut entry = self
            .pools
            .get_mut(id)
            .ok_or_else(|| DispatchError::NotFound(format!("pool {id}")))?;

        if entry.version != expected_version {
            return Ok(VersionUpdateOutcome::Conflict { actual_version: entry.version });
        }

        mutator(&mut entry);
        entry.version = expected_version + 1;
        entry.updated_at = Utc::now();
        Ok(VersionUpdateOutcome::Ok { new_version: entry.version })
    }

    async fn delete_pool(&self, id: &PoolId) -> DispatchResult<()> {
        self.pools.remove(id);
        self.waypoints.retain(|_, w| &w.pool_id != id);
        Ok(())
    }

    async fn insert_waypoint(&self, waypoint: Waypoint) -> DispatchResult<()> {
        self.waypoints.insert(waypoint.id.clone(), waypoint);
        Ok(())
    }

    async fn waypoints_for_pool(&self, pool_id: &PoolId) -> DispatchResult<Vec<Waypoint>> {
        let mut result: Vec<Waypoint> = self
            .waypoints
            .iter()
            .filter(|w| &w.pool_id == pool_id)
            .map(|w| w.clone())
            .collect();
        result.sort_by_key(|w| w.position);
        Ok(result)
    }

    async fn delete_waypoints_for_passenger(&self, passenger_id: &PassengerId) -> DispatchResult<()> {
        self.waypoints.retain(|_, w| &w.passenger_id != passenger_id);
        Ok(())
    }

    async fn query_pending_passengers(&self, limit: usize) -> DispatchResult<Vec<Passenger>> {
        use crate::domain::types::PassengerState;
        let mut pending: Vec<Passenger> = self
            .passengers
            .iter()
            .filter(|p| p.state == PassengerState::Pending)
            .map(|p| p.clone())
            .collect();
        pending.sort_by_key(|p| p.requested_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn query_forming_pools(&self, max_age: ChronoDuration) -> DispatchResult<Vec<Pool>> {
        use crate::domain::types::PoolState;
        let now = Utc::now();
        let mut forming: Vec<Pool> = self
            .pools
            .iter()
            .filter(|p| p.state == PoolState::Forming && now - p.created_at <= max_age)
            .map(|p| p.clone())
            .collect();
        forming.sort_by_key(|p| p.created_at);
        Ok(forming)
    }

    async fn acquire_lease(&self, pool_id: &PoolId, holder: &HolderId, ttl: Duration) -> DispatchResult<Option<PoolLease>> {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(30));

        let acquired = match self.leases.entry(pool_id.clone()) {
            Entry::Vacant(slot) => {
                let lease = PoolLease {
                    pool_id: pool_id.clone(),
                    holder: holder.0.clone(),
                    acquired_at: now,
                    expires_at: now + ttl,
                    version: 0,
                };
                slot.insert(lease.clone());
                Some(lease)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    let next_version = slot.get().version + 1;
                    let lease = PoolLease {
                        pool_id: pool_id.clone(),
                        holder: holder.0.clone(),
                        acquired_at: now,
                        expires_at: now + ttl,
                        version: next_version,
                    };
                    slot.insert(lease.clone());
                    Some(lease)
                } else {
                    None
                }
            }
        };
        Ok(acquired)
    }

    async fn release_lease(&self, pool_id: &PoolId, holder: &HolderId) -> DispatchResult<()> {
        // Conditional remove: a mismatched release is a silent no-op.
        self.leases.remove_if(pool_id, |_, lease| lease.holder == holder.0);
        Ok(())
    }

    async fn sweep_expired_leases(&self) -> DispatchResult<usize> {
        let now = Utc::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired(now));
        Ok(before - self.leases.len())
    }

    async fn insert_surge_zone(&self, zone: SurgeZone) -> DispatchResult<()> {
        self.surge_zones.insert(zone.id.clone(), zone);
        Ok(())
    }

    async fn get_surge_zone(&self, id: &SurgeZoneId) -> DispatchResult<Option<SurgeZone>> {
        Ok(self.surge_zones.get(id).map(|z| z.clone()))
    }

    async fn surge_zone_containing(&self, point: &Coordinate) -> DispatchResult<Option<SurgeZone>> {
        Ok(self
            .surge_zones
            .iter()
            .find(|z| geometry::within_radius(point, &z.center, z.radius_km))
            .map(|z| z.clone()))
    }

    async fn update_surge_zone(&self, id: &SurgeZoneId, mutator: Mutator<SurgeZone>) -> DispatchResult<SurgeZone> {
        let mut entry = self
            .surge_zones
            .get_mut(id)
            .ok_or_else(|| DispatchError::NotFound(format!("surge zone {id}")))?;
        mutator(&mut entry);
        Ok(entry.clone())
    }

    async fn list_surge_zones(&self) -> DispatchResult<Vec<SurgeZone>> {
        Ok(self.surge_zones.iter().map(|z| z.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{PassengerState, PoolState, VehicleClass};

    fn sample_pool(id: &str) -> Pool {
        Pool {
            id: PoolId::from(id),
            driver_id: None,
            vehicle_class: VehicleClass::Sedan,
            max_seats: 4,
            max_luggage: 3,
            current_seats: 1,
            current_luggage: 0,
            state: PoolState::Forming,
            total_distance_km: 0.0,
            planned_route: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 99, // should be forced to 0 on insert
        }
    }

    #[tokio::test]
    async fn insert_pool_forces_version_zero() {
        let store = InMemoryStore::new();
        store.insert_pool(sample_pool("p1")).await.unwrap();
        let pool = store.get_pool(&PoolId::from("p1")).await.unwrap().unwrap();
        assert_eq!(pool.version, 0);
    }

    #[tokio::test]
    async fn update_pool_by_version_detects_conflict() {
        let store = InMemoryStore::new();
        store.insert_pool(sample_pool("p1")).await.unwrap();
        let id = PoolId::from("p1");

        let outcome = store
            .update_pool_by_version(&id, 0, Box::new(|p| p.current_seats += 1))
            .await
            .unwrap();
        assert!(matches!(outcome, VersionUpdateOutcome::Ok { new_version: 1 }));

        // Stale expected_version now conflicts.
        let outcome = store
            .update_pool_by_version(&id, 0, Box::new(|p| p.current_seats += 1))
            .await
            .unwrap();
        assert!(matches!(outcome, VersionUpdateOutcome::Conflict { actual_version: 1 }));
    }

    #[tokio::test]
    async fn lease_steal_only_succeeds_after_expiry() {
        let store = InMemoryStore::new();
        let pool_id = PoolId::from("p1");
        let a = HolderId::from("a");
        let b = HolderId::from("b");

        let lease = store.acquire_lease(&pool_id, &a, Duration::from_secs(30)).await.unwrap();
        assert!(lease.is_some());

        // Not expired: a second holder must not acquire.
        let stolen = store.acquire_lease(&pool_id, &b, Duration::from_secs(30)).await.unwrap();
        assert!(stolen.is_none());
    }

    #[tokio::test]
    async fn expired_holders_stale_release_cannot_touch_the_stealing_holders_lease() {
        let store = InMemoryStore::new();
        let pool_id = PoolId::from("p1");
        let a = HolderId::from("a");
        let b = HolderId::from("b");

        store.acquire_lease(&pool_id, &a, Duration::from_millis(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let stolen = store.acquire_lease(&pool_id, &b, Duration::from_secs(30)).await.unwrap();
        assert!(stolen.is_some(), "b should steal the expired lease");

        // a's release targets its own (now-expired, overwritten) holder name
        // but must not remove b's freshly acquired lease.
        store.release_lease(&pool_id, &a).await.unwrap();
        let still_held_by_b = store
            .acquire_lease(&pool_id, &HolderId::from("c"), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(still_held_by_b.is_none(), "b's lease must still be active after a's stale release");
    }

    #[tokio::test]
    async fn mismatched_release_is_a_silent_no_op() {
        let store = InMemoryStore::new();
        let pool_id = PoolId::from("p1");
        let a = HolderId::from("a");
        let b = HolderId::from("b");

        store.acquire_lease(&pool_id, &a, Duration::from_secs(30)).await.unwrap();
        store.release_lease(&pool_id, &b).await.unwrap();

        // Lease still held by `a`: `b` still cannot acquire.
        let attempt = store.acquire_lease(&pool_id, &b, Duration::from_secs(30)).await.unwrap();
        assert!(attempt.is_none());
    }

    #[tokio::test]
    async fn sweep_expired_leases_removes_only_expired_entries() {
        let store = InMemoryStore::new();
        let expired = PoolId::from("expired");
        let live = PoolId::from("live");

        store.acquire_lease(&expired, &HolderId::from("a"), Duration::from_millis(0)).await.unwrap();
        store.acquire_lease(&live, &HolderId::from("b"), Duration::from_secs(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let removed = store.sweep_expired_leases().await.unwrap();
        assert_eq!(removed, 1);

        // The swept lease is gone, so a fresh holder can now acquire it...
        let reacquired = store.acquire_lease(&expired, &HolderId::from("c"), Duration::from_secs(30)).await.unwrap();
        assert!(reacquired.is_some());
        // ...while the still-live lease is untouched.
        let still_blocked = store.acquire_lease(&live, &HolderId::from("c"), Duration::from_secs(30)).await.unwrap();
        assert!(still_blocked.is_none());
    }

    #[tokio::test]
    async fn delete_pool_cascades_to_waypoints() {
        let store = InMemoryStore::new();
        store.insert_pool(sample_pool("p1")).await.unwrap();
        store
            .insert_waypoint(Waypoint {
                id: WaypointId::from("w1"),
                pool_id: PoolId::from("p1"),
                passenger_id: PassengerId::from("pax1"),
                position: 0,
                kind: crate::domain::types::WaypointKind::Pickup,
                coordinate: Coordinate::new(0.0, 0.0).unwrap(),
            })
            .await
            .unwrap();

        store.delete_pool(&PoolId::from("p1")).await.unwrap();
        let remaining = store.waypoints_for_pool(&PoolId::from("p1")).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn query_pending_passengers_is_fifo_ordered() {
        let store = InMemoryStore::new();
        for (idx, label) in ["b", "a", "c"].iter().enumerate() {
            store
                .insert_passenger(Passenger {
                    id: PassengerId::from(*label),
                    user_id: "u".to_string(),
                    pickup: Coordinate::new(0.0, 0.0).unwrap(),
                    dropoff: Coordinate::new(0.0, 1.0).unwrap(),
                    luggage_count: 0,
                    seats_required: 1,
                    max_detour_minutes: 10.0,
                    state: PassengerState::Pending,
                    pool_id: None,
                    base_fare: None,
                    final_fare: None,
                    surge_multiplier: None,
                    requested_at: Utc::now() - ChronoDuration::seconds((3 - idx) as i64),
                    matched_at: None,
                    completed_at: None,
                    cancelled_at: None,
                    cancellation_reason: None,
                })
                .await
                .unwrap();
        }

        let pending = store.query_pending_passengers(10).await.unwrap();
        let ids: Vec<String> = pending.iter().map(|p| p.id.0.clone()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
