//! Dispatch Service: request intake, the periodic matching cycle, and
//! cancellation. Orchestrates Geometry, Pricing, the Matcher, the Route
//! Planner (indirectly, via the Matcher) and the Concurrency Mediator
//! against the persistence boundary. Owns every state transition; the
//! Matcher itself never writes.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::domain::types::{
    Coordinate, Passenger, PassengerState, Pool, PoolState, SurgeZone, VehicleClass, Waypoint,
    WaypointKind as DomainWaypointKind,
};
use crate::error::{DispatchError, DispatchResult};
use crate::geometry;
use crate::ids::{HolderId, PassengerId, PoolId, WaypointId};
use crate::matcher::{self, MatcherContext, MatcherPassenger};
use crate::persistence::PersistenceStore;
use crate::pricing::{self, SurgeZoneFactors, Weather};
use crate::route_planner::WaypointKind as PlannerWaypointKind;

/// Inputs validated and priced into a fresh Pending passenger. Field
/// validation is this crate's job; payload parsing and transport-level
/// concerns are not.
#[derive(Debug, Clone)]
pub struct CreateRequestInput {
    pub user_id: String,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub luggage_count: u32,
    pub seats_required: u32,
    pub max_detour_minutes: f64,
}

#[derive(Debug, Clone)]
pub struct CreateRequestOutput {
    pub passenger_id: PassengerId,
    pub estimated_final: f64,
    pub state: PassengerState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingCycleSummary {
    pub matched_count: usize,
    pub pools_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The passenger was already Cancelled or Completed.
    AlreadyTerminal,
    /// Lease acquisition on the passenger's pool exhausted retries; the
    /// caller may retry.
    LeaseUnavailable,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SurgeRefreshSummary {
    pub zones_refreshed: usize,
}

pub struct DispatchService {
    store: Arc<dyn PersistenceStore>,
    config: Config,
}

impl DispatchService {
    pub fn new(store: Arc<dyn PersistenceStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Price and persist a Pending passenger. The estimate is advisory; the
    /// committed final price is set at match time.
    #[instrument(skip(self, intake), fields(user_id = %intake.user_id))]
    pub async fn create_request(&self, intake: CreateRequestInput) -> DispatchResult<CreateRequestOutput> {
        if intake.seats_required < 1 {
            return Err(DispatchError::Validation("seats_required must be >= 1".to_string()));
        }
        if intake.max_detour_minutes <= 0.0 {
            return Err(DispatchError::Validation("max_detour_minutes must be > 0".to_string()));
        }

        let now = Utc::now();
        let distance_km = geometry::distance(&intake.pickup, &intake.dropoff);
        let time_min = geometry::travel_time(distance_km);

        let zone = self.store.surge_zone_containing(&intake.pickup).await?;
        let surge_factors = zone.as_ref().map(surge_factors_from_zone);

        let base = pricing::base_fare(VehicleClass::Sedan, distance_km, time_min);
        let surge = pricing::surge_multiplier(surge_factors, &now, Weather::Clear);
        let discount = pricing::pool_discount_multiplier(1, 0.0);
        let estimated_final = pricing::round2(base * surge * discount);

        if let Some(zone) = &zone {
            let zone_id = zone.id.clone();
            self.store
                .update_surge_zone(&zone_id, Box::new(|z: &mut SurgeZone| z.active_requests += 1))
                .await?;
        }

        let passenger = Passenger {
            id: PassengerId::new(),
            user_id: intake.user_id,
            pickup: intake.pickup,
            dropoff: intake.dropoff,
            luggage_count: intake.luggage_count,
            seats_required: intake.seats_required,
            max_detour_minutes: intake.max_detour_minutes,
            state: PassengerState::Pending,
            pool_id: None,
            base_fare: Some(pricing::round2(base)),
            final_fare: None,
            surge_multiplier: Some(pricing::round2(surge)),
            requested_at: now,
            matched_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        };
        let passenger_id = passenger.id.clone();
        self.store.insert_passenger(passenger).await?;

        info!(passenger_id = %passenger_id, estimated_final, "request created");
        Ok(CreateRequestOutput {
            passenger_id,
            estimated_final,
            state: PassengerState::Pending,
        })
    }

    /// Run one matching cycle. Each proposal commits independently; a
    /// failure on one must not roll back others — the backing store has no
    /// multi-statement transactions, so the guarantee here is per-proposal
    /// atomicity, not cycle atomicity.
    #[instrument(skip(self))]
    pub async fn run_matching_cycle(&self) -> DispatchResult<MatchingCycleSummary> {
        let pending = self.store.query_pending_passengers(self.config.pending_fetch_limit).await?;
        // Forming pools are fetched for the Matcher's input contract but
        // this crate does not wire online augmentation — every cycle forms
        // fresh pools from pending passengers only.
        let _forming_pools = self
            .store
            .query_forming_pools(ChronoDuration::seconds(self.config.forming_pool_max_age_secs))
            .await?;
        let surge_zones = self.store.list_surge_zones().await?;

        let matcher_passengers: Vec<MatcherPassenger> = pending.iter().map(to_matcher_passenger).collect();
        let config = self.config.clone();
        let now = Utc::now();

        let proposals = tokio::task::spawn_blocking(move || {
            let ctx = MatcherContext {
                surge_zones: &surge_zones,
                now,
                weather: Weather::Clear,
                config: &config,
            };
            matcher::run_matcher(&matcher_passengers, &ctx)
        })
        .await
        .map_err(|e| DispatchError::Persistence(format!("matcher task panicked: {e}")))??;

        let mut summary = MatchingCycleSummary::default();

        for proposal in proposals {
            let passenger_count = proposal.passenger_ids.len();
            match self.commit_proposal(proposal, now).await {
                Ok(()) => {
                    summary.pools_created += 1;
                    summary.matched_count += passenger_count;
                }
                Err(err) => {
                    warn!(error = %err, "proposal commit failed, continuing with remaining proposals");
                }
            }
        }

        info!(matched = summary.matched_count, pools = summary.pools_created, "matching cycle complete");
        Ok(summary)
    }

    async fn commit_proposal(&self, proposal: matcher::MatchProposal, now: chrono::DateTime<Utc>) -> DispatchResult<()> {
        let waypoint_ids: Vec<WaypointId> = (0..proposal.route.waypoints.len()).map(|_| WaypointId::new()).collect();

        let pool = Pool {
            id: proposal.pool_id.clone(),
            driver_id: None,
            vehicle_class: proposal.vehicle_class,
            max_seats: proposal.vehicle_class.max_seats(),
            max_luggage: proposal.vehicle_class.max_luggage(),
            current_seats: proposal.total_seats,
            current_luggage: proposal.total_luggage,
            state: PoolState::Matched,
            total_distance_km: proposal.route.total_distance_km,
            planned_route: waypoint_ids.clone(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.insert_pool(pool).await?;

        for (position, (waypoint_id, planned)) in waypoint_ids.iter().zip(&proposal.route.waypoints).enumerate() {
            let waypoint = Waypoint {
                id: waypoint_id.clone(),
                pool_id: proposal.pool_id.clone(),
                passenger_id: planned.passenger_id.clone(),
                position,
                kind: to_domain_waypoint_kind(planned.kind),
                coordinate: planned.coordinate,
            };
            self.store.insert_waypoint(waypoint).await?;
        }

        let pool_size = proposal.passenger_ids.len();
        for ((passenger_id, metered_fare), realized_detour) in proposal
            .passenger_ids
            .iter()
            .zip(&proposal.metered_fares)
            .zip(&proposal.route.detour_per_passenger)
        {
            let pool_id = proposal.pool_id.clone();
            let discount = pricing::pool_discount_multiplier(pool_size, *realized_detour);
            let final_price = pricing::round2(metered_fare * discount);
            self.store
                .update_passenger(
                    passenger_id,
                    Box::new(move |p: &mut Passenger| {
                        p.state = PassengerState::Matched;
                        p.pool_id = Some(pool_id.clone());
                        p.final_fare = Some(final_price);
                        p.matched_at = Some(now);
                    }),
                )
                .await?;
        }

        Ok(())
    }

    /// Recompute every surge zone's multiplier from its live demand/supply
    /// counters, exponentially smoothed against its previous value (spec
    /// §4.2's surge-zone refresh table). Intended to be invoked periodically,
    /// the same way `run_matching_cycle` is; unlike the matching cycle this
    /// never fails partway in a way other zones need to survive, since each
    /// zone update is already independent and non-blocking on the others.
    #[instrument(skip(self))]
    pub async fn refresh_surge_zones(&self) -> DispatchResult<SurgeRefreshSummary> {
        let zones = self.store.list_surge_zones().await?;
        let mut summary = SurgeRefreshSummary::default();

        for zone in zones {
            let (tier, new_multiplier) = pricing::refresh_surge_zone(zone.active_requests, zone.available_drivers, zone.multiplier);
            let zone_id = zone.id.clone();
            self.store
                .update_surge_zone(
                    &zone_id,
                    Box::new(move |z: &mut SurgeZone| {
                        z.multiplier = new_multiplier;
                        z.demand_tier = tier;
                    }),
                )
                .await?;
            summary.zones_refreshed += 1;
        }

        info!(zones = summary.zones_refreshed, "surge zones refreshed");
        Ok(summary)
    }

    /// Cancel a passenger's request.
    #[instrument(skip(self, reason))]
    pub async fn cancel_request(&self, passenger_id: &PassengerId, reason: Option<String>) -> DispatchResult<CancelOutcome> {
        let passenger = self
            .store
            .get_passenger(passenger_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("passenger {passenger_id}")))?;

        if passenger.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        let now = Utc::now();
        let reason_for_closure = reason.clone();

        let Some(pool_id) = passenger.pool_id.clone() else {
            self.store
                .update_passenger(
                    passenger_id,
                    Box::new(move |p: &mut Passenger| {
                        p.state = PassengerState::Cancelled;
                        p.cancelled_at = Some(now);
                        p.cancellation_reason = reason_for_closure;
                    }),
                )
                .await?;
            return Ok(CancelOutcome::Cancelled);
        };

        let holder = HolderId::from(format!("cancel:{passenger_id}"));
        let store = self.store.clone();
        let passenger_id = passenger_id.clone();
        let seats = passenger.seats_required;
        let luggage = passenger.luggage_count;
        // `pool_id` stays borrowed (`&pool_id`) for the `with_lease` call
        // below for the whole call's duration, so the closure needs its own
        // owned copy rather than moving the outer binding.
        let pool_id_inner = pool_id.clone();

        let outcome = crate::concurrency::with_lease(
            store.clone(),
            &pool_id,
            &holder,
            self.config.lease_ttl,
            self.config.lease_max_retries,
            self.config.lease_retry_delay,
            move || {
                async move {
                    store
                        .update_passenger(
                            &passenger_id,
                            Box::new(move |p: &mut Passenger| {
                                p.state = PassengerState::Cancelled;
                                p.pool_id = None;
                                p.cancelled_at = Some(now);
                                p.cancellation_reason = reason;
                            }),
                        )
                        .await?;
                    store.delete_waypoints_for_passenger(&passenger_id).await?;

                    let updated_pool = store
                        .update_pool_under_lease(
                            &pool_id_inner,
                            Box::new(move |pool: &mut Pool| {
                                pool.current_seats = pool.current_seats.saturating_sub(seats);
                                pool.current_luggage = pool.current_luggage.saturating_sub(luggage);
                            }),
                        )
                        .await?;

                    if updated_pool.current_seats == 0 {
                        store.delete_pool(&pool_id_inner).await?;
                    }

                    Ok(())
                }
            },
        )
        .await?;

        match outcome {
            crate::concurrency::LeaseOutcome::Completed(()) => Ok(CancelOutcome::Cancelled),
            crate::concurrency::LeaseOutcome::Unavailable => Ok(CancelOutcome::LeaseUnavailable),
        }
    }
}

fn surge_factors_from_zone(zone: &SurgeZone) -> SurgeZoneFactors {
    SurgeZoneFactors {
        active_requests: zone.active_requests,
        available_drivers: zone.available_drivers,
        stored_multiplier: zone.multiplier,
    }
}

fn to_matcher_passenger(p: &Passenger) -> MatcherPassenger {
    MatcherPassenger {
        id: p.id.clone(),
        pickup: p.pickup,
        dropoff: p.dropoff,
        seats: p.seats_required,
        luggage: p.luggage_count,
        max_detour_minutes: p.max_detour_minutes,
        requested_at: p.requested_at,
    }
}

fn to_domain_waypoint_kind(kind: PlannerWaypointKind) -> DomainWaypointKind {
    match kind {
        PlannerWaypointKind::Pickup => DomainWaypointKind::Pickup,
        PlannerWaypointKind::Dropoff => DomainWaypointKind::Dropoff,
    }
}
