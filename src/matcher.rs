//! Matcher: spatial clustering of pending passengers, selection of mutually
//! compatible subsets, route planner invocation, and scoring. Produces match
//! proposals; never writes state itself — Dispatch commits.
//!
//! Clustering and pool formation are deterministic given input order: no
//! randomness is used anywhere in this module, so running the same pending
//! set through it twice yields identical proposals.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::types::{Coordinate, SurgeZone, VehicleClass};
use crate::error::DispatchResult;
use crate::geometry;
use crate::ids::{PassengerId, PoolId};
use crate::pricing::{self, SurgeZoneFactors, Weather};
use crate::route_planner::{self, Capacity, PlannedRoute, PlannerPassenger};

/// One pending passenger as seen by the Matcher.
#[derive(Debug, Clone)]
pub struct MatcherPassenger {
    pub id: PassengerId,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub seats: u32,
    pub luggage: u32,
    pub max_detour_minutes: f64,
    pub requested_at: DateTime<Utc>,
}

/// Context the Matcher reads but never mutates: live surge zones (already
/// fetched by the caller — the Matcher itself stays synchronous and
/// non-suspending), the clock, ambient weather, and tunables.
pub struct MatcherContext<'a> {
    pub surge_zones: &'a [SurgeZone],
    pub now: DateTime<Utc>,
    pub weather: Weather,
    pub config: &'a Config,
}

/// A proposed pool: never written directly, always committed by Dispatch.
#[derive(Debug, Clone)]
pub struct MatchProposal {
    pub pool_id: PoolId,
    pub vehicle_class: VehicleClass,
    pub total_seats: u32,
    pub total_luggage: u32,
    /// Parallel to `metered_fares` and `route.detour_per_passenger`.
    pub passenger_ids: Vec<PassengerId>,
    pub route: PlannedRoute,
    /// Each seat's base-fare-times-surge, *before* the pool discount. The
    /// discount depends on the realized per-passenger detour, which only
    /// exists once the route is planned and committed, so Dispatch applies
    /// it against these figures rather than this module guessing at a
    /// detour of zero.
    pub metered_fares: Vec<f64>,
    pub efficiency_score: f64,
}

/// Run one matching cycle over `passengers`, sorted ascending by request
/// timestamp by the caller (oldest-first order is what keeps clustering fair
/// across ticks). Returns whatever proposals were gathered before the
/// timeout budget elapsed at an outer loop boundary.
pub fn run_matcher(passengers: &[MatcherPassenger], ctx: &MatcherContext) -> DispatchResult<Vec<MatchProposal>> {
    let started = Instant::now();
    let clusters = cluster_by_proximity(passengers, ctx.config.cluster_radius_km);
    let mut proposals = Vec::new();

    for cluster in clusters {
        if started.elapsed() >= ctx.config.matcher_budget {
            warn!(gathered = proposals.len(), "matcher budget exceeded, returning partial results");
            break;
        }

        if cluster.len() <= ctx.config.max_pool_size {
            match try_form_pool(&cluster, passengers, ctx)? {
                Some(proposal) => proposals.push(proposal),
                // Whole-cluster formation failed (e.g. incompatible directions
                // forcing an infeasible detour). Size-1 proposals are
                // permitted, so fall back to proposing each member on its
                // own rather than dropping the cluster.
                None if cluster.len() > 1 => {
                    for &idx in &cluster {
                        if let Some(singleton) = try_form_pool(&[idx], passengers, ctx)? {
                            proposals.push(singleton);
                        }
                    }
                }
                None => {}
            }
        } else {
            proposals.extend(process_large_cluster(&cluster, passengers, ctx)?);
        }
    }

    debug!(proposals = proposals.len(), "matching cycle complete");
    Ok(proposals)
}

/// Union-by-proximity spatial clustering: walk passengers in order, each
/// unassigned passenger seeds a cluster and absorbs every unassigned
/// passenger within `radius_km` of *its* pickup. Intentionally non-optimal
/// but deterministic given input order.
fn cluster_by_proximity(passengers: &[MatcherPassenger], radius_km: f64) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; passengers.len()];
    let mut clusters = Vec::new();

    for seed_idx in 0..passengers.len() {
        if assigned[seed_idx] {
            continue;
        }
        assigned[seed_idx] = true;
        let seed_pickup = passengers[seed_idx].pickup;
        let mut cluster = vec![seed_idx];

        for other_idx in (seed_idx + 1)..passengers.len() {
            if assigned[other_idx] {
                continue;
            }
            if geometry::within_radius(&passengers[other_idx].pickup, &seed_pickup, radius_km) {
                assigned[other_idx] = true;
                cluster.push(other_idx);
            }
        }

        clusters.push(cluster);
    }

    clusters
}

/// Compatibility predicate: every admitted member must share direction with
/// the candidate, and the combined load must stay within the largest
/// vehicle class's ceilings.
fn compatible(admitted: &[usize], candidate_idx: usize, passengers: &[MatcherPassenger], direction_threshold_deg: f64) -> bool {
    let candidate = &passengers[candidate_idx];

    for &e_idx in admitted {
        let e = &passengers[e_idx];
        if !geometry::same_direction(&e.pickup, &e.dropoff, &candidate.pickup, &candidate.dropoff, direction_threshold_deg) {
            return false;
        }
    }

    let combined_seats: u32 = admitted.iter().map(|&i| passengers[i].seats).sum::<u32>() + candidate.seats;
    let combined_luggage: u32 = admitted.iter().map(|&i| passengers[i].luggage).sum::<u32>() + candidate.luggage;
    combined_seats <= VehicleClass::Van.max_seats() && combined_luggage <= VehicleClass::Van.max_luggage()
}

/// Greedy growth from the head of an over-large cluster: take the oldest
/// unassigned member as seed, walk the remainder newest-first and admit
/// compatible candidates up to the pool size/capacity caps, attempt to form
/// a pool, then repeat with whatever is left.
fn process_large_cluster(cluster: &[usize], passengers: &[MatcherPassenger], ctx: &MatcherContext) -> DispatchResult<Vec<MatchProposal>> {
    let mut unassigned: Vec<usize> = cluster.to_vec();
    let mut proposals = Vec::new();

    while !unassigned.is_empty() {
        let seed = unassigned[0];
        let mut admitted = vec![seed];

        let mut i = unassigned.len();
        while i > 1 {
            i -= 1;
            if admitted.len() >= ctx.config.max_pool_size {
                break;
            }
            let candidate = unassigned[i];
            if compatible(&admitted, candidate, passengers, ctx.config.direction_threshold_deg) {
                admitted.push(candidate);
            }
        }

        unassigned.retain(|idx| !admitted.contains(idx));

        if let Some(proposal) = try_form_pool(&admitted, passengers, ctx)? {
            proposals.push(proposal);
        }
    }

    Ok(proposals)
}

/// Attempt to form one pool from exactly `indices`. `Ok(None)` covers every
/// way this can fail to produce a proposal: no vehicle class dominates the
/// combined load, or the Route Planner finds no feasible sequence. Neither
/// is an error — the caller tries a smaller subset.
fn try_form_pool(indices: &[usize], passengers: &[MatcherPassenger], ctx: &MatcherContext) -> DispatchResult<Option<MatchProposal>> {
    let total_seats: u32 = indices.iter().map(|&i| passengers[i].seats).sum();
    let total_luggage: u32 = indices.iter().map(|&i| passengers[i].luggage).sum();

    let Some(vehicle_class) = VehicleClass::smallest_fitting(total_seats, total_luggage) else {
        return Ok(None);
    };

    let pickups: Vec<Coordinate> = indices.iter().map(|&i| passengers[i].pickup).collect();
    let start = route_planner::centroid(&pickups)?;

    let planner_passengers: Vec<PlannerPassenger> = indices
        .iter()
        .map(|&i| {
            let p = &passengers[i];
            PlannerPassenger {
                id: p.id.clone(),
                pickup: p.pickup,
                dropoff: p.dropoff,
                seats: p.seats,
                luggage: p.luggage,
                max_detour_minutes: p.max_detour_minutes,
                requested_at_millis: p.requested_at.timestamp_millis(),
            }
        })
        .collect();

    let capacity = Capacity {
        max_seats: vehicle_class.max_seats(),
        max_luggage: vehicle_class.max_luggage(),
    };

    let Some(route) = route_planner::plan_route(&planner_passengers, start, capacity, ctx.config.two_opt_iteration_cap)? else {
        return Ok(None);
    };

    // Metered fare only: base * surge, with no pool discount applied yet.
    // The discount is detour-aware and the realized detour only exists once
    // `route` is planned, so Dispatch computes it at commit time instead.
    let mut metered_fares = Vec::with_capacity(indices.len());

    for &i in indices {
        let p = &passengers[i];
        let direct_distance = geometry::distance(&p.pickup, &p.dropoff);
        let direct_time = geometry::travel_time(direct_distance);
        let base = pricing::base_fare(vehicle_class, direct_distance, direct_time);

        let surge_factors = ctx
            .surge_zones
            .iter()
            .find(|z| geometry::within_radius(&p.pickup, &z.center, z.radius_km))
            .map(|z| SurgeZoneFactors {
                active_requests: z.active_requests,
                available_drivers: z.available_drivers,
                stored_multiplier: z.multiplier,
            });
        let surge = pricing::surge_multiplier(surge_factors, &ctx.now, ctx.weather);

        metered_fares.push(base * surge);
    }

    let efficiency_score = route.efficiency_score;

    Ok(Some(MatchProposal {
        pool_id: PoolId::new(),
        vehicle_class,
        total_seats,
        total_luggage,
        passenger_ids: indices.iter().map(|&i| passengers[i].id.clone()).collect(),
        route,
        metered_fares,
        efficiency_score,
    }))
}

/// Score for adding a single passenger to an existing Forming pool (for
/// online augmentation). Higher is better. Not called from
/// [`run_matcher`]'s core loop, which isn't wired for online augmentation:
/// every cycle forms fresh pools from pending passengers rather than
/// attaching new riders to an already-Forming pool.
pub fn match_to_existing_pool_score(current_seats: u32, max_seats: u32, age_minutes: f64) -> f64 {
    let utilization = current_seats as f64 / max_seats.max(1) as f64;
    (100.0 - 20.0 * utilization - (age_minutes * 2.0).min(30.0)).max(0.0)
}
