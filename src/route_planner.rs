//! Route planner: a constrained TSP-like sequencer over paired
//! pickup/dropoff waypoints, improved by a 2-opt local-search pass.
//!
//! Builds a feasible order greedily, then generates candidate reorderings,
//! scores them, and adopts an improving one under an iteration budget —
//! segment reversal rather than a swap-based neighbourhood, with no tabu
//! list, since short-lived pools don't need one to avoid cycling.

use crate::domain::types::Coordinate;
use crate::error::{DispatchError, DispatchResult};
use crate::geometry;
use crate::ids::PassengerId;

/// One passenger's contribution to a planning problem.
#[derive(Debug, Clone)]
pub struct PlannerPassenger {
    pub id: PassengerId,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub seats: u32,
    pub luggage: u32,
    pub max_detour_minutes: f64,
    /// Used only as a FIFO tie-break during greedy construction.
    pub requested_at_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointKind {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WpRef {
    passenger_idx: usize,
    kind: WaypointKind,
}

/// One stop along a planned route.
#[derive(Debug, Clone)]
pub struct PlannedWaypoint {
    pub passenger_id: PassengerId,
    pub kind: WaypointKind,
    pub coordinate: Coordinate,
}

/// A feasible, scored route.
#[derive(Debug, Clone)]
pub struct PlannedRoute {
    pub waypoints: Vec<PlannedWaypoint>,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    /// Parallel to the passenger input order.
    pub detour_per_passenger: Vec<f64>,
    pub efficiency_score: f64,
}

/// Vehicle capacity constraints for the route being planned.
#[derive(Debug, Clone, Copy)]
pub struct Capacity {
    pub max_seats: u32,
    pub max_luggage: u32,
}

struct RouteMetrics {
    total_distance_km: f64,
    total_time_min: f64,
    detour_per_passenger: Vec<f64>,
}

/// Plan a feasible pickup/dropoff sequence for `passengers`, starting at
/// `start`, under `capacity`. Returns `Ok(None)` when no feasible sequence
/// exists — infeasibility is a normal result, not an error.
pub fn plan_route(
    passengers: &[PlannerPassenger],
    start: Coordinate,
    capacity: Capacity,
    two_opt_iteration_cap: usize,
) -> DispatchResult<Option<PlannedRoute>> {
    if passengers.is_empty() {
        // Zero passengers returns immediately with an empty route.
        return Ok(Some(PlannedRoute {
            waypoints: Vec::new(),
            total_distance_km: 0.0,
            total_time_min: 0.0,
            detour_per_passenger: Vec::new(),
            efficiency_score: 1.0,
        }));
    }

    let Some(mut order) = greedy_construct(passengers, &start, capacity) else {
        return Ok(None);
    };

    let Some(metrics) = compute_metrics(&order, passengers, &start) else {
        return Ok(None);
    };
    if !detours_within_limits(&metrics, passengers) {
        return Ok(None);
    }

    let mut best_metrics = metrics;
    improve_with_two_opt(&mut order, passengers, &start, two_opt_iteration_cap, &mut best_metrics);

    let direct_sum: f64 = passengers
        .iter()
        .map(|p| geometry::distance(&p.pickup, &p.dropoff))
        .sum();
    let efficiency_score = if best_metrics.total_distance_km > 0.0 {
        direct_sum / best_metrics.total_distance_km
    } else {
        1.0
    };

    let waypoints = order
        .iter()
        .map(|w| {
            let p = &passengers[w.passenger_idx];
            let coordinate = match w.kind {
                WaypointKind::Pickup => p.pickup,
                WaypointKind::Dropoff => p.dropoff,
            };
            PlannedWaypoint {
                passenger_id: p.id.clone(),
                kind: w.kind,
                coordinate,
            }
        })
        .collect();

    Ok(Some(PlannedRoute {
        waypoints,
        total_distance_km: best_metrics.total_distance_km,
        total_time_min: best_metrics.total_time_min,
        detour_per_passenger: best_metrics.detour_per_passenger,
        efficiency_score,
    }))
}

/// Greedy nearest-feasible-waypoint construction.
fn greedy_construct(
    passengers: &[PlannerPassenger],
    start: &Coordinate,
    capacity: Capacity,
) -> Option<Vec<WpRef>> {
    let n = passengers.len();
    let mut remaining: Vec<WpRef> = Vec::with_capacity(2 * n);
    for idx in 0..n {
        remaining.push(WpRef { passenger_idx: idx, kind: WaypointKind::Pickup });
        remaining.push(WpRef { passenger_idx: idx, kind: WaypointKind::Dropoff });
    }

    let mut onboard = vec![false; n];
    let mut seats_onboard = 0u32;
    let mut luggage_onboard = 0u32;
    let mut current = *start;
    let mut order = Vec::with_capacity(2 * n);

    while !remaining.is_empty() {
        let mut best: Option<(usize, f64)> = None;

        for (i, w) in remaining.iter().enumerate() {
            let p = &passengers[w.passenger_idx];
            let feasible = match w.kind {
                WaypointKind::Dropoff => onboard[w.passenger_idx],
                WaypointKind::Pickup => {
                    seats_onboard + p.seats <= capacity.max_seats
                        && luggage_onboard + p.luggage <= capacity.max_luggage
                }
            };
            if !feasible {
                continue;
            }

            let coord = match w.kind {
                WaypointKind::Pickup => p.pickup,
                WaypointKind::Dropoff => p.dropoff,
            };
            let d = geometry::distance(&current, &coord);

            best = Some(match best {
                None => (i, d),
                Some((best_i, best_d)) => {
                    if d < best_d - f64::EPSILON {
                        (i, d)
                    } else if (d - best_d).abs() <= f64::EPSILON {
                        // Tie-break: prefer the passenger who has been waiting longer.
                        let best_p = &passengers[remaining[best_i].passenger_idx];
                        if p.requested_at_millis < best_p.requested_at_millis {
                            (i, d)
                        } else {
                            (best_i, best_d)
                        }
                    } else {
                        (best_i, best_d)
                    }
                }
            });
        }

        let (chosen_i, _) = best?;
        let chosen = remaining.remove(chosen_i);
        let p = &passengers[chosen.passenger_idx];
        match chosen.kind {
            WaypointKind::Pickup => {
                onboard[chosen.passenger_idx] = true;
                seats_onboard += p.seats;
                luggage_onboard += p.luggage;
                current = p.pickup;
            }
            WaypointKind::Dropoff => {
                onboard[chosen.passenger_idx] = false;
                seats_onboard -= p.seats;
                luggage_onboard -= p.luggage;
                current = p.dropoff;
            }
        }
        order.push(chosen);
    }

    Some(order)
}

/// Walk a candidate order and compute total distance/time and per-passenger
/// detour. Returns `None` if any dropoff precedes its pickup — an undefined,
/// infeasible ordering.
fn compute_metrics(
    order: &[WpRef],
    passengers: &[PlannerPassenger],
    start: &Coordinate,
) -> Option<RouteMetrics> {
    let n = passengers.len();
    let mut picked_up = vec![false; n];
    let mut pickup_time = vec![0.0f64; n];
    let mut dropoff_time = vec![0.0f64; n];

    let mut current = *start;
    let mut total_distance_km = 0.0;
    let mut elapsed_min = 0.0;

    for w in order {
        let p = &passengers[w.passenger_idx];
        let coord = match w.kind {
            WaypointKind::Pickup => p.pickup,
            WaypointKind::Dropoff => p.dropoff,
        };
        let leg = geometry::distance(&current, &coord);
        total_distance_km += leg;
        elapsed_min += geometry::travel_time(leg);

        match w.kind {
            WaypointKind::Pickup => {
                picked_up[w.passenger_idx] = true;
                pickup_time[w.passenger_idx] = elapsed_min;
            }
            WaypointKind::Dropoff => {
                if !picked_up[w.passenger_idx] {
                    return None;
                }
                dropoff_time[w.passenger_idx] = elapsed_min;
            }
        }
        current = coord;
    }

    let detour_per_passenger = (0..n)
        .map(|i| {
            let onboard_time = dropoff_time[i] - pickup_time[i];
            let direct_time = geometry::travel_time(geometry::distance(&passengers[i].pickup, &passengers[i].dropoff));
            onboard_time - direct_time
        })
        .collect();

    Some(RouteMetrics {
        total_distance_km,
        total_time_min: elapsed_min,
        detour_per_passenger,
    })
}

fn detours_within_limits(metrics: &RouteMetrics, passengers: &[PlannerPassenger]) -> bool {
    metrics
        .detour_per_passenger
        .iter()
        .zip(passengers)
        .all(|(detour, p)| *detour <= p.max_detour_minutes)
}

/// 2-opt improvement pass: repeatedly try reversing a
/// subsequence, adopting the best strictly-improving, still-feasible
/// candidate, until no improvement is found or `iteration_cap` is reached.
fn improve_with_two_opt(
    order: &mut Vec<WpRef>,
    passengers: &[PlannerPassenger],
    start: &Coordinate,
    iteration_cap: usize,
    best_metrics: &mut RouteMetrics,
) {
    let n = order.len();
    if n < 4 {
        return;
    }

    for _ in 0..iteration_cap {
        let mut best_candidate: Option<(Vec<WpRef>, RouteMetrics)> = None;

        for i in 0..n - 2 {
            for j in (i + 2)..n {
                let mut candidate = order.clone();
                candidate[i + 1..=j].reverse();

                let Some(metrics) = compute_metrics(&candidate, passengers, start) else {
                    continue;
                };
                if metrics.total_distance_km >= best_metrics.total_distance_km - f64::EPSILON {
                    continue;
                }
                if !detours_within_limits(&metrics, passengers) {
                    continue;
                }

                let better_than_seen = match &best_candidate {
                    None => true,
                    Some((_, seen)) => metrics.total_distance_km < seen.total_distance_km,
                };
                if better_than_seen {
                    best_candidate = Some((candidate, metrics));
                }
            }
        }

        match best_candidate {
            Some((candidate, metrics)) => {
                *order = candidate;
                *best_metrics = metrics;
            }
            None => break,
        }
    }
}

/// Surfaced when a caller asks the planner to compute something undefined,
/// e.g. the centroid of zero pickups — a programming error, not infeasibility.
pub fn centroid(coords: &[Coordinate]) -> DispatchResult<Coordinate> {
    if coords.is_empty() {
        return Err(DispatchError::Invariant(
            "centroid of an empty coordinate set is undefined".to_string(),
        ));
    }
    let lat = coords.iter().map(|c| c.lat).sum::<f64>() / coords.len() as f64;
    let lng = coords.iter().map(|c| c.lng).sum::<f64>() / coords.len() as f64;
    Coordinate::new(lat, lng)
}
