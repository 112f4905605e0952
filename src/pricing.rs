//! Dynamic pricing engine: a pure function of its inputs, no I/O.
//!
//! Split into `quote` (base/surge/discount/final) and `refresh_surge_zone`
//! (the exponential-smoothing table), so each piece is independently
//! testable against a fixed input.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::types::{DemandTier, VehicleClass};

/// Weather conditions recognised by the surge multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Weather {
    Clear,
    Rain,
    Snow,
}

impl Weather {
    fn factor(self) -> f64 {
        match self {
            Weather::Clear => 1.0,
            Weather::Rain => 1.2,
            Weather::Snow => 1.5,
        }
    }
}

/// A surge zone's contribution to a quote: its live demand/supply counters
/// and its own stored multiplier — a quote takes the max of the computed
/// surge and the zone's stored multiplier.
#[derive(Debug, Clone, Copy)]
pub struct SurgeZoneFactors {
    pub active_requests: u32,
    pub available_drivers: u32,
    pub stored_multiplier: f64,
}

/// Inputs to a single fare quote.
#[derive(Debug, Clone)]
pub struct PricingFactors {
    pub vehicle_class: VehicleClass,
    pub distance_km: f64,
    pub time_min: f64,
    pub pool_size: usize,
    pub detour_minutes: f64,
    pub surge_zone: Option<SurgeZoneFactors>,
    pub weather: Weather,
    pub local_time: DateTime<Utc>,
}

/// A fare quote's components, rounded to 2 decimals only at this boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: f64,
    pub surge: f64,
    pub pool_discount: f64,
    pub final_fare: f64,
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn is_weekday_peak(t: &DateTime<Utc>) -> bool {
    let is_weekday = !matches!(t.weekday(), Weekday::Sat | Weekday::Sun);
    let hour = t.hour();
    let is_peak_hour = (7..10).contains(&hour) || (17..20).contains(&hour);
    is_weekday && is_peak_hour
}

/// Base fare: `max(minFare, distance*ratePerKm + time*ratePerMin)`.
pub fn base_fare(class: VehicleClass, distance_km: f64, time_min: f64) -> f64 {
    let metered = distance_km * class.rate_per_km() + time_min * class.rate_per_min();
    class.min_fare().max(metered)
}

/// Composite surge multiplier, clamped to `[1.0, 3.5]`.
pub fn surge_multiplier(
    surge_zone: Option<SurgeZoneFactors>,
    local_time: &DateTime<Utc>,
    weather: Weather,
) -> f64 {
    let mut surge = 1.0;

    if let Some(zone) = surge_zone {
        let r = zone.active_requests as f64 / (zone.available_drivers as f64).max(1.0);
        if r > 1.5 {
            surge += ((r - 1.5) * 0.5).min(1.5);
        }
        surge = surge.max(zone.stored_multiplier);
    }

    if is_weekday_peak(local_time) {
        surge *= 1.3;
    }

    surge *= weather.factor();

    surge.clamp(1.0, 3.5)
}

/// Pool discount multiplier in `[0.50, 1.0]`.
pub fn pool_discount_multiplier(pool_size: usize, detour_minutes: f64) -> f64 {
    if pool_size <= 1 {
        return 1.0;
    }
    let raw = 0.15 * (pool_size as f64 - 1.0) - 0.02 * detour_minutes.max(0.0);
    (1.0 - raw.max(0.0)).max(0.50)
}

/// Compute a full fare quote from its factors.
pub fn quote(factors: &PricingFactors) -> PriceBreakdown {
    let base = base_fare(factors.vehicle_class, factors.distance_km, factors.time_min);
    let surge = surge_multiplier(factors.surge_zone, &factors.local_time, factors.weather);
    let discount = pool_discount_multiplier(factors.pool_size, factors.detour_minutes);
    let final_fare = base * surge * discount;

    PriceBreakdown {
        base: round2(base),
        surge: round2(surge),
        pool_discount: round2(discount),
        final_fare: round2(final_fare),
    }
}

/// Demand tier and raw surge value for a given active/driver ratio.
fn surge_tier_and_raw(active: u32, drivers: u32) -> (DemandTier, f64) {
    let r = active as f64 / (drivers as f64).max(1.0);
    if r < 0.5 {
        (DemandTier::Low, 1.0)
    } else if r < 1.5 {
        (DemandTier::Normal, 1.0)
    } else if r < 3.0 {
        (DemandTier::High, 1.0 + (r - 1.5) * 0.4)
    } else {
        (DemandTier::VeryHigh, 1.6 + (r - 3.0) * 0.3)
    }
}

/// Refresh a surge zone's multiplier: exponentially smooth the raw tier
/// value against the previous multiplier, clamped to `[1.0, 3.5]`.
pub fn refresh_surge_zone(active: u32, drivers: u32, prev_surge: f64) -> (DemandTier, f64) {
    let (tier, raw) = surge_tier_and_raw(active, drivers);
    let smoothed = 0.3 * raw + 0.7 * prev_surge;
    (tier, smoothed.clamp(1.0, 3.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekday_peak() -> DateTime<Utc> {
        // 2024-01-08 is a Monday.
        Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap()
    }

    #[test]
    fn weekday_peak_single_rider_estimate_has_expected_surge() {
        let distance_km = 21.3;
        let time_min = 42.6;
        let base = base_fare(VehicleClass::Sedan, distance_km, time_min);
        assert!((base - 70.29).abs() < 0.05, "base was {base}");

        let surge = surge_multiplier(None, &weekday_peak(), Weather::Clear);
        assert!((surge - 1.3).abs() < 1e-9);

        let discount = pool_discount_multiplier(1, 0.0);
        assert_eq!(discount, 1.0);

        let final_fare = base * surge * discount;
        assert!((final_fare - 91.38).abs() < 0.1, "final was {final_fare}");
    }

    #[test]
    fn three_rider_pool_discount_is_point_seven() {
        // pool of 3, detour irrelevant to the 0.30 headline number when small.
        let discount = pool_discount_multiplier(3, 0.0);
        assert!((discount - 0.70).abs() < 1e-9, "discount was {discount}");
    }

    #[test]
    fn pool_discount_floors_at_half() {
        let discount = pool_discount_multiplier(10, 0.0);
        assert_eq!(discount, 0.50);
    }

    #[test]
    fn surge_clamped_to_upper_bound() {
        let zone = SurgeZoneFactors {
            active_requests: 1000,
            available_drivers: 1,
            stored_multiplier: 1.0,
        };
        let surge = surge_multiplier(Some(zone), &weekday_peak(), Weather::Snow);
        assert_eq!(surge, 3.5);
    }

    #[test]
    fn final_fare_within_invariant_bounds() {
        let factors = PricingFactors {
            vehicle_class: VehicleClass::Suv,
            distance_km: 12.0,
            time_min: 30.0,
            pool_size: 3,
            detour_minutes: 15.0,
            surge_zone: None,
            weather: Weather::Rain,
            local_time: weekday_peak(),
        };
        let q = quote(&factors);
        assert!(q.final_fare >= 0.5 * q.base * q.surge - 1e-6);
        assert!(q.final_fare <= q.base * q.surge + 1e-6);
    }

    #[test]
    fn surge_refresh_smoothing_converges_toward_raw_value() {
        let (tier, smoothed) = refresh_surge_zone(30, 5, 1.0);
        assert_eq!(tier, DemandTier::VeryHigh);
        assert!((smoothed - 1.45).abs() < 1e-9, "smoothed was {smoothed}");
    }

    #[test]
    fn surge_refresh_always_in_bounds() {
        let (_, smoothed) = refresh_surge_zone(0, 0, 1.0);
        assert!((1.0..=3.5).contains(&smoothed));
        let (_, smoothed) = refresh_surge_zone(10_000, 1, 3.5);
        assert!((1.0..=3.5).contains(&smoothed));
    }
}
