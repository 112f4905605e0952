//! Small demo runner: builds an in-memory store, creates a handful of
//! requests, runs one matching cycle, and prints the resulting pools and
//! prices — a thin shell proving the library works end to end.

use std::error::Error;
use std::sync::Arc;

use colored::*;
use ridepool_dispatch::dispatch::{CreateRequestInput, DispatchService};
use ridepool_dispatch::domain::types::Coordinate;
use ridepool_dispatch::persistence::memory::InMemoryStore;
use ridepool_dispatch::persistence::PersistenceStore;
use ridepool_dispatch::Config;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().compact())
        .init();

    let store = Arc::new(InMemoryStore::new());
    let service = DispatchService::new(store.clone(), Config::from_env());

    info!("seeding sample requests near JFK");

    let seeds = [
        ("alice", (40.6413, -73.7781), (40.7580, -73.9855), 1u32),
        ("bilal", (40.6420, -73.7790), (40.7585, -73.9860), 0u32),
        ("carmen", (40.6425, -73.7795), (40.7590, -73.9865), 2u32),
        ("dev", (40.7000, -74.0000), (40.8000, -73.9000), 0u32),
    ];

    let mut passenger_ids = Vec::new();
    for (name, pickup, dropoff, luggage) in seeds {
        let output = service
            .create_request(CreateRequestInput {
                user_id: name.to_string(),
                pickup: Coordinate::new(pickup.0, pickup.1)?,
                dropoff: Coordinate::new(dropoff.0, dropoff.1)?,
                luggage_count: luggage,
                seats_required: 1,
                max_detour_minutes: 20.0,
            })
            .await?;
        println!(
            "{} {} estimate {}",
            "request".blue(),
            name,
            format!("${:.2}", output.estimated_final).green()
        );
        passenger_ids.push(output.passenger_id);
    }

    let summary = service.run_matching_cycle().await?;
    println!(
        "{} {} passengers into {} pool(s)",
        "matched".bold(),
        summary.matched_count,
        summary.pools_created
    );

    for passenger_id in &passenger_ids {
        if let Some(passenger) = store.get_passenger(passenger_id).await? {
            let pool_label = passenger
                .pool_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unmatched".to_string());
            println!(
                "  {:<8} state={:<10?} pool={} final={}",
                passenger.user_id,
                passenger.state,
                pool_label,
                passenger
                    .final_fare
                    .map(|f| format!("${f:.2}"))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    Ok(())
}
