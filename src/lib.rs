//! Ride-pooling dispatch engine: batches pending passenger requests into
//! shared-vehicle pools, plans a feasible pickup/dropoff sequence for each,
//! prices every seat, and mediates concurrent state changes against shared
//! pool data.
//!
//! Small, independently testable modules (`geometry`, `pricing`,
//! `route_planner`, `matcher`) composed by one orchestrating service
//! (`dispatch`) behind a persistence trait, with a thin demo binary as the
//! only consumer in this repository.

pub mod concurrency;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod matcher;
pub mod persistence;
pub mod pricing;
pub mod route_planner;

pub use config::Config;
pub use dispatch::{
    CancelOutcome, CreateRequestInput, CreateRequestOutput, DispatchService, MatchingCycleSummary, SurgeRefreshSummary,
};
pub use error::{DispatchError, DispatchResult};
