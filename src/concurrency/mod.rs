//! Concurrency Mediator: named mutual-exclusion leases with TTL,
//! version-checked updates, and retry-with-backoff.
//!
//! Explicit, typed concurrency primitives — lock-striped shared state
//! behind a lease abstraction — rather than ad hoc mutexes sprinkled
//! through business logic.

pub mod lease;
pub mod retry;

pub use lease::{with_lease, LeaseOutcome};
pub use retry::retry_with_backoff;
