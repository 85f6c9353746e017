//! Topic constants for broker routing.
//!
//! Topics follow the `jobs.<kind>` routing keys of the jobs exchange.

/// Job requests (launches) sent to the launcher.
pub const LAUNCHES: &str = "jobs.launches";

/// Requests to stop running jobs.
pub const STOPS: &str = "jobs.stops";

/// Job status updates published by the launcher.
pub const UPDATES: &str = "jobs.updates";
