//! Core domain types
//!
//! The job description is produced upstream, carried over the bus inside a
//! request, and handed to the cluster unchanged apart from the scheduler
//! identifier. Status updates travel the other way.

pub mod job;
pub mod status;
