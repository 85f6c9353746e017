//! Data Transfer Objects carried over the message bus
//!
//! Requests arrive from upstream services and are decoded from JSON before
//! they are dispatched.

pub mod request;
