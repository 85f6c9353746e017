//! Background scheduling for the launcher
//!
//! Work that runs on a timer rather than in response to messages.

pub mod reaper;

pub use reaper::HeldJobReaper;
