//! Condor Core
//!
//! Core types shared by the condor-launcher services.
//!
//! This crate contains:
//! - Domain types: the job description and the status updates emitted for it
//! - DTOs: the request payloads carried over the message bus

pub mod domain;
pub mod dto;
