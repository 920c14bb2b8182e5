//! Skill-based job subscription matching and notification pipeline for the
//! JobFind marketplace.
//!
//! The crate is organized the same way the service thinks about the problem:
//! `workflows::subscriptions` holds the matching core (skill sets, subscriber
//! registry, matcher, dispatcher, scheduler) behind storage and mail-sender
//! seams, while `config`, `telemetry`, and `error` carry the application
//! plumbing shared with the API binary.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
