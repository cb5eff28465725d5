//! HTTP control surface for the publication harvester.

pub mod api;
pub mod metrics;
pub mod state;
