//! Command line tools for configuring a MythTV backend over its
//! Services API, plus a stream relay for external recorder inputs.

pub mod capture;
pub mod channels;
pub mod cli;
pub mod client;
pub mod display;
pub mod models;
pub mod relay;
pub mod rules;
pub mod schedule;
pub mod settings;
pub mod timefmt;
