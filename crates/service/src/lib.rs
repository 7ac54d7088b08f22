//! `gatekeep-service`: one handle over every gatekeep component.
//!
//! Binaries build a [`Gatekeep`] with [`Gatekeep::connect`] from
//! [`GatekeepConfig::from_env`]; tests assemble one from in-memory stores
//! with [`Gatekeep::builder`].

pub mod config;
pub mod gatekeep;

pub use config::GatekeepConfig;
pub use gatekeep::{Gatekeep, GatekeepBuilder};

