//! [crates/fleet-core/src/queries/mod.rs]
//! Read-only query handlers.

pub mod labs;
pub mod settings;
pub mod workers;
