//! [crates/fleet-core/src/commands/mod.rs]
//! Command handlers. Each is a plain async function over
//! `Services` and plain arguments; the controller layer (out of scope) wraps
//! the `Result` in `OperationResult::from_command_result`.

pub mod bulk_sync;
pub mod idle_toggle;
pub mod lab_control;
pub mod refresh;
pub mod worker_lifecycle;
