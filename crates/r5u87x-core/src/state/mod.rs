//! State machine module.

pub mod commands;
pub mod machine;

pub use machine::{LoaderState, StateMachineContext, VersionCheck};
