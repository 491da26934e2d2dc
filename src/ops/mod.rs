//! High-level operations.
//!
//! This module contains the implementation of the shim's commands.

pub mod args;
pub mod clean;
pub mod setup;

pub use args::{partition, ArgumentGroups, BuildOptions, PartitionedArgs};
pub use clean::clean;
pub use setup::{setup, SetupContext, SetupOptions, SetupPlan};
