//! Core data structures for Shipwright.
//!
//! This module contains the foundational types used throughout Shipwright:
//! - Error kinds surfaced to the user
//! - Generators and the platforms that own them
//! - Project declarations (`Shipwright.toml`)
//! - The on-disk build layout

pub mod errors;
pub mod generator;
pub mod layout;
pub mod platform;
pub mod project;

pub use errors::ShimError;
pub use generator::Generator;
pub use layout::BuildLayout;
pub use platform::Platform;
pub use project::Project;
