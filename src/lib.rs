//! Shipwright - delegate the native part of a package build to CMake
//!
//! This crate splits a packaging command line into packaging, configure and
//! build-tool arguments, configures and builds the project's native code with
//! CMake, and classifies the installed files back into the package model.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for Shipwright unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides a mock process executor and project fixtures.
#[cfg(test)]
pub mod test_support;

pub use core::{BuildLayout, Generator, Platform, Project, ShimError};
pub use util::context::GlobalContext;
