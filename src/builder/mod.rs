//! Native build driver.
//!
//! Everything that talks to CMake or the target interpreter lives here,
//! together with the build spec cache and the install manifest classifier.

pub mod classify;
pub mod cmake;
pub mod probe;
pub mod python;
pub mod spec;

pub use classify::{Classification, Classifier, PackagePrefixes};
pub use cmake::{CMaker, ConfigureOptions};
pub use probe::GeneratorResolver;
pub use python::InterpreterInfo;
pub use spec::BuildSpec;
