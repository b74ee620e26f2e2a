// Library exports for the ripper binary and integration tests

pub mod cd;
pub mod config;

pub use cd::{RipperError, RipperSession};
pub use config::RipperConfig;

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
