//! Process-wide tracing setup shared by binaries and integration tests.

pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat, init, init_with};
