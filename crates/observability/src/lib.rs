//! Process-wide logging setup for FELICITA binaries and tests.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
