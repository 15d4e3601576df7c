//! FlightDW common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient functionality shared by the FlightDW workspace members. For now
//! that is the logging setup used by the `flightdw` binary and by tests that
//! want readable pipeline output.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel, LogOutput, LoggingGuard};
