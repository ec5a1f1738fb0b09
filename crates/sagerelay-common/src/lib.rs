//! Sagerelay Common Library
//!
//! Shared infrastructure for the sagerelay workspace. Currently this is the
//! logging layer; every binary initializes tracing through
//! [`logging::init_logging`] so that log configuration behaves identically
//! across components.

pub mod logging;

pub use logging::{init_logging, LogConfig};
