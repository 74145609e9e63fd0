//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod load;
pub mod scheduler;
pub mod telemetry;
