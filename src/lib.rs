//! Adaptive incremental markdown preview.
//!
//! See [`preview`] for the engine and [`config`] for the settings layer used
//! by the `anteprima` binary.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod preview;
pub(crate) mod util;
