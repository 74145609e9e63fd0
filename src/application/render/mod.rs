//! Block rendering primitive.
//!
//! The rendering pipeline is intentionally kept pure: it accepts the markdown
//! of one block, produces deterministic HTML output, and surfaces structured
//! errors. Caching and scheduling happen in the caller, the preview worker.

mod service;
mod types;

pub use service::{ComrakBlockRenderer, block_renderer};
pub use types::{BlockRenderer, RenderError};
