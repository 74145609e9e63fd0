//! Block render cache.
//!
//! Rendered HTML is stored per block, addressed by the SHA-256 digest of the
//! block's markdown so identical text is rendered once.
//!
//! ## Configuration
//!
//! ```toml
//! [preview]
//! cache_max_blocks = 250
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::ContentHash;
pub use store::{CacheEntry, CacheStats, RenderCache};
