mod config;

use std::sync::Arc;

use comrak::{Arena, format_html, parse_document};
use once_cell::sync::Lazy;

use crate::application::render::types::{BlockRenderer, RenderError};

use config::{build_sanitizer, default_options};

/// Default Comrak-based block renderer with Ammonia sanitisation.
pub struct ComrakBlockRenderer {
    options: comrak::Options<'static>,
    sanitizer: ammonia::Builder<'static>,
}

impl ComrakBlockRenderer {
    /// Construct a renderer with GFM extensions enabled.
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_sanitizer(),
        }
    }

    /// Render markdown into HTML while skipping the sanitisation stage. This is
    /// intended for diagnostics when refining sanitizer rules.
    pub fn render_unsanitized(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let mut html = String::new();
        format_html(root, &self.options, &mut html)
            .map_err(|err| RenderError::markdown(err.to_string()))?;
        Ok(html)
    }
}

impl Default for ComrakBlockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRenderer for ComrakBlockRenderer {
    fn render_block(&self, markdown: &str) -> Result<String, RenderError> {
        let html = self.render_unsanitized(markdown)?;
        Ok(self.sanitizer.clean(&html).to_string())
    }
}

static BLOCK_RENDERER: Lazy<Arc<ComrakBlockRenderer>> =
    Lazy::new(|| Arc::new(ComrakBlockRenderer::new()));

/// Access the shared block renderer instance, initialised on first use.
pub fn block_renderer() -> Arc<ComrakBlockRenderer> {
    Arc::clone(&BLOCK_RENDERER)
}
