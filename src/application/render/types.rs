use thiserror::Error;

/// Structured errors surfaced when a single block fails to render. The
/// orchestrator never propagates these to callers; they are collected into a
/// per-pass failure report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("markdown parsing failed: {message}")]
    Markdown { message: String },
    #[error("sanitisation rejected content: {message}")]
    Sanitisation { message: String },
}

impl RenderError {
    pub fn markdown(message: impl Into<String>) -> Self {
        Self::Markdown {
            message: message.into(),
        }
    }
}

/// Markup-to-HTML primitive used for every block. Implementations must be pure
/// and deterministic: given the same input, they return identical outputs or
/// errors.
pub trait BlockRenderer: Send + Sync {
    fn render_block(&self, markdown: &str) -> Result<String, RenderError>;
}

impl<R: BlockRenderer + ?Sized> BlockRenderer for std::sync::Arc<R> {
    fn render_block(&self, markdown: &str) -> Result<String, RenderError> {
        (**self).render_block(markdown)
    }
}
