//! Full and incremental render passes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::application::render::BlockRenderer;
use crate::cache::{CacheConfig, ContentHash, RenderCache};

use super::blocks::{Block, BlockSplitter};
use super::version::DocumentVersion;

const METRIC_RENDER_MS: &str = "anteprima_render_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    Full,
    Incremental,
}

impl RenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderKind::Full => "full",
            RenderKind::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurements for one completed render pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderMetrics {
    pub duration_ms: f64,
    pub blocks_total: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub render_kind: RenderKind,
}

/// A block whose markup could not be rendered; its raw text was shown instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockFailure {
    pub block_index: usize,
    #[serde(serialize_with = "serialize_hash")]
    pub block_id: ContentHash,
    pub message: String,
}

fn serialize_hash<S: serde::Serializer>(hash: &ContentHash, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash.to_hex())
}

/// All block failures of one applied pass, reported once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFailureReport {
    pub version: DocumentVersion,
    pub failures: Vec<BlockFailure>,
}

/// What the UI receives for an applied render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResult {
    pub html: String,
    pub metrics: RenderMetrics,
    pub version: DocumentVersion,
}

/// Everything a render pass produced, before the version gate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutcome {
    pub html: String,
    pub metrics: RenderMetrics,
    pub version: DocumentVersion,
    pub failures: Vec<BlockFailure>,
}

impl RenderOutcome {
    pub fn into_parts(self) -> (RenderResult, Option<RenderFailureReport>) {
        let report = (!self.failures.is_empty()).then(|| RenderFailureReport {
            version: self.version,
            failures: self.failures,
        });
        let result = RenderResult {
            html: self.html,
            metrics: self.metrics,
            version: self.version,
        };
        (result, report)
    }
}

/// Splits, looks up, renders and assembles documents. Owns the block cache
/// and the block map of the previous pass.
pub struct RenderOrchestrator {
    splitter: BlockSplitter,
    renderer: Arc<dyn BlockRenderer>,
    cache: RenderCache,
    previous: Option<Vec<Block>>,
    previous_version: Option<DocumentVersion>,
    incremental_threshold_chars: usize,
}

impl RenderOrchestrator {
    pub fn new(
        splitter: BlockSplitter,
        renderer: Arc<dyn BlockRenderer>,
        cache_config: &CacheConfig,
        incremental_threshold_chars: usize,
    ) -> Self {
        Self {
            splitter,
            renderer,
            cache: RenderCache::new(cache_config),
            previous: None,
            previous_version: None,
            incremental_threshold_chars,
        }
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn renderer(&self) -> &Arc<dyn BlockRenderer> {
        &self.renderer
    }

    /// Block map of the most recent pass.
    pub fn blocks(&self) -> &[Block] {
        self.previous.as_deref().unwrap_or_default()
    }

    /// Version of the most recent pass.
    pub fn last_version(&self) -> Option<DocumentVersion> {
        self.previous_version
    }

    /// Borrow the renderer and the cache together, as speculative warming
    /// needs both.
    pub(crate) fn warming_parts(&mut self) -> (&dyn BlockRenderer, &mut RenderCache) {
        (self.renderer.as_ref(), &mut self.cache)
    }

    /// Forget the block map and every cached block.
    pub fn reset(&mut self) {
        self.previous = None;
        self.previous_version = None;
        self.cache.clear();
    }

    fn choose_kind(&self, doc_size_chars: usize) -> RenderKind {
        if self.previous.is_none() || doc_size_chars < self.incremental_threshold_chars {
            RenderKind::Full
        } else {
            RenderKind::Incremental
        }
    }

    #[instrument(skip(self, document), fields(doc_bytes = document.len()))]
    pub fn render(&mut self, document: &str, version: DocumentVersion) -> RenderOutcome {
        let started_at = Instant::now();
        let blocks = self.splitter.split(document);
        let kind = self.choose_kind(document.chars().count());
        let previous = self.previous.take().unwrap_or_default();

        let mut html = String::with_capacity(document.len() + document.len() / 2);
        let mut failures = Vec::new();
        let mut cache_hits = 0;
        let mut cache_misses = 0;

        for (index, block) in blocks.iter().enumerate() {
            if kind == RenderKind::Incremental {
                let unchanged = previous.get(index).is_some_and(|prev| prev.id == block.id);
                if let Some(fragment) = self.cache.get(&block.id) {
                    cache_hits += 1;
                    push_fragment(&mut html, &fragment);
                    continue;
                }
                if unchanged {
                    debug!(block = %block.id, index, "Unchanged block missing from cache");
                }
            }

            cache_misses += 1;
            let fragment = self.render_block(index, block, &mut failures);
            push_fragment(&mut html, &fragment);
        }

        let elapsed = started_at.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        histogram!(METRIC_RENDER_MS, "kind" => kind.as_str()).record(duration_ms);

        if !failures.is_empty() {
            warn!(
                version,
                failed_blocks = failures.len(),
                "Some blocks fell back to raw text"
            );
        }

        debug!(
            version,
            kind = %kind,
            blocks_total = blocks.len(),
            cache_hits,
            cache_misses,
            duration_ms,
            "Render pass complete"
        );

        let metrics = RenderMetrics {
            duration_ms,
            blocks_total: blocks.len(),
            cache_hits,
            cache_misses,
            render_kind: kind,
        };

        self.previous = Some(blocks);
        self.previous_version = Some(version);

        RenderOutcome {
            html,
            metrics,
            version,
            failures,
        }
    }

    fn render_block(
        &mut self,
        index: usize,
        block: &Block,
        failures: &mut Vec<BlockFailure>,
    ) -> String {
        match self.renderer.render_block(&block.raw_text) {
            Ok(fragment) => {
                self.cache.put(block.id, fragment.clone());
                fragment
            }
            Err(err) => {
                failures.push(BlockFailure {
                    block_index: index,
                    block_id: block.id,
                    message: err.to_string(),
                });
                fallback_fragment(&block.raw_text)
            }
        }
    }
}

fn push_fragment(html: &mut String, fragment: &str) {
    html.push_str(fragment);
    if !fragment.ends_with('\n') {
        html.push('\n');
    }
}

/// Escaped raw text shown in place of a block that failed to render.
pub fn fallback_fragment(raw_text: &str) -> String {
    format!(
        "<pre class=\"render-fallback\">{}</pre>\n",
        ammonia::clean_text(raw_text)
    )
}
