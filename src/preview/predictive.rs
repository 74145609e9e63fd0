//! Speculative rendering of blocks near the cursor.

use std::collections::{HashSet, VecDeque};

use metrics::counter;
use tracing::debug;

use crate::application::render::BlockRenderer;
use crate::cache::{ContentHash, RenderCache};

use super::blocks::Block;
use super::version::{DocumentVersion, VersionClock};

const METRIC_PREDICTIVE_RENDER: &str = "anteprima_predictive_render_total";

#[derive(Debug, Clone)]
struct Speculation {
    id: ContentHash,
    raw_text: String,
}

/// Outcome of one unit of speculative work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictiveStep {
    /// Nothing queued.
    Idle,
    /// A block was rendered and cached.
    Warmed,
    /// The block was cached in the meantime.
    AlreadyCached,
    /// The render failed; nothing was cached.
    Failed,
    /// The document moved on; the queue was dropped.
    Discarded,
}

/// Queue of blocks around the cursor, rendered one at a time while the
/// worker is otherwise idle.
#[derive(Debug)]
pub struct PredictiveRenderer {
    window: usize,
    queue: VecDeque<Speculation>,
    target: Option<DocumentVersion>,
}

impl PredictiveRenderer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            queue: VecDeque::new(),
            target: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Replace the queue with uncached neighbours of `block_index`, nearest
    /// first, alternating after and before the cursor block.
    pub fn on_cursor_move(
        &mut self,
        block_index: usize,
        version: DocumentVersion,
        blocks: &[Block],
        cache: &RenderCache,
    ) {
        self.queue.clear();
        self.target = Some(version);

        let mut seen = HashSet::new();
        if let Some(cursor_block) = blocks.get(block_index) {
            seen.insert(cursor_block.id);
        }

        for distance in 1..=self.window {
            let after = block_index.checked_add(distance);
            let before = block_index.checked_sub(distance);
            for index in [after, before].into_iter().flatten() {
                let Some(block) = blocks.get(index) else {
                    continue;
                };
                if cache.contains(&block.id) || !seen.insert(block.id) {
                    continue;
                }
                self.queue.push_back(Speculation {
                    id: block.id,
                    raw_text: block.raw_text.clone(),
                });
            }
        }

        debug!(
            block_index,
            version,
            queued = self.queue.len(),
            "Predictive queue replaced"
        );
    }

    pub fn cancel(&mut self) {
        self.queue.clear();
        self.target = None;
    }

    fn is_current(&self, clock: &VersionClock) -> bool {
        self.target == Some(clock.current())
    }

    fn discard(&mut self, clock: &VersionClock) -> PredictiveStep {
        debug!(
            target_version = ?self.target,
            latest = clock.current(),
            dropped = self.queue.len(),
            "Discarded predictive queue"
        );
        self.cancel();
        PredictiveStep::Discarded
    }

    /// Render the next queued block, provided the document has not changed
    /// since the queue was built.
    pub fn run_next(
        &mut self,
        renderer: &dyn BlockRenderer,
        cache: &mut RenderCache,
        clock: &VersionClock,
    ) -> PredictiveStep {
        if self.queue.is_empty() {
            return PredictiveStep::Idle;
        }
        if !self.is_current(clock) {
            return self.discard(clock);
        }

        let Some(next) = self.queue.pop_front() else {
            return PredictiveStep::Idle;
        };
        if cache.contains(&next.id) {
            return PredictiveStep::AlreadyCached;
        }

        let rendered = renderer.render_block(&next.raw_text);

        if !self.is_current(clock) {
            return self.discard(clock);
        }

        match rendered {
            Ok(html) => {
                cache.put(next.id, html);
                counter!(METRIC_PREDICTIVE_RENDER, "result" => "warmed").increment(1);
                debug!(block = %next.id, "Pre-rendered block");
                PredictiveStep::Warmed
            }
            Err(err) => {
                counter!(METRIC_PREDICTIVE_RENDER, "result" => "failed").increment(1);
                debug!(block = %next.id, error = %err, "Speculative render failed");
                PredictiveStep::Failed
            }
        }
    }
}
