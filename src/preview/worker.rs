//! Dedicated rendering thread.

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, error, info, trace};

use super::blocks::block_index_at;
use super::error::PreviewError;
use super::orchestrator::{RenderOrchestrator, RenderOutcome};
use super::predictive::{PredictiveRenderer, PredictiveStep};
use super::version::{DocumentVersion, VersionClock};

const THREAD_NAME: &str = "anteprima-render";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Render {
        text: String,
        version: DocumentVersion,
    },
    CursorMoved {
        offset: usize,
    },
    /// Drop the block map, the cache and any speculative work.
    Reset,
    Shutdown,
}

/// Owns everything that renders. Commands always take priority over
/// speculative work, which only runs while the command queue is empty.
pub struct RenderWorker {
    orchestrator: RenderOrchestrator,
    predictive: PredictiveRenderer,
    clock: VersionClock,
    commands: UnboundedReceiver<WorkerCommand>,
    outcomes: UnboundedSender<RenderOutcome>,
}

impl RenderWorker {
    /// Start the worker thread. Outcomes arrive on the returned receiver in
    /// the order renders were requested.
    pub fn spawn(
        orchestrator: RenderOrchestrator,
        predictive: PredictiveRenderer,
        clock: VersionClock,
    ) -> Result<(WorkerHandle, UnboundedReceiver<RenderOutcome>), PreviewError> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let worker = RenderWorker {
            orchestrator,
            predictive,
            clock,
            commands: command_rx,
            outcomes: outcome_tx,
        };

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(PreviewError::WorkerSpawn)?;

        Ok((
            WorkerHandle {
                commands: command_tx,
                thread: Some(thread),
            },
            outcome_rx,
        ))
    }

    fn run(mut self) {
        debug!("Render worker started");
        loop {
            let command = if self.predictive.has_pending() {
                match self.commands.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Empty) => {
                        self.warm_next();
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match self.commands.blocking_recv() {
                    Some(command) => command,
                    None => break,
                }
            };

            if !self.handle(command) {
                break;
            }
        }
        debug!("Render worker stopped");
    }

    /// Returns false when the worker should stop.
    fn handle(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Render { text, version } => {
                let outcome = self.orchestrator.render(&text, version);
                if self.outcomes.send(outcome).is_err() {
                    info!(version, "Session gone; dropping render outcome");
                    return false;
                }
            }
            WorkerCommand::CursorMoved { offset } => self.on_cursor_moved(offset),
            WorkerCommand::Reset => {
                self.predictive.cancel();
                self.orchestrator.reset();
                debug!("Render worker reset");
            }
            WorkerCommand::Shutdown => return false,
        }
        true
    }

    fn on_cursor_moved(&mut self, offset: usize) {
        let Some(version) = self.orchestrator.last_version() else {
            return;
        };
        let blocks = self.orchestrator.blocks();
        let Some(index) = block_index_at(blocks, offset) else {
            return;
        };
        self.predictive
            .on_cursor_move(index, version, blocks, self.orchestrator.cache());
    }

    fn warm_next(&mut self) {
        let (renderer, cache) = self.orchestrator.warming_parts();
        let step = self.predictive.run_next(renderer, cache, &self.clock);
        if step != PredictiveStep::Idle {
            trace!(?step, "Predictive step");
        }
    }
}

/// Sending side of the worker's command queue.
pub struct WorkerHandle {
    commands: UnboundedSender<WorkerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, command: WorkerCommand) -> Result<(), PreviewError> {
        self.commands
            .send(command)
            .map_err(|_| PreviewError::WorkerStopped)
    }

    /// Ask the worker to stop after its current command and wait for the
    /// thread to exit.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        let Some(thread) = self.thread.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => error!("Render worker panicked"),
            Err(err) => error!(error = %err, "Failed to join render worker"),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(WorkerCommand::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::application::render::ComrakBlockRenderer;
    use crate::cache::{CacheConfig, ContentHash};
    use crate::preview::blocks::BlockSplitter;
    use crate::preview::orchestrator::RenderKind;

    fn spawn_worker(
        clock: &VersionClock,
    ) -> (WorkerHandle, UnboundedReceiver<RenderOutcome>) {
        let orchestrator = RenderOrchestrator::new(
            BlockSplitter::markdown(),
            Arc::new(ComrakBlockRenderer::new()),
            &CacheConfig::default(),
            0,
        );
        RenderWorker::spawn(orchestrator, PredictiveRenderer::new(2), clock.clone())
            .expect("spawn worker")
    }

    async fn next(outcomes: &mut UnboundedReceiver<RenderOutcome>) -> RenderOutcome {
        timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("worker should respond")
            .expect("worker alive")
    }

    #[tokio::test]
    async fn renders_in_request_order() {
        let clock = VersionClock::new();
        let (worker, mut outcomes) = spawn_worker(&clock);

        for text in ["one", "one\n\ntwo"] {
            let version = clock.advance();
            worker
                .send(WorkerCommand::Render {
                    text: text.to_string(),
                    version,
                })
                .expect("send render");
        }

        let first = next(&mut outcomes).await;
        let second = next(&mut outcomes).await;
        assert_eq!(first.version, 1);
        assert_eq!(first.metrics.render_kind, RenderKind::Full);
        assert_eq!(second.version, 2);
        assert_eq!(second.metrics.render_kind, RenderKind::Incremental);
        assert_eq!(second.metrics.cache_hits, 1);
        assert_eq!(second.html, "<p>one</p>\n<p>two</p>\n");

        worker.shutdown().await;
    }

    fn inline_worker(clock: &VersionClock, cache_max_blocks: usize) -> RenderWorker {
        let orchestrator = RenderOrchestrator::new(
            BlockSplitter::markdown(),
            Arc::new(ComrakBlockRenderer::new()),
            &CacheConfig { cache_max_blocks },
            0,
        );
        let (_commands_tx, commands) = mpsc::unbounded_channel();
        let (outcomes, _outcomes_rx) = mpsc::unbounded_channel();
        RenderWorker {
            orchestrator,
            predictive: PredictiveRenderer::new(2),
            clock: clock.clone(),
            commands,
            outcomes,
        }
    }

    #[test]
    fn cursor_move_warms_neighbouring_blocks() {
        let clock = VersionClock::new();
        let mut worker = inline_worker(&clock, 2);

        let version = clock.advance();
        worker.orchestrator.render("a\n\nb\n\nc", version);
        // Capacity 2 leaves "b" and "c" cached.
        assert!(!worker.orchestrator.cache().contains(&ContentHash::of("a")));

        worker.on_cursor_moved(6);
        assert_eq!(worker.predictive.pending(), 1);

        worker.warm_next();
        assert!(worker.orchestrator.cache().contains(&ContentHash::of("a")));
        assert!(!worker.predictive.has_pending());
    }

    #[test]
    fn edit_after_cursor_move_discards_speculation() {
        let clock = VersionClock::new();
        let mut worker = inline_worker(&clock, 2);

        let version = clock.advance();
        worker.orchestrator.render("a\n\nb\n\nc", version);
        worker.on_cursor_moved(6);
        clock.advance();

        worker.warm_next();
        assert!(!worker.orchestrator.cache().contains(&ContentHash::of("a")));
        assert!(!worker.predictive.has_pending());
    }

    #[test]
    fn cursor_move_before_first_render_is_ignored() {
        let clock = VersionClock::new();
        let mut worker = inline_worker(&clock, 2);
        worker.on_cursor_moved(0);
        assert!(!worker.predictive.has_pending());
    }

    #[test]
    fn reset_clears_cache_and_speculation() {
        let clock = VersionClock::new();
        let mut worker = inline_worker(&clock, 2);

        let version = clock.advance();
        worker.orchestrator.render("a\n\nb\n\nc", version);
        worker.on_cursor_moved(6);

        assert!(worker.handle(WorkerCommand::Reset));
        assert!(worker.orchestrator.cache().is_empty());
        assert!(!worker.predictive.has_pending());
        assert!(!worker.handle(WorkerCommand::Shutdown));
    }

    #[tokio::test]
    async fn dropping_outcome_receiver_stops_worker() {
        let clock = VersionClock::new();
        let (worker, outcomes) = spawn_worker(&clock);
        drop(outcomes);

        worker
            .send(WorkerCommand::Render {
                text: "x".to_string(),
                version: clock.advance(),
            })
            .expect("send render");
        worker.shutdown().await;
    }
}
