//! UI-side preview session.
//!
//! The session is a tokio task that stamps every edit with a version, decides
//! when to render through the adaptive debouncer, and delivers only results
//! that are still current. Rendering itself happens on the worker thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::application::render::{BlockRenderer, block_renderer};
use crate::infra::load::SysinfoProbe;
use crate::infra::scheduler::TokioScheduler;

use super::blocks::BlockSplitter;
use super::config::PreviewConfig;
use super::debounce::{AdaptiveDebouncer, CompletionAction, DebounceMachine, DebounceState, EditAction};
use super::error::PreviewError;
use super::load::{LoadProbe, SystemLoadMonitor};
use super::orchestrator::{RenderFailureReport, RenderOrchestrator, RenderOutcome, RenderResult};
use super::predictive::PredictiveRenderer;
use super::scheduler::{Scheduler, TimerHandle};
use super::version::{DocumentVersion, GateDecision, VersionClock, VersionGate};
use super::worker::{RenderWorker, WorkerCommand, WorkerHandle};

/// Receives what the session produces for display.
pub trait PreviewSink: Send + 'static {
    fn on_result(&mut self, result: RenderResult);

    fn on_render_failures(&mut self, report: RenderFailureReport) {
        let _ = report;
    }
}

/// Sink payload for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    Rendered(RenderResult),
    RenderFailures(RenderFailureReport),
}

impl PreviewSink for UnboundedSender<PreviewEvent> {
    fn on_result(&mut self, result: RenderResult) {
        if self.send(PreviewEvent::Rendered(result)).is_err() {
            debug!("Preview event receiver dropped");
        }
    }

    fn on_render_failures(&mut self, report: RenderFailureReport) {
        if self.send(PreviewEvent::RenderFailures(report)).is_err() {
            debug!("Preview event receiver dropped");
        }
    }
}

/// Collaborators injected into a session.
pub struct PreviewServices {
    pub renderer: Arc<dyn BlockRenderer>,
    pub load: Arc<dyn LoadProbe>,
    pub scheduler: Arc<dyn Scheduler>,
    pub splitter: BlockSplitter,
}

impl PreviewServices {
    /// Comrak rendering, `sysinfo` load sensing and tokio timers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn system() -> Self {
        Self {
            renderer: block_renderer(),
            load: Arc::new(SysinfoProbe::new()),
            scheduler: Arc::new(TokioScheduler::current()),
            splitter: BlockSplitter::markdown(),
        }
    }
}

#[derive(Debug)]
enum SessionMessage {
    Edit { text: String },
    CursorMoved { offset: usize },
    ReplaceDocument { text: String },
    TimerFired { generation: u64 },
    Close { done: oneshot::Sender<()> },
}

/// Cloneable input side of a running session.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    messages: UnboundedSender<SessionMessage>,
}

impl PreviewHandle {
    /// The full document text after an edit.
    pub fn edit(&self, text: impl Into<String>) -> Result<(), PreviewError> {
        self.send(SessionMessage::Edit { text: text.into() })
    }

    /// Cursor byte offset into the latest text.
    pub fn move_cursor(&self, offset: usize) -> Result<(), PreviewError> {
        self.send(SessionMessage::CursorMoved { offset })
    }

    /// Load a different document, discarding cached blocks and history.
    pub fn replace_document(&self, text: impl Into<String>) -> Result<(), PreviewError> {
        self.send(SessionMessage::ReplaceDocument { text: text.into() })
    }

    /// Stop the session and its worker, waiting for both to finish.
    pub async fn close(self) -> Result<(), PreviewError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(SessionMessage::Close { done: done_tx })?;
        done_rx.await.map_err(|_| PreviewError::SessionClosed)
    }

    fn send(&self, message: SessionMessage) -> Result<(), PreviewError> {
        self.messages
            .send(message)
            .map_err(|_| PreviewError::SessionClosed)
    }
}

pub struct PreviewSession<S: PreviewSink> {
    debouncer: AdaptiveDebouncer,
    state: DebounceState,
    machine: DebounceMachine,
    gate: VersionGate,
    clock: VersionClock,
    load: SystemLoadMonitor,
    scheduler: Arc<dyn Scheduler>,
    timer: Option<TimerHandle>,
    timer_generation: u64,
    self_tx: WeakUnboundedSender<SessionMessage>,
    text: String,
    version: DocumentVersion,
    dispatched: Option<DocumentVersion>,
    worker: WorkerHandle,
    sink: S,
}

impl<S: PreviewSink> PreviewSession<S> {
    /// Start the worker thread and the session task.
    ///
    /// Must be called from within a tokio runtime. The session ends when
    /// [`PreviewHandle::close`] is called or every handle is dropped.
    pub fn spawn(
        config: PreviewConfig,
        services: PreviewServices,
        sink: S,
    ) -> Result<PreviewHandle, PreviewError> {
        let clock = VersionClock::new();
        let orchestrator = RenderOrchestrator::new(
            services.splitter,
            services.renderer,
            &config.cache,
            config.incremental_threshold_chars(),
        );
        let predictive = PredictiveRenderer::new(config.predictive_window_blocks);
        let (worker, outcomes) = RenderWorker::spawn(orchestrator, predictive, clock.clone())?;

        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let session = PreviewSession {
            state: DebounceState::new(&config.debounce),
            debouncer: AdaptiveDebouncer::new(config.debounce.clone()),
            machine: DebounceMachine::new(),
            gate: VersionGate::new(),
            clock,
            load: SystemLoadMonitor::new(services.load, config.load_sample_ttl()),
            scheduler: services.scheduler,
            timer: None,
            timer_generation: 0,
            self_tx: messages_tx.downgrade(),
            text: String::new(),
            version: 0,
            dispatched: None,
            worker,
            sink,
        };

        tokio::spawn(session.run(messages_rx, outcomes));
        Ok(PreviewHandle {
            messages: messages_tx,
        })
    }

    async fn run(
        mut self,
        mut messages: UnboundedReceiver<SessionMessage>,
        mut outcomes: UnboundedReceiver<RenderOutcome>,
    ) {
        debug!("Preview session started");
        let mut closed = None;

        loop {
            tokio::select! {
                // Edits are stamped before any queued result is judged.
                biased;

                message = messages.recv() => match message {
                    Some(SessionMessage::Close { done }) => {
                        closed = Some(done);
                        break;
                    }
                    Some(message) => {
                        if let Err(err) = self.on_message(message) {
                            error!(error = %err, "Preview session stopping");
                            break;
                        }
                    }
                    None => break,
                },
                outcome = outcomes.recv() => match outcome {
                    Some(outcome) => {
                        if let Err(err) = self.on_outcome(outcome) {
                            error!(error = %err, "Preview session stopping");
                            break;
                        }
                    }
                    None => {
                        error!(error = %PreviewError::WorkerStopped, "Preview session stopping");
                        break;
                    }
                },
            }
        }

        self.cancel_timer();
        drop(messages);
        drop(outcomes);
        self.worker.shutdown().await;
        info!(
            latest = self.version,
            applied = ?self.gate.applied(),
            "Preview session closed"
        );
        if let Some(done) = closed {
            let _ = done.send(());
        }
    }

    fn on_message(&mut self, message: SessionMessage) -> Result<(), PreviewError> {
        match message {
            SessionMessage::Edit { text } => {
                self.state.record_keystroke(Instant::now());
                self.on_edit(text)
            }
            SessionMessage::CursorMoved { offset } => {
                self.worker.send(WorkerCommand::CursorMoved { offset })
            }
            SessionMessage::ReplaceDocument { text } => self.replace_document(text),
            SessionMessage::TimerFired { generation } => self.on_timer_fired(generation),
            SessionMessage::Close { .. } => Ok(()),
        }
    }

    fn on_edit(&mut self, text: String) -> Result<(), PreviewError> {
        self.text = text;
        self.version = self.clock.advance();
        self.gate.observe(self.version);

        match self.machine.on_edit() {
            EditAction::ArmTimer => self.arm_timer(),
            EditAction::RestartTimer => {
                self.cancel_timer();
                self.arm_timer();
            }
            EditAction::Coalesced => {
                debug!(version = self.version, "Edit coalesced into trailing render");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, text), fields(doc_bytes = text.len()))]
    fn replace_document(&mut self, text: String) -> Result<(), PreviewError> {
        self.cancel_timer();
        self.machine.reset();
        self.state.reset(self.debouncer.config());
        self.dispatched = None;
        self.worker.send(WorkerCommand::Reset)?;
        info!("Document replaced");
        self.on_edit(text)
    }

    fn arm_timer(&mut self) {
        let load = self.load.sample();
        let doc_size_chars = self.text.chars().count();
        let interval_ms = self
            .debouncer
            .next_interval(doc_size_chars, load, &mut self.state);

        self.timer_generation += 1;
        let generation = self.timer_generation;
        let session = self.self_tx.clone();
        let handle = self.scheduler.schedule(
            Duration::from_millis(interval_ms),
            Box::new(move || {
                if let Some(session) = session.upgrade() {
                    let _ = session.send(SessionMessage::TimerFired { generation });
                }
            }),
        );

        debug!(
            version = self.version,
            interval_ms,
            load = %load,
            doc_size_chars,
            timer = %handle,
            "Render scheduled"
        );
        self.timer = Some(handle);
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn on_timer_fired(&mut self, generation: u64) -> Result<(), PreviewError> {
        if generation != self.timer_generation {
            return Ok(());
        }
        self.timer = None;
        if self.machine.on_timer_fired() {
            self.dispatch()?;
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), PreviewError> {
        self.dispatched = Some(self.version);
        debug!(version = self.version, "Dispatching render");
        self.worker.send(WorkerCommand::Render {
            text: self.text.clone(),
            version: self.version,
        })
    }

    fn on_outcome(&mut self, outcome: RenderOutcome) -> Result<(), PreviewError> {
        let version = outcome.version;
        self.state
            .record_render(Duration::from_secs_f64(outcome.metrics.duration_ms / 1000.0));

        let (result, failures) = outcome.into_parts();
        if self.gate.admit(version) == GateDecision::Apply {
            debug!(
                version,
                kind = %result.metrics.render_kind,
                cache_hits = result.metrics.cache_hits,
                cache_misses = result.metrics.cache_misses,
                duration_ms = result.metrics.duration_ms,
                "Render applied"
            );
            self.sink.on_result(result);
            if let Some(report) = failures {
                self.sink.on_render_failures(report);
            }
        }

        if self.dispatched != Some(version) {
            return Ok(());
        }
        self.dispatched = None;

        match self.machine.on_render_complete() {
            CompletionAction::RenderAgain => self.dispatch(),
            CompletionAction::Idle => {
                if self.version != version {
                    warn!(
                        version,
                        latest = self.version,
                        "Session idle behind latest edit"
                    );
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::time::timeout;

    use super::*;
    use crate::application::render::RenderError;
    use crate::preview::load::FixedLoad;
    use crate::preview::scheduler::TimerCallback;

    /// Holds timers until the test fires them.
    #[derive(Default)]
    struct ManualScheduler {
        next_id: AtomicU64,
        timers: Mutex<Vec<(TimerHandle, Duration, TimerCallback)>>,
    }

    impl ManualScheduler {
        fn armed(&self) -> Vec<Duration> {
            self.timers
                .lock()
                .expect("timers lock")
                .iter()
                .map(|(_, delay, _)| *delay)
                .collect()
        }

        fn fire_all(&self) {
            let timers = std::mem::take(&mut *self.timers.lock().expect("timers lock"));
            for (_, _, callback) in timers {
                callback();
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
            let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.timers
                .lock()
                .expect("timers lock")
                .push((handle, delay, callback));
            handle
        }

        fn cancel(&self, handle: TimerHandle) {
            self.timers
                .lock()
                .expect("timers lock")
                .retain(|(armed, _, _)| *armed != handle);
        }
    }

    /// Blocks every render until the test releases it.
    struct Gated {
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl BlockRenderer for Gated {
        fn render_block(&self, markdown: &str) -> Result<String, RenderError> {
            let _ = self.release.lock().expect("release lock").recv();
            Ok(format!("<p>{markdown}</p>\n"))
        }
    }

    struct Plain;

    impl BlockRenderer for Plain {
        fn render_block(&self, markdown: &str) -> Result<String, RenderError> {
            if markdown.starts_with("bad") {
                return Err(RenderError::markdown("rejected"));
            }
            Ok(format!("<p>{markdown}</p>\n"))
        }
    }

    fn services(renderer: Arc<dyn BlockRenderer>, scheduler: Arc<ManualScheduler>) -> PreviewServices {
        PreviewServices {
            renderer,
            load: Arc::new(FixedLoad(0.0)),
            scheduler,
            splitter: BlockSplitter::markdown(),
        }
    }

    async fn wait_for_timers(scheduler: &ManualScheduler, count: usize) {
        timeout(Duration::from_secs(5), async {
            while scheduler.armed().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timer should be armed");
    }

    async fn next_event(events: &mut UnboundedReceiver<PreviewEvent>) -> PreviewEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event should arrive")
            .expect("session alive")
    }

    async fn assert_quiet(events: &mut UnboundedReceiver<PreviewEvent>) {
        let extra = timeout(Duration::from_millis(100), events.recv()).await;
        assert!(extra.is_err(), "unexpected event: {extra:?}");
    }

    #[tokio::test]
    async fn rapid_edits_restart_one_timer() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(Arc::new(Plain), Arc::clone(&scheduler)),
            events_tx,
        )
        .expect("spawn session");

        handle.edit("h").expect("edit");
        handle.edit("he").expect("edit");
        handle.edit("hey").expect("edit");

        // Wait until the third edit re-armed the timer.
        timeout(Duration::from_secs(5), async {
            while scheduler.next_id.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("three timers armed");
        assert_eq!(scheduler.armed().len(), 1);

        scheduler.fire_all();
        match next_event(&mut events).await {
            PreviewEvent::Rendered(result) => {
                assert_eq!(result.version, 3);
                assert_eq!(result.html, "<p>hey</p>\n");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_quiet(&mut events).await;

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn first_interval_follows_document_size() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(Arc::new(Plain), Arc::clone(&scheduler)),
            events_tx,
        )
        .expect("spawn session");

        handle.edit("x".repeat(500)).expect("edit");
        wait_for_timers(&scheduler, 1).await;
        assert_eq!(scheduler.armed(), [Duration::from_millis(200)]);

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn edits_during_render_coalesce_into_one_trailing_render() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let renderer = Arc::new(Gated {
            release: Mutex::new(release_rx),
        });
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(renderer, Arc::clone(&scheduler)),
            events_tx,
        )
        .expect("spawn session");

        handle.edit("a").expect("edit");
        wait_for_timers(&scheduler, 1).await;
        scheduler.fire_all();

        handle.edit("ab").expect("edit");
        handle.edit("abc").expect("edit");
        release_tx.send(()).expect("release first render");
        release_tx.send(()).expect("release trailing render");

        match next_event(&mut events).await {
            PreviewEvent::Rendered(result) => {
                assert_eq!(result.version, 3);
                assert_eq!(result.html, "<p>abc</p>\n");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_quiet(&mut events).await;
        assert!(scheduler.armed().is_empty());

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn block_failures_are_reported_after_result() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(Arc::new(Plain), Arc::clone(&scheduler)),
            events_tx,
        )
        .expect("spawn session");

        handle.edit("ok\n\nbad <b>").expect("edit");
        wait_for_timers(&scheduler, 1).await;
        scheduler.fire_all();

        match next_event(&mut events).await {
            PreviewEvent::Rendered(result) => {
                assert!(result.html.contains("render-fallback"));
                assert!(result.html.contains("&lt;b&gt;"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut events).await {
            PreviewEvent::RenderFailures(report) => {
                assert_eq!(report.version, 1);
                assert_eq!(report.failures.len(), 1);
                assert_eq!(report.failures[0].block_index, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn replace_document_resets_and_renders_new_text() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(Arc::new(Plain), Arc::clone(&scheduler)),
            events_tx,
        )
        .expect("spawn session");

        handle.edit("draft").expect("edit");
        wait_for_timers(&scheduler, 1).await;
        handle.replace_document("fresh").expect("replace");

        timeout(Duration::from_secs(5), async {
            while scheduler.next_id.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("timer re-armed");
        assert_eq!(scheduler.armed().len(), 1);

        scheduler.fire_all();
        match next_event(&mut events).await {
            PreviewEvent::Rendered(result) => {
                assert_eq!(result.version, 2);
                assert_eq!(result.html, "<p>fresh</p>\n");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn closed_session_rejects_input() {
        let scheduler = Arc::new(ManualScheduler::default());
        let (events_tx, _events) = mpsc::unbounded_channel();
        let handle = PreviewSession::spawn(
            PreviewConfig::default(),
            services(Arc::new(Plain), scheduler),
            events_tx,
        )
        .expect("spawn session");

        let other = handle.clone();
        handle.close().await.expect("close");

        assert!(matches!(other.edit("late"), Err(PreviewError::SessionClosed)));
    }
}
