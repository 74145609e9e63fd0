//! Adaptive incremental preview engine.
//!
//! A [`PreviewSession`] receives edits and cursor moves through a
//! [`PreviewHandle`], waits an adaptive debounce interval, and asks the
//! render worker for HTML. The worker splits the document into
//! content-addressed blocks, reuses cached fragments for blocks that did not
//! change, and pre-renders blocks around the cursor while idle. Results that
//! were overtaken by a newer edit are dropped before they reach the
//! [`PreviewSink`].
//!
//! ## Configuration
//!
//! ```toml
//! [preview]
//! small_doc_threshold_chars = 1000
//! large_doc_threshold_chars = 10000
//! base_delay_small_ms = 200
//! min_delay_ms = 50
//! max_delay_ms = 2000
//! cache_max_blocks = 250
//! predictive_window_blocks = 2
//! ```

mod blocks;
mod config;
mod debounce;
mod error;
mod load;
mod orchestrator;
mod predictive;
mod scheduler;
mod session;
mod version;
mod worker;

pub use blocks::{Block, BlockSplitter, BoundaryRule, MarkdownBoundaries, block_index_at};
pub use config::{DebounceConfig, PreviewConfig};
pub use debounce::{
    AdaptiveDebouncer, CompletionAction, DebounceMachine, DebouncePhase, DebounceState,
    EditAction,
};
pub use error::PreviewError;
pub use load::{FixedLoad, LoadCategory, LoadProbe, LoadProbeError, SystemLoadMonitor};
pub use orchestrator::{
    BlockFailure, RenderFailureReport, RenderKind, RenderMetrics, RenderOrchestrator,
    RenderOutcome, RenderResult, fallback_fragment,
};
pub use predictive::{PredictiveRenderer, PredictiveStep};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle};
pub use session::{PreviewEvent, PreviewHandle, PreviewServices, PreviewSession, PreviewSink};
pub use version::{DocumentVersion, GateDecision, VersionClock, VersionGate};
pub use worker::{RenderWorker, WorkerCommand, WorkerHandle};
