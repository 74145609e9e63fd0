use thiserror::Error;

/// Failures of the session and worker plumbing. Rendering problems never
/// surface here; they are reported per block through the sink.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to spawn render worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("preview session is closed")]
    SessionClosed,
    #[error("render worker stopped unexpectedly")]
    WorkerStopped,
}
