//! Document versions and the stale-result gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tracing::info;

const METRIC_RENDER_STALE: &str = "anteprima_render_stale_total";

/// Monotonic counter stamped on every edit.
pub type DocumentVersion = u64;

/// Latest document version, written by the session and read by the worker.
#[derive(Debug, Clone, Default)]
pub struct VersionClock {
    latest: Arc<AtomicU64>,
}

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a new edit and return its version.
    pub fn advance(&self) -> DocumentVersion {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> DocumentVersion {
        self.latest.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Apply,
    DropStale {
        version: DocumentVersion,
        latest: DocumentVersion,
    },
}

/// Admits a result only if it carries the latest known version and nothing
/// newer has been applied.
#[derive(Debug, Clone, Default)]
pub struct VersionGate {
    latest: DocumentVersion,
    applied: Option<DocumentVersion>,
}

impl VersionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `version` exists. Older versions are ignored.
    pub fn observe(&mut self, version: DocumentVersion) {
        self.latest = self.latest.max(version);
    }

    pub fn latest(&self) -> DocumentVersion {
        self.latest
    }

    pub fn applied(&self) -> Option<DocumentVersion> {
        self.applied
    }

    pub fn admit(&mut self, version: DocumentVersion) -> GateDecision {
        let newer_than_applied = self.applied.is_none_or(|applied| version > applied);

        if version == self.latest && newer_than_applied {
            self.applied = Some(version);
            GateDecision::Apply
        } else {
            info!(
                version,
                latest = self.latest,
                applied = ?self.applied,
                result = "dropped-stale",
                "Discarded stale render result"
            );
            counter!(METRIC_RENDER_STALE).increment(1);
            GateDecision::DropStale {
                version,
                latest: self.latest,
            }
        }
    }
}
