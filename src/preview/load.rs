//! Coarse system load sensing.
//!
//! Load sensing is best-effort: a failed OS query degrades to
//! [`LoadCategory::Medium`] and is never surfaced to callers.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::util::lock::mutex_lock;

const SOURCE: &str = "preview::load";

const LOW_CEILING_PERCENT: f32 = 30.0;
const MEDIUM_CEILING_PERCENT: f32 = 60.0;
const HIGH_CEILING_PERCENT: f32 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadCategory {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl LoadCategory {
    pub const ALL: [LoadCategory; 4] = [
        LoadCategory::Low,
        LoadCategory::Medium,
        LoadCategory::High,
        LoadCategory::VeryHigh,
    ];

    /// Bucket a CPU utilisation percentage.
    pub fn from_cpu_percent(percent: f32) -> Self {
        if percent < LOW_CEILING_PERCENT {
            LoadCategory::Low
        } else if percent < MEDIUM_CEILING_PERCENT {
            LoadCategory::Medium
        } else if percent < HIGH_CEILING_PERCENT {
            LoadCategory::High
        } else {
            LoadCategory::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadCategory::Low => "low",
            LoadCategory::Medium => "medium",
            LoadCategory::High => "high",
            LoadCategory::VeryHigh => "very_high",
        }
    }
}

impl fmt::Display for LoadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LoadProbeError {
    #[error("load sensing is not supported on this platform")]
    Unsupported,
    #[error("load reading is not a finite percentage: {0}")]
    InvalidReading(f32),
    #[error("load probe failed: {0}")]
    Probe(String),
}

/// Source of raw CPU utilisation readings (0 to 100).
pub trait LoadProbe: Send + Sync {
    fn cpu_percent(&self) -> Result<f32, LoadProbeError>;
}

impl<P: LoadProbe + ?Sized> LoadProbe for Arc<P> {
    fn cpu_percent(&self) -> Result<f32, LoadProbeError> {
        (**self).cpu_percent()
    }
}

/// Probe that always reports the same reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoad(pub f32);

impl FixedLoad {
    /// A probe whose reading falls into the given category.
    pub fn category(category: LoadCategory) -> Self {
        match category {
            LoadCategory::Low => Self(0.0),
            LoadCategory::Medium => Self(LOW_CEILING_PERCENT),
            LoadCategory::High => Self(MEDIUM_CEILING_PERCENT),
            LoadCategory::VeryHigh => Self(100.0),
        }
    }
}

impl LoadProbe for FixedLoad {
    fn cpu_percent(&self) -> Result<f32, LoadProbeError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedReading {
    taken_at: Instant,
    category: LoadCategory,
}

/// Samples the probe at most once per TTL window.
///
/// The probe is queried while the reading lock is held, so concurrent callers
/// inside one window observe the same category.
pub struct SystemLoadMonitor {
    probe: Box<dyn LoadProbe>,
    ttl: Duration,
    last: Mutex<Option<CachedReading>>,
}

impl SystemLoadMonitor {
    pub fn new(probe: impl LoadProbe + 'static, ttl: Duration) -> Self {
        Self {
            probe: Box::new(probe),
            ttl,
            last: Mutex::new(None),
        }
    }

    pub fn sample(&self) -> LoadCategory {
        self.sample_at(Instant::now())
    }

    fn sample_at(&self, now: Instant) -> LoadCategory {
        let mut last = mutex_lock(&self.last, SOURCE, "sample");

        if let Some(reading) = *last {
            if now.saturating_duration_since(reading.taken_at) < self.ttl {
                return reading.category;
            }
        }

        let category = match self.probe.cpu_percent() {
            Ok(percent) if percent.is_finite() => LoadCategory::from_cpu_percent(percent),
            Ok(percent) => {
                warn!(
                    error = %LoadProbeError::InvalidReading(percent),
                    fallback = %LoadCategory::Medium,
                    "Load sensing failed"
                );
                LoadCategory::Medium
            }
            Err(err) => {
                warn!(error = %err, fallback = %LoadCategory::Medium, "Load sensing failed");
                LoadCategory::Medium
            }
        };

        debug!(load = %category, "Sampled system load");
        *last = Some(CachedReading {
            taken_at: now,
            category,
        });
        category
    }
}
