//! Preview engine tunables.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;

const DEFAULT_SMALL_DOC_THRESHOLD_CHARS: usize = 1_000;
const DEFAULT_LARGE_DOC_THRESHOLD_CHARS: usize = 10_000;
const DEFAULT_BASE_DELAY_SMALL_MS: u64 = 200;
const DEFAULT_BASE_DELAY_MEDIUM_MS: u64 = 400;
const DEFAULT_BASE_DELAY_LARGE_MS: u64 = 600;
const DEFAULT_MIN_DELAY_MS: u64 = 50;
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;
const DEFAULT_LOAD_MULTIPLIER_HIGH: f64 = 1.3;
const DEFAULT_LOAD_MULTIPLIER_VERY_HIGH: f64 = 1.6;
const DEFAULT_TYPING_WINDOW_KEYSTROKES: usize = 10;
const DEFAULT_FAST_TYPING_GAP_MS: u64 = 150;
const DEFAULT_PAUSED_TYPING_GAP_MS: u64 = 1_000;
const DEFAULT_FAST_TYPING_FACTOR: f64 = 1.5;
const DEFAULT_RENDER_HISTORY_LEN: usize = 5;
const DEFAULT_BACKPRESSURE_HEADROOM: f64 = 1.2;
const DEFAULT_PREDICTIVE_WINDOW_BLOCKS: usize = 2;
const DEFAULT_LOAD_SAMPLE_TTL_MS: u64 = 1_500;

/// Thresholds and tunables for the adaptive debouncer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Boundary between the "small" and "medium" delay tiers.
    pub small_doc_threshold_chars: usize,
    /// Boundary of the "large" delay tier; also switches on incremental renders.
    pub large_doc_threshold_chars: usize,
    pub base_delay_small_ms: u64,
    pub base_delay_medium_ms: u64,
    pub base_delay_large_ms: u64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub load_multiplier_high: f64,
    pub load_multiplier_very_high: f64,
    /// Keystrokes considered when measuring typing cadence.
    pub typing_window_keystrokes: usize,
    /// Mean gap below which the user counts as typing fast.
    pub fast_typing_gap_ms: u64,
    /// Mean gap above which the user counts as paused.
    pub paused_typing_gap_ms: u64,
    pub fast_typing_factor: f64,
    /// Completed renders averaged by the backpressure check.
    pub render_history_len: usize,
    /// Multiplier applied to the mean render time when it outruns the interval.
    pub backpressure_headroom: f64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            small_doc_threshold_chars: DEFAULT_SMALL_DOC_THRESHOLD_CHARS,
            large_doc_threshold_chars: DEFAULT_LARGE_DOC_THRESHOLD_CHARS,
            base_delay_small_ms: DEFAULT_BASE_DELAY_SMALL_MS,
            base_delay_medium_ms: DEFAULT_BASE_DELAY_MEDIUM_MS,
            base_delay_large_ms: DEFAULT_BASE_DELAY_LARGE_MS,
            min_delay_ms: DEFAULT_MIN_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            load_multiplier_high: DEFAULT_LOAD_MULTIPLIER_HIGH,
            load_multiplier_very_high: DEFAULT_LOAD_MULTIPLIER_VERY_HIGH,
            typing_window_keystrokes: DEFAULT_TYPING_WINDOW_KEYSTROKES,
            fast_typing_gap_ms: DEFAULT_FAST_TYPING_GAP_MS,
            paused_typing_gap_ms: DEFAULT_PAUSED_TYPING_GAP_MS,
            fast_typing_factor: DEFAULT_FAST_TYPING_FACTOR,
            render_history_len: DEFAULT_RENDER_HISTORY_LEN,
            backpressure_headroom: DEFAULT_BACKPRESSURE_HEADROOM,
        }
    }
}

/// Full configuration for one preview session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    #[serde(flatten)]
    pub debounce: DebounceConfig,
    #[serde(flatten)]
    pub cache: CacheConfig,
    /// Blocks before and after the cursor block that are pre-rendered.
    pub predictive_window_blocks: usize,
    /// How long a system load reading is reused.
    pub load_sample_ttl_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            cache: CacheConfig::default(),
            predictive_window_blocks: DEFAULT_PREDICTIVE_WINDOW_BLOCKS,
            load_sample_ttl_ms: DEFAULT_LOAD_SAMPLE_TTL_MS,
        }
    }
}

impl PreviewConfig {
    /// Documents at or above this size are eligible for incremental renders.
    pub fn incremental_threshold_chars(&self) -> usize {
        self.debounce.large_doc_threshold_chars
    }

    pub fn load_sample_ttl(&self) -> Duration {
        Duration::from_millis(self.load_sample_ttl_ms)
    }
}
