//! Adaptive debounce interval and the per-session render state machine.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::config::DebounceConfig;
use super::load::LoadCategory;

/// Typing and render-time history for one open document.
#[derive(Debug, Clone)]
pub struct DebounceState {
    recent_render_durations: VecDeque<Duration>,
    recent_keystroke_times: VecDeque<Instant>,
    render_capacity: usize,
    keystroke_capacity: usize,
    current_interval_ms: u64,
}

impl DebounceState {
    pub fn new(config: &DebounceConfig) -> Self {
        let render_capacity = config.render_history_len.max(1);
        let keystroke_capacity = config.typing_window_keystrokes.max(2);
        Self {
            recent_render_durations: VecDeque::with_capacity(render_capacity),
            recent_keystroke_times: VecDeque::with_capacity(keystroke_capacity),
            render_capacity,
            keystroke_capacity,
            current_interval_ms: config.base_delay_small_ms,
        }
    }

    pub fn record_keystroke(&mut self, at: Instant) {
        if self.recent_keystroke_times.len() == self.keystroke_capacity {
            self.recent_keystroke_times.pop_front();
        }
        self.recent_keystroke_times.push_back(at);
    }

    pub fn record_render(&mut self, duration: Duration) {
        if self.recent_render_durations.len() == self.render_capacity {
            self.recent_render_durations.pop_front();
        }
        self.recent_render_durations.push_back(duration);
    }

    /// Forget all history, e.g. when a different document is loaded.
    pub fn reset(&mut self, config: &DebounceConfig) {
        *self = Self::new(config);
    }

    pub fn current_interval_ms(&self) -> u64 {
        self.current_interval_ms
    }

    pub fn keystroke_count(&self) -> usize {
        self.recent_keystroke_times.len()
    }

    pub fn render_count(&self) -> usize {
        self.recent_render_durations.len()
    }

    /// Mean gap between consecutive recorded keystrokes.
    fn mean_keystroke_gap_ms(&self) -> Option<f64> {
        let first = self.recent_keystroke_times.front()?;
        let last = self.recent_keystroke_times.back()?;
        let gaps = self.recent_keystroke_times.len().checked_sub(1)?;
        if gaps == 0 {
            return None;
        }
        let span = last.saturating_duration_since(*first);
        Some(span.as_secs_f64() * 1000.0 / gaps as f64)
    }

    fn mean_render_ms(&self) -> Option<f64> {
        if self.recent_render_durations.is_empty() {
            return None;
        }
        let total: Duration = self.recent_render_durations.iter().sum();
        Some(total.as_secs_f64() * 1000.0 / self.recent_render_durations.len() as f64)
    }
}

/// Computes how long to wait after an edit before rendering.
#[derive(Debug, Clone)]
pub struct AdaptiveDebouncer {
    config: DebounceConfig,
}

impl AdaptiveDebouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    /// Size-tier base interval, before load, cadence and feedback.
    pub fn base_interval_ms(&self, doc_size_chars: usize) -> u64 {
        if doc_size_chars < self.config.small_doc_threshold_chars {
            self.config.base_delay_small_ms
        } else if doc_size_chars < self.config.large_doc_threshold_chars {
            self.config.base_delay_medium_ms
        } else {
            self.config.base_delay_large_ms
        }
    }

    fn load_multiplier(&self, load: LoadCategory) -> f64 {
        match load {
            LoadCategory::Low | LoadCategory::Medium => 1.0,
            LoadCategory::High => self.config.load_multiplier_high,
            LoadCategory::VeryHigh => self.config.load_multiplier_very_high,
        }
    }

    /// Next debounce interval in milliseconds, also stored in `state`.
    pub fn next_interval(
        &self,
        doc_size_chars: usize,
        load: LoadCategory,
        state: &mut DebounceState,
    ) -> u64 {
        let base = self.base_interval_ms(doc_size_chars) as f64;
        let loaded = base * self.load_multiplier(load);

        let mut interval = match state.mean_keystroke_gap_ms() {
            Some(gap) if gap < self.config.fast_typing_gap_ms as f64 => {
                loaded * self.config.fast_typing_factor
            }
            Some(gap) if gap > self.config.paused_typing_gap_ms as f64 => {
                base + (loaded - base) / 2.0
            }
            _ => loaded,
        };

        // Never schedule faster than recent renders actually complete.
        if let Some(mean_render) = state.mean_render_ms() {
            interval = interval.max(mean_render * self.config.backpressure_headroom);
        }

        let interval_ms = (interval.round() as u64)
            .max(self.config.min_delay_ms)
            .min(self.config.max_delay_ms);

        state.current_interval_ms = interval_ms;
        interval_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebouncePhase {
    Idle,
    Pending,
    Rendering,
}

/// What the session should do in response to an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    /// Arm a fresh timer.
    ArmTimer,
    /// Cancel the pending timer and arm a new one.
    RestartTimer,
    /// A render is in flight; one trailing render has been requested.
    Coalesced,
}

/// What the session should do after a render completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    Idle,
    /// Dispatch the trailing render immediately.
    RenderAgain,
}

/// `Idle → Pending → Rendering → Idle`, with edits during a render coalesced
/// into a single trailing render.
#[derive(Debug, Clone)]
pub struct DebounceMachine {
    phase: DebouncePhase,
    render_again: bool,
}

impl DebounceMachine {
    pub fn new() -> Self {
        Self {
            phase: DebouncePhase::Idle,
            render_again: false,
        }
    }

    pub fn phase(&self) -> DebouncePhase {
        self.phase
    }

    pub fn render_again(&self) -> bool {
        self.render_again
    }

    pub fn on_edit(&mut self) -> EditAction {
        match self.phase {
            DebouncePhase::Idle => {
                self.phase = DebouncePhase::Pending;
                EditAction::ArmTimer
            }
            DebouncePhase::Pending => EditAction::RestartTimer,
            DebouncePhase::Rendering => {
                self.render_again = true;
                EditAction::Coalesced
            }
        }
    }

    /// Returns true when the timer firing should dispatch a render.
    pub fn on_timer_fired(&mut self) -> bool {
        if self.phase == DebouncePhase::Pending {
            self.phase = DebouncePhase::Rendering;
            true
        } else {
            false
        }
    }

    pub fn on_render_complete(&mut self) -> CompletionAction {
        if self.phase != DebouncePhase::Rendering {
            return CompletionAction::Idle;
        }

        if std::mem::take(&mut self.render_again) {
            CompletionAction::RenderAgain
        } else {
            self.phase = DebouncePhase::Idle;
            CompletionAction::Idle
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for DebounceMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debouncer() -> AdaptiveDebouncer {
        AdaptiveDebouncer::new(DebounceConfig::default())
    }

    fn fresh_state() -> DebounceState {
        DebounceState::new(&DebounceConfig::default())
    }

    #[test]
    fn small_document_low_load_uses_small_base() {
        let mut state = fresh_state();
        assert_eq!(
            debouncer().next_interval(500, LoadCategory::Low, &mut state),
            200
        );
        assert_eq!(state.current_interval_ms(), 200);
    }

    #[test]
    fn size_tiers_select_base() {
        let debouncer = debouncer();
        assert_eq!(debouncer.base_interval_ms(999), 200);
        assert_eq!(debouncer.base_interval_ms(1_000), 400);
        assert_eq!(debouncer.base_interval_ms(9_999), 400);
        assert_eq!(debouncer.base_interval_ms(10_000), 600);
    }

    #[test]
    fn load_scales_interval() {
        let debouncer = debouncer();
        let mut state = fresh_state();
        assert_eq!(debouncer.next_interval(5_000, LoadCategory::Medium, &mut state), 400);
        assert_eq!(debouncer.next_interval(5_000, LoadCategory::High, &mut state), 520);
        assert_eq!(debouncer.next_interval(5_000, LoadCategory::VeryHigh, &mut state), 640);
    }

    #[test]
    fn fast_typing_extends_interval() {
        let debouncer = debouncer();
        let mut state = fresh_state();
        let start = Instant::now();
        for i in 0..10 {
            state.record_keystroke(start + Duration::from_millis(i * 50));
        }

        let interval = debouncer.next_interval(500, LoadCategory::Low, &mut state);
        assert!(interval > debouncer.base_interval_ms(500));
        assert_eq!(interval, 300);
    }

    #[test]
    fn paused_typing_moves_back_toward_base() {
        let debouncer = debouncer();
        let mut state = fresh_state();
        let start = Instant::now();
        state.record_keystroke(start);
        state.record_keystroke(start + Duration::from_millis(3_000));

        // Loaded value 640 pulled halfway back to the 400 base.
        assert_eq!(
            debouncer.next_interval(5_000, LoadCategory::VeryHigh, &mut state),
            520
        );
    }

    #[test]
    fn slow_renders_raise_interval() {
        let debouncer = debouncer();
        let mut state = fresh_state();
        for _ in 0..5 {
            state.record_render(Duration::from_millis(500));
        }

        assert_eq!(debouncer.next_interval(500, LoadCategory::Low, &mut state), 600);
    }

    #[test]
    fn render_history_is_bounded() {
        let mut state = fresh_state();
        for _ in 0..5 {
            state.record_render(Duration::from_millis(1_000));
        }
        for _ in 0..5 {
            state.record_render(Duration::from_millis(10));
        }
        assert_eq!(state.render_count(), 5);
        assert_eq!(debouncer().next_interval(500, LoadCategory::Low, &mut state), 200);
    }

    #[test]
    fn keystroke_history_is_bounded() {
        let mut state = fresh_state();
        let start = Instant::now();
        for i in 0..50 {
            state.record_keystroke(start + Duration::from_millis(i * 10));
        }
        assert_eq!(state.keystroke_count(), 10);
    }

    #[test]
    fn interval_is_clamped() {
        let debouncer = debouncer();
        let mut state = fresh_state();
        for _ in 0..5 {
            state.record_render(Duration::from_secs(30));
        }
        assert_eq!(
            debouncer.next_interval(50_000, LoadCategory::VeryHigh, &mut state),
            2_000
        );

        let tiny = AdaptiveDebouncer::new(DebounceConfig {
            base_delay_small_ms: 1,
            ..DebounceConfig::default()
        });
        let mut state = fresh_state();
        assert_eq!(tiny.next_interval(10, LoadCategory::Low, &mut state), 50);
    }

    #[test]
    fn interval_always_within_bounds() {
        let debouncer = debouncer();
        let config = debouncer.config().clone();
        let start = Instant::now();

        for size in [0, 1, 999, 1_000, 5_000, 10_000, 1_000_000] {
            for load in LoadCategory::ALL {
                for gap_ms in [0_u64, 20, 400, 5_000] {
                    for render_ms in [0_u64, 100, 900, 10_000] {
                        let mut state = fresh_state();
                        for i in 0..10 {
                            state.record_keystroke(start + Duration::from_millis(i * gap_ms));
                        }
                        state.record_render(Duration::from_millis(render_ms));

                        let interval = debouncer.next_interval(size, load, &mut state);
                        assert!(
                            (config.min_delay_ms..=config.max_delay_ms).contains(&interval),
                            "size={size} load={load} gap={gap_ms} render={render_ms} -> {interval}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn very_high_load_never_faster_than_low() {
        let debouncer = debouncer();
        let start = Instant::now();

        for size in [10, 2_000, 20_000] {
            for gap_ms in [0_u64, 50, 400, 2_000] {
                for render_ms in [0_u64, 300, 700, 3_000] {
                    let build = || {
                        let mut state = fresh_state();
                        for i in 0..10 {
                            state.record_keystroke(start + Duration::from_millis(i * gap_ms));
                        }
                        state.record_render(Duration::from_millis(render_ms));
                        state
                    };

                    let low = debouncer.next_interval(size, LoadCategory::Low, &mut build());
                    let very_high =
                        debouncer.next_interval(size, LoadCategory::VeryHigh, &mut build());
                    assert!(very_high >= low, "size={size} gap={gap_ms} render={render_ms}");
                }
            }
        }
    }

    #[test]
    fn reset_clears_history() {
        let config = DebounceConfig::default();
        let mut state = DebounceState::new(&config);
        state.record_keystroke(Instant::now());
        state.record_render(Duration::from_millis(10));

        state.reset(&config);

        assert_eq!(state.keystroke_count(), 0);
        assert_eq!(state.render_count(), 0);
    }

    #[test]
    fn machine_walks_idle_pending_rendering_idle() {
        let mut machine = DebounceMachine::new();
        assert_eq!(machine.phase(), DebouncePhase::Idle);

        assert_eq!(machine.on_edit(), EditAction::ArmTimer);
        assert_eq!(machine.phase(), DebouncePhase::Pending);

        assert_eq!(machine.on_edit(), EditAction::RestartTimer);
        assert_eq!(machine.phase(), DebouncePhase::Pending);

        assert!(machine.on_timer_fired());
        assert_eq!(machine.phase(), DebouncePhase::Rendering);

        assert_eq!(machine.on_render_complete(), CompletionAction::Idle);
        assert_eq!(machine.phase(), DebouncePhase::Idle);
    }

    #[test]
    fn edits_during_render_coalesce_into_one_trailing_render() {
        let mut machine = DebounceMachine::new();
        machine.on_edit();
        machine.on_timer_fired();

        for _ in 0..5 {
            assert_eq!(machine.on_edit(), EditAction::Coalesced);
        }
        assert!(machine.render_again());

        assert_eq!(machine.on_render_complete(), CompletionAction::RenderAgain);
        assert_eq!(machine.phase(), DebouncePhase::Rendering);
        assert!(!machine.render_again());

        assert_eq!(machine.on_render_complete(), CompletionAction::Idle);
        assert_eq!(machine.phase(), DebouncePhase::Idle);
    }

    #[test]
    fn stray_timer_is_ignored() {
        let mut machine = DebounceMachine::new();
        assert!(!machine.on_timer_fired());
        assert_eq!(machine.phase(), DebouncePhase::Idle);
    }
}
