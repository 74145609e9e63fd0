//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::str::FromStr;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::preview::{DebounceConfig, PreviewConfig};

mod cli;

pub use cli::{CliArgs, Command, PreviewOverrides, RenderArgs, WatchArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "anteprima";
const ENV_PREFIX: &str = "ANTEPRIMA";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    preview: RawPreviewSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreviewSettings {
    small_doc_threshold_chars: Option<usize>,
    large_doc_threshold_chars: Option<usize>,
    base_delay_small_ms: Option<u64>,
    base_delay_medium_ms: Option<u64>,
    base_delay_large_ms: Option<u64>,
    min_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    load_multiplier_high: Option<f64>,
    load_multiplier_very_high: Option<f64>,
    typing_window_keystrokes: Option<usize>,
    fast_typing_gap_ms: Option<u64>,
    paused_typing_gap_ms: Option<u64>,
    fast_typing_factor: Option<f64>,
    render_history_len: Option<usize>,
    backpressure_headroom: Option<f64>,
    cache_max_blocks: Option<usize>,
    predictive_window_blocks: Option<usize>,
    load_sample_ttl_ms: Option<u64>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &PreviewOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.cache_max_blocks {
            self.preview.cache_max_blocks = Some(max);
        }
        if let Some(min) = overrides.min_delay_ms {
            self.preview.min_delay_ms = Some(min);
        }
        if let Some(max) = overrides.max_delay_ms {
            self.preview.max_delay_ms = Some(max);
        }
        if let Some(threshold) = overrides.large_doc_threshold_chars {
            self.preview.large_doc_threshold_chars = Some(threshold);
        }
        if let Some(window) = overrides.predictive_window_blocks {
            self.preview.predictive_window_blocks = Some(window);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, preview } = raw;

        let logging = build_logging_settings(logging)?;
        let preview = build_preview_settings(preview)?;

        Ok(Self { logging, preview })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_preview_settings(preview: RawPreviewSettings) -> Result<PreviewConfig, LoadError> {
    let defaults = PreviewConfig::default();
    let d = &defaults.debounce;

    let debounce = DebounceConfig {
        small_doc_threshold_chars: preview
            .small_doc_threshold_chars
            .unwrap_or(d.small_doc_threshold_chars),
        large_doc_threshold_chars: preview
            .large_doc_threshold_chars
            .unwrap_or(d.large_doc_threshold_chars),
        base_delay_small_ms: positive_u64(
            preview.base_delay_small_ms.unwrap_or(d.base_delay_small_ms),
            "preview.base_delay_small_ms",
        )?,
        base_delay_medium_ms: positive_u64(
            preview.base_delay_medium_ms.unwrap_or(d.base_delay_medium_ms),
            "preview.base_delay_medium_ms",
        )?,
        base_delay_large_ms: positive_u64(
            preview.base_delay_large_ms.unwrap_or(d.base_delay_large_ms),
            "preview.base_delay_large_ms",
        )?,
        min_delay_ms: preview.min_delay_ms.unwrap_or(d.min_delay_ms),
        max_delay_ms: positive_u64(
            preview.max_delay_ms.unwrap_or(d.max_delay_ms),
            "preview.max_delay_ms",
        )?,
        load_multiplier_high: multiplier(
            preview.load_multiplier_high.unwrap_or(d.load_multiplier_high),
            "preview.load_multiplier_high",
        )?,
        load_multiplier_very_high: multiplier(
            preview
                .load_multiplier_very_high
                .unwrap_or(d.load_multiplier_very_high),
            "preview.load_multiplier_very_high",
        )?,
        typing_window_keystrokes: preview
            .typing_window_keystrokes
            .unwrap_or(d.typing_window_keystrokes),
        fast_typing_gap_ms: preview.fast_typing_gap_ms.unwrap_or(d.fast_typing_gap_ms),
        paused_typing_gap_ms: preview
            .paused_typing_gap_ms
            .unwrap_or(d.paused_typing_gap_ms),
        fast_typing_factor: multiplier(
            preview.fast_typing_factor.unwrap_or(d.fast_typing_factor),
            "preview.fast_typing_factor",
        )?,
        render_history_len: positive_usize(
            preview.render_history_len.unwrap_or(d.render_history_len),
            "preview.render_history_len",
        )?,
        backpressure_headroom: multiplier(
            preview
                .backpressure_headroom
                .unwrap_or(d.backpressure_headroom),
            "preview.backpressure_headroom",
        )?,
    };

    if debounce.small_doc_threshold_chars >= debounce.large_doc_threshold_chars {
        return Err(LoadError::invalid(
            "preview.small_doc_threshold_chars",
            "must be smaller than large_doc_threshold_chars",
        ));
    }
    if debounce.min_delay_ms > debounce.max_delay_ms {
        return Err(LoadError::invalid(
            "preview.min_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }
    if debounce.load_multiplier_high > debounce.load_multiplier_very_high {
        return Err(LoadError::invalid(
            "preview.load_multiplier_high",
            "must not exceed load_multiplier_very_high",
        ));
    }
    if debounce.typing_window_keystrokes < 2 {
        return Err(LoadError::invalid(
            "preview.typing_window_keystrokes",
            "must be at least 2",
        ));
    }
    if debounce.fast_typing_gap_ms >= debounce.paused_typing_gap_ms {
        return Err(LoadError::invalid(
            "preview.fast_typing_gap_ms",
            "must be smaller than paused_typing_gap_ms",
        ));
    }

    let cache = CacheConfig {
        cache_max_blocks: positive_usize(
            preview
                .cache_max_blocks
                .unwrap_or(defaults.cache.cache_max_blocks),
            "preview.cache_max_blocks",
        )?,
    };

    Ok(PreviewConfig {
        debounce,
        cache,
        predictive_window_blocks: preview
            .predictive_window_blocks
            .unwrap_or(defaults.predictive_window_blocks),
        load_sample_ttl_ms: preview
            .load_sample_ttl_ms
            .unwrap_or(defaults.load_sample_ttl_ms),
    })
}

fn positive_u64(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

fn positive_usize(value: usize, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

fn multiplier(value: f64, key: &'static str) -> Result<f64, LoadError> {
    if !value.is_finite() || value < 1.0 {
        return Err(LoadError::invalid(key, "must be a finite value of at least 1.0"));
    }
    Ok(value)
}
