use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cross_mapping::QcSettings;
use crate::file_utils::FileManager;
use crate::media::ffmpeg::{SilenceSettings, ToolTimeouts};
use crate::providers::RetryPolicy;
use crate::retiming::{CpsTarget, RetimingPlan};
use crate::subtitle_processor::credit::{Credit, CreditDuration, DEFAULT_CREDIT_DURATION_MS, DEFAULT_CREDIT_GAP_MS};
use crate::translation::llm::BatchLimits;
use crate::translation::TranslationStyle;
use crate::validation::{ConstraintOverrides, ConstraintTable, FrameRate, TypographyRules};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Every section has serde defaults, so a partial `conf.json` loads.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Selects the minimum duration and gap rows of the constraint table
    #[serde(default)]
    pub frame_rate: FrameRate,

    /// Per-field overrides of the constraint table
    #[serde(default)]
    pub constraints: ConstraintOverrides,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub retiming: RetimingConfig,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub qc: QcConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub typography: TypographyConfig,

    #[serde(default)]
    pub sdh: SdhConfig,

    #[serde(default)]
    pub credit: CreditConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: Anthropic
    Anthropic,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::Anthropic => "Anthropic",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::Anthropic => "anthropic".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max concurrent requests per file
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Max subtitle chars per request
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        match provider_type {
            TranslationProvider::Ollama => Self {
                provider_type: "ollama".to_string(),
                model: default_ollama_model(),
                api_key: String::new(),
                endpoint: default_ollama_endpoint(),
                concurrent_requests: default_concurrent_requests(),
                max_chars_per_request: default_max_chars_per_request(),
                timeout_secs: default_timeout_secs(),
            },
            TranslationProvider::Anthropic => Self {
                provider_type: "anthropic".to_string(),
                model: default_anthropic_model(),
                api_key: String::new(),
                endpoint: default_anthropic_endpoint(),
                concurrent_requests: default_concurrent_requests(),
                max_chars_per_request: default_anthropic_max_chars_per_request(),
                timeout_secs: default_anthropic_timeout_secs(),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default = "default_available_providers")]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: default_available_providers(),
            common: TranslationCommonConfig::default(),
        }
    }
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum cues per request
    #[serde(default = "default_max_entries_per_request")]
    pub max_entries_per_request: usize,

    /// Preceding source lines shown as context
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Extra instructions appended to the system prompt
    #[serde(default)]
    pub notes: Option<String>,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
            max_entries_per_request: default_max_entries_per_request(),
            context_lines: default_context_lines(),
            notes: None,
        }
    }
}

/// Merge engine thresholds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MergeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Largest gap between cues that may still be merged
    #[serde(default = "default_merge_gap_ms")]
    pub gap_threshold_ms: u64,

    /// Longest merged cue
    #[serde(default = "default_merge_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gap_threshold_ms: default_merge_gap_ms(),
            max_duration_ms: default_merge_max_duration_ms(),
        }
    }
}

/// Re-timing thresholds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetimingConfig {
    /// Close gaps below `gap_threshold_ms` before extending for CPS
    #[serde(default = "default_true")]
    pub close_gaps: bool,

    #[serde(default = "default_close_gap_ms")]
    pub gap_threshold_ms: u64,

    /// Cues above this CPS get extended
    #[serde(default = "default_trigger_cps")]
    pub trigger_cps: f64,

    /// CPS extensions aim for
    #[serde(default = "default_target_cps")]
    pub target_cps: f64,

    /// Extend ends into detected speech (needs a media file)
    #[serde(default)]
    pub extend_to_speech: bool,

    #[serde(default = "default_max_speech_extension_ms")]
    pub max_speech_extension_ms: u64,
}

impl Default for RetimingConfig {
    fn default() -> Self {
        Self {
            close_gaps: true,
            gap_threshold_ms: default_close_gap_ms(),
            trigger_cps: default_trigger_cps(),
            target_cps: default_target_cps(),
            extend_to_speech: false,
            max_speech_extension_ms: default_max_speech_extension_ms(),
        }
    }
}

/// Timecode join tolerances
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MappingConfig {
    /// Draft-to-source start tolerance
    #[serde(default = "default_mapping_tolerance_ms")]
    pub tolerance_ms: u64,

    /// Nearest-cue fallback for the draft-to-source join
    #[serde(default = "default_mapping_fallback_ms")]
    pub fallback_ms: u64,

    /// Final-to-merge and merge-to-draft tolerance
    #[serde(default = "default_join_tolerance_ms")]
    pub join_tolerance_ms: u64,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: default_mapping_tolerance_ms(),
            fallback_ms: default_mapping_fallback_ms(),
            join_tolerance_ms: default_join_tolerance_ms(),
        }
    }
}

/// Timing QC thresholds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_speech_tolerance_ms")]
    pub speech_tolerance_ms: u64,

    #[serde(default = "default_boundary_threshold_ms")]
    pub boundary_threshold_ms: u64,

    #[serde(default = "default_search_range_ms")]
    pub search_range_ms: u64,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speech_tolerance_ms: default_speech_tolerance_ms(),
            boundary_threshold_ms: default_boundary_threshold_ms(),
            search_range_ms: default_search_range_ms(),
        }
    }
}

/// External media tool settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,

    #[serde(default = "default_audio_timeout_secs")]
    pub audio_timeout_secs: u64,

    /// silencedetect noise floor
    #[serde(default = "default_silence_noise_db")]
    pub silence_noise_db: f64,

    /// silencedetect minimum silence length
    #[serde(default = "default_silence_min_ms")]
    pub silence_min_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            probe_timeout_secs: default_probe_timeout_secs(),
            extract_timeout_secs: default_extract_timeout_secs(),
            audio_timeout_secs: default_audio_timeout_secs(),
            silence_noise_db: default_silence_noise_db(),
            silence_min_ms: default_silence_min_ms(),
        }
    }
}

impl MediaConfig {
    pub fn timeouts(&self) -> ToolTimeouts {
        ToolTimeouts {
            probe: Duration::from_secs(self.probe_timeout_secs),
            extract: Duration::from_secs(self.extract_timeout_secs),
            audio: Duration::from_secs(self.audio_timeout_secs),
        }
    }

    pub fn silence(&self) -> SilenceSettings {
        SilenceSettings {
            noise_db: self.silence_noise_db,
            min_silence_ms: self.silence_min_ms,
        }
    }
}

/// Decoded-audio cache
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to the user cache directory
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_cache_max_mb")]
    pub max_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_mb: default_cache_max_mb(),
        }
    }
}

/// Batch run settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchConfig {
    /// Files processed at the same time
    #[serde(default = "default_concurrent_files")]
    pub concurrent_files: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrent_files: default_concurrent_files(),
        }
    }
}

/// Text normalisation switches
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TypographyConfig {
    #[serde(default = "default_true")]
    pub normalize_ellipsis: bool,

    #[serde(default)]
    pub replace_forbidden_punctuation: bool,
}

impl Default for TypographyConfig {
    fn default() -> Self {
        Self {
            normalize_ellipsis: true,
            replace_forbidden_punctuation: false,
        }
    }
}

/// SDH stripping of the source before translation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SdhConfig {
    #[serde(default)]
    pub strip_source: bool,

    /// Keep music cues (♪, (music)) when stripping
    #[serde(default)]
    pub keep_music: bool,
}

/// Closing credit appended to every final file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CreditConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_credit_text")]
    pub text: String,

    /// Gap after the last cue
    #[serde(default = "default_credit_gap_ms")]
    pub gap_ms: u64,

    #[serde(default = "default_credit_duration_ms")]
    pub duration_ms: u64,

    /// Derive the duration from this reading speed instead of `duration_ms`
    #[serde(default)]
    pub cps: Option<f64>,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: default_credit_text(),
            gap_ms: default_credit_gap_ms(),
            duration_ms: default_credit_duration_ms(),
            cps: None,
        }
    }
}

impl CreditConfig {
    pub fn credit(&self) -> Credit {
        Credit {
            text: self.text.clone(),
            gap_ms: self.gap_ms,
            duration: match self.cps {
                Some(cps) => CreditDuration::ReadingSpeed(cps),
                None => CreditDuration::Fixed(self.duration_ms),
            },
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "nl".to_string()
}

fn default_concurrent_requests() -> usize {
    2
}

fn default_max_chars_per_request() -> usize {
    4000
}

fn default_anthropic_max_chars_per_request() -> usize {
    2500
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_anthropic_timeout_secs() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_entries_per_request() -> usize {
    40
}

fn default_context_lines() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_available_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(TranslationProvider::Ollama),
        ProviderConfig::new(TranslationProvider::Anthropic),
    ]
}

fn default_merge_gap_ms() -> u64 {
    1000
}

fn default_merge_max_duration_ms() -> u64 {
    7000
}

fn default_close_gap_ms() -> u64 {
    1000
}

fn default_trigger_cps() -> f64 {
    13.0
}

fn default_target_cps() -> f64 {
    12.5
}

fn default_max_speech_extension_ms() -> u64 {
    1000
}

fn default_mapping_tolerance_ms() -> u64 {
    500
}

fn default_mapping_fallback_ms() -> u64 {
    1000
}

fn default_join_tolerance_ms() -> u64 {
    50
}

fn default_speech_tolerance_ms() -> u64 {
    250
}

fn default_boundary_threshold_ms() -> u64 {
    500
}

fn default_search_range_ms() -> u64 {
    2000
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    60
}

fn default_extract_timeout_secs() -> u64 {
    120
}

fn default_audio_timeout_secs() -> u64 {
    600
}

fn default_silence_noise_db() -> f64 {
    -30.0
}

fn default_silence_min_ms() -> u64 {
    300
}

fn default_cache_max_mb() -> u64 {
    2048
}

fn default_concurrent_files() -> usize {
    2
}

fn default_credit_text() -> String {
    "Ondertiteling: cueforge".to_string()
}

fn default_credit_gap_ms() -> u64 {
    DEFAULT_CREDIT_GAP_MS
}

fn default_credit_duration_ms() -> u64 {
    DEFAULT_CREDIT_DURATION_MS
}

impl Config {
    /// Load `path`, writing the default configuration there when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            let config = Self::default();
            config.save(path)?;
            log::info!("Created default configuration at {:?}", path);
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid configuration file: {:?}", path))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        FileManager::write_atomic(path, json.as_bytes())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::get_language_name(&self.source_language)?;
        crate::language_utils::get_language_name(&self.target_language)?;

        let table = self.constraint_table();
        if !(table.cps_optimal <= table.cps_hard_limit && table.cps_hard_limit <= table.cps_emergency_max) {
            return Err(anyhow!(
                "CPS limits must be ordered: optimal {} <= hard {} <= emergency {}",
                table.cps_optimal,
                table.cps_hard_limit,
                table.cps_emergency_max
            ));
        }
        if table.max_chars_per_line == 0 || table.max_lines == 0 {
            return Err(anyhow!("Line limits must be positive"));
        }
        if table.min_duration_ms >= table.max_duration_ms {
            return Err(anyhow!(
                "Minimum duration {}ms must be below maximum duration {}ms",
                table.min_duration_ms,
                table.max_duration_ms
            ));
        }
        if self.merge.max_duration_ms > table.max_duration_ms {
            return Err(anyhow!(
                "Merge max duration {}ms exceeds the cue maximum {}ms",
                self.merge.max_duration_ms,
                table.max_duration_ms
            ));
        }
        if self.retiming.target_cps <= 0.0 || self.retiming.target_cps > self.retiming.trigger_cps {
            return Err(anyhow!(
                "Re-timing target CPS {} must be positive and not above the trigger {}",
                self.retiming.target_cps,
                self.retiming.trigger_cps
            ));
        }
        if self.mapping.fallback_ms < self.mapping.tolerance_ms {
            return Err(anyhow!("Mapping fallback must not be below the tolerance"));
        }
        if self.batch.concurrent_files == 0 {
            return Err(anyhow!("batch.concurrent_files must be at least 1"));
        }
        if self.credit.enabled {
            self.credit.credit().validate()?;
        }

        let provider = self
            .translation
            .get_active_provider_config()
            .ok_or_else(|| anyhow!("No configuration for provider {}", self.translation.provider))?;
        if !provider.endpoint.is_empty() {
            Url::parse(&provider.endpoint)
                .with_context(|| format!("Invalid endpoint for {}: {}", provider.provider_type, provider.endpoint))?;
        }
        if self.translation.provider == TranslationProvider::Anthropic && provider.api_key.is_empty() {
            return Err(anyhow!("Translation API key is required for Anthropic provider"));
        }

        Ok(())
    }

    /// Frame-rate table with the configured overrides applied
    pub fn constraint_table(&self) -> ConstraintTable {
        self.constraints.apply(ConstraintTable::for_frame_rate(self.frame_rate))
    }

    pub fn retiming_plan(&self) -> RetimingPlan {
        RetimingPlan {
            close_gaps: self.retiming.close_gaps,
            gap_threshold_ms: self.retiming.gap_threshold_ms,
            target: CpsTarget {
                trigger_cps: self.retiming.trigger_cps,
                target_cps: self.retiming.target_cps,
            },
            max_duration_ms: self.constraint_table().max_duration_ms,
        }
    }

    pub fn qc_settings(&self) -> QcSettings {
        QcSettings {
            speech_tolerance_ms: self.qc.speech_tolerance_ms,
            boundary_threshold_ms: self.qc.boundary_threshold_ms,
            search_range_ms: self.qc.search_range_ms,
        }
    }

    pub fn typography_rules(&self) -> TypographyRules {
        TypographyRules {
            normalize_ellipsis: self.typography.normalize_ellipsis,
            replace_forbidden_punctuation: self.typography.replace_forbidden_punctuation,
        }
    }

    pub fn translation_style(&self) -> TranslationStyle {
        let table = self.constraint_table();
        TranslationStyle {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            max_chars_per_line: table.max_chars_per_line,
            max_lines: table.max_lines,
            target_cps: self.retiming.target_cps,
            notes: self.translation.common.notes.clone(),
        }
    }

    /// Where cached artifacts live
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(crate::media::ArtifactCache::default_dir)
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            frame_rate: FrameRate::default(),
            constraints: ConstraintOverrides::default(),
            merge: MergeConfig::default(),
            retiming: RetimingConfig::default(),
            mapping: MappingConfig::default(),
            qc: QcConfig::default(),
            media: MediaConfig::default(),
            cache: CacheConfig::default(),
            translation: TranslationConfig::default(),
            batch: BatchConfig::default(),
            typography: TypographyConfig::default(),
            sdh: SdhConfig::default(),
            credit: CreditConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.common.retry_count,
            backoff_base_ms: self.common.retry_backoff_ms,
        }
    }

    pub fn batch_limits(&self) -> BatchLimits {
        let provider = self.get_active_provider_config();
        BatchLimits {
            max_entries: self.common.max_entries_per_request,
            max_chars: provider
                .map(|p| p.max_chars_per_request)
                .unwrap_or_else(default_max_chars_per_request),
            context_lines: self.common.context_lines,
            max_concurrent: provider
                .map(|p| p.concurrent_requests)
                .unwrap_or_else(default_concurrent_requests),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_shouldValidate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_withPartialFile_shouldFillDefaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf.json");
        std::fs::write(&path, r#"{"target_language":"de","merge":{"gap_threshold_ms":800}}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.target_language, "de");
        assert_eq!(config.merge.gap_threshold_ms, 800);
        assert_eq!(config.merge.max_duration_ms, 7000);
        assert_eq!(config.mapping.join_tolerance_ms, 50);
    }

    #[test]
    fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf.json");
        Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap().target_language, "nl");
    }

    #[test]
    fn test_validate_withInvertedCpsLimits_shouldFail() {
        let mut config = Config::default();
        config.constraints.cps_hard_limit = Some(25.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_withAnthropicAndNoKey_shouldFail() {
        let mut config = Config::default();
        config.translation.provider = TranslationProvider::Anthropic;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_constraintTable_shouldApplyOverrides() {
        let mut config = Config::default();
        config.frame_rate = FrameRate::Fps24;
        config.constraints.max_chars_per_line = Some(37);
        let table = config.constraint_table();
        assert_eq!(table.max_chars_per_line, 37);
        assert_eq!(table.min_gap_ms, 125);
    }
}
