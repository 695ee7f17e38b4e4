use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::app_config::{Config, TranslationProvider};
use crate::errors::{AppError, EncodingError, ExitReason, MediaError, ParseError};
use crate::file_utils::{FileManager, FileType, MEDIA_EXTENSIONS};
use crate::language_utils;
use crate::media::{ArtifactCache, FfmpegTool, MediaTool, StreamSelector};
use crate::pipeline::{CuePipeline, PipelineOutput, PipelineSettings};
use crate::providers::{Anthropic, ChatProvider, Ollama};
use crate::subtitle_processor::sdh::remove_sdh;
use crate::subtitle_processor::{parse, write_srt, Cue, SourceDiagnostics, SubtitleFile};
use crate::translation::{LlmTranslator, Translator};

// @module: Application controller for per-file and batch runs

// @struct: What happened to one input
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    // @field: Final SRT, when one was written
    pub output: Option<PathBuf>,
    pub reason: ExitReason,
    pub message: String,
    // @field: Set when the source had to be decoded lossily
    pub encoding_warning: Option<EncodingError>,
    // @field: Malformed source blocks that were skipped
    pub parse_errors: Vec<ParseError>,
}

impl FileOutcome {
    fn new(input: &Path, output: Option<PathBuf>, reason: ExitReason, message: String) -> Self {
        Self {
            input: input.to_path_buf(),
            output,
            reason,
            message,
            encoding_warning: None,
            parse_errors: Vec::new(),
        }
    }

    fn failed(input: &Path, error: AppError) -> Self {
        Self::new(input, None, error.exit_reason(), error.to_string())
    }

    fn with_source(mut self, source: &SourceDiagnostics) -> Self {
        self.encoding_warning = source.encoding_warning.clone();
        self.parse_errors = source.parse_errors.clone();
        self
    }
}

// @struct: All outcomes of a batch, folded into one exit reason
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<FileOutcome>,
    pub reason: ExitReason,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.reason == ExitReason::Success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    media: Arc<dyn MediaTool>,
    translator: Arc<dyn Translator>,
    pipeline: CuePipeline,
    force_overwrite: bool,
}

impl Controller {
    /// Controller with explicit collaborators
    pub fn new(config: Config, media: Arc<dyn MediaTool>, translator: Arc<dyn Translator>) -> Self {
        let pipeline = CuePipeline::new(PipelineSettings::from_config(&config));
        Self {
            config,
            media,
            translator,
            pipeline,
            force_overwrite: false,
        }
    }

    // @method: Build ffmpeg, cache and LLM translator from the configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let ffmpeg = build_media_tool(&config)?;
        let provider = build_chat_provider(&config)?;
        let translator = LlmTranslator::new(provider, config.translation.batch_limits());
        Ok(Self::new(config, Arc::new(ffmpeg), Arc::new(translator)))
    }

    /// Rewrite outputs that already exist instead of skipping the input
    pub fn with_force_overwrite(mut self, force_overwrite: bool) -> Self {
        self.force_overwrite = force_overwrite;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The media tools must run before any file is touched
    pub async fn preflight(&self) -> Result<(), MediaError> {
        self.media.check_available().await
    }

    /// Process one input; never fails, the outcome carries the reason
    pub async fn run_file(&self, input: &Path, output_dir: Option<&Path>) -> FileOutcome {
        let start = Instant::now();
        match self.process_file(input, output_dir).await {
            Ok(outcome) => {
                debug!("{:?} done in {:.1}s", input, start.elapsed().as_secs_f64());
                outcome
            }
            Err(e) => FileOutcome::failed(input, AppError::from(e)),
        }
    }

    /// Process every input with `batch.concurrent_files` in flight.
    /// A failing file is logged and does not stop the others.
    pub async fn run_batch(&self, inputs: Vec<PathBuf>, output_dir: Option<&Path>) -> BatchSummary {
        let progress_bar = ProgressBar::new(inputs.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("=>-"));

        let concurrency = self.config.batch.concurrent_files.max(1);
        let outcomes: Vec<FileOutcome> = stream::iter(inputs)
            .map(|input| {
                let pb = progress_bar.clone();
                async move {
                    let outcome = self.run_file(&input, output_dir).await;
                    log_outcome(&outcome);
                    pb.inc(1);
                    outcome
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        progress_bar.finish_and_clear();

        let reason = outcomes
            .iter()
            .fold(ExitReason::Success, |worst, outcome| worst.worst(outcome.reason));
        let summary = BatchSummary { outcomes, reason };
        info!(
            "Batch finished: {} succeeded, {} failed, exit reason: {}",
            summary.succeeded(),
            summary.failed(),
            summary.reason
        );
        summary
    }

    /// Inputs below `path`: the file itself, or every subtitle and media file in a directory.
    /// Files this tool wrote for the target language are left out.
    pub fn collect_inputs(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if FileManager::file_exists(path) {
            return Ok(vec![path.to_path_buf()]);
        }
        if !FileManager::dir_exists(path) {
            return Err(AppError::MissingInput(path.display().to_string()).into());
        }

        let mut extensions = vec!["srt"];
        extensions.extend_from_slice(MEDIA_EXTENSIONS);
        let target_suffix = format!(".{}.srt", self.config.target_language.to_lowercase());
        let inputs: Vec<PathBuf> = FileManager::find_files(path, &extensions)?
            .into_iter()
            .filter(|p| !p.to_string_lossy().to_lowercase().ends_with(&target_suffix))
            .collect();

        if inputs.is_empty() {
            return Err(AppError::MissingInput(format!("no subtitle or media files in {}", path.display())).into());
        }
        Ok(inputs)
    }

    async fn process_file(&self, input: &Path, output_dir: Option<&Path>) -> Result<FileOutcome> {
        if !input.exists() {
            return Err(AppError::MissingInput(input.display().to_string()).into());
        }

        let output_dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let outputs = OutputPaths::new(input, &output_dir, &self.config.source_language, &self.config.target_language);
        if outputs.srt.exists() && !self.force_overwrite {
            warn!("Skipping {:?}, {:?} already exists (use --force to overwrite)", input, outputs.srt);
            return Ok(FileOutcome::new(
                input,
                Some(outputs.srt),
                ExitReason::Success,
                "skipped, output exists".to_string(),
            ));
        }

        let (source, diagnostics, media) = self.load_source(input).await?;
        if let Some(summary) = diagnostics.summary() {
            warn!("{:?}: {}", input, summary);
        }
        if source.is_empty() {
            return Err(AppError::Validation(format!("{} has no usable cues", input.display())).into());
        }
        let speech = match &media {
            Some(media) if self.needs_speech() => Some(self.media.speech_activity(media).await?),
            _ => None,
        };

        let style = self.config.translation_style();
        let draft = self.translator.translate_batch(&source, &style).await?;
        info!("{:?}: {} source cues -> {} draft cues", input, source.len(), draft.len());

        let output = self
            .pipeline
            .run(&source, &draft, speech.as_deref())
            .with_source(diagnostics);
        let reason = output.report.exit_reason();

        FileManager::ensure_dir(&output_dir)?;
        self.write_outputs(&outputs, &output)?;

        let mut message = match reason {
            ExitReason::Success => format!("{} cues written", output.cues.len()),
            _ => format!(
                "{} cues written, {} unfixable, {} emergency CPS",
                output.cues.len(),
                output.report.unfixable_count(),
                output.report.emergency_count()
            ),
        };
        if let Some(summary) = output.report.source.summary() {
            message.push_str(&format!(" (source: {})", summary));
        }
        let outcome = FileOutcome::new(input, Some(outputs.srt), reason, message);
        Ok(outcome.with_source(&output.report.source))
    }

    /// Source cues, what parsing reported and the media file to measure speech in, if any
    async fn load_source(&self, input: &Path) -> Result<(Vec<Cue>, SourceDiagnostics, Option<PathBuf>)> {
        let (cues, diagnostics, media) = match FileManager::detect_file_type(input)? {
            FileType::Subtitle => {
                let (cues, diagnostics) = SubtitleFile::load(input)?.into_parts();
                (cues, diagnostics, companion_media(input))
            }
            FileType::Video => {
                let selector = StreamSelector::Language(self.config.source_language.clone());
                let bytes = self.media.extract_subtitle_stream(input, &selector).await?;
                let (cues, diagnostics) = parse(&bytes).into_parts();
                for e in &diagnostics.parse_errors {
                    warn!("{:?} (extracted): {}", input, e);
                }
                (cues, diagnostics, Some(input.to_path_buf()))
            }
            FileType::Unknown => {
                return Err(anyhow!("Unsupported input type: {:?}", input));
            }
        };

        if !self.config.sdh.strip_source {
            return Ok((cues, diagnostics, media));
        }
        let stripped = remove_sdh(&cues, self.config.sdh.keep_music);
        debug!(
            "SDH: {} annotations removed, {} cues dropped",
            stripped.tags_removed,
            stripped.removed_cues
        );
        Ok((stripped.cues, diagnostics, media))
    }

    fn needs_speech(&self) -> bool {
        self.config.qc.enabled || self.config.retiming.extend_to_speech
    }

    // Only called once the pipeline has finished
    fn write_outputs(&self, outputs: &OutputPaths, output: &PipelineOutput) -> Result<()> {
        write_srt(&outputs.srt, &output.cues)?;
        output.merge_report.save(&outputs.merges)?;
        output.draft_mapping.save(&outputs.draft_map)?;
        if let Some(qc) = &output.qc {
            write_json(&outputs.qc, qc)?;
        }
        write_json(&outputs.report, &output.report)?;
        info!("Success: {}", outputs.srt.display());
        Ok(())
    }
}

// @struct: Every artifact written for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub srt: PathBuf,
    pub merges: PathBuf,
    pub draft_map: PathBuf,
    pub qc: PathBuf,
    pub report: PathBuf,
}

impl OutputPaths {
    /// `<stem>.<lang>.srt` and its side artifacts. A source language tag at the
    /// end of the stem (`movie.en.srt`) is replaced, not kept.
    pub fn new(input: &Path, output_dir: &Path, source_language: &str, target_language: &str) -> Self {
        let stem = output_stem(input, source_language);
        let named = PathBuf::from(format!("{}.srt", stem));
        let path = |suffix: &str| FileManager::generate_output_path(&named, output_dir, target_language, suffix);
        Self {
            srt: path("srt"),
            merges: path("merges.json"),
            draft_map: path("draft-map.json"),
            qc: path("qc.json"),
            report: path("report.json"),
        }
    }
}

fn output_stem(input: &Path, source_language: &str) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    match stem.rsplit_once('.') {
        Some((base, tag)) if !base.is_empty() && language_utils::language_codes_match(tag, source_language) => {
            base.to_string()
        }
        _ => stem,
    }
}

/// A media file next to `subtitle` sharing its stem (`movie.en.srt` -> `movie.mkv`)
fn companion_media(subtitle: &Path) -> Option<PathBuf> {
    let dir = subtitle.parent()?;
    let stem = subtitle.file_stem()?.to_string_lossy().to_string();
    let mut candidates = vec![stem.clone()];
    if let Some((base, _)) = stem.rsplit_once('.') {
        candidates.push(base.to_string());
    }
    candidates.iter().find_map(|base| {
        MEDIA_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", base, ext)))
            .find(|p| p.is_file())
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| format!("Failed to serialize {:?}", path))?;
    FileManager::write_atomic(path, json.as_bytes())
}

fn log_outcome(outcome: &FileOutcome) {
    match outcome.reason {
        ExitReason::Success => info!("{}: {}", outcome.input.display(), outcome.message),
        ExitReason::ValidationFailed => warn!("{}: {}", outcome.input.display(), outcome.message),
        reason => error!("{}: {} ({})", outcome.input.display(), outcome.message, reason),
    }
}

/// ffmpeg/ffprobe with the configured timeouts and, when enabled, the artifact cache
pub fn build_media_tool(config: &Config) -> Result<FfmpegTool> {
    let ffmpeg = FfmpegTool::new(&config.media.ffmpeg_path, &config.media.ffprobe_path)
        .with_timeouts(config.media.timeouts())
        .with_silence(config.media.silence());
    if !config.cache.enabled {
        return Ok(ffmpeg);
    }
    let cache = ArtifactCache::new(config.cache_dir(), config.cache.max_mb.saturating_mul(1024 * 1024))
        .context("Failed to open the artifact cache")?;
    Ok(ffmpeg.with_cache(Arc::new(cache)))
}

/// Chat client for the configured provider
pub fn build_chat_provider(config: &Config) -> Result<Arc<dyn ChatProvider>> {
    let translation = &config.translation;
    let provider_config = translation
        .get_active_provider_config()
        .ok_or_else(|| AppError::Config(format!("No configuration for provider {}", translation.provider)))?;
    let retry = translation.retry_policy();
    let temperature = translation.common.temperature;

    let provider: Arc<dyn ChatProvider> = match translation.provider {
        TranslationProvider::Ollama => Arc::new(
            Ollama::new(&provider_config.endpoint, &provider_config.model, provider_config.timeout())
                .with_retry(retry)
                .with_temperature(temperature),
        ),
        TranslationProvider::Anthropic => Arc::new(
            Anthropic::new(
                &provider_config.api_key,
                &provider_config.endpoint,
                &provider_config.model,
                provider_config.timeout(),
            )
            .with_retry(retry)
            .with_temperature(temperature),
        ),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_outputPaths_withSourceTag_shouldReplaceIt() {
        let paths = OutputPaths::new(Path::new("/in/movie.en.srt"), Path::new("/out"), "en", "nl");
        assert_eq!(paths.srt, PathBuf::from("/out/movie.nl.srt"));
        assert_eq!(paths.merges, PathBuf::from("/out/movie.nl.merges.json"));
        assert_eq!(paths.draft_map, PathBuf::from("/out/movie.nl.draft-map.json"));
    }

    #[test]
    fn test_outputPaths_withMedia_shouldUseStem() {
        let paths = OutputPaths::new(Path::new("/in/movie.mkv"), Path::new("/in"), "en", "nl");
        assert_eq!(paths.srt, PathBuf::from("/in/movie.nl.srt"));
        assert_eq!(paths.report, PathBuf::from("/in/movie.nl.report.json"));
    }

    #[test]
    fn test_companionMedia_shouldFindVideoNextToSubtitle() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("movie.mkv"), b"x").unwrap();
        let srt = dir.path().join("movie.en.srt");
        std::fs::write(&srt, b"").unwrap();
        assert_eq!(companion_media(&srt), Some(dir.path().join("movie.mkv")));
        assert_eq!(companion_media(&dir.path().join("other.srt")), None);
    }

    #[test]
    fn test_buildChatProvider_withDefaults_shouldUseOllama() {
        let provider = build_chat_provider(&Config::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
