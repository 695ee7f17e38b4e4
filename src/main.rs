// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cueforge::app_config::{Config, LogLevel, TranslationProvider};
use cueforge::app_controller::{build_media_tool, Controller};
use cueforge::cross_mapping::{build_draft_mapping, DraftIndex, DraftMapping, MergeIndex, TimingQc};
use cueforge::errors::{AppError, ExitReason};
use cueforge::file_utils::FileManager;
use cueforge::media::MediaTool;
use cueforge::merge::{MergeEngine, MergeReport};
use cueforge::retiming::{extend_to_speech, retime};
use cueforge::subtitle_processor::credit::{append_credit, CreditDuration, CreditPlacement};
use cueforge::subtitle_processor::sdh::remove_sdh;
use cueforge::subtitle_processor::{renumber, write_srt, Cue, SubtitleFile, TimeWindow};
use cueforge::validation::{CpsReport, LineBalanceReport, StructuralValidator};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Ollama,
    Anthropic,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// cueforge - subtitle translation and timing repair
///
/// Translates subtitle files with an LLM, then validates and repairs the
/// result against broadcast timing and formatting constraints.
#[derive(Parser, Debug)]
#[command(name = "cueforge")]
#[command(version)]
#[command(about = "LLM subtitle translation with mechanical timing and layout repair")]
#[command(long_about = "cueforge translates subtitles with an LLM and repairs timing and layout.

EXAMPLES:
    cueforge run movie.mkv                      # Extract, translate, repair, QC
    cueforge run -f -t de /movies/              # Whole directory, German, overwrite
    cueforge validate movie.nl.srt              # Structural and CPS check
    cueforge fix movie.nl.srt -o fixed.srt      # Repair overlaps, gaps and layout
    cueforge qc movie.nl.srt --merges movie.nl.merges.json --draft-map movie.nl.draft-map.json --media movie.mkv
    cueforge credit movie.nl.srt --cps 12         # Closing credit 3s after the last cue
    cueforge completions bash > cueforge.bash

EXIT CODES:
    0 success, 1 internal error, 2 missing input, 3 validation failed,
    4 tool unavailable, 5 collaborator failed, 6 configuration error")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full pipeline: extract or load, translate, fix, merge, re-time, QC
    Run(RunArgs),
    /// Report structural problems and reading-speed violations
    Validate(InputArgs),
    /// Repair overlaps, gaps, typography and line layout
    Fix(OutputArgs),
    /// Merge short adjacent cues and write the provenance report
    Merge(MergeArgs),
    /// Close small gaps and extend cues that read too fast
    Retime(RetimeArgs),
    /// Map draft cues back onto the source cues they translate
    MapDraft(MapDraftArgs),
    /// Resolve final cues to source time windows and check them against speech
    Qc(QcArgs),
    /// Reading-speed statistics
    Cps(InputArgs),
    /// Two-line cues with a poor break
    Balance(BalanceArgs),
    /// Remove hearing-impaired annotations
    Sdh(SdhArgs),
    /// Renumber cues from 1
    Renumber(OutputArgs),
    /// Append a closing credit cue after the last subtitle
    Credit(CreditArgs),
    /// Generate shell completions for cueforge
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Subtitle or media file, or a directory of them
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Directory for outputs (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Source language code (e.g., 'en')
    #[arg(short, long)]
    source_language: Option<String>,

    /// Target language code (e.g., 'nl')
    #[arg(short, long)]
    target_language: Option<String>,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// SRT file to read
    input: PathBuf,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// SRT file to read
    input: PathBuf,

    /// Where to write the result (default: `<stem>.<command>.srt` next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MergeArgs {
    #[command(flatten)]
    io: OutputArgs,

    /// Largest gap bridged by a merge, in ms
    #[arg(long)]
    gap_threshold: Option<u64>,

    /// Longest merged cue, in ms
    #[arg(long)]
    max_duration: Option<u64>,

    /// Merge report path (default: next to the output)
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RetimeArgs {
    #[command(flatten)]
    io: OutputArgs,

    /// Media file whose speech the cue ends may be extended into
    #[arg(long)]
    media: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MapDraftArgs {
    /// Translated draft SRT
    draft: PathBuf,

    /// Source SRT the draft was translated from
    source: PathBuf,

    /// Mapping path (default: `<draft>.draft-map.json`)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QcArgs {
    /// Final SRT
    input: PathBuf,

    /// Merge report of the run that produced the final file
    #[arg(long)]
    merges: PathBuf,

    /// Draft-to-source mapping of that run
    #[arg(long)]
    draft_map: PathBuf,

    /// Media file to measure speech in
    #[arg(long)]
    media: Option<PathBuf>,

    /// Report path (default: `<input>.qc.json`)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BalanceArgs {
    #[command(flatten)]
    io: OutputArgs,

    /// Write the suggested re-breaks
    #[arg(long)]
    apply: bool,
}

#[derive(Args, Debug)]
struct SdhArgs {
    #[command(flatten)]
    io: OutputArgs,

    /// Keep music-note passages
    #[arg(long)]
    keep_music: bool,
}

#[derive(Args, Debug)]
struct CreditArgs {
    #[command(flatten)]
    io: OutputArgs,

    /// Credit text (default: `credit.text` from the configuration)
    #[arg(long)]
    text: Option<String>,

    /// Gap after the last cue, in ms
    #[arg(long)]
    gap: Option<u64>,

    /// Display time, in ms
    #[arg(long, conflicts_with = "cps")]
    duration: Option<u64>,

    /// Derive the display time from this reading speed
    #[arg(long)]
    cps: Option<f64>,
}

// @struct: Custom logger implementation, filtered by `log::max_level`
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let cli = CommandLineOptions::parse();
    if let Some(level) = &cli.log_level {
        log::set_max_level(LogLevel::from(level.clone()).to_level_filter());
    }

    let reason = match dispatch(cli).await {
        Ok(reason) => reason,
        Err(e) => {
            let app_error = AppError::from(e);
            error!("{}", app_error);
            app_error.exit_reason()
        }
    };
    ExitCode::from(reason.code())
}

async fn dispatch(cli: CommandLineOptions) -> Result<ExitReason> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "cueforge", &mut std::io::stdout());
        return Ok(ExitReason::Success);
    }

    let mut config = Config::load_or_create(&cli.config_path)
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    } else {
        log::set_max_level(config.log_level.to_level_filter());
    }

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::Validate(args) => validate(&config, &args.input),
        Commands::Fix(args) => fix(&config, &args),
        Commands::Merge(args) => merge(&config, &args),
        Commands::Retime(args) => retime_file(&config, &args).await,
        Commands::MapDraft(args) => map_draft(&config, &args),
        Commands::Qc(args) => qc(&config, &args).await,
        Commands::Cps(args) => cps(&config, &args.input),
        Commands::Balance(args) => balance(&config, &args),
        Commands::Sdh(args) => sdh(&args),
        Commands::Renumber(args) => renumber_file(&args),
        Commands::Credit(args) => credit(&config, &args),
        Commands::Completions { .. } => Ok(ExitReason::Success),
    }
}

async fn run(mut config: Config, args: RunArgs) -> Result<ExitReason> {
    if let Some(provider) = args.provider {
        config.translation.provider = provider.into();
    }
    if let Some(model) = &args.model {
        let provider_str = config.translation.provider.to_lowercase_string();
        if let Some(provider_config) = config
            .translation
            .available_providers
            .iter_mut()
            .find(|p| p.provider_type == provider_str)
        {
            provider_config.model = model.clone();
        }
    }
    if let Some(source_language) = args.source_language {
        config.source_language = source_language;
    }
    if let Some(target_language) = args.target_language {
        config.target_language = target_language;
    }
    config
        .validate()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;

    let controller = Controller::with_config(config)?.with_force_overwrite(args.force_overwrite);
    let inputs = controller.collect_inputs(&args.input_path)?;
    controller.preflight().await?;

    info!(
        "{} input(s), {} -> {} via {}",
        inputs.len(),
        controller.config().source_language,
        controller.config().target_language,
        controller.config().translation.provider.display_name()
    );
    let summary = controller.run_batch(inputs, args.output_dir.as_deref()).await;
    Ok(summary.reason)
}

/// Cues of an SRT file, plus `ValidationFailed` when it decoded lossily or lost blocks
fn load_cues(path: &Path) -> Result<(Vec<Cue>, ExitReason)> {
    let (cues, source) = SubtitleFile::load(path)?.into_parts();
    let reason = match source.summary() {
        Some(summary) => {
            warn!("{}: {}", path.display(), summary);
            ExitReason::ValidationFailed
        }
        None => ExitReason::Success,
    };
    Ok((cues, reason))
}

fn validator(config: &Config) -> StructuralValidator {
    StructuralValidator::new(config.constraint_table()).with_typography(config.typography_rules())
}

/// `-o` or `<stem>.<tag>.srt` next to the input
fn output_path(args: &OutputArgs, tag: &str) -> PathBuf {
    args.output.clone().unwrap_or_else(|| {
        let dir = args.input.parent().unwrap_or(Path::new(""));
        FileManager::generate_output_path(&args.input, dir, tag, "srt")
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    FileManager::write_atomic(path, json.as_bytes())
}

fn validate(config: &Config, input: &Path) -> Result<ExitReason> {
    let file = SubtitleFile::load(input)?;
    let table = config.constraint_table();
    let structure = validator(config).validate(file.cues());
    let cps = CpsReport::analyze(file.cues(), &table);
    let parse_errors: Vec<String> = file.outcome.errors.iter().map(|e| e.to_string()).collect();

    print_json(&serde_json::json!({
        "cues": file.cues().len(),
        "encoding": file.outcome.encoding.to_string(),
        "encoding_warning": file.outcome.encoding_warning.as_ref().map(|w| w.to_string()),
        "parse_errors": parse_errors,
        "structure": structure,
        "cps": cps,
    }))?;

    let clean = parse_errors.is_empty() && structure.is_clean() && cps.errors().next().is_none();
    Ok(if clean { ExitReason::Success } else { ExitReason::ValidationFailed })
}

fn fix(config: &Config, args: &OutputArgs) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(&args.input)?;
    let mut outcome = validator(config).fix(&cues);
    renumber(&mut outcome.cues);

    let output = output_path(args, "fixed");
    write_srt(&output, &outcome.cues)?;
    info!("{} fixes applied, written to {}", outcome.fixes.len(), output.display());
    for problem in &outcome.unfixable {
        warn!("{}", problem);
    }
    let reason = if outcome.unfixable.is_empty() { ExitReason::Success } else { ExitReason::ValidationFailed };
    Ok(loaded.worst(reason))
}

fn merge(config: &Config, args: &MergeArgs) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(&args.io.input)?;
    let gap = args.gap_threshold.unwrap_or(config.merge.gap_threshold_ms);
    let max_duration = args.max_duration.unwrap_or(config.merge.max_duration_ms);

    let engine = MergeEngine::new(&config.constraint_table());
    let plan = engine.plan_merges(&cues, gap, max_duration);
    let report = plan.report(cues.len(), engine.parameters(gap, max_duration));

    let output = output_path(&args.io, "merged");
    let report_path = args.report.clone().unwrap_or_else(|| output.with_extension("merges.json"));
    write_srt(&output, &plan.cues)?;
    report.save(&report_path)?;
    info!(
        "{} -> {} cues ({} merges), report {}",
        cues.len(),
        plan.cues.len(),
        report.statistics.merges_performed,
        report_path.display()
    );
    Ok(loaded)
}

async fn speech_windows(config: &Config, media: Option<&Path>) -> Result<Option<Vec<TimeWindow>>> {
    let Some(media) = media else {
        return Ok(None);
    };
    let tool = build_media_tool(config)?;
    tool.check_available().await?;
    Ok(Some(tool.speech_activity(media).await?))
}

async fn retime_file(config: &Config, args: &RetimeArgs) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(&args.io.input)?;
    let table = config.constraint_table();
    let plan = config.retiming_plan();
    let mut outcome = retime(&cues, &plan, &table);

    if let Some(speech) = speech_windows(config, args.media.as_deref()).await? {
        let extended = extend_to_speech(
            &mut outcome.cues,
            &speech,
            table.min_gap_ms,
            plan.max_duration_ms,
            config.retiming.max_speech_extension_ms,
        );
        info!("{} cues extended into speech", extended.len());
    }

    let output = output_path(&args.io, "retimed");
    write_srt(&output, &outcome.cues)?;
    info!(
        "{} gaps closed, {} cues extended for reading speed, written to {}",
        outcome.gaps_closed.len(),
        outcome.extended.len(),
        output.display()
    );
    for cue in &outcome.condensation_needed {
        warn!("Cue at {}ms needs condensing: {} chars in {}ms", cue.start_ms, cue.chars, cue.duration_ms);
    }
    let reason = if outcome.emergency_count() > 0 { ExitReason::ValidationFailed } else { ExitReason::Success };
    Ok(loaded.worst(reason))
}

fn map_draft(config: &Config, args: &MapDraftArgs) -> Result<ExitReason> {
    let (draft, draft_loaded) = load_cues(&args.draft)?;
    let (source, source_loaded) = load_cues(&args.source)?;
    let mapping = build_draft_mapping(&draft, &source, config.mapping.tolerance_ms, config.mapping.fallback_ms);

    let output = args.output.clone().unwrap_or_else(|| args.draft.with_extension("draft-map.json"));
    mapping.save(&output)?;
    info!(
        "{} of {} draft cues mapped, written to {}",
        mapping.mappings.iter().filter(|m| m.is_matched()).count(),
        mapping.mappings.len(),
        output.display()
    );
    Ok(draft_loaded.worst(source_loaded))
}

async fn qc(config: &Config, args: &QcArgs) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(&args.input)?;
    let merges = MergeReport::load(&args.merges)?;
    let drafts = DraftMapping::load(&args.draft_map)?;
    let speech = speech_windows(config, args.media.as_deref()).await?.unwrap_or_default();

    let merge_index = MergeIndex::from_records(&merges.merges, config.mapping.join_tolerance_ms);
    let draft_index = DraftIndex::from_mapping(&drafts, config.mapping.join_tolerance_ms);
    let report = TimingQc::new(&merge_index, &draft_index, &speech, config.qc_settings()).run(&cues);

    let output = args.output.clone().unwrap_or_else(|| args.input.with_extension("qc.json"));
    write_json(&output, &report)?;
    info!(
        "{} cues: {} resolved, {} unresolved, {} high-severity findings, report {}",
        report.summary.cues_analyzed,
        report.summary.resolved,
        report.summary.unresolved,
        report.summary.high,
        output.display()
    );
    Ok(loaded)
}

fn cps(config: &Config, input: &Path) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(input)?;
    let report = CpsReport::analyze(&cues, &config.constraint_table());
    print_json(&report)?;
    let reason = if report.errors().next().is_none() { ExitReason::Success } else { ExitReason::ValidationFailed };
    Ok(loaded.worst(reason))
}

fn balance(config: &Config, args: &BalanceArgs) -> Result<ExitReason> {
    let (mut cues, loaded) = load_cues(&args.io.input)?;
    let table = config.constraint_table();
    let report = LineBalanceReport::analyze(&cues, &table);
    print_json(&report)?;

    if args.apply {
        let summary = report.apply(&mut cues, &table);
        let output = output_path(&args.io, "balanced");
        write_srt(&output, &cues)?;
        info!("{:?}, written to {}", summary, output.display());
    }
    Ok(loaded)
}

fn sdh(args: &SdhArgs) -> Result<ExitReason> {
    let (cues, loaded) = load_cues(&args.io.input)?;
    let mut outcome = remove_sdh(&cues, args.keep_music);
    renumber(&mut outcome.cues);

    let output = output_path(&args.io, "nosdh");
    write_srt(&output, &outcome.cues)?;
    info!(
        "{} annotations removed, {} cues dropped, written to {}",
        outcome.tags_removed,
        outcome.removed_cues,
        output.display()
    );
    Ok(loaded)
}

fn renumber_file(args: &OutputArgs) -> Result<ExitReason> {
    let (mut cues, loaded) = load_cues(&args.input)?;
    if cues.is_empty() {
        return Err(anyhow!("{} has no cues", args.input.display()));
    }
    renumber(&mut cues);
    let output = output_path(args, "renumbered");
    write_srt(&output, &cues)?;
    info!("{} cues renumbered, written to {}", cues.len(), output.display());
    Ok(loaded)
}

fn credit(config: &Config, args: &CreditArgs) -> Result<ExitReason> {
    let mut credit = config.credit.credit();
    if let Some(text) = &args.text {
        credit.text = text.clone();
    }
    if let Some(gap) = args.gap {
        credit.gap_ms = gap;
    }
    if let Some(duration) = args.duration {
        credit.duration = CreditDuration::Fixed(duration);
    }
    if let Some(cps) = args.cps {
        credit.duration = CreditDuration::ReadingSpeed(cps);
    }
    credit.validate().map_err(|e| AppError::Config(format!("{:#}", e)))?;

    let (mut cues, loaded) = load_cues(&args.io.input)?;
    let placement = append_credit(&mut cues, &credit);
    print_json(&placement)?;
    match placement {
        CreditPlacement::NoCues => Err(anyhow!("{} has no cues", args.io.input.display())),
        CreditPlacement::AlreadyPresent => Ok(loaded),
        CreditPlacement::Added { .. } => {
            let output = output_path(&args.io, "credited");
            write_srt(&output, &cues)?;
            info!("Credit added, written to {}", output.display());
            Ok(loaded)
        }
    }
}
