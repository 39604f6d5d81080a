//! CLI binary for bodyfat-lens.
//!
//! A thin shim over the library crate that maps CLI flags to `LensConfig`,
//! runs one analysis (or a card render, or a reminder command) and prints
//! the outcome.

use anyhow::{bail, Context, Result};
use bodyfat_lens::pipeline::compose;
use bodyfat_lens::{
    acquire, normalize, AnalysisObserver, AnalysisSession, CardContent, FileStore, ImageSource,
    LensConfig, LlmBackend, Provenance, ReminderScheduler, ReportView, ShareComposer,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn amber(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Terminal spinner shown while the model is thinking.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading photo…");
        Arc::new(Self { bar })
    }
}

impl AnalysisObserver for CliObserver {
    fn on_capture(&self, width: u32, height: u32, bytes: usize) {
        self.bar.println(format!(
            "  {} Photo normalised  {}",
            green("✓"),
            dim(&format!("{width}x{height}, {} KB", bytes / 1024))
        ));
    }

    fn on_analysis_start(&self, _attempt: u64) {
        self.bar.set_prefix("Analyzing");
        self.bar.set_message("Waiting for the model…");
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_analysis_complete(&self, _attempt: u64, _estimate: &str) {
        self.bar.finish_and_clear();
    }

    fn on_analysis_error(&self, _attempt: u64, _message: &str) {
        self.bar.finish_and_clear();
    }

    fn on_share_rendered(&self, _generation: u64, png_len: usize) {
        self.bar.println(format!(
            "  {} Share card ready  {}",
            green("✓"),
            dim(&format!("{} KB", png_len / 1024))
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a photo and save the share card
  bodyfat analyze selfie.jpg --out-dir .

  # Same, with your own branding and a DEXA-measured value on the card
  bodyfat analyze selfie.jpg --brand "Iron Gym" --override 17% --out-dir .

  # Render a card without calling the model
  bodyfat card selfie.jpg --estimate 12-15% --confidence High --out-dir .

  # Machine-readable report
  bodyfat analyze selfie.jpg --json > report.json

  # Check-in reminders
  bodyfat reminder schedule
  bodyfat reminder status

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter
"#;

/// Estimate body fat from a photo using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "bodyfat",
    version,
    about = "Estimate body fat from a photo using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BODYFAT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BODYFAT_QUIET")]
    quiet: bool,

    /// Reminder store file (default: user data directory).
    #[arg(long, global = true, env = "BODYFAT_STORE")]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a photo to the model and print the report.
    Analyze(AnalyzeArgs),
    /// Render a share card from a photo and a known value.
    Card(CardArgs),
    /// Bound and re-encode a photo exactly as it would be uploaded.
    Normalize(NormalizeArgs),
    /// Manage the check-in reminder.
    Reminder {
        #[command(subcommand)]
        action: ReminderAction,
    },
}

#[derive(Args, Debug)]
struct PhotoArgs {
    /// Photo to read (JPEG, PNG, WebP, …).
    image: PathBuf,

    /// Longest side in pixels before upload.
    #[arg(long, env = "BODYFAT_MAX_DIMENSION", default_value_t = 1024)]
    max_dimension: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "BODYFAT_QUALITY", default_value_t = 70,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
}

#[derive(Args, Debug)]
struct CardStyleArgs {
    /// Branding text on the share card.
    #[arg(long, env = "BODYFAT_BRAND")]
    brand: Option<String>,

    /// TrueType font for card text.
    #[arg(long, env = "BODYFAT_FONT")]
    font: Option<PathBuf>,

    /// Directory to save `bodyfat-analysis.png` into.
    #[arg(long, env = "BODYFAT_OUT_DIR")]
    out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    photo: PhotoArgs,

    #[command(flatten)]
    card: CardStyleArgs,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Seconds to wait for the model.
    #[arg(long, env = "BODYFAT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to a text file with a custom analysis prompt.
    #[arg(long, env = "BODYFAT_PROMPT")]
    prompt: Option<PathBuf>,

    /// Show this value on the card instead of the model's estimate.
    #[arg(long = "override")]
    override_value: Option<String>,

    /// Schedule the next check-in reminder after a successful analysis.
    #[arg(long)]
    remind: bool,

    /// Print the report as JSON.
    #[arg(long, env = "BODYFAT_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "BODYFAT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CardArgs {
    #[command(flatten)]
    photo: PhotoArgs,

    #[command(flatten)]
    card: CardStyleArgs,

    /// The model's estimate, e.g. "12-15%".
    #[arg(long)]
    estimate: String,

    /// A user-entered value; the card is styled as self-reported.
    #[arg(long = "override")]
    override_value: Option<String>,

    /// Confidence label for the footnote.
    #[arg(long, default_value = "Medium")]
    confidence: String,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    #[command(flatten)]
    photo: PhotoArgs,

    /// Output JPEG path.
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Subcommand, Debug)]
enum ReminderAction {
    /// Show when the next check-in is due.
    Status,
    /// Schedule the next check-in, replacing any other.
    Schedule {
        /// Days from now.
        #[arg(long, default_value_t = 14)]
        days: u32,
    },
    /// Remove the scheduled check-in.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store_path = cli.store.clone().unwrap_or_else(FileStore::default_path);

    match cli.command {
        Command::Analyze(args) => run_analyze(args, &store_path, cli.quiet).await,
        Command::Card(args) => run_card(args),
        Command::Normalize(args) => run_normalize(args, cli.quiet),
        Command::Reminder { action } => run_reminder(action, &store_path),
    }
}

// ── analyze ──────────────────────────────────────────────────────────────────

async fn run_analyze(args: AnalyzeArgs, store_path: &Path, quiet: bool) -> Result<()> {
    let config = build_analyze_config(&args).await?;
    let backend = LlmBackend::from_config(&config).context("Failed to set up the LLM provider")?;

    let mut session = AnalysisSession::new(config, Arc::new(backend));
    if !quiet && !args.no_progress && !args.json {
        session = session.with_observer(CliObserver::new());
    }

    let captured = session
        .capture(ImageSource::File(args.photo.image.clone()))
        .with_context(|| format!("Failed to read {}", args.photo.image.display()))?;
    if !captured {
        bail!("{} is not an image", args.photo.image.display());
    }

    let result = match session.analyze().await {
        Ok(r) => r.clone(),
        Err(e) => bail!("{} {} ({e})", red("✘"), e.user_message()),
    };

    if let Some(ref value) = args.override_value {
        session.begin_override();
        if !session.commit_override(value) {
            bail!("Override value must not be blank");
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise report")?
        );
    } else {
        print_report(&session);
    }

    if let (Some(dir), Some(card)) = (args.card.out_dir.as_deref(), session.share_card()) {
        let path = card.save_to(dir).context("Failed to save share card")?;
        if !quiet {
            let payload = card.share_payload();
            eprintln!("{} {}  {}", green("✔"), bold(&path.display().to_string()), dim(&payload.text));
        }
    }

    if args.remind && !result.is_not_applicable() {
        let scheduler = ReminderScheduler::new(FileStore::new(store_path));
        let due = scheduler
            .schedule_in(session.config().reminder_interval())
            .context("Failed to schedule reminder")?;
        if !quiet {
            eprintln!("{} Next check-in: {}", green("✔"), format_due(due));
        }
    }

    session.shutdown();
    Ok(())
}

async fn build_analyze_config(args: &AnalyzeArgs) -> Result<LensConfig> {
    let mut builder = LensConfig::builder()
        .max_dimension(args.photo.max_dimension)
        .jpeg_quality(args.photo.quality)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = args.prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    builder = apply_card_style(builder, &args.card);

    builder.build().context("Invalid configuration")
}

fn apply_card_style(
    mut builder: bodyfat_lens::LensConfigBuilder,
    card: &CardStyleArgs,
) -> bodyfat_lens::LensConfigBuilder {
    if let Some(ref brand) = card.brand {
        builder = builder.brand_text(brand);
    }
    if let Some(ref font) = card.font {
        builder = builder.font_path(font);
    }
    builder
}

fn print_report(session: &AnalysisSession) {
    let Some(view) = session.view() else {
        return;
    };
    match view {
        ReportView::Unavailable {
            reason,
            suggestions,
        } => {
            println!("{} {}", amber("⚠"), bold("Could not estimate body fat"));
            println!("  {reason}");
            if !suggestions.is_empty() {
                println!();
                println!("{}", bold("For a better photo:"));
                for s in suggestions {
                    println!("  • {s}");
                }
            }
        }
        ReportView::Metrics(report) => {
            let (value, label) = match session.display() {
                Some(d) if d.provenance() == Provenance::UserOverride => {
                    (amber(d.value()), compose::OVERRIDE_LABEL)
                }
                Some(d) => (green(d.value()), compose::AI_LABEL),
                None => (green(&report.estimated_range), compose::AI_LABEL),
            };
            println!("{}  {}", bold(label), value);
            println!("{}  {}", dim("Confidence"), report.confidence_level);
            if !report.visual_cues.is_empty() {
                println!("{}  {}", dim("Visual cues"), report.visual_cues.join(", "));
            }
            println!();
            println!("{}", report.muscle_definition_analysis);
            if !report.health_tips.is_empty() {
                println!();
                println!("{}", bold("Tips:"));
                for tip in &report.health_tips {
                    println!("  • {tip}");
                }
            }
            println!();
            println!("{}", dim(&report.disclaimer));
        }
    }
}

// ── card ─────────────────────────────────────────────────────────────────────

fn run_card(args: CardArgs) -> Result<()> {
    let config = apply_card_style(
        LensConfig::builder()
            .max_dimension(args.photo.max_dimension)
            .jpeg_quality(args.photo.quality),
        &args.card,
    )
    .build()
    .context("Invalid configuration")?;

    let photo = load_normalized(&args.photo, &config)?;
    let font = compose::load_font(config.font_path.as_deref());
    if font.is_none() {
        eprintln!("{} No usable font found; card will have no text", amber("⚠"));
    }

    let (value, provenance) = match args.override_value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() && v != args.estimate => (v.to_string(), Provenance::UserOverride),
        _ => (args.estimate.clone(), Provenance::Ai),
    };
    let content = CardContent {
        value,
        provenance,
        confidence: args.confidence,
        brand: config.brand_text.clone(),
    };

    let composer = ShareComposer::new(photo, font, config.debounce());
    let card = composer.render_now(content).context("Failed to render card")?;
    let dir = args.card.out_dir.unwrap_or_else(|| PathBuf::from("."));
    let path = card.save_to(&dir).context("Failed to save share card")?;
    println!("{}", path.display());
    Ok(())
}

// ── normalize ────────────────────────────────────────────────────────────────

fn run_normalize(args: NormalizeArgs, quiet: bool) -> Result<()> {
    let config = LensConfig::builder()
        .max_dimension(args.photo.max_dimension)
        .jpeg_quality(args.photo.quality)
        .build()
        .context("Invalid configuration")?;
    let photo = load_normalized(&args.photo, &config)?;
    std::fs::write(&args.output, photo.bytes())
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    if !quiet {
        eprintln!(
            "{} {}x{}  {} bytes  →  {}",
            green("✔"),
            photo.width(),
            photo.height(),
            photo.bytes().len(),
            bold(&args.output.display().to_string())
        );
    }
    Ok(())
}

fn load_normalized(
    photo: &PhotoArgs,
    config: &LensConfig,
) -> Result<bodyfat_lens::NormalizedImage> {
    let raw = acquire(ImageSource::File(photo.image.clone()))
        .with_context(|| format!("Failed to read {}", photo.image.display()))?;
    let Some(raw) = raw else {
        bail!("{} is not an image", photo.image.display());
    };
    normalize(&raw, config.max_dimension, config.jpeg_quality).context("Failed to encode photo")
}

// ── reminder ─────────────────────────────────────────────────────────────────

fn run_reminder(action: ReminderAction, store_path: &Path) -> Result<()> {
    let scheduler = ReminderScheduler::new(FileStore::new(store_path));
    match action {
        ReminderAction::Status => match scheduler.due_at().context("Failed to read reminder")? {
            None => println!("No check-in scheduled"),
            Some(due) => {
                let state = if scheduler.is_due()? {
                    green("due now")
                } else {
                    dim("upcoming")
                };
                println!("Next check-in: {}  ({state})", format_due(due));
            }
        },
        ReminderAction::Schedule { days } => {
            if days == 0 {
                bail!("--days must be at least 1");
            }
            let due = scheduler
                .schedule_in(Duration::from_secs(u64::from(days) * 24 * 60 * 60))
                .context("Failed to schedule reminder")?;
            println!("Next check-in: {}", format_due(due));
        }
        ReminderAction::Clear => {
            scheduler.clear().context("Failed to clear reminder")?;
            println!("Reminder cleared");
        }
    }
    Ok(())
}

fn format_due(due_ms: u64) -> String {
    i64::try_from(due_ms)
        .ok()
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| format!("{due_ms} ms"))
}
