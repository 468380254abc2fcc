//! CLI binary for edgequake-news2csv.
//!
//! A thin shim over the library crate: `process` maps flags to
//! `ExtractionConfig` and runs one archive, `fetch` copies an accumulated
//! table to stdout or a file.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_news2csv::{
    fetch_table, process_archive_file, ArchiveReport, ExtractionConfig,
    ExtractionProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page image.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the image currently in flight; images run one at a time.
    current: Mutex<Option<Instant>>,
    articles: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening archive…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(None),
            articles: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.current
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_archive_start(&self, total_images: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_images as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_images} page image(s)…"))
        ));
    }

    fn on_image_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut t) = self.current.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_image_complete(&self, index: usize, total: usize, name: &str, articles: usize) {
        self.articles.fetch_add(articles, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{articles:>3} article(s)")),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, index: usize, total: usize, name: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_archive_complete(&self, total_images: usize, succeeded: usize, articles: usize) {
        let failed = total_images.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} image(s) read, {} article(s) appended",
                green("✔"),
                bold(&succeeded.to_string()),
                bold(&articles.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) read  ({} skipped), {} article(s) appended",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_images,
                red(&failed.to_string()),
                bold(&articles.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every page of an archive into uploads/monday_articles.csv
  news2csv process monday.zip

  # A second archive with the same name keeps numbering where the table left off
  news2csv process ~/incoming/monday.zip

  # Custom table directory and model
  news2csv process --uploads-dir data --model gemini-1.5-pro monday.zip

  # Machine-readable run report
  news2csv process --json monday.zip > report.json

  # Download the accumulated table
  news2csv fetch monday_articles.csv -o monday.csv

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Gemini API key (also read from .env)
  NEWS2CSV_UPLOADS_DIR    Directory holding the accumulation tables
  NEWS2CSV_MODEL          Override model ID
  NEWS2CSV_ENDPOINT       Override the API base URL
  RUST_LOG                Fine-grained log filter (overrides -v / --quiet)
"#;

/// Extract newspaper articles from page-image archives into CSV tables.
#[derive(Parser, Debug)]
#[command(
    name = "news2csv",
    version,
    about = "Extract newspaper articles from page-image archives into CSV tables",
    long_about = "Read every .png/.jpg/.jpeg page in a zip archive with a Vision Language Model \
and append the articles found to uploads/<archive>_articles.csv. Article ids continue across \
runs. Pages the model cannot read are reported and skipped.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs (-vv for TRACE).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "NEWS2CSV_QUIET")]
    quiet: bool,

    /// Directory holding the accumulation tables.
    #[arg(long, global = true, env = "NEWS2CSV_UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one archive through the pipeline and append to its table.
    Process(ProcessArgs),
    /// Write an accumulated table to stdout or a file.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Zip archive of page images.
    archive: PathBuf,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "NEWS2CSV_MODEL", default_value = edgequake_news2csv::config::DEFAULT_MODEL)]
    model: String,

    /// API base URL.
    #[arg(long, env = "NEWS2CSV_ENDPOINT", default_value = edgequake_news2csv::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Path to a text file replacing the built-in extraction instruction.
    #[arg(long, env = "NEWS2CSV_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Per-image request timeout in seconds (no timeout if unset).
    #[arg(long, env = "NEWS2CSV_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "NEWS2CSV_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Table file name, e.g. monday_articles.csv.
    name: String,

    /// Write to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v was given.
    let show_progress = match &cli.command {
        Command::Process(p) => !cli.quiet && !p.no_progress && !p.json,
        Command::Fetch(_) => false,
    };
    let filter = match cli.verbose {
        0 if cli.quiet || show_progress => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Process(ref args) => run_process(&cli, args, show_progress).await,
        Command::Fetch(ref args) => run_fetch(&cli, args).await,
    }
}

async fn run_process(cli: &Cli, args: &ProcessArgs, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, args, progress_cb).await?;

    let report = process_archive_file(&args.archive, &config)
        .await
        .with_context(|| format!("Failed to process {}", args.archive.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, show_progress);
    }

    if report.stats.total_images > 0 && report.stats.succeeded_images == 0 {
        bail!(
            "none of the {} image(s) in {} could be read",
            report.stats.total_images,
            report.archive_name
        );
    }
    Ok(())
}

fn print_summary(report: &ArchiveReport, show_progress: bool) {
    let stats = &report.stats;
    if !show_progress {
        eprintln!(
            "Read {}/{} image(s), appended {} article(s) in {}ms",
            stats.succeeded_images, stats.total_images, stats.articles_appended, stats.total_duration_ms
        );
        for err in report.errors() {
            eprintln!("  {} {}", red("✗"), err);
        }
    }
    let ids = if stats.articles_appended == 0 {
        "no new ids".to_string()
    } else {
        format!(
            "ids {}–{}",
            report.first_article_id,
            report.first_article_id + stats.articles_appended as u64 - 1
        )
    };
    eprintln!(
        "   {}  →  {}",
        dim(&ids),
        bold(&report.table_path.display().to_string())
    );
}

async fn run_fetch(cli: &Cli, args: &FetchArgs) -> Result<()> {
    let config = ExtractionConfig::builder()
        .uploads_dir(&cli.uploads_dir)
        .build()
        .context("Invalid configuration")?;

    let bytes = fetch_table(&args.name, &config)
        .await
        .with_context(|| format!("Failed to fetch {}", args.name))?;

    match args.output {
        Some(ref path) => {
            tokio::fs::write(path, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!(
                    "{} {} bytes  →  {}",
                    green("✔"),
                    bytes.len(),
                    bold(&path.display().to_string())
                );
            }
        }
        None => {
            io::stdout()
                .lock()
                .write_all(&bytes)
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    cli: &Cli,
    args: &ProcessArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .uploads_dir(&cli.uploads_dir)
        .model(&args.model)
        .endpoint(&args.endpoint);

    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref path) = args.instruction {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?;
        builder = builder.instruction(text);
    }
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
