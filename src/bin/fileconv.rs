//! CLI binary for fileconv.
//!
//! Drives one workflow against a running conversion server: select the file,
//! pick the target, submit, and save the result next to the other outputs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fileconv::{
    ClientConfig, Notice, Phase, SelectedFile, Severity, WorkflowController, WorkflowObserver,
    WorkflowSnapshot,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Terminal observer ────────────────────────────────────────────────────────

/// Renders workflow notifications on stderr.
///
/// The bar starts as a spinner while the format is detected and switches to a
/// percentage bar once the upload begins.
struct CliObserver {
    bar: Option<ProgressBar>,
}

impl CliObserver {
    fn new(show_progress: bool) -> Arc<Self> {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_prefix("Detecting");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Arc::new(Self { bar })
    }

    fn show_percent_bar(bar: &ProgressBar) {
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Converting");
        bar.set_position(0);
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl WorkflowObserver for CliObserver {
    fn on_state_change(&self, snapshot: &WorkflowSnapshot) {
        let Some(bar) = &self.bar else {
            return;
        };
        match snapshot.phase {
            Phase::Detecting => {
                bar.set_message(snapshot.file_name.clone().unwrap_or_default());
            }
            Phase::Submitting => Self::show_percent_bar(bar),
            Phase::Ready => {
                bar.set_prefix("Ready");
                bar.set_message(snapshot.detected_format.clone().unwrap_or_default());
            }
            other => bar.set_prefix(other.to_string()),
        }
    }

    fn on_progress(&self, percent: u8) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(percent));
        }
    }

    fn on_notice(&self, notice: &Notice) {
        let line = match notice.severity {
            Severity::Transient => format!("{} {}", yellow("⚠"), notice.message()),
            Severity::Blocking => format!("{} {}", red("✘"), bold(notice.message())),
        };
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List what a file can be converted to
  fileconv --list-targets report.docx

  # Convert into the current directory
  fileconv report.docx --to pdf

  # Convert against another server, saving into ./out
  fileconv photo.png --to webp --server https://convert.example.org -o out

  # Machine-readable outcome
  fileconv report.docx --to txt --json

ENVIRONMENT VARIABLES:
  FILECONV_SERVER       Base URL of the conversion server
  FILECONV_CSRF_TOKEN   CSRF token (default: taken from the csrftoken cookie)
  FILECONV_OUTPUT_DIR   Directory converted files are written to
  RUST_LOG              Overrides the log filter selected by -v / -q
"#;

/// Convert a file through a fileconv server.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Convert files through a conversion server",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// File to convert.
    input: PathBuf,

    /// Target format (e.g. pdf, txt, webp).
    #[arg(short = 't', long, env = "FILECONV_TO", required_unless_present = "list_targets")]
    to: Option<String>,

    /// Base URL of the conversion server.
    #[arg(long, env = "FILECONV_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// CSRF token sent with the conversion request.
    #[arg(long, env = "FILECONV_CSRF_TOKEN", hide_env_values = true)]
    csrf_token: Option<String>,

    /// Directory the converted file is written to.
    #[arg(short, long, env = "FILECONV_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Print the detected format and available targets, then exit.
    #[arg(long)]
    list_targets: bool,

    /// Print the final workflow state as JSON on stdout.
    #[arg(long, env = "FILECONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FILECONV_QUIET")]
    quiet: bool,

    /// Format detection timeout in seconds.
    #[arg(long, env = "FILECONV_DETECT_TIMEOUT", default_value_t = 30)]
    detect_timeout: u64,

    /// Conversion request timeout in seconds.
    #[arg(long, env = "FILECONV_CONVERT_TIMEOUT", default_value_t = 600)]
    convert_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar carries the user-facing feedback, so library INFO logs are
    // only shown when it is off.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build controller ─────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let observer = CliObserver::new(show_progress);
    let controller = WorkflowController::from_config(&config)
        .context("Failed to set up HTTP client")?
        .with_observer(observer.clone());

    let file = SelectedFile::from_path(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    // ── Detect ───────────────────────────────────────────────────────────
    if controller.select_file(file).await != Phase::Ready {
        observer.finish();
        let snapshot = controller.snapshot();
        print_json(&cli, &snapshot)?;
        bail!(
            "{} cannot be converted: {}",
            cli.input.display(),
            failure_reason(&snapshot)
        );
    }

    if cli.list_targets {
        observer.finish();
        let snapshot = controller.snapshot();
        if cli.json {
            print_json(&cli, &snapshot)?;
        } else {
            println!(
                "{}: {}",
                bold(snapshot.detected_format.as_deref().unwrap_or("?")),
                snapshot.available_targets.join(", ")
            );
        }
        return Ok(());
    }

    // ── Choose target ────────────────────────────────────────────────────
    let target = cli.to.as_deref().unwrap_or_default().trim().to_lowercase();
    if !controller.choose_target(&target) {
        observer.finish();
        let snapshot = controller.snapshot();
        bail!(
            "{} cannot be converted to '{}' (available: {})",
            snapshot.detected_format.as_deref().unwrap_or("this format"),
            target,
            snapshot.available_targets.join(", ")
        );
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let phase = controller.submit().await;
    observer.finish();

    match phase {
        Phase::Completed => {
            let result = controller
                .retrieve_result()
                .context("Conversion completed without a result")?;
            let path = result
                .save_into(&cli.output_dir)
                .context("Failed to save converted file")?;
            print_json(&cli, &controller.snapshot())?;
            if !cli.quiet && !cli.json {
                eprintln!(
                    "{}  {} bytes  →  {}",
                    green("✔"),
                    result.bytes.len(),
                    bold(&path.display().to_string())
                );
            }
            Ok(())
        }
        Phase::LimitBlocked => {
            let snapshot = controller.snapshot();
            print_json(&cli, &snapshot)?;
            controller.acknowledge_limit();
            bail!("{}", failure_reason(&snapshot))
        }
        _ => {
            let snapshot = controller.snapshot();
            print_json(&cli, &snapshot)?;
            bail!("Conversion failed: {}", failure_reason(&snapshot))
        }
    }
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .base_url(cli.server.trim_end_matches('/'))
        .detect_timeout_secs(cli.detect_timeout)
        .convert_timeout_secs(cli.convert_timeout);
    if let Some(token) = &cli.csrf_token {
        builder = builder.csrf_token(token.clone());
    }
    builder.build().context("Invalid configuration")
}

fn print_json(cli: &Cli, snapshot: &WorkflowSnapshot) -> Result<()> {
    if cli.json {
        let json =
            serde_json::to_string_pretty(snapshot).context("Failed to serialise workflow state")?;
        println!("{json}");
    }
    Ok(())
}

fn failure_reason(snapshot: &WorkflowSnapshot) -> String {
    snapshot
        .last_error
        .as_ref()
        .map(|e| e.message().to_string())
        .unwrap_or_else(|| format!("workflow ended in phase {}", snapshot.phase))
}
