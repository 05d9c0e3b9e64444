//! lingomerge command-line tool.
//!
//! Resolves translation merge conflicts in a documentation repository:
//! scans for conflict blocks, keeps existing translations that are still
//! close to the English source, and re-translates the rest through an LLM
//! API. Also provides subcommands for listing conflicts, checking the
//! language heuristics, and generating / validating configuration files.

mod output;
mod style;

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::ProgressBar;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use lingomerge_core::{
    AppConfig, ConflictProcessor, Language, LanguageDetector, OpenAiClient, PauseGate, RunSummary,
    Scanner,
};

const DEFAULT_CONFIG_PATH: &str = "~/.config/lingomerge/config.toml";

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Resolve translation merge conflicts with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "lingomerge",
    version,
    about = "Resolve merge conflicts between English docs and their translations"
)]
struct Cli {
    /// Path to the TOML configuration file [default: ~/.config/lingomerge/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve every conflict under a codebase.
    Resolve {
        /// Root of the documentation repository.
        codebase: PathBuf,

        /// Target language code or name (fr, es, de, ja, ...).
        #[arg(short, long)]
        language: Language,

        /// Decide and show diffs without writing files.
        #[arg(long)]
        dry_run: bool,

        /// Process at most this many files with conflicts.
        #[arg(long)]
        limit: Option<usize>,

        /// dotenv file holding the API key.
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Conflicts of one file processed concurrently.
        #[arg(long)]
        workers: Option<usize>,

        /// Write a JSON run report to this path.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Do not ask for confirmation before writing files.
        #[arg(short, long)]
        yes: bool,
    },

    /// List conflicts without calling the API.
    Scan {
        /// Root of the documentation repository.
        codebase: PathBuf,

        /// List at most this many files.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show how the language heuristics judge a text.
    CheckLanguage {
        /// Target language code or name.
        #[arg(short, long)]
        language: Language,

        /// Text to check; read from stdin when omitted.
        text: Option<String>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./lingomerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // The log file comes from the config, so load it before tracing starts.
    let config = load_config(cli.config.as_deref());
    let log_file = config
        .as_ref()
        .ok()
        .and_then(|c| c.logging.file.clone());
    let _guard = match init_tracing(cli.verbose, log_file.as_deref(), !cli.no_color) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!(command = ?cli.command, "starting");

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Result<AppConfig>) -> Result<()> {
    let color = !cli.no_color;
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(cli.config.as_deref()),
        Commands::CheckLanguage { language, text } => cmd_check_language(language, text),
        Commands::Scan { codebase, limit } => cmd_scan(&config?, &codebase, limit, color),
        Commands::Resolve {
            codebase,
            language,
            dry_run,
            limit,
            env_file,
            workers,
            report,
            yes,
        } => {
            let mut config = config?;
            if let Some(workers) = workers {
                config.processing.workers = workers;
            }
            let opts = ResolveOptions {
                codebase,
                language,
                dry_run,
                limit,
                env_file,
                report,
                yes,
                color,
            };
            cmd_resolve(config, opts).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config & logging helpers
// ---------------------------------------------------------------------------

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// An explicit path must exist; the default location is optional.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from_file(expand_tilde(path))
            .context("failed to load configuration file")?,
        None => AppConfig::load_or_default(expand_tilde(Path::new(DEFAULT_CONFIG_PATH)))
            .context("failed to load default configuration file")?,
    };
    Ok(config)
}

fn init_tracing(verbose: u8, log_file: Option<&Path>, ansi: bool) -> Result<Option<WorkerGuard>> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .without_time();

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = expand_tilde(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid log file path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to initialise logging")?;
    Ok(guard)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

struct ResolveOptions {
    codebase: PathBuf,
    language: Language,
    dry_run: bool,
    limit: Option<usize>,
    env_file: Option<PathBuf>,
    report: Option<PathBuf>,
    yes: bool,
    color: bool,
}

async fn cmd_resolve(mut config: AppConfig, opts: ResolveOptions) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let env_file = opts.env_file.as_deref().map(expand_tilde);
    config
        .resolve_credentials(env_file.as_deref())
        .context("missing API credential")?;
    let api_key = config
        .llm
        .api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("API credential was not resolved"))?;

    let codebase = expand_tilde(&opts.codebase);
    let files = Scanner::new(&codebase, &config.scan)
        .scan(opts.limit)
        .context("failed to scan codebase")?;

    println!();
    if files.is_empty() {
        println!("{}", style::success("No conflicts found"));
        println!();
        return Ok(());
    }
    let total: usize = files.iter().map(|f| f.conflict_count()).sum();
    info!(files = files.len(), conflicts = total, dry_run = opts.dry_run, "starting resolve");
    println!(
        "{}",
        style::header(&format!(
            "{} conflict(s) in {} file(s), target {} ({})",
            total,
            files.len(),
            opts.language.name(),
            opts.language.code()
        ))
    );
    if opts.dry_run {
        println!("{}", style::dim("Dry run: no files will be written."));
    }
    println!();

    if !opts.dry_run && !opts.yes && std::io::stdin().is_terminal() {
        let confirmed = Confirm::new()
            .with_prompt(format!("Resolve and rewrite {} file(s)?", files.len()))
            .default(true)
            .interact()
            .context("failed to read confirmation")?;
        if !confirmed {
            println!("{}", style::warn("Cancelled. No file was modified."));
            return Ok(());
        }
    }

    let client = OpenAiClient::new(&config.llm, api_key).context("failed to create API client")?;
    let bar = output::progress_bar(total as u64);
    let gate = PauseGate::new();
    if std::io::stdin().is_terminal() {
        println!("{}", style::dim("Type p and press Enter to pause or resume."));
        spawn_pause_listener(gate.clone(), bar.clone());
    }
    let observer_bar = bar.clone();
    let processor = ConflictProcessor::new(Arc::new(client), opts.language, &config)
        .dry_run(opts.dry_run)
        .with_pause_gate(gate.clone())
        .with_observer(move |rel_path, outcome| {
            observer_bar.println(output::outcome_line(rel_path, outcome));
            observer_bar.inc(1);
        });

    let mut summary = RunSummary::new(opts.language.code(), opts.dry_run);
    for file in &files {
        gate.wait().await;
        bar.set_message(file.rel_path.clone());
        let mut report = processor.process_file(file).await;

        if let Some(err) = &report.write_error {
            bar.println(style::error(&format!("{}: {}", report.rel_path, err)));
        }
        if let Some(diff) = output::file_diff(&report) {
            bar.suspend(|| println!("{}\n", diff));
        }
        report.discard_content();
        summary.record(report);
    }
    bar.finish_and_clear();
    summary.finish();

    println!();
    println!("{}", output::summary_table(&summary, opts.color));
    println!(
        "{}",
        style::dim(&format!(
            "Finished in {:.1}s ({:.2} conflicts/s)",
            summary.elapsed_ms as f64 / 1000.0,
            summary.rate()
        ))
    );
    let changed: Vec<&str> = summary.changed_files().collect();
    if !changed.is_empty() {
        println!();
        println!(
            "{}",
            style::header(if summary.dry_run {
                "Files that would be written:"
            } else {
                "Files written:"
            })
        );
        for path in changed {
            println!("  {}", path);
        }
    }
    if summary.failed > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} conflict(s) kept their markers for manual review",
                summary.failed
            ))
        );
    }

    if let Some(path) = &opts.report {
        let json = summary.to_json().context("failed to serialise report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("{}", style::success(&format!("Report written to {}", path.display())));
    }
    println!();

    Ok(())
}

/// Whether a line typed during `resolve` toggles the pause.
fn is_pause_command(line: &str) -> bool {
    matches!(
        line.trim().to_ascii_lowercase().as_str(),
        "p" | "pause" | "resume"
    )
}

/// Read stdin lines on a background thread, toggling `gate` on each pause
/// command. The thread ends with the process.
fn spawn_pause_listener(gate: PauseGate, bar: ProgressBar) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if !is_pause_command(&line) {
                continue;
            }
            if gate.toggle() {
                bar.println(style::warn("Paused. Type p and press Enter to resume."));
            } else {
                bar.println(style::success("Resumed."));
            }
        }
    });
}

fn cmd_scan(config: &AppConfig, codebase: &Path, limit: Option<usize>, color: bool) -> Result<()> {
    let files = Scanner::new(expand_tilde(codebase), &config.scan)
        .scan(limit)
        .context("failed to scan codebase")?;

    println!();
    if files.is_empty() {
        println!("{}", style::success("No conflicts found"));
        println!();
        return Ok(());
    }

    let total: usize = files.iter().map(|f| f.conflict_count()).sum();
    println!(
        "{}",
        style::header(&format!("Conflicts ({} in {} files)", total, files.len()))
    );
    println!();
    println!("{}", output::scan_table(&files, color));
    for file in &files {
        for warning in &file.document.warnings {
            println!(
                "{}",
                style::warn(&format!("{}:{}: {}", file.rel_path, warning.line, warning.message))
            );
        }
    }
    println!();
    Ok(())
}

fn cmd_check_language(language: Language, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read text from stdin")?;
            buf
        }
    };

    let detector = LanguageDetector::new(language);
    let score = detector.score(&text);
    let verdict = |ok: bool| if ok { style::success("yes") } else { style::error("no") };

    println!();
    println!("{}", style::header(&format!("Language check ({})", language.name())));
    println!();
    println!("  Looks like code    : {}", LanguageDetector::looks_like_code(&text));
    println!(
        "  Needs translation  : {}",
        LanguageDetector::needs_translation(&text)
    );
    println!(
        "  Words judged       : {} ({} {}, {} English)",
        score.words,
        score.target,
        language.code(),
        score.english
    );
    println!(
        "  Appears translated : {}",
        verdict(detector.appears_translated(&text))
    );
    let translatable = LanguageDetector::translatable_text(&text);
    if !translatable.is_empty() {
        println!();
        println!("  {}", style::dim("Translatable text:"));
        for line in translatable.lines() {
            println!("    {}", line);
        }
    }
    println!();
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        if !std::io::stdin().is_terminal() {
            anyhow::bail!(
                "file already exists: {}. Use a different path or remove the existing file.",
                output.display()
            );
        }
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output.display()))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;
        if !overwrite {
            println!(
                "{}",
                style::warn("Init cancelled. Existing file was not modified.")
            );
            return Ok(());
        }
    }

    if let Some(dir) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).context("failed to create config directory")?;
    }
    std::fs::write(output, AppConfig::default_template()).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Adjust the model, file extensions and ignore patterns");
    println!("  2. Export the API key (OPENAI_API_KEY) or keep it in a .env file");
    println!(
        "  3. Validate with: lingomerge validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview a run: lingomerge resolve <docs> --language fr --dry-run --config {}",
        output.display()
    );
    Ok(())
}

fn cmd_validate(config_path: Option<&Path>) -> Result<()> {
    let path = expand_tilde(config_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH)));
    println!("Validating configuration: {}", path.display());
    println!();

    let mut config = AppConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    match config.validate() {
        Ok(()) => println!("  [OK] All values are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    // A missing key is reported, not fatal, here.
    let credential = match config.resolve_credentials(None) {
        Ok(()) => "set",
        Err(_) => "NOT SET",
    };

    println!();
    println!("Configuration summary:");
    println!("  API URL       : {}", config.llm.api_url);
    println!("  Model         : {}", config.llm.model);
    println!("  Temperature   : {}", config.llm.temperature);
    println!("  API key       : {} ({})", credential, config.llm.api_key_env);
    println!("  Extensions    : {}", config.scan.extensions.join(", "));
    println!("  Ignored       : {}", config.scan.ignore_patterns.len());
    println!("  Incoming side : {:?}", config.conflicts.incoming_side);
    println!("  Workers       : {}", config.processing.workers);
    println!("  Rate limit    : {}ms", config.processing.rate_limit_ms);
    println!();
    println!("Configuration is valid.");
    Ok(())
}
