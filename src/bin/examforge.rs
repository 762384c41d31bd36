//! CLI binary for examforge.
//!
//! A thin shim over the library crate: maps subcommand flags to
//! `ExtractionConfig` / `GenerationConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use examforge::{
    extract, finalize_problem, generate_from_document, is_valid, repair_mcq, resolve_client,
    Difficulty, ExtractionConfig, ExtractionLayout, ExtractionResult, GeneratedProblem,
    GenerationConfig, GenerationProgressCallback, GenerationQueue, InMemoryDocumentStore,
    ProblemKind, ProgressCallback, VocabularyPipeline, VocabularyVariant,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for the vocabulary pipeline: a spinner naming the
/// current attempt and model, with one log line per failure or repair.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Generating");
        bar.set_message("waiting for the queue…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32, model: &str) {
        self.bar
            .set_message(format!("attempt {attempt}/{max_attempts}  {}", dim(model)));
    }

    fn on_attempt_failed(&self, attempt: u32, reason: &str) {
        // Truncate very long reasons to keep output tidy.
        let msg: String = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar
            .println(format!("  {} attempt {:>2}  {}", red("✗"), attempt, red(&msg)));
    }

    fn on_repair(&self, attempt: u32, remaining_budget: u32) {
        self.bar.println(format!(
            "  {} attempt {:>2}  repairing payload  {}",
            cyan("↻"),
            attempt,
            dim(&format!("{remaining_budget} repair(s) left")),
        ));
    }

    fn on_complete(&self, attempts: u32) {
        self.bar.println(format!(
            "  {} problem ready after {} attempt(s)",
            green("✓"),
            attempts
        ));
        self.bar.set_message("next passage…");
    }

    fn on_exhausted(&self, attempts: u32, _last_reason: &str) {
        self.bar.println(format!(
            "  {} gave up after {} attempts",
            red("✘"),
            attempts
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the passages in an exam PDF
  examforge extract midterm.pdf

  # Extraction result as JSON, page-keyed layout forced
  examforge extract --layout mini --json olympos.txt -o passages.json

  # Sentence-order problems for every passage (no API key needed)
  examforge generate midterm.pdf --kind order --difficulty advanced

  # One vocabulary problem for passage 3
  examforge generate midterm.pdf --kind vocabulary --variant appropriate --passage 3

  # Check (and fix) problems before importing them
  examforge validate problems.json --repair

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (otherwise ./ then the system library)
"#;

/// Extract English passages from exam PDFs and generate practice problems.
#[derive(Parser, Debug)]
#[command(
    name = "examforge",
    version,
    about = "Extract exam passages and generate English practice problems",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXAMFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXAMFORGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract passages from a PDF, text dump or URL.
    Extract(ExtractArgs),
    /// Generate problems from the passages of a PDF, text dump or URL.
    Generate(GenerateArgs),
    /// Check problem JSON (one object or an array) against the validator.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Local PDF / text file path or HTTP/HTTPS URL.
    input: String,

    /// Layout parser: auto, structured, mini.
    #[arg(long, env = "EXAMFORGE_LAYOUT", value_enum, default_value = "auto")]
    layout: ExtractionLayout,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "EXAMFORGE_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EXAMFORGE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output the ExtractionResult as JSON.
    #[arg(long)]
    json: bool,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "EXAMFORGE_OUTPUT")]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Order,
    Insertion,
    Vocabulary,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VariantArg {
    Inappropriate,
    Appropriate,
}

impl From<VariantArg> for VocabularyVariant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Inappropriate => VocabularyVariant::inappropriate(),
            VariantArg::Appropriate => VocabularyVariant::appropriate(),
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Problem type.
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Order-problem difficulty: basic (3 sentences) or advanced (5).
    #[arg(long, value_enum, default_value = "basic")]
    difficulty: Difficulty,

    /// Vocabulary variant.
    #[arg(long, value_enum, default_value = "inappropriate")]
    variant: VariantArg,

    /// 1-based passage number; all passages when omitted.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    passage: Option<u32>,

    /// Base model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Model used from the third attempt on.
    #[arg(long, env = "EXAMFORGE_PREMIUM_MODEL")]
    premium_model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Outer attempts per vocabulary problem.
    #[arg(long, env = "EXAMFORGE_MAX_ATTEMPTS", default_value_t = 6)]
    max_attempts: u32,

    /// Queue retries per model call.
    #[arg(long, env = "EXAMFORGE_RETRIES", default_value_t = 3)]
    retries: u32,

    /// Output JSON instead of plain text.
    #[arg(long)]
    json: bool,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long, env = "EXAMFORGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Disable the progress spinner.
    #[arg(long, env = "EXAMFORGE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// JSON file with one problem or an array of problems.
    file: PathBuf,

    /// Repair invalid multiple-choice problems and print the result.
    #[arg(long)]
    repair: bool,
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

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.quiet).await,
        Command::Generate(args) => run_generate(args, cli.quiet).await,
        Command::Validate(args) => run_validate(args).await,
    }
}

fn extraction_config(source: &SourceArgs) -> ExtractionConfig {
    let mut builder = ExtractionConfig::builder()
        .layout(source.layout)
        .download_timeout_secs(source.download_timeout);
    if let Some(ref pwd) = source.password {
        builder = builder.password(pwd.clone());
    }
    builder.build()
}

async fn load(source: &SourceArgs) -> Result<ExtractionResult> {
    extract(&source.input, &extraction_config(source))
        .await
        .with_context(|| format!("Extraction failed for {}", source.input))
}

async fn emit_json<T: serde::Serialize>(value: &T, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => examforge::extract::write_json(path, value)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
            println!("{json}");
            Ok(())
        }
    }
}

// ── extract ──────────────────────────────────────────────────────────────────

async fn run_extract(args: ExtractArgs, quiet: bool) -> Result<()> {
    let result = load(&args.source).await?;

    if args.json || args.output.is_some() {
        emit_json(&result, args.output.as_ref()).await?;
        if let (Some(path), false) = (&args.output, quiet) {
            eprintln!(
                "{}  {} passages  →  {}",
                green("✔"),
                result.passages.len(),
                bold(&path.display().to_string())
            );
        }
        return Ok(());
    }

    println!("{}", bold(if result.title.is_empty() { "(untitled)" } else { result.title.as_str() }));
    for p in &result.passages {
        let preview: String = p.passage.chars().take(72).collect();
        println!(
            "{:>3}. {:<22} {}  {}",
            p.problem_number,
            cyan(&p.source),
            dim(&format!("p{}", p.page)),
            preview
        );
    }
    if !quiet {
        eprintln!(
            "{} {} passages from {} pages ({:?} layout)",
            green("✔"),
            result.passages.len(),
            result.metadata.total_pages,
            result.metadata.parser
        );
    }
    Ok(())
}

// ── generate ─────────────────────────────────────────────────────────────────

async fn run_generate(args: GenerateArgs, quiet: bool) -> Result<()> {
    let result = load(&args.source).await?;
    if result.passages.is_empty() {
        anyhow::bail!("No passages found in {}", args.source.input);
    }

    let store = InMemoryDocumentStore::new();
    let doc_id = store.insert_extraction(&result);

    let kind = match args.kind {
        KindArg::Order => ProblemKind::Order(args.difficulty),
        KindArg::Insertion => ProblemKind::Insertion,
        KindArg::Vocabulary => ProblemKind::Vocabulary(args.variant.into()),
    };

    let pipeline = if matches!(kind, ProblemKind::Vocabulary(_)) {
        let progress: Option<ProgressCallback> = if quiet || args.no_progress || args.json {
            None
        } else {
            Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
        };
        Some(build_pipeline(&args, progress)?)
    } else {
        None
    };

    let indices: Vec<usize> = match args.passage {
        Some(n) => vec![n as usize - 1],
        None => (0..result.passages.len()).collect(),
    };

    let mut generated: Vec<GeneratedProblem> = Vec::with_capacity(indices.len());
    let mut failures = 0usize;
    for idx in indices {
        match generate_from_document(&store, doc_id, idx, &kind, pipeline.as_ref()).await {
            Ok(g) => generated.push(g),
            Err(e) => {
                failures += 1;
                eprintln!("{} passage {}: {}", red("✗"), idx + 1, e);
            }
        }
    }

    if args.json || args.output.is_some() {
        emit_json(&generated, args.output.as_ref()).await?;
    } else {
        for (n, g) in generated.iter().enumerate() {
            println!("{}", bold(&format!("[{}] {} problem", n + 1, g.problem.kind)));
            println!("{}", g.problem.question);
            for opt in g.problem.options.iter().flatten() {
                println!("  {opt}");
            }
            println!("{} {}\n", dim("answer:"), g.problem.answer);
        }
    }

    if !quiet {
        eprintln!(
            "{} {} problem(s) generated{}",
            if failures == 0 { green("✔") } else { cyan("⚠") },
            generated.len(),
            if failures > 0 {
                format!(", {} failed", red(&failures.to_string()))
            } else {
                String::new()
            }
        );
    }
    if generated.is_empty() {
        anyhow::bail!("No problems could be generated");
    }
    Ok(())
}

fn build_pipeline(args: &GenerateArgs, progress: Option<ProgressCallback>) -> Result<VocabularyPipeline> {
    let mut builder = GenerationConfig::builder()
        .max_attempts(args.max_attempts)
        .retries(args.retries);
    if let Some(ref m) = args.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref m) = args.premium_model {
        builder = builder.premium_model(m.clone());
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // Fail fast here; a library caller would keep an empty ClientSlot instead.
    let client = resolve_client(&config).context("No model client available")?;
    let queue = GenerationQueue::new(Arc::new(move || Some(Arc::clone(&client))), config.retry);
    Ok(VocabularyPipeline::new(queue, config))
}

// ── validate ─────────────────────────────────────────────────────────────────

async fn run_validate(args: ValidateArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let parsed: Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;
    let problems = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut invalid = 0usize;
    let mut out: Vec<Value> = Vec::with_capacity(problems.len());
    for (n, problem) in problems.into_iter().enumerate() {
        if is_valid(&problem) {
            eprintln!("  {} #{}", green("✓"), n + 1);
            out.push(problem);
            continue;
        }
        if args.repair {
            let repaired = repair_mcq(&problem);
            let typed = serde_json::from_value(repaired.clone())
                .ok()
                .and_then(|p| finalize_problem(p).ok());
            if typed.is_some() {
                eprintln!("  {} #{} repaired", cyan("↻"), n + 1);
                out.push(repaired);
                continue;
            }
        }
        eprintln!("  {} #{} invalid", red("✗"), n + 1);
        invalid += 1;
        out.push(problem);
    }

    if args.repair {
        emit_json(&out, None).await?;
    }
    if invalid > 0 {
        anyhow::bail!("{invalid} problem(s) failed validation");
    }
    Ok(())
}
