//! CLI binary for foodcontact-audit.
//!
//! A thin shim over the library crate that maps CLI flags to `AuditConfig`
//! and `AuditContext`, and prints the resulting report.

use anyhow::{Context, Result};
use clap::Parser;
use foodcontact_audit::{
    encode_all, submit_audit, write_report, AuditConfig, AuditContext, AuditProgressCallback,
    PdfiumEngine, ProgressCallback, RawAttachment, VerdictSchema,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while evidence is prepared and the backend
/// is thinking, plus one log line per attachment.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading evidence…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl AuditProgressCallback for CliProgressCallback {
    fn on_audit_start(&self, attachments: usize) {
        self.bar.set_message(format!("{attachments} attachment(s)"));
    }

    fn on_attachment_prepared(&self, index: usize, name: &str, pages: usize) {
        self.bar.println(format!(
            "  {} Attachment {}  {:<32}  {}",
            green("✓"),
            index,
            name,
            dim(&format!("{pages} image(s)")),
        ));
    }

    fn on_attachment_degraded(&self, index: usize, name: &str, reason: &str) {
        let msg = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} Attachment {}  {:<32}  {}",
            yellow("⚠"),
            index,
            name,
            yellow(&msg),
        ));
    }

    fn on_backend_call(&self, attempt: u32) {
        self.bar.set_prefix("Auditing");
        if attempt == 0 {
            self.bar.set_message("waiting for the model…");
        } else {
            self.bar.set_message(format!("retry {attempt}…"));
        }
    }

    fn on_audit_complete(&self, success: bool) {
        self.bar.finish_and_clear();
        if success {
            eprintln!("{} Audit complete", green("✔"));
        } else {
            eprintln!("{} Audit failed", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Audit a gasket from its datasheet
  food-audit --material "Junta EPDM 70" --use "Contacto con leche a 80 °C" \
      --file ficha.pdf

  # Several pieces of evidence (max 3), report to a file
  food-audit --material "Cinta PU" --file ficha.pdf --file foto.jpg -o informe.md

  # Raw JSON verdict
  food-audit --material "Bandeja PP" --notes "Sin DoC" --json

  # Use another provider through edgequake-llm
  food-audit --provider anthropic --model claude-sonnet-4-20250514 --file doc.pdf

  # Print the verdict schema and exit
  food-audit --dump-schema

ENVIRONMENT VARIABLES:
  FOOD_AUDIT_API_KEY   API key for the OpenAI-compatible endpoint
  OPENAI_API_KEY       Fallback API key
  FOOD_AUDIT_BASE_URL  OpenAI-compatible base URL (default: https://api.openai.com/v1)
  FOOD_AUDIT_MODEL     Model ID (default: gpt-4o)
  PDFIUM_LIB_PATH      Path to libpdfium (file or directory)
"#;

/// Audit food-contact suitability of a material with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "food-audit",
    version,
    about = "Audit food-contact suitability of industrial materials with a vision LLM",
    long_about = "Send a material's name, intended use, notes and up to three pieces of \
evidence (PDF datasheets, declarations of conformity, photos) to a vision LLM and get a \
structured verdict for direct and indirect food contact.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Commercial name or reference of the material.
    #[arg(short, long)]
    material: Option<String>,

    /// Intended use / application of the part.
    #[arg(short = 'u', long = "use")]
    intended_use: Option<String>,

    /// Free-form technical notes (temperatures, media, certificates…).
    #[arg(short, long)]
    notes: Option<String>,

    /// Evidence file (PDF or image). Repeat for several files.
    #[arg(short, long = "file")]
    files: Vec<PathBuf>,

    /// Write the report to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4o, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "FOOD_AUDIT_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "FOOD_AUDIT_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "FOOD_AUDIT_BASE_URL")]
    base_url: Option<String>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "FOOD_AUDIT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide = true, hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Retries on transient backend failure (0 = single call).
    #[arg(long, env = "FOOD_AUDIT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Max LLM output tokens.
    #[arg(long, env = "FOOD_AUDIT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Backend call timeout in seconds.
    #[arg(long, env = "FOOD_AUDIT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Output the report as JSON instead of Markdown.
    #[arg(long)]
    json: bool,

    /// Print the verdict JSON Schema and exit.
    #[arg(long)]
    dump_schema: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json && !cli.dump_schema;
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

    // ── Schema dump ──────────────────────────────────────────────────────
    if cli.dump_schema {
        let schema = VerdictSchema::audit_report();
        println!(
            "{}",
            serde_json::to_string_pretty(schema.as_json()).context("Failed to serialise schema")?
        );
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AuditProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Attachments ──────────────────────────────────────────────────────
    if cli.files.len() > config.max_attachments {
        anyhow::bail!(
            "At most {} attachments per audit (got {})",
            config.max_attachments,
            cli.files.len()
        );
    }

    let batch = encode_all(cli.files.iter().cloned().map(RawAttachment::from_path).collect()).await;
    for rejected in &batch.rejected {
        eprintln!("{} {}", yellow("⚠"), rejected);
    }

    if batch.accepted.iter().any(|f| f.is_pdf()) {
        PdfiumEngine::new(config.pdfium_lib_path.clone())
            .ensure_available()
            .context("PDF attachments need the pdfium library")?;
    }

    let mut context = AuditContext::new();
    if let Some(ref m) = cli.material {
        context = context.material_name(m);
    }
    if let Some(ref u) = cli.intended_use {
        context = context.intended_use(u);
    }
    if let Some(ref n) = cli.notes {
        context = context.technical_data(n);
    }
    for payload in batch.accepted {
        context = context.attachment(payload);
    }

    // ── Run audit ────────────────────────────────────────────────────────
    let start = Instant::now();
    let report = submit_audit(&context, &config)
        .await
        .context("Audit failed")?;

    let rendered = if cli.json {
        let mut json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        json.push('\n');
        json
    } else {
        report.to_markdown(context.material())
    };

    if let Some(ref output_path) = cli.output {
        write_report(output_path, &rendered)
            .await
            .context("Failed to write report")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} / {}  {}ms  →  {}",
                green("✔"),
                report.direct_contact_verdict,
                report.indirect_contact_verdict,
                start.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

/// Map CLI args to `AuditConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AuditConfig> {
    let mut builder = AuditConfig::builder()
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout);

    if let Some(key) = cli.api_key.as_ref().or(cli.openai_api_key.as_ref()) {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
