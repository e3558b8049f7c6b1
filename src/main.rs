//! PII/PHI Redaction CLI Application.
//!
//! This binary provides a command-line interface for the phi-redactor
//! library: one-shot redaction of a file, text extraction for debugging, and
//! the HTTP job service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use phi_redactor::detection::literal::LiteralTerm;
use phi_redactor::replacement::{OpenRouterConfig, OpenRouterGenerator};
use phi_redactor::{
    DetectionEngine, FallbackGenerator, GenerationLimits, Generator, JobRegistry, LiteralDetector,
    NoProgress, RedactionPipeline, RedactionPolicy, TextRedactionMode, VisualRedactionMode,
};

/// PII/PHI PDF Redaction Tool
///
/// Detect personal and health information in PDF documents and replace it
/// according to a redaction policy.
#[derive(Parser)]
#[command(name = "phi-redactor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Redact a PDF file
    Redact(RedactArgs),

    /// Extract text from a PDF (for debugging and verification)
    Extract {
        /// Input PDF file path
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output text file (optional, defaults to stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Run the HTTP job service
    Serve {
        #[arg(long, env = "PHI_REDACTOR_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "PHI_REDACTOR_PORT", default_value_t = 8000)]
        port: u16,

        /// Directory job artifacts are written to
        #[arg(long, env = "PHI_REDACTOR_JOBS_DIR", default_value = "jobs")]
        jobs_dir: PathBuf,

        /// Redaction policy file (YAML) applied to every job
        #[arg(long, value_name = "FILE")]
        policy: Option<PathBuf>,

        #[command(flatten)]
        generation: GenerationArgs,
    },
}

#[derive(clap::Args)]
struct RedactArgs {
    /// Input PDF file path
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output PDF file path
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// Write the audit overlay PDF here
    #[arg(long, value_name = "FILE")]
    overlay: Option<PathBuf>,

    /// Write the JSON redaction log here
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Redaction policy file (YAML)
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Text mode: dummy (per-type policy) or anonymize (everything)
    #[arg(long, value_name = "MODE")]
    text_mode: Option<TextRedactionMode>,

    /// Visual mode: textbox or replacement
    #[arg(long, value_name = "MODE")]
    visual_mode: Option<VisualRedactionMode>,

    /// Literal term to redact, as TYPE=TEXT (can be specified multiple times)
    #[arg(long = "term", value_name = "TYPE=TEXT")]
    terms: Vec<LiteralTerm>,

    #[command(flatten)]
    generation: GenerationArgs,
}

#[derive(clap::Args)]
struct GenerationArgs {
    /// Source of synthetic replacement values
    #[arg(long, value_enum, env = "PHI_REDACTOR_GENERATOR", default_value = "fallback")]
    generator: GeneratorKind,

    /// Maximum concurrent generator calls
    #[arg(long, env = "PHI_REDACTOR_MAX_GENERATIONS", default_value_t = 4)]
    max_generations: usize,

    /// Timeout per generator call, in seconds
    #[arg(long, env = "PHI_REDACTOR_GENERATION_TIMEOUT", default_value_t = 30)]
    generation_timeout: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GeneratorKind {
    /// Built-in offline table
    Fallback,
    /// OpenRouter chat completions (needs OPENROUTER_API_KEY)
    Openrouter,
}

impl GenerationArgs {
    fn generator(&self) -> Result<Arc<dyn Generator>> {
        Ok(match self.generator {
            GeneratorKind::Fallback => Arc::new(FallbackGenerator::new()),
            GeneratorKind::Openrouter => {
                let config = OpenRouterConfig::from_env()
                    .context("OPENROUTER_API_KEY must be set to use the openrouter generator")?;
                Arc::new(OpenRouterGenerator::new(config))
            }
        })
    }

    fn limits(&self) -> GenerationLimits {
        GenerationLimits::new(
            self.max_generations,
            Duration::from_secs(self.generation_timeout.max(1)),
        )
    }
}

/// Command handler.
struct RedactionHandler {
    verbose: bool,
}

impl RedactionHandler {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Executes a one-shot redaction.
    async fn redact(&self, args: &RedactArgs) -> Result<()> {
        if !args.input.exists() {
            anyhow::bail!("Input file does not exist: {}", args.input.display());
        }

        let policy = build_policy(args)?;
        let mut detection = DetectionEngine::with_builtin_rules();
        if !args.terms.is_empty() {
            detection = detection.with_detector(Box::new(LiteralDetector::new(args.terms.clone())));
        }
        let pipeline = RedactionPipeline::new(
            detection,
            args.generation.generator()?,
            args.generation.limits(),
        );
        if !pipeline.detects("Name") {
            warn!("no detection pass covers Name; personal names are only redacted when given with --term Name=...");
        }

        if self.verbose {
            println!("Input:  {}", args.input.display());
            println!("Output: {}", args.output.display());
            println!("Generator: {}", pipeline.generator_name());
        }

        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("Failed to read {}", args.input.display()))?;
        let input_name = file_name(&args.input);

        let output = pipeline
            .run(Arc::new(bytes), &input_name, &policy, &NoProgress)
            .await
            .with_context(|| "Redaction failed")?;

        write_file(&args.output, &output.redacted)?;
        if let (Some(path), Some(overlay)) = (&args.overlay, &output.overlay) {
            write_file(path, overlay)?;
            println!("✓ Overlay → {}", path.display());
        }
        if let Some(path) = &args.log {
            let json = output.log.to_json().context("Failed to serialize log")?;
            write_file(path, &json)?;
            println!("✓ Log → {}", path.display());
        }

        let metrics = &output.log.metrics;
        if self.verbose {
            println!("\nRedaction Summary:");
            println!("  Pages modified:   {}", output.summary.pages_modified);
            println!("  Types found:      {}", metrics.unique_pii_types);
            println!("  Visual elements:  {}", metrics.total_visual_elements);
            println!("  Degraded:         {}", metrics.degraded_replacements);
            println!("  Unresolved:       {}", metrics.unresolved_locations);
            for (pii_type, count) in &metrics.type_counts {
                println!("    {:<28} {}", pii_type, count);
            }
        }

        if metrics.total_redactions > 0 || metrics.total_visual_elements > 0 {
            println!(
                "✓ Successfully redacted {} instance(s) → {}",
                metrics.total_redactions,
                args.output.display()
            );
        } else {
            println!("⚠ No instances found to redact");
        }
        if metrics.unresolved_locations > 0 {
            println!(
                "⚠ {} instance(s) could not be located and were left in place",
                metrics.unresolved_locations
            );
        }

        Ok(())
    }

    /// Extracts text from a PDF.
    fn extract(&self, input: &Path, output: Option<&Path>) -> Result<()> {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {}", input.display());
        }

        let text = phi_redactor::extract_text_from_pdf(input)
            .with_context(|| "Text extraction failed")?;

        if let Some(output_path) = output {
            std::fs::write(output_path, &text)
                .with_context(|| format!("Failed to write to {}", output_path.display()))?;
            println!(
                "✓ Extracted {} characters → {}",
                text.len(),
                output_path.display()
            );
        } else {
            println!("{}", text);
        }

        Ok(())
    }

    /// Runs the HTTP job service.
    async fn serve(
        &self,
        host: &str,
        port: u16,
        jobs_dir: &Path,
        policy: Option<&Path>,
        generation: &GenerationArgs,
    ) -> Result<()> {
        let policy = match policy {
            Some(path) => RedactionPolicy::load(path)?,
            None => RedactionPolicy::default(),
        };
        std::fs::create_dir_all(jobs_dir)
            .with_context(|| format!("Failed to create {}", jobs_dir.display()))?;

        let pipeline = RedactionPipeline::new(
            DetectionEngine::with_builtin_rules(),
            generation.generator()?,
            generation.limits(),
        );
        if !pipeline.detects("Name") {
            warn!("no detection pass covers Name; submitted documents keep personal names");
        }
        let registry = Arc::new(JobRegistry::new(jobs_dir, Arc::new(pipeline)).with_base_policy(policy));

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
        println!("✓ Serving on http://{}", addr);
        phi_redactor::server::serve(addr, registry)
            .await
            .context("Server error")
    }
}

/// Builds the run policy: policy file, then command-line overrides.
fn build_policy(args: &RedactArgs) -> Result<RedactionPolicy> {
    let mut policy = match &args.policy {
        Some(path) => RedactionPolicy::load(path)?,
        None => RedactionPolicy::default(),
    };
    if let Some(mode) = args.text_mode {
        policy = policy.with_text_mode(mode);
    }
    if let Some(mode) = args.visual_mode {
        policy = policy.with_visual_mode(mode);
    }
    Ok(policy.with_overlay(args.overlay.is_some()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let handler = RedactionHandler::new(cli.verbose);

    match &cli.command {
        Commands::Redact(args) => handler.redact(args).await?,
        Commands::Extract { input, output } => handler.extract(input, output.as_deref())?,
        Commands::Serve {
            host,
            port,
            jobs_dir,
            policy,
            generation,
        } => {
            handler
                .serve(host, *port, jobs_dir, policy.as_deref(), generation)
                .await?
        }
    }

    Ok(())
}
