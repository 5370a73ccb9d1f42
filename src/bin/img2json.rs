//! CLI binary for edgequake-img2json.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints or writes the consolidated JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_img2json::pipeline::input::resolve_inputs;
use edgequake_img2json::{
    batch_artifact_name, extract_inputs, provider, write_json_artifact, Backend, BatchOutput,
    BatchProgressCallback, DetectorKind, ExtractionConfig, OcrSettings, ProgressCallback,
    SchemaCatalog,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch and a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the file currently being extracted.
    file_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_files} image(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, filename: &str) {
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, filename: &str, entries: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            filename,
            dim(&format!("{entries} entries")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let secs = self.elapsed_secs();
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} image(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) extracted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Free-form extraction of one scan (stdout)
  img2json invoice.png

  # Conform to a schema from ./schemas and save the batch
  img2json --schema invoice scans/ -o invoices.json

  # Any schema file on disk
  img2json --schema ./my_schema.json receipt.jpg

  # OCR backend: local tesseract, then a Groq text model
  img2json --backend ocr --provider groq receipt.jpg

  # Stream the reply from an OpenAI-compatible endpoint
  img2json --stream --provider groq --model meta-llama/llama-4-scout-17b-16e-instruct scan.png

  # Full batch report (entries + failures + stats)
  img2json --json scans/ > report.json

  # List the schema catalog
  img2json --list-schemas

  # JSON HTTP API
  img2json --serve 127.0.0.1:8080

PROVIDERS:
  Provider     Key variable          Default vision model
  ─────────    ──────────────────    ─────────────────────────────────────────
  openai       OPENAI_API_KEY        gpt-4.1-nano
  groq         GROQ_API_KEY          meta-llama/llama-4-scout-17b-16e-instruct
  anthropic    ANTHROPIC_API_KEY     claude-3-5-sonnet-latest
  gemini       GEMINI_API_KEY        gemini-2.0-flash
  mistral      MISTRAL_API_KEY       pixtral-12b-2409
  openrouter   OPENROUTER_API_KEY    openai/gpt-4.1-nano
  xai          XAI_API_KEY           grok-2-vision-1212
  ollama       (none)                llava
  lmstudio     (none)                local-model

ENVIRONMENT VARIABLES:
  IMG2JSON_SCHEMA_DIR     Schema catalog directory (default: schemas)
  EDGEQUAKE_LLM_PROVIDER  Override provider
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Extract structured JSON from document images using Vision LLMs or OCR.
#[derive(Parser, Debug)]
#[command(
    name = "img2json",
    version,
    about = "Extract structured JSON from document images using Vision LLMs or OCR",
    long_about = "Extract structured JSON from scanned invoices, receipts and forms \
(local files, directories or URLs). The vision backend sends each image to a vision-capable \
model; the OCR backend runs a local text detector and structures the text with a text model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image files (PNG/JPEG), directories of images, or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Extraction backend.
    #[arg(long, env = "IMG2JSON_BACKEND", value_enum, default_value = "vision")]
    backend: BackendArg,

    /// Target schema: a catalog name (see --list-schemas) or a JSON file path.
    #[arg(long, env = "IMG2JSON_SCHEMA")]
    schema: Option<String>,

    /// Directory of `*.json` schema files.
    #[arg(long, env = "IMG2JSON_SCHEMA_DIR", default_value = "schemas")]
    schema_dir: PathBuf,

    /// Print the schema catalog and exit.
    #[arg(long)]
    list_schemas: bool,

    /// Write the consolidated JSON here (a directory gets a generated name).
    #[arg(short, long, env = "IMG2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID (vision backend).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Text model ID used to structure OCR output (ocr backend).
    #[arg(long, env = "IMG2JSON_OCR_MODEL")]
    ocr_model: Option<String>,

    /// LLM provider: openai, groq, anthropic, gemini, mistral, openrouter, ollama, lmstudio.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, groq, anthropic, gemini, mistral, openrouter, xai, ollama, lmstudio."
    )]
    provider: Option<String>,

    /// Stream the vision reply over an OpenAI-compatible endpoint.
    #[arg(long, env = "IMG2JSON_STREAM")]
    stream: bool,

    /// Base URL of an OpenAI-compatible endpoint.
    #[arg(long, env = "IMG2JSON_API_BASE")]
    api_base: Option<String>,

    /// API key (default: the provider's key variable).
    #[arg(long, env = "IMG2JSON_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Max completion tokens for the vision call.
    #[arg(long, env = "IMG2JSON_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Vision sampling temperature (0.0–2.0).
    #[arg(long, env = "IMG2JSON_TEMPERATURE", default_value_t = 1.0)]
    temperature: f32,

    /// Local text detector (ocr backend).
    #[arg(long, env = "IMG2JSON_DETECTOR", value_enum, default_value = "tesseract")]
    detector: DetectorArg,

    /// Tesseract language codes joined with `+`.
    #[arg(long, env = "IMG2JSON_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract")]
    tesseract_bin: PathBuf,

    /// oar-ocr text detection model (ONNX).
    #[arg(long, env = "OAR_DET_MODEL")]
    oar_det_model: Option<PathBuf>,

    /// oar-ocr text recognition model (ONNX).
    #[arg(long, env = "OAR_REC_MODEL")]
    oar_rec_model: Option<PathBuf>,

    /// oar-ocr character dictionary.
    #[arg(long, env = "OAR_DICT")]
    oar_dict: Option<PathBuf>,

    /// Print the full batch report (entries, failures, stats) instead of the extracted JSON.
    #[arg(long, env = "IMG2JSON_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "IMG2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "IMG2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "IMG2JSON_QUIET")]
    quiet: bool,

    /// Serve the JSON HTTP API on this address instead of extracting.
    #[cfg(feature = "server")]
    #[arg(long, value_name = "ADDR")]
    serve: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "IMG2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Request timeout for the streaming transport in seconds.
    #[arg(long, env = "IMG2JSON_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Vision,
    Ocr,
}

impl From<BackendArg> for Backend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Vision => Backend::Vision,
            BackendArg::Ocr => Backend::Ocr,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DetectorArg {
    Tesseract,
    Oar,
}

impl From<DetectorArg> for DetectorKind {
    fn from(v: DetectorArg) -> Self {
        match v {
            DetectorArg::Tesseract => DetectorKind::Tesseract,
            DetectorArg::Oar => DetectorKind::Oar,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !is_serving(&cli);
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

    // ── Schema catalog listing ───────────────────────────────────────────
    if cli.list_schemas {
        let catalog = SchemaCatalog::load(&cli.schema_dir)
            .with_context(|| format!("Failed to read schema directory {:?}", cli.schema_dir))?;
        if catalog.is_empty() {
            eprintln!("No schemas in {}", catalog.dir().display());
        }
        for name in catalog.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // Fail before touching any input when no key is configured.
    provider::ensure_credentials(&config).context("Cannot start")?;

    #[cfg(feature = "server")]
    if let Some(ref addr) = cli.serve {
        return edgequake_img2json::server::serve(addr, config)
            .await
            .context("Server failed");
    }

    if cli.inputs.is_empty() {
        anyhow::bail!("No inputs given. Pass image files, directories or URLs.");
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let files = resolve_inputs(&cli.inputs, config.download_timeout_secs)
        .await
        .context("Failed to read inputs")?;
    let output = extract_inputs(&files, &config)
        .await
        .context("Extraction failed")?;
    let value = result_value(&output, cli.json)?;

    if let Some(ref out) = cli.output {
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        let path = output_path(out, &names);
        write_json_artifact(&path, &value)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} files  {} entries  {}ms  →  {}",
                if output.stats.failed_files == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                output.stats.total_files - output.stats.failed_files,
                output.stats.total_files,
                output.entries.len(),
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else {
        let json = serde_json::to_string_pretty(&value).context("Failed to serialise output")?;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Extracted {}/{} files in {}ms",
            output.stats.total_files - output.stats.failed_files,
            output.stats.total_files,
            output.stats.total_duration_ms
        );
        if output.stats.invalid_json_files > 0 {
            eprintln!(
                "  {} file(s) returned invalid JSON",
                output.stats.invalid_json_files
            );
        }
    }
    for failure in &output.failures {
        if !cli.quiet {
            eprintln!("  {} {}", red("✗"), failure);
        }
    }

    Ok(())
}

#[cfg(feature = "server")]
fn is_serving(cli: &Cli) -> bool {
    cli.serve.is_some()
}

#[cfg(not(feature = "server"))]
fn is_serving(_cli: &Cli) -> bool {
    false
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let ocr = OcrSettings {
        detector: cli.detector.into(),
        languages: cli.ocr_lang.clone(),
        tesseract_binary: cli.tesseract_bin.clone(),
        det_model: cli.oar_det_model.clone(),
        rec_model: cli.oar_rec_model.clone(),
        dict_path: cli.oar_dict.clone(),
    };

    let mut builder = ExtractionConfig::builder()
        .backend(cli.backend.into())
        .stream(cli.stream)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .ocr(ocr)
        .schema_dir(cli.schema_dir.clone())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref m) = cli.ocr_model {
        builder = builder.ocr_model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref s) = cli.schema {
        builder = builder.schema(s);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// What gets printed or written: the full report with `--json`, otherwise
/// the single document or the consolidated array.
fn result_value(output: &BatchOutput, report: bool) -> Result<Value> {
    if report {
        serde_json::to_value(output).context("Failed to serialise output")
    } else {
        Ok(output.to_download_value())
    }
}

/// `out` itself, or a generated file name inside it when it is a directory.
fn output_path(out: &Path, names: &[&str]) -> PathBuf {
    if out.is_dir() {
        out.join(batch_artifact_name(names))
    } else {
        out.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_img2json::{ExtractedDocument, ExtractionResult, InputFile};
    use serde_json::json;

    async fn run(names: &[&str], replies: &[Value]) -> BatchOutput {
        struct Fixed(Vec<(String, Value)>);

        #[async_trait::async_trait]
        impl edgequake_img2json::Extractor for Fixed {
            fn backend(&self) -> Backend {
                Backend::Vision
            }
            fn describe(&self) -> String {
                "fixed".into()
            }
            async fn extract(
                &self,
                image: &InputFile,
                _schema: Option<&str>,
            ) -> Result<String, edgequake_img2json::ExtractError> {
                let (_, v) = self.0.iter().find(|(n, _)| *n == image.filename).unwrap();
                Ok(v.to_string())
            }
        }

        let png = {
            let img = image::DynamicImage::new_rgb8(2, 2);
            let mut buf = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };
        let files: Vec<InputFile> = names
            .iter()
            .map(|n| InputFile::from_bytes(*n, png.clone()).unwrap())
            .collect();
        let ex = Fixed(
            names
                .iter()
                .map(|n| n.to_string())
                .zip(replies.iter().cloned())
                .collect(),
        );
        edgequake_img2json::run_batch(&files, &ex, None, None).await
    }

    #[tokio::test]
    async fn single_file_prints_its_document() {
        let out = run(&["invoice.png"], &[json!({"total": 42})]).await;
        assert_eq!(result_value(&out, false).unwrap(), json!({"total": 42}));
        assert_eq!(
            out.documents[0].result,
            ExtractionResult::Document(ExtractedDocument::from_value(json!({"total": 42})))
        );
    }

    #[tokio::test]
    async fn batch_prints_tagged_array() {
        let out = run(&["a.png", "b.png"], &[json!({"n": 1}), json!({"n": 2})]).await;
        assert_eq!(
            result_value(&out, false).unwrap(),
            json!([
                {"n": 1, "source_file": "a.png"},
                {"n": 2, "source_file": "b.png"},
            ])
        );
    }

    #[tokio::test]
    async fn report_mode_keeps_stats_and_failures() {
        let out = run(&["a.png"], &[json!({"n": 1})]).await;
        let v = result_value(&out, true).unwrap();
        assert_eq!(v["stats"]["total_files"], 1);
        assert!(v["failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn output_path_names_file_inside_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            output_path(dir.path(), &["scan.jpg"]),
            dir.path().join("extract_scan.json")
        );
        let file = dir.path().join("out.json");
        assert_eq!(output_path(&file, &["a.png", "b.png"]), file);
    }
}
