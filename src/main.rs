//! handoff: replay a recorded clinical scene and track its SBAR handoff
//!
//! Usage:
//!   handoff scenes/tension_pneumo/dialogue.jsonl
//!   handoff scene.jsonl --realtime --speed 4
//!   handoff scene.jsonl --oracle llm --extractor llm --config handoff.toml
//!   handoff --dump-config > handoff.toml

use anyhow::Context;
use clap::{Parser, ValueEnum};
use handoff_engine::config::LlmBackend;
use handoff_engine::{
    AlwaysSignificant, EngineConfig, FieldExtractor, KeywordExtractor, KeywordOracle, LlmFieldExtractor, LlmOracle,
    SignificanceOracle,
};
use handoff_llm::{AnthropicProvider, LlmProvider, OpenAiCompatProvider};
use handoff_scene::{format_record_line, HarnessOptions, ReplayOptions, SceneHarness};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OracleKind {
    Keyword,
    Always,
    Llm,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExtractorKind {
    Keyword,
    Llm,
}

#[derive(Parser)]
#[command(
    name = "handoff",
    about = "Streaming SBAR consensus and change detection over recorded clinical scenes",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Scene timeline (JSONL, one utterance per line)
    #[arg(required_unless_present = "dump_config")]
    scene: Option<PathBuf>,

    /// Evolution report destination (default: sbar_report.md next to the scene)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Clinician questions destination (default: clinician_questions.md next to the scene)
    #[arg(long)]
    questions: Option<PathBuf>,

    /// Engine config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective config as TOML and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,

    #[arg(long, value_enum, default_value = "keyword")]
    oracle: OracleKind,

    #[arg(long, value_enum, default_value = "keyword")]
    extractor: ExtractorKind,

    /// Honor the gaps between utterances
    #[arg(long, default_value_t = false)]
    realtime: bool,

    /// Playback speed multiplier (only with --realtime)
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Skip utterances that ended before this scene offset (seconds)
    #[arg(long, default_value_t = 0.0)]
    start_offset: f64,

    /// Directory of protocol YAML documents
    #[arg(long, default_value = "data/emergencies")]
    library_dir: PathBuf,

    /// Protocol registry index (default: registry.yaml in the library dir)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Write the observation history as JSONL
    #[arg(long)]
    history_out: Option<PathBuf>,

    /// LLM API key (or set ANTHROPIC_API_KEY / OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };
    if cli.dump_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let _log_guard = init_tracing(cli.log_json, cli.log_file.as_deref())?;
    run(&cli, config).await
}

/// Install the global subscriber. The returned guard flushes the log file on drop.
fn init_tracing(json: bool, log_file: Option<&Path>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "handoff=info".into());

    let mut guard = None;
    let file_layer = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().context("--log-file needs a file name")?;
            std::fs::create_dir_all(dir)?;
            let (writer, g) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            guard = Some(g);
            Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(guard)
}

async fn run(cli: &Cli, config: EngineConfig) -> anyhow::Result<()> {
    let scene = cli.scene.as_deref().context("no scene given")?;
    if !scene.exists() {
        anyhow::bail!("Scene file not found: {}", scene.display());
    }
    let report = cli.report.clone().unwrap_or_else(|| scene.with_file_name("sbar_report.md"));
    let questions = cli
        .questions
        .clone()
        .unwrap_or_else(|| scene.with_file_name("clinician_questions.md"));

    let needs_llm = matches!(cli.oracle, OracleKind::Llm) || matches!(cli.extractor, ExtractorKind::Llm);
    let provider = if needs_llm {
        Some(build_provider(&config, cli.api_key.clone())?)
    } else {
        None
    };
    let llm = &config.llm;

    let oracle: Arc<dyn SignificanceOracle> = match (cli.oracle, &provider) {
        (OracleKind::Llm, Some(p)) => {
            Arc::new(LlmOracle::new(p.clone(), &llm.model).with_sampling(llm.max_tokens, llm.temperature))
        }
        (OracleKind::Always, _) => Arc::new(AlwaysSignificant),
        _ => Arc::new(KeywordOracle::default()),
    };
    let extractor: Arc<dyn FieldExtractor> = match (cli.extractor, &provider) {
        (ExtractorKind::Llm, Some(p)) => {
            Arc::new(LlmFieldExtractor::new(p.clone(), &llm.model).with_sampling(llm.max_tokens, llm.temperature))
        }
        _ => Arc::new(KeywordExtractor::new()),
    };

    let options = HarnessOptions {
        replay: ReplayOptions {
            realtime: cli.realtime,
            speed: cli.speed,
            start_offset: cli.start_offset,
        },
        registry_path: Some(
            cli.registry
                .clone()
                .unwrap_or_else(|| cli.library_dir.join("registry.yaml")),
        ),
        library_dir: cli.library_dir.clone(),
        history_path: cli.history_out.clone(),
    };

    let mut harness = SceneHarness::new(config, extractor, oracle).with_options(options);
    let result = harness.run(scene, &report, &questions).await?;

    for snapshot in &result.snapshots {
        println!(
            "[{:>3}] t={:>7.1}s  {}",
            snapshot.index(),
            snapshot.t_start(),
            format_record_line(snapshot.record())
        );
    }
    println!();
    println!("Downstream context:\n{}", result.downstream_context);
    println!();
    println!("Report:    {}", result.report_path.display());
    println!("Questions: {}", result.questions_path.display());

    info!(
        run_id = %result.run_id,
        skipped = result.skipped.len(),
        protocols = result.protocols.len(),
        "Done"
    );
    Ok(())
}

fn build_provider(config: &EngineConfig, api_key: Option<String>) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let base_url = config.llm.base_url.trim();
    let provider: Arc<dyn LlmProvider> = match config.llm.provider {
        LlmBackend::Anthropic => {
            let key = api_key
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .context("ANTHROPIC_API_KEY not set (or pass --api-key)")?;
            let provider = AnthropicProvider::new(key);
            if base_url.is_empty() {
                Arc::new(provider)
            } else {
                Arc::new(provider.with_base_url(base_url))
            }
        }
        LlmBackend::Openai => {
            let mut provider = OpenAiCompatProvider::local();
            if !base_url.is_empty() {
                provider = provider.with_base_url(base_url);
            }
            if let Some(key) = api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok()) {
                provider = provider.with_api_key(key);
            }
            Arc::new(provider)
        }
    };
    Ok(provider)
}
