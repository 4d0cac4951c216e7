use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use transpile_agents::config::{CliOverrides, TranslatorConfig};
use transpile_agents::model::OpenAiCompatClient;
use transpile_agents::pipeline::{TranslationPipeline, TranslationRequest};
use transpile_agents::project_runner::ProjectRunner;
use transpile_agents::report::{render_project, render_result, SuiteEntry, SuiteReport};
use transpile_agents::suite::{self, DEFAULT_CASE};
use transpile_core::feedback::{RustcVerifier, VerifierError};
use transpile_core::project::{ProjectScan, ProjectScanner};
use transpile_core::retrieval::{Corpus, ExampleIndex};

#[derive(Debug, Parser)]
#[command(
    name = "transpile-agents",
    version,
    about = "Translate C to Rust with static hints, retrieved examples and compiler feedback"
)]
struct Cli {
    /// Built-in case to translate
    #[arg(long, default_value = DEFAULT_CASE)]
    case: String,

    /// Run every built-in case
    #[arg(long, conflicts_with_all = ["input", "manifest", "source_dir"])]
    all: bool,

    /// Translate a single C file
    #[arg(long, conflicts_with_all = ["manifest", "source_dir"])]
    input: Option<PathBuf>,

    /// compile_commands.json of a multi-file project
    #[arg(long, conflicts_with = "source_dir")]
    manifest: Option<PathBuf>,

    /// Directory of C sources to translate as a project
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Write the translated Rust here
    #[arg(long, short)]
    output: Option<PathBuf>,

    #[arg(long)]
    max_iterations: Option<u32>,

    #[arg(long)]
    top_k: Option<usize>,

    /// Parallel SCC translations in project mode
    #[arg(long)]
    workers: Option<usize>,

    /// Cancel the whole project run on the first infrastructure failure
    #[arg(long)]
    abort_on_fatal: bool,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List built-in cases and exit
    #[arg(long)]
    list: bool,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `None` unless one of the multi-file flags was given.
fn scan_project(cli: &Cli) -> Result<Option<ProjectScan>> {
    let scanner = ProjectScanner::new();
    let scan = match (&cli.manifest, &cli.source_dir) {
        (Some(manifest), _) => scanner
            .scan_compile_commands(manifest)
            .with_context(|| format!("scanning {}", manifest.display()))?,
        (None, Some(dir)) => scanner
            .scan_directory(dir)
            .with_context(|| format!("scanning {}", dir.display()))?,
        (None, None) => return Ok(None),
    };
    Ok(Some(scan))
}

fn write_output(path: Option<&PathBuf>, text: &str) -> Result<()> {
    if let Some(path) = path {
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Rust output written");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for case in suite::CASES {
            println!("{:<20} {:?}", case.name, case.group);
        }
        return Ok(());
    }

    let config = TranslatorConfig::load(cli.config.as_deref())
        .context("loading configuration")?
        .with_overrides(&CliOverrides {
            max_iterations: cli.max_iterations,
            top_k: cli.top_k,
            workers: cli.workers,
            abort_on_fatal: cli.abort_on_fatal,
        });
    config.validate()?;

    let mut corpus = Corpus::builtin()?;
    if let Some(path) = &config.corpus {
        let extra = Corpus::load(path)?;
        corpus.extend(extra.examples().iter().cloned());
    }
    info!(
        model = %config.model,
        examples = corpus.len(),
        max_iterations = config.max_iterations,
        "Translator starting"
    );
    let index = Arc::new(ExampleIndex::build(corpus));

    let verifier = RustcVerifier::new(config.verifier_config());
    match verifier.probe().await {
        Ok(version) => info!(%version, "Compiler available"),
        Err(e @ VerifierError::ToolchainUnavailable { .. }) => {
            bail!("{e}; install Rust from https://rustup.rs/ or set TRANSPILE_RUSTC")
        }
        Err(e) => warn!(error = %e, "Compiler probe failed; continuing"),
    }

    let model = Arc::new(OpenAiCompatClient::from_config(&config)?);
    let pipeline = Arc::new(TranslationPipeline::new(
        model,
        Arc::new(verifier),
        index,
        &config,
    ));

    if let Some(scan) = scan_project(&cli)? {
        let runner = ProjectRunner::new(pipeline, config.workers, config.abort_on_fatal);
        let report = runner.run(&scan).await;
        if cli.json {
            print_json(&report)?;
        } else {
            print!("{}", render_project(&report));
        }
        write_output(cli.output.as_ref(), &report.artifact())?;
        return Ok(());
    }

    if cli.all {
        let mut report = SuiteReport::default();
        for case in suite::CASES {
            let request = TranslationRequest::new(case.name, case.source);
            let (result, error) = match pipeline.translate(&request).await {
                Ok(result) => (Some(result), None),
                Err(e) => {
                    warn!(case = case.name, error = %e, "Case aborted");
                    (None, Some(e.to_string()))
                }
            };
            if let (Some(r), false) = (&result, cli.json) {
                let verdict = if r.success { "✓ PASS" } else { "✗ FAIL" };
                println!("{verdict} {} ({} attempt(s))", case.name, r.attempts.len());
            }
            report.entries.push(SuiteEntry {
                name: case.name.to_string(),
                group: case.group,
                result,
                error,
            });
        }
        if cli.json {
            print_json(&report)?;
        } else {
            print!("{}", report.render());
        }
        return Ok(());
    }

    let request = match &cli.input {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            TranslationRequest::new(path.display().to_string(), source)
        }
        None => {
            let Some(case) = suite::find(&cli.case) else {
                bail!("unknown case {:?}; use --list to see the built-in cases", cli.case);
            };
            TranslationRequest::new(case.name, case.source)
        }
    };

    let result = pipeline.translate(&request).await?;
    if cli.json {
        print_json(&result)?;
    } else {
        print!("{}", render_result(&result));
    }
    write_output(cli.output.as_ref(), &result.final_code)?;
    Ok(())
}
