//! Casesynth CLI
//!
//! Command-line front end for the case synthesis engine:
//! - Creating synthetic case records in a file-backed store
//! - Listing the registered case types
//! - Inspecting stored records
//! - Writing a default engine configuration

use anyhow::{anyhow, Context, Result};
use casesynth_core::{
    CaseTypeRegistry, ContentGenerator, Created, DisabledGenerator, EchoGenerator, EngineConfig,
    RecordId, SynthesisOrchestrator, TextGenerator,
};
use casesynth_storage::FileStore;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod report;

const DEFAULT_STORE_DIR: &str = "casesynth-store";

/// Exit status when a batch ran but produced no records.
const EXIT_EMPTY_BATCH: i32 = 2;

#[derive(Parser)]
#[command(name = "casesynth")]
#[command(author, version, about = "Casesynth: synthetic case records for ITSM and healthcare workflows")]
struct Cli {
    /// Debug-level logs unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create one record, or a batch for batchable case types.
    Create {
        /// Case type id (see `casesynth types`).
        case_type: String,

        /// Short description; required by incident, csm_case and hr_case.
        #[arg(short = 'd', long)]
        short_description: Option<String>,

        /// Number of records for batchable types (0 means 1).
        #[arg(short = 'n', long)]
        num_cases: Option<usize>,

        /// Store directory.
        #[arg(long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,

        /// Engine config file (JSON). Falls back to $CASESYNTH_CONFIG.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Text generation backend.
        #[arg(long, value_enum, default_value_t = LlmChoice::Echo, env = "CASESYNTH_LLM")]
        llm: LlmChoice,

        /// RNG seed; overrides the config file.
        #[arg(long)]
        seed: Option<u64>,

        /// Print a JSON summary instead of colored text.
        #[arg(long)]
        json: bool,
    },

    /// List registered case types.
    Types {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Print a stored record with its journal and attachments as JSON.
    Show {
        collection: String,
        id: String,

        #[arg(long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },

    /// Write the default engine configuration.
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LlmChoice {
    /// Always use the fallback text.
    None,
    /// Deterministic text derived from the prompt.
    Echo,
    Ollama,
    Openai,
    Anthropic,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Create {
            case_type,
            short_description,
            num_cases,
            store,
            config,
            llm,
            seed,
            json,
        } => {
            let created = cmd_create(
                &case_type,
                short_description.as_deref(),
                num_cases,
                &store,
                config.as_deref(),
                llm,
                seed,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report::created_json(&created))?);
            } else {
                report::print_created(&created, &store);
            }
            if created.ids().is_empty() {
                std::process::exit(EXIT_EMPTY_BATCH);
            }
        }
        Commands::Types { config, json } => cmd_types(config.as_deref(), json)?,
        Commands::Show { collection, id, store } => cmd_show(&collection, &id, &store)?,
        Commands::InitConfig { path, force } => cmd_init_config(&path, force)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading config {}", path.display())),
        None => EngineConfig::from_env().context("loading config from $CASESYNTH_CONFIG"),
    }
}

fn text_generator(choice: LlmChoice) -> Result<Box<dyn TextGenerator>> {
    let backend: Box<dyn TextGenerator> = match choice {
        LlmChoice::None => Box::new(DisabledGenerator),
        LlmChoice::Echo => Box::new(EchoGenerator),
        LlmChoice::Ollama => llm_backend(casesynth_llm::Provider::Ollama)?,
        LlmChoice::Openai => llm_backend(casesynth_llm::Provider::OpenAI)?,
        LlmChoice::Anthropic => llm_backend(casesynth_llm::Provider::Anthropic)?,
    };
    Ok(backend)
}

fn llm_backend(provider: casesynth_llm::Provider) -> Result<Box<dyn TextGenerator>> {
    let generator = casesynth_llm::LlmGenerator::for_provider(provider).map_err(|e| {
        tracing::warn!(%provider, error = %e, "llm backend unavailable");
        anyhow!("cannot use --llm {provider}: {e}")
    })?;
    tracing::debug!(%provider, "llm backend ready");
    Ok(Box::new(generator))
}

fn cmd_create(
    case_type: &str,
    short_description: Option<&str>,
    num_cases: Option<usize>,
    store_dir: &Path,
    config_path: Option<&Path>,
    llm: LlmChoice,
    seed: Option<u64>,
) -> Result<Created> {
    let mut config = load_config(config_path)?;
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    let registry = CaseTypeRegistry::from_config(&config)?;
    let store = FileStore::open(store_dir)
        .with_context(|| format!("opening store {}", store_dir.display()))?;
    let content = ContentGenerator::new(text_generator(llm)?).with_fallback(config.fallback_text.clone());

    tracing::info!(
        case_type,
        store = %store_dir.display(),
        llm = ?llm,
        num_cases = num_cases.unwrap_or(1),
        "creating cases"
    );
    let mut orchestrator = SynthesisOrchestrator::new(registry, store, content, config)?;
    let created = orchestrator
        .create_case(case_type, short_description, num_cases)
        .map_err(|e| {
            tracing::warn!(case_type, error = %e, "create failed");
            e
        })
        .with_context(|| format!("creating {case_type}"))?;
    let count = created.ids().len();
    if count == 0 {
        tracing::warn!(case_type, "no case in the batch was created");
    } else {
        tracing::info!(case_type, count, "cases created");
    }
    Ok(created)
}

fn cmd_types(config_path: Option<&Path>, as_json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let registry = CaseTypeRegistry::from_config(&config)?;

    if as_json {
        let types: Vec<_> = registry
            .schemas()
            .map(|s| {
                json!({
                    "id": s.id,
                    "collection": s.target_collection,
                    "requires_short_description": s.requires_short_description,
                    "allows_batch": s.allows_batch,
                    "fields": s.field_plan.len(),
                    "notes": s.annotation_plan.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&types)?);
        return Ok(());
    }

    println!("{} case types", registry.len().to_string().bold());
    for schema in registry.schemas() {
        let mut flags = Vec::new();
        if schema.requires_short_description {
            flags.push("requires -d");
        }
        if schema.allows_batch {
            flags.push("batch");
        }
        println!(
            "  {} {} {} {}",
            "→".cyan(),
            schema.id.bold(),
            schema.target_collection.dimmed(),
            flags.join(", ").yellow()
        );
    }
    Ok(())
}

fn cmd_show(collection: &str, id: &str, store_dir: &Path) -> Result<()> {
    tracing::debug!(collection, id, store = %store_dir.display(), "show record");
    let store = FileStore::open(store_dir).with_context(|| format!("opening store {}", store_dir.display()))?;
    let record = store
        .record(collection, &RecordId::new(id))?
        .ok_or_else(|| anyhow!("no record {id} in `{collection}`"))?;
    println!("{}", serde_json::to_string_pretty(&report::record_json(&record))?);
    Ok(())
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!("{} already exists (pass --force to overwrite)", path.display()));
    }
    EngineConfig::default().save(path)?;
    tracing::debug!(path = %path.display(), "default config written");
    eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    Ok(())
}
