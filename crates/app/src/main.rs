use chrono::Utc;
use clap::{Parser, Subcommand};
use policy_docs_core::{
    ingest_folder, parse_with_budget, rebuild_from_folder, CarrierNormalizer, InMemoryDirectory,
    IndexOptions, JsonCarrierFile, ParsingPipeline, PolicyIndex, PolicySearch,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "policy-docs", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the full-text index.
    #[arg(long, env = "POLICY_DOCS_INDEX", default_value = "data/index")]
    index: PathBuf,

    /// JSON object mapping raw carrier names to canonical ones.
    #[arg(long, env = "POLICY_DOCS_CARRIERS", default_value = "config/carriers.json")]
    carriers: PathBuf,

    /// JSON snapshot with policy notes, building names and agent names.
    #[arg(long, env = "POLICY_DOCS_DIRECTORY")]
    directory: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Parse one PDF and print the extracted fields.
    Parse {
        file: PathBuf,
        /// Also run the building recognizer over the text.
        #[arg(long, default_value_t = false)]
        building: bool,
        /// Include the full extracted text in the output.
        #[arg(long, default_value_t = false)]
        include_text: bool,
    },
    /// Parse every PDF under a folder and add it to the index.
    Ingest {
        #[arg(long)]
        folder: PathBuf,
    },
    /// Query the index.
    Search {
        query: String,
        /// Exact-term policy search merged with matching notes.
        #[arg(long, default_value_t = false)]
        exact: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Autocomplete over carriers, policy numbers, buildings and agents.
    Suggest {
        partial: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Drop one document from the index.
    Remove { document_id: u64 },
    /// Replace the index contents with a fresh parse of a folder.
    Rebuild {
        #[arg(long)]
        folder: PathBuf,
    },
    /// Print document and segment counts.
    Stats,
}

fn carrier_normalizer(path: &Path) -> CarrierNormalizer {
    if !path.exists() {
        warn!(path = %path.display(), "carrier mapping file not found; carriers pass through unchanged");
    }
    CarrierNormalizer::new(Box::new(JsonCarrierFile::new(path)), None)
}

fn load_directory(path: Option<&Path>) -> anyhow::Result<InMemoryDirectory> {
    match path {
        Some(path) => Ok(InMemoryDirectory::load(path)?),
        None => Ok(InMemoryDirectory::default()),
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index = %cli.index.display(),
        "policy-docs boot"
    );

    match cli.command {
        Command::Parse {
            file,
            building,
            include_text,
        } => {
            let pipeline = Arc::new(ParsingPipeline::with_carriers(carrier_normalizer(
                &cli.carriers,
            ))?);
            let budget = pipeline.options().parse_budget;
            let threshold = pipeline.options().review_threshold;
            let parsed = parse_with_budget(pipeline.clone(), file.clone(), budget).await;
            let needs_review = parsed.needs_review(threshold);

            let mut output = json!({
                "file": file.display().to_string(),
                "confidence": parsed.confidence,
                "message": parsed.message,
                "engine": parsed.engine,
                "needs_review": needs_review,
                "metadata": parsed.metadata,
            });
            if building {
                output["building"] = json!(pipeline.recognizer().recognize_building(&parsed.text));
            }
            if include_text {
                output["text"] = json!(parsed.text);
            }
            print_json(&output)?;
        }
        Command::Ingest { folder } => {
            let pipeline = Arc::new(ParsingPipeline::with_carriers(carrier_normalizer(
                &cli.carriers,
            ))?);
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            let report = ingest_folder(&folder, pipeline, &index).await?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for flagged in report.flagged_for_review() {
                warn!(
                    path = %flagged.path.display(),
                    confidence = flagged.confidence,
                    message = %flagged.message,
                    "flagged for manual review"
                );
            }
            print_json(&report)?;
        }
        Command::Search {
            query,
            exact,
            limit,
            offset,
        } => {
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            let limit = limit.unwrap_or(index.options().default_limit);

            if exact {
                let directory = load_directory(cli.directory.as_deref())?;
                let hits = PolicySearch::new(&index, directory).search(&query, limit)?;
                print_json(&hits)?;
            } else {
                let results = index.query(&query, limit, offset)?;
                print_json(&results)?;
            }
        }
        Command::Suggest { partial, limit } => {
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            let directory = load_directory(cli.directory.as_deref())?;
            let suggestions = PolicySearch::new(&index, directory).suggestions(&partial, limit)?;
            print_json(&suggestions)?;
        }
        Command::Remove { document_id } => {
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            index.remove(document_id)?;
            print_json(&json!({ "removed": document_id }))?;
        }
        Command::Rebuild { folder } => {
            let pipeline = Arc::new(ParsingPipeline::with_carriers(carrier_normalizer(
                &cli.carriers,
            ))?);
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            let indexed = rebuild_from_folder(&folder, pipeline, &index).await?;
            print_json(&json!({
                "indexed": indexed,
                "rebuilt_at": Utc::now().to_rfc3339(),
            }))?;
        }
        Command::Stats => {
            let index = PolicyIndex::open(&cli.index, IndexOptions::default())?;
            print_json(&index.stats())?;
        }
    }

    Ok(())
}
