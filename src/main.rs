//! zotnotes command-line entrypoint.
//!
//! Browses a Zotero library, generates AI reading notes for items with PDFs, and exports a
//! collection's citations and notes as a single text document.
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use time::{OffsetDateTime, macros::format_description};
use zotnotes::config::{Config, KNOWN_MODELS};
use zotnotes::library::{
    CollectionNode, ItemOverview, LibraryClient, ZoteroClient, build_collection_tree,
    survey_items,
};
use zotnotes::logging;
use zotnotes::metrics::RunSnapshot;
use zotnotes::pipeline::{
    AggregateOutcome, ItemStatus, Launcher, PipelineEvent, PipelineHandle, ProcessingUnit,
    spawn_aggregation,
};
use zotnotes::summarization::GeminiClient;

#[derive(Parser)]
#[command(
    name = "zotnotes",
    version,
    about = "Generate AI reading notes for Zotero items and export collection digests"
)]
struct Cli {
    /// Mirror operator logs to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the collection tree with keys.
    Collections,
    /// List a collection's top-level items and their note status.
    Items {
        /// Collection key.
        collection: String,
    },
    /// Generate AI notes for items of a collection.
    Summarize {
        /// Collection key.
        collection: String,
        /// Item keys to summarize; defaults to every pending item.
        #[arg(long = "item", value_name = "KEY")]
        items: Vec<String>,
        /// Model override.
        #[arg(long)]
        model: Option<String>,
        /// Sampling temperature override (0.0 to 1.0).
        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Compile citations and AI notes of a collection tree into one text file.
    Export {
        /// Collection key.
        collection: String,
        /// Output path; defaults to `<collection-name>-<date>.txt`.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let config = Config::load().context("failed to load configuration")?;

    let web = ZoteroClient::web(&config.library).context("failed to build Zotero Web client")?;
    match cli.command {
        Command::Collections => print_collections(&web).await,
        Command::Items { collection } => print_items(&web, &collection).await,
        Command::Summarize {
            collection,
            items,
            model,
            temperature,
        } => summarize(config, web, &collection, &items, model, temperature).await,
        Command::Export { collection, output } => export(web, &collection, output).await,
    }
}

async fn print_collections(client: &ZoteroClient) -> Result<()> {
    let collections = client
        .list_collections()
        .await
        .context("failed to list collections")?;
    let tree = build_collection_tree(collections);
    if tree.is_empty() {
        println!("No collections found.");
    }
    for node in &tree {
        print_node(node, 0);
    }
    Ok(())
}

fn print_node(node: &CollectionNode, depth: usize) {
    println!(
        "{}{}  [{}]",
        "  ".repeat(depth),
        node.collection.name,
        node.collection.key
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

async fn print_items(client: &ZoteroClient, collection: &str) -> Result<()> {
    let overviews = survey_items(client, collection)
        .await
        .with_context(|| format!("failed to survey collection {collection}"))?;
    if overviews.is_empty() {
        println!("No items in collection {collection}.");
    }
    for overview in &overviews {
        println!(
            "{:<8}  {}  {} ({})",
            overview.status().label(),
            overview.item.key,
            overview.item.display_title(),
            overview.item.authors()
        );
    }
    Ok(())
}

fn select_units(
    overviews: Vec<ItemOverview>,
    requested: &[String],
) -> Result<Vec<ProcessingUnit>> {
    let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let mut units = Vec::new();
    for (row, overview) in overviews.into_iter().enumerate() {
        let chosen = if wanted.is_empty() {
            overview.is_selectable()
        } else {
            wanted.contains(overview.item.key.as_str())
        };
        if !chosen {
            continue;
        }
        if !overview.is_selectable() {
            println!(
                "Skipping '{}': {}",
                overview.item.display_title(),
                overview.status().label()
            );
            continue;
        }
        units.push(ProcessingUnit {
            row,
            item: overview.item,
        });
    }
    if units.is_empty() {
        bail!("no selectable items; pick items that have a PDF and no AI note yet");
    }
    Ok(units)
}

async fn summarize(
    config: Config,
    web: ZoteroClient,
    collection: &str,
    requested: &[String],
    model: Option<String>,
    temperature: Option<f32>,
) -> Result<()> {
    let local = ZoteroClient::local(&config.library).context("failed to build local client")?;
    local.probe().await.context(
        "failed to reach the local Zotero API; make sure the Zotero application is running",
    )?;
    println!("-> Successfully connected to Zotero Web API and Local Server.");
    let overviews = survey_items(&web, collection)
        .await
        .with_context(|| format!("failed to survey collection {collection}"))?;

    let mut settings = config.summary.clone();
    if let Some(model) = model {
        if !KNOWN_MODELS.contains(&model.as_str()) {
            tracing::warn!(model = %model, "Model is not in the known model list");
        }
        settings = settings.with_model(model);
    }
    if let Some(temperature) = temperature {
        settings = settings
            .with_temperature(temperature)
            .context("invalid temperature")?;
    }

    let units = select_units(overviews, requested)?;
    let titles: Vec<String> = units
        .iter()
        .map(|unit| unit.item.display_title().to_string())
        .collect();
    let rows: Vec<usize> = units.iter().map(|unit| unit.row).collect();

    let generator = GeminiClient::new(&config.gemini).context("failed to build Gemini client")?;
    let launcher = Launcher::new(Arc::new(web), Arc::new(local), Arc::new(generator));
    println!(
        "Starting summary generation for {} paper(s)...",
        units.len()
    );
    let handle = launcher.start_summaries(units, settings)?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stop requested; finishing the current item...");
            cancel.cancel();
        }
    });

    let snapshot = drain_summary(handle, &rows, &titles).await;
    match snapshot {
        Some(snapshot) => {
            println!(
                "All summaries finished: {} done, {} without PDF, {} errors, {} not saved, {} skipped.",
                snapshot.completed,
                snapshot.no_attachment,
                snapshot.errors,
                snapshot.failed_to_persist,
                snapshot.skipped
            );
            Ok(())
        }
        None => bail!("summary run ended without reporting completion"),
    }
}

async fn drain_summary(
    mut handle: PipelineHandle<RunSnapshot>,
    rows: &[usize],
    titles: &[String],
) -> Option<RunSnapshot> {
    while let Some(event) = handle.next_event().await {
        match event {
            PipelineEvent::Progress(line) => println!("{line}"),
            PipelineEvent::Warning(line) => println!("Warning: {line}"),
            PipelineEvent::ItemError(line) => eprintln!("ERROR: {line}"),
            PipelineEvent::Status { row, status } => {
                if status != ItemStatus::InProgress {
                    let title = rows
                        .iter()
                        .position(|candidate| *candidate == row)
                        .and_then(|index| titles.get(index))
                        .map(String::as_str)
                        .unwrap_or("?");
                    println!("[{}] {title}", status.label());
                }
            }
            PipelineEvent::Finished(snapshot) => return Some(snapshot),
            PipelineEvent::Failed(message) => {
                eprintln!("ERROR: {message}");
                return None;
            }
        }
    }
    None
}

async fn export(
    web: ZoteroClient,
    collection: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let name = match web.list_collections().await {
        Ok(collections) => collections
            .into_iter()
            .find(|candidate| candidate.key == collection)
            .map(|candidate| candidate.name),
        Err(error) => {
            tracing::warn!(error = %error, "Could not resolve collection name");
            None
        }
    };
    println!(
        "Starting full summary compilation for collection: '{}'...",
        name.as_deref().unwrap_or(collection)
    );
    let mut handle = spawn_aggregation(Arc::new(web), collection);

    let mut outcome = None;
    while let Some(event) = handle.next_event().await {
        match event {
            PipelineEvent::Progress(line) => println!("{line}"),
            PipelineEvent::Warning(line) => println!("    - Warning: {line}"),
            PipelineEvent::ItemError(line) => eprintln!("ERROR: {line}"),
            PipelineEvent::Status { .. } => {}
            PipelineEvent::Finished(result) => outcome = Some(result),
            PipelineEvent::Failed(message) => bail!(message),
        }
    }

    let digest = match outcome {
        Some(AggregateOutcome::Document(digest)) if !digest.is_empty() => digest,
        Some(_) => {
            println!("No items with citations were found in the selected collection(s).");
            return Ok(());
        }
        None => bail!("collection export ended without a result"),
    };

    let path = match output {
        Some(path) => path,
        None => default_output_path(name.as_deref().unwrap_or(collection))?,
    };
    tokio::fs::write(&path, digest.text.as_bytes())
        .await
        .with_context(|| format!("failed to save file {}", path.display()))?;
    println!(
        "Successfully saved full summary to {} ({} items, {} with AI notes).",
        path.display(),
        digest.included,
        digest.with_notes
    );
    Ok(())
}

fn default_output_path(collection_name: &str) -> Result<PathBuf> {
    let date = OffsetDateTime::now_utc()
        .date()
        .format(format_description!("[year]-[month]-[day]"))
        .context("failed to format export date")?;
    let stem: String = collection_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    Ok(PathBuf::from(format!("{stem}-{date}.txt")))
}
