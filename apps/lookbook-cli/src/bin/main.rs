use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lookbook_core::config::{resolve_path, Config, DataConfig, SearchConfig};
use lookbook_core::traits::{EmbeddingProvider, ReasoningProvider};
use lookbook_core::types::{ChatTurn, Modality, Query};
use lookbook_core::Error;
use lookbook_embed::get_default_embedder;
use lookbook_hybrid::{SearchComponents, SearchOrchestrator};
use lookbook_planner::{GeminiProvider, QueryPlanner};
use lookbook_vector::table::open_db;
use lookbook_vector::{write_vectors, Catalog, LanceVectorIndex, VectorRecord};

#[derive(Parser)]
#[command(name = "lookbook", about = "Multimodal product search", long_about = None)]
struct Cli {
    /// Configuration file; relative data paths resolve against its directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a search and print the response as JSON
    Search {
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        /// JSON array of {"role", "content"} turns
        #[arg(long)]
        history: Option<PathBuf>,
        /// Include debug telemetry in the output
        #[arg(long)]
        debug: bool,
    },
    /// Print the query plan without retrieving
    Plan {
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Embed every catalog product into the text and image tables
    Index,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
}

struct Settings {
    search: Arc<SearchConfig>,
    data: DataConfig,
    config: Config,
}

impl Settings {
    fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(p) => Config::from_file(p)?,
            None => Config::load()?,
        };
        let mut data = config.data()?;
        if let Some(base) = path.and_then(Path::parent) {
            data = data.relative_to(base);
        }
        Ok(Self { search: Arc::new(config.search()?), data, config })
    }

    fn reasoning(&self) -> anyhow::Result<Option<Arc<dyn ReasoningProvider>>> {
        let llm = self.config.llm()?;
        let timeout = Duration::from_millis(self.search.timeouts.planner_ms.max(self.search.timeouts.summary_ms));
        match GeminiProvider::new(&llm, timeout) {
            Ok(provider) => Ok(Some(Arc::new(provider))),
            Err(e) => {
                warn!(error = %e, "reasoning provider unavailable; planning will use the fallback plan");
                Ok(None)
            }
        }
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        get_default_embedder(&self.config.embedding()?)
    }
}

fn read_query(text: Option<String>, image: Option<&Path>, history: Option<&Path>) -> anyhow::Result<Query> {
    let mut query = Query::text(text.unwrap_or_default());
    if let Some(path) = image {
        query = query.with_image(std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?);
    }
    if let Some(path) = history {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading history {}", path.display()))?;
        let turns: Vec<ChatTurn> = serde_json::from_str(&raw).with_context(|| format!("parsing history {}", path.display()))?;
        query = query.with_history(turns);
    }
    Ok(query)
}

async fn build_orchestrator(settings: &Settings) -> anyhow::Result<SearchOrchestrator> {
    let data = &settings.data;
    let conn = open_db(&data.lancedb_path().to_string_lossy()).await?;
    let components = SearchComponents {
        reasoning: settings.reasoning()?,
        embedder: settings.embedder()?,
        text_index: Arc::new(LanceVectorIndex::open(&conn, &data.text_table, Modality::Text).await?),
        image_index: Arc::new(LanceVectorIndex::open(&conn, &data.image_table, Modality::Image).await?),
        metadata: Arc::new(Catalog::load(&data.catalog_file())?),
    };
    Ok(SearchOrchestrator::new(components, Arc::clone(&settings.search)))
}

async fn index_catalog(settings: &Settings) -> anyhow::Result<()> {
    let data = &settings.data;
    let catalog_file = data.catalog_file();
    let catalog = Catalog::load(&catalog_file)?;
    let image_base = catalog_file.parent().map(Path::to_path_buf).unwrap_or_default();
    let embedder = settings.embedder()?;

    let mut text_records = Vec::with_capacity(catalog.len());
    let mut image_records = Vec::with_capacity(catalog.len());
    for product in catalog.products() {
        match embedder.embed_text(&product.description).await {
            Ok(v) => text_records.push(VectorRecord::new(product.product_id.clone(), v.values)),
            Err(e) => warn!(product = %product.product_id, error = %e, "skipping text vector"),
        }
        let image_path = resolve_path(&image_base, &product.image_path);
        let embedded = match std::fs::read(&image_path) {
            Ok(bytes) => embedder.embed_image(&bytes).await,
            Err(e) => Err(Error::Embedding(format!("{}: {}", image_path.display(), e))),
        };
        match embedded {
            Ok(v) => image_records.push(VectorRecord::new(product.product_id.clone(), v.values)),
            Err(e) => warn!(product = %product.product_id, error = %e, "skipping image vector"),
        }
    }

    let conn = open_db(&data.lancedb_path().to_string_lossy()).await?;
    let dim = embedder.dim();
    let texts = write_vectors(&conn, &data.text_table, Modality::Text, dim, &text_records).await?;
    let images = write_vectors(&conn, &data.image_table, Modality::Image, dim, &image_records).await?;
    info!(products = catalog.len(), text_vectors = texts, image_vectors = images, model = embedder.model_id(), "catalog indexed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Search { text, image, history, debug } => {
            let query = read_query(text, image.as_deref(), history.as_deref())?;
            let orchestrator = build_orchestrator(&settings).await?;
            match orchestrator.search(&query).await {
                Ok(response) if debug => println!("{}", serde_json::to_string_pretty(&response)?),
                Ok(response) => println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                    "assistant_message": response.assistant_message,
                    "results": response.results,
                }))?),
                Err(e) => {
                    if let (true, Some(telemetry)) = (debug, e.debug()) {
                        eprintln!("{}", serde_json::to_string_pretty(telemetry)?);
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Plan { text, image } => {
            let query = read_query(text, image.as_deref(), None)?;
            let planner = QueryPlanner::new(settings.reasoning()?, Arc::clone(&settings.search));
            let outcome = planner.plan(&query).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Index => index_catalog(&settings).await?,
    }
    Ok(())
}
