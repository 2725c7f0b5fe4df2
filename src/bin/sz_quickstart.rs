//! sz-quickstart
//!
//! Quick-start commands against an entity-resolution service over gRPC.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sz_quickstart::download::TruthSetDownloader;
use sz_quickstart::operations::{pretty_json, BulkLoadProcedure, RecordOutcome};
use sz_quickstart::transport::GrpcAbstractFactory;
use sz_quickstart::{Settings, SzAbstractFactory, SzEngine, SzFlags, SzProduct};

#[derive(Parser)]
#[command(name = "sz-quickstart")]
#[command(about = "Quick-start commands for a Senzing gRPC service", long_about = None)]
#[command(version)]
struct Cli {
    /// Service address (`host:port`).
    #[arg(long, global = true)]
    grpc_url: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the service version.
    Hello,

    /// Print engine method help.
    MethodHelp {
        /// Method to describe in detail.
        #[arg(default_value = "get_entity_by_record_id")]
        method: String,
    },

    /// Download the demo truth sets, load them and run sample queries.
    LoadTruthsets {
        /// Use files already present in the data directory.
        #[arg(long)]
        skip_download: bool,

        /// Directory truth-set files are written to.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Register the data sources in FILE and load its records.
    Load {
        file: PathBuf,

        #[arg(long, default_value = "Add user datasources")]
        comment: String,
    },

    /// Print the entity a record resolved into.
    GetEntity { data_source: String, record_id: String },

    /// Search entities by attributes given as a JSON object.
    Search { attributes: String },
}

const TRUTHSET_COMMENT: &str = "Add TruthSet datasources";
const SAMPLE_SEARCH: &str = r#"{"name_full": "robert smith", "date_of_birth": "11/12/1978"}"#;
const SAMPLE_ENTITY: (&str, &str) = ("CUSTOMERS", "1070");
const SAMPLE_ENTITY_FLAGS: SzFlags = SzFlags::ENTITY_DEFAULT_FLAGS;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sz_quickstart=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_outcome(_path: &std::path::Path, outcome: &RecordOutcome) {
    match outcome {
        RecordOutcome::Added { info, .. } => {
            if !info.is_empty() {
                println!("{info}");
            }
        }
        RecordOutcome::Failed(failure) => eprintln!("line {}: {}", failure.line, failure.error),
    }
}

async fn load_files(
    factory: Arc<dyn SzAbstractFactory>,
    settings: &Settings,
    files: &[PathBuf],
    comment: &str,
) -> anyhow::Result<()> {
    let report = BulkLoadProcedure::new(factory)
        .max_attempts(settings.promote_attempts)
        .run(files, comment, print_outcome)
        .await
        .context("bulk load failed")?;
    eprintln!(
        "Found the following DATA_SOURCE values in the data: {:?}",
        report.data_sources
    );
    eprintln!(
        "Loaded {} of {} records ({} failed) into configuration {}",
        report.succeeded(),
        report.attempted(),
        report.failed(),
        report.sync.config_id
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(url) = cli.grpc_url {
        settings.grpc_url = url;
    }

    let factory: Arc<dyn SzAbstractFactory> = Arc::new(
        GrpcAbstractFactory::connect(&settings.grpc_url, settings.connect_timeout)
            .await
            .with_context(|| format!("cannot reach {}", settings.grpc_url))?,
    );

    match cli.cmd {
        Commands::Hello => {
            let product = factory.create_product().await?;
            println!("{}", pretty_json(&product.get_version().await?));
        }
        Commands::MethodHelp { method } => {
            let engine = factory.create_engine().await?;
            println!("{}", engine.help(None)?);
            println!("{}", engine.help(Some(&method))?);
        }
        Commands::LoadTruthsets {
            skip_download,
            data_dir,
        } => {
            if let Some(dir) = data_dir {
                settings.data_dir = dir;
            }
            let files = if skip_download {
                settings.truthset_paths()
            } else {
                TruthSetDownloader::new(
                    settings.truthset_url_prefix.clone(),
                    settings.connect_timeout,
                    settings.download_timeout,
                )?
                .download_all(&settings.truthset_files, &settings.data_dir)
                .await
                .context("truth-set download failed")?
            };
            load_files(Arc::clone(&factory), &settings, &files, TRUTHSET_COMMENT).await?;

            let engine = factory.create_engine().await?;
            let entity = engine
                .get_entity_by_record_id(SAMPLE_ENTITY.0, SAMPLE_ENTITY.1, SAMPLE_ENTITY_FLAGS)
                .await?;
            println!("{}", pretty_json(&entity));
            let hits = engine
                .search_by_attributes(SAMPLE_SEARCH, "", SzFlags::SEARCH_BY_ATTRIBUTES_DEFAULT_FLAGS)
                .await?;
            println!("{}", pretty_json(&hits));
        }
        Commands::Load { file, comment } => {
            load_files(factory, &settings, &[file], &comment).await?;
        }
        Commands::GetEntity {
            data_source,
            record_id,
        } => {
            let engine = factory.create_engine().await?;
            let entity = engine
                .get_entity_by_record_id(&data_source, &record_id, SzFlags::ENTITY_DEFAULT_FLAGS)
                .await?;
            println!("{}", pretty_json(&entity));
        }
        Commands::Search { attributes } => {
            let engine = factory.create_engine().await?;
            let hits = engine
                .search_by_attributes(&attributes, "", SzFlags::SEARCH_BY_ATTRIBUTES_DEFAULT_FLAGS)
                .await?;
            println!("{}", pretty_json(&hits));
        }
    }

    Ok(())
}
