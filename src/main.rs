use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use mimalloc::MiMalloc;
use serde::Serialize;
use std::path::PathBuf;

use photo_gallery::config::Config;
use photo_gallery::db_pool::OpenMode;
use photo_gallery::duplicate_filter::DuplicatePolicy;
use photo_gallery::ingest::{BatchIngestor, IngestOptions};
use photo_gallery::models::parse_tags;
use photo_gallery::store::{PhotoStore, SqliteStore};
use photo_gallery::sync::{run_sync, SyncMode};
use photo_gallery::upload::{upload_photo, UploadRequest};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "photo-gallery", about = "Photo store ingestion, sync and maintenance")]
struct Cli {
    /// Store locator (sqlite: URL or file path); defaults to PHOTO_GALLERY_DB_URL
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy photos from one store into another
    Sync {
        #[arg(long)]
        mode: SyncMode,
        /// Defaults to the local store
        #[arg(long)]
        source: Option<String>,
        /// Defaults to PHOTO_GALLERY_REMOTE_DB_URL
        #[arg(long)]
        destination: Option<String>,
    },
    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands working against the local store.
#[derive(Subcommand)]
enum StoreCommand {
    /// Create the store and its schema if missing
    InitDb,
    /// Bulk-load a directory tree
    Ingest {
        root: Option<PathBuf>,
        /// Treat failed duplicate checks as "not found"
        #[arg(long)]
        fail_open: bool,
    },
    /// Import a local folder (TIFF allowed)
    Import {
        root: Option<PathBuf>,
        /// Delete every stored photo before importing
        #[arg(long)]
        clear: bool,
    },
    /// Store a single image
    Upload {
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
        /// Comma separated
        #[arg(long)]
        tags: Option<String>,
    },
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        tag: Option<String>,
    },
    Show {
        id: i64,
    },
    /// Write a photo's stored bytes to a file
    Export {
        id: i64,
        out: PathBuf,
    },
    Update {
        id: i64,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        tags: Option<String>,
    },
    Delete {
        id: i64,
    },
    /// Photos carrying any of the given comma separated tags
    Search {
        tags: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn open_store(locator: &str, config: &Config) -> Result<SqliteStore> {
    SqliteStore::connect(locator, OpenMode::CreateIfMissing, config.max_connections)
        .await
        .with_context(|| format!("Failed to open store {}", locator))
}

async fn ingest(store: &SqliteStore, root: PathBuf, options: IngestOptions) -> Result<()> {
    let report = BatchIngestor::new(store, options)
        .ingest_directory(&root)
        .await
        .with_context(|| format!("Ingestion of {} failed", root.display()))?;
    print_json(&report)
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let db = cli.db.clone().unwrap_or_else(|| config.db_url.clone());

    match cli.command {
        Command::Sync {
            mode,
            source,
            destination,
        } => {
            let source = source.unwrap_or(db);
            let destination = destination
                .or_else(|| config.remote_db_url.clone())
                .ok_or_else(|| {
                    anyhow!("No destination given and PHOTO_GALLERY_REMOTE_DB_URL is not set")
                })?;
            let report = run_sync(&source, &destination, mode, config.max_connections).await?;
            print_json(&report)
        }
        Command::Store(command) => {
            let store = open_store(&db, &config).await?;
            let result = run_store_command(&store, command, &config).await;
            store.close().await;
            result
        }
    }
}

async fn run_store_command(
    store: &SqliteStore,
    command: StoreCommand,
    config: &Config,
) -> Result<()> {
    let photos_path = || PathBuf::from(&config.photos_path);

    match command {
        StoreCommand::InitDb => {
            let photos = store.count().await?;
            print_json(&serde_json::json!({ "photos": photos }))
        }
        StoreCommand::Ingest { root, fail_open } => {
            let mut options = config.bulk_ingest_options();
            if fail_open {
                options.duplicate_policy = DuplicatePolicy::FailOpen;
            }
            ingest(store, root.unwrap_or_else(photos_path), options).await
        }
        StoreCommand::Import { root, clear } => {
            let options = config.local_import_options(clear);
            ingest(store, root.unwrap_or_else(photos_path), options).await
        }
        StoreCommand::Upload {
            file,
            description,
            tags,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("{} has no file name", file.display()))?;
            let request = UploadRequest {
                filename,
                bytes,
                description,
                tags,
            };
            let summary = upload_photo(store, request, &config.upload_options()).await?;
            print_json(&summary)
        }
        StoreCommand::List { page, limit, tag } => {
            print_json(&store.list_page(page, limit, tag.as_deref()).await?)
        }
        StoreCommand::Show { id } => match store.find_by_id(id).await? {
            Some(photo) => print_json(&photo),
            None => bail!("Photo {} not found", id),
        },
        StoreCommand::Export { id, out } => {
            let photo = store
                .find_by_id(id)
                .await?
                .ok_or_else(|| anyhow!("Photo {} not found", id))?;
            tokio::fs::write(&out, &photo.content)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Exported photo {} to {}", id, out.display());
            print_json(&serde_json::json!({
                "id": id,
                "path": out.display().to_string(),
                "mime_type": photo.mime_type,
                "byte_size": photo.byte_size,
            }))
        }
        StoreCommand::Update {
            id,
            description,
            tags,
        } => {
            let tags = tags.as_deref().and_then(parse_tags);
            match store
                .update_details(id, description.as_deref(), tags.as_ref())
                .await?
            {
                Some(summary) => print_json(&summary),
                None => bail!("Photo {} not found", id),
            }
        }
        StoreCommand::Delete { id } => {
            if !store.delete(id).await? {
                bail!("Photo {} not found", id);
            }
            print_json(&serde_json::json!({ "deleted": id }))
        }
        StoreCommand::Search { tags } => {
            let tags = parse_tags(&tags).unwrap_or_default();
            print_json(&store.search_by_tags(&tags).await?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    run(cli, config).await
}
