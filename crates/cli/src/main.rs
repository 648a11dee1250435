use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use carlot_core::{
    config::{self, AppConfig},
    CatalogClient, CatalogEntry, CatalogSource, CreateError, DraftForm, EntryId, FavoritesStore,
    FileStorage, ImageUpload, Phase, SearchController, Toggled,
};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Browse and manage vehicle listings.
#[derive(Debug, Parser)]
#[command(name = "carlot", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List listings, optionally filtered by make or model.
    List {
        /// Case-insensitive make/model filter.
        query: Option<String>,
    },
    /// Show one listing.
    Show {
        /// Listing id.
        id: String,
    },
    /// Submit a new listing.
    Add(AddArgs),
    /// Delete a listing.
    Delete {
        /// Listing id.
        id: String,
        /// Succeed when the listing is already gone.
        #[arg(long)]
        ignore_missing: bool,
    },
    /// Manage the local favorites list.
    #[command(subcommand)]
    Favorites(FavoritesCommand),
}

#[derive(Debug, Args)]
struct AddArgs {
    #[arg(long)]
    make: String,
    #[arg(long)]
    model: String,
    #[arg(long)]
    year: String,
    #[arg(long)]
    price: String,
    #[arg(long, default_value = "")]
    mileage: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Photo to upload with the listing.
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum FavoritesCommand {
    /// Print saved favorites without contacting the service.
    List,
    /// Add or remove a listing from favorites.
    Toggle {
        /// Listing id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    init_logging(&config)?;
    debug!(api_url = %config.api_url, data_dir = %config.data_dir.display(), "configuration loaded");

    let client = Arc::new(CatalogClient::from_config(&config)?);
    let debounce = Duration::from_millis(config.search_debounce_ms);
    let favorites = FavoritesStore::open(Arc::new(FileStorage::new(config.storage_dir()))).await;

    match cli.command {
        Command::List { query } => {
            let controller = SearchController::idle(client.clone(), debounce);
            controller.set_query(query.unwrap_or_default());
            controller.refresh().await;

            let state = controller.state();
            if state.phase == Phase::Failed {
                bail!(
                    "failed to load listings: {}",
                    state.error_message.unwrap_or_default()
                );
            }
            if state.results.is_empty() {
                println!("No listings found.");
            }
            for entry in &state.results {
                print_summary(entry, favorites.is_favorite(&entry.id));
            }
        }
        Command::Show { id } => {
            let id = EntryId::new(id);
            let Some(entry) = client.get_entry_by_id(&id).await? else {
                bail!("no listing with ID {id}");
            };
            print_summary(&entry, favorites.is_favorite(&entry.id));
            if let Some(mileage) = entry.mileage {
                println!("  mileage: {mileage}");
            }
            if let Some(description) = &entry.description {
                println!("  {description}");
            }
            if let Some(url) = client.image_url(&entry) {
                println!("  image: {url}");
            }
        }
        Command::Add(args) => {
            let form = DraftForm {
                make: args.make,
                model: args.model,
                year: args.year,
                price: args.price,
                mileage: args.mileage,
                description: args.description,
                image: match args.image {
                    Some(path) => Some(read_image(&path).await?),
                    None => None,
                },
            };
            let controller = SearchController::idle(client.clone(), debounce);
            match controller.create_entry(form).await {
                Ok(created) => println!("Created listing {} ({})", created.id, created.display_name()),
                Err(CreateError::Invalid(errors)) => {
                    for (field, message) in errors.iter() {
                        eprintln!("  {field}: {message}");
                    }
                    bail!("listing was not submitted");
                }
                Err(CreateError::Remote(failure)) => return Err(failure.into()),
            }
        }
        Command::Delete { id, ignore_missing } => {
            let id = EntryId::new(id);
            let controller = SearchController::idle(client.clone(), debounce)
                .with_favorites(favorites.clone());
            match controller.delete_entry(&id).await {
                Ok(()) => println!("Deleted listing {id}"),
                Err(failure) if failure.is_not_found() && ignore_missing => {
                    favorites.forget(&id).await;
                    println!("Listing {id} was already gone");
                }
                Err(failure) => return Err(failure.into()),
            }
        }
        Command::Favorites(FavoritesCommand::List) => {
            let saved = favorites.favorites();
            if saved.is_empty() {
                println!("No favorites yet.");
            }
            for entry in &saved {
                print_summary(entry, true);
            }
        }
        Command::Favorites(FavoritesCommand::Toggle { id }) => {
            let id = EntryId::new(id);
            let saved = favorites.favorites().into_iter().find(|entry| entry.id == id);
            let entry = match saved {
                Some(entry) => entry,
                None => client
                    .get_entry_by_id(&id)
                    .await?
                    .with_context(|| format!("no listing with ID {id}"))?,
            };
            let label = entry.display_name();
            match favorites.toggle_favorite(entry).await {
                Toggled::Added => println!("Added {label} to favorites"),
                Toggled::Removed => println!("Removed {label} from favorites"),
                Toggled::Queued => println!("Favorites are still loading; change queued"),
            }
        }
    }

    Ok(())
}

fn print_summary(entry: &CatalogEntry, favorite: bool) {
    let marker = if favorite { '*' } else { ' ' };
    println!(
        "{marker} {:<26} {:<32} {:>10.2}",
        entry.id,
        entry.display_name(),
        entry.price
    );
}

async fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();
    let content_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    Ok(ImageUpload {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let log_dir = config.log_dir();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("carlot.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
