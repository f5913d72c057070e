//! bookshelf-rs entry point.

use bookshelf_rs::config::{BookCommand, Cli, Command, Config};
use bookshelf_rs::library::{Book, ContentStore, NewBook, UploadedFile};
use bookshelf_rs::server;
use bookshelf_rs::viewer::{
    HttpAssetSource, NoopEnvironment, SessionContent, Viewer, ViewerMode,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::Book { action }) => cmd_book(action, &config),
        Some(Command::Fav { id }) => cmd_fav(&id, &config),
        Some(Command::Read {
            id,
            page,
            scale,
            output,
            base_url,
        }) => cmd_read(&config, &id, page, scale, output, &base_url).await,
        Some(Command::Serve { bind, data }) => cmd_serve(config, bind, data).await,
        None => cmd_serve(config, None, None).await,
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookshelf_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize config and data layout.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _store = ContentStore::open(&config.storage, config.upload.clone())?;
    println!(
        "Initialized data directory: {}",
        config.storage.data_dir.display()
    );

    println!("\nEdit config.toml to configure the server.");
    println!("Then run: bookshelf-rs serve");

    Ok(())
}

/// Library management commands.
fn cmd_book(action: BookCommand, config: &Config) -> anyhow::Result<()> {
    let store = ContentStore::open(&config.storage, config.upload.clone())?;

    match action {
        BookCommand::Add {
            title,
            file,
            author,
            year,
            cover,
        } => {
            let book_file = read_upload(&file)?;
            let cover_file = cover.as_deref().map(read_upload).transpose()?;

            let book = store.create_book(NewBook {
                title,
                author,
                year,
                file: book_file,
                cover: cover_file,
            })?;
            println!(
                "Added book: {} ({}, id: {})",
                book.title, book.format, book.id
            );
        }

        BookCommand::List => {
            let books = store.list_books();
            if books.is_empty() {
                println!("No books found.");
            } else {
                println!("{:<36} {:<30} {:<20} FORMAT", "ID", "TITLE", "AUTHOR");
                println!("{}", "-".repeat(94));
                for book in books {
                    println!(
                        "{:<36} {:<30} {:<20} {}",
                        book.id, book.title, book.author, book.format
                    );
                }
            }
        }

        BookCommand::Del { id } => match store.delete_book(&id) {
            Ok(()) => println!("Deleted book: {}", id),
            Err(bookshelf_rs::AppError::NotFound(_)) => println!("Book not found: {}", id),
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}

/// Toggle a favorite.
fn cmd_fav(id: &str, config: &Config) -> anyhow::Result<()> {
    let store = ContentStore::open(&config.storage, config.upload.clone())?;
    let favorites = store.toggle_favorite(id)?;

    if favorites.iter().any(|fav| fav == id) {
        println!("Added to favorites: {}", id);
    } else {
        println!("Removed from favorites: {}", id);
    }
    println!("{} favorite(s) total.", favorites.len());

    Ok(())
}

/// Read a book against a running server.
async fn cmd_read(
    config: &Config,
    id: &str,
    page: u32,
    scale: f32,
    output: Option<PathBuf>,
    base_url: &str,
) -> anyhow::Result<()> {
    init_logging();

    let timeout = Duration::from_secs(config.viewer.fetch_timeout_secs);
    let assets = Arc::new(HttpAssetSource::new(Some(base_url), timeout)?);

    let record_url = format!("{}/books/{}", base_url.trim_end_matches('/'), id);
    let book: Book = reqwest::get(&record_url)
        .await?
        .error_for_status()?
        .json()
        .await?;

    println!("{} — {} ({})", book.title, book.author, book.format);

    let mut viewer = Viewer::new(NoopEnvironment, assets, scale);
    viewer.open(book);
    viewer.start_reading().await;

    match viewer.mode() {
        ViewerMode::Reading => {
            let content = viewer.session().and_then(|s| s.content());
            let is_paginated = matches!(content, Some(SessionContent::Paginated(_)));
            let is_text = matches!(content, Some(SessionContent::Text(_)));

            if is_paginated {
                let total = viewer.session().map(|s| s.total_pages).unwrap_or(0);
                let target = page.clamp(1, total.max(1));
                while viewer.session().map(|s| s.current_page).unwrap_or(target) < target {
                    viewer.next_page().await;
                }

                let Some(bitmap) = viewer.surface().current() else {
                    anyhow::bail!("No page rendered");
                };
                let output = output.unwrap_or_else(|| PathBuf::from("page.png"));
                bitmap.image.save(&output)?;
                println!(
                    "Rendered page {}/{} at {:.2}x to {}",
                    bitmap.page,
                    total,
                    bitmap.scale,
                    output.display()
                );
            } else if is_text {
                let text = viewer.session().and_then(|s| s.text()).unwrap_or_default();
                let head: String = text.chars().take(2000).collect();
                println!("{}", head);
                if text.chars().count() > 2000 {
                    println!("... ({} characters total)", text.chars().count());
                }
            } else {
                println!(
                    "Format cannot be read in place. Download: {}/books/{}/download",
                    base_url.trim_end_matches('/'),
                    id
                );
            }
        }
        ViewerMode::Error => {
            let message = viewer
                .session()
                .and_then(|s| s.last_error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            println!("Failed to open document: {}", message);
            println!(
                "Download instead: {}/books/{}/download",
                base_url.trim_end_matches('/'),
                id
            );
        }
        _ => {}
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    data: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(data_dir) = data {
        config.storage.data_dir = data_dir;
    }

    init_logging();

    let store = ContentStore::open(&config.storage, config.upload.clone())?;

    tracing::info!(
        bind = %config.server.bind,
        data_dir = %config.storage.data_dir.display(),
        title = %config.server.title,
        "Starting bookshelf-rs server"
    );

    let state = server::AppState::new(config.clone(), store);
    let app = server::create_router(state);

    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Read a local file into an upload payload.
fn read_upload(path: &std::path::Path) -> anyhow::Result<UploadedFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let bytes = std::fs::read(path)?;
    Ok(UploadedFile { name, bytes })
}
