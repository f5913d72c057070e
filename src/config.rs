use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Local library server with in-place book reading.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookshelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKSHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Path to the data directory (books, covers, metadata).
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Initialize the data directory and create a default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Library management commands.
    Book {
        /// Book subcommand action.
        #[command(subcommand)]
        action: BookCommand,
    },

    /// Toggle a book in the favorite set.
    Fav {
        /// Book id.
        id: String,
    },

    /// Read a book against a running server and dump the result.
    Read {
        /// Book id.
        id: String,

        /// Page to render (paginated formats only).
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Render scale.
        #[arg(short, long, default_value = "1.5")]
        scale: f32,

        /// Output file for the rendered page (PNG).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base URL of the running server.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        base_url: String,
    },
}

/// Library management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum BookCommand {
    /// Add a book from a local file.
    Add {
        /// Book title.
        title: String,

        /// Path to the book file (pdf, txt or fb2).
        #[arg(short, long)]
        file: PathBuf,

        /// Author name.
        #[arg(short, long)]
        author: Option<String>,

        /// Publication year.
        #[arg(short, long)]
        year: Option<String>,

        /// Path to a cover image (jpg, jpeg, png or webp).
        #[arg(long)]
        cover: Option<PathBuf>,
    },

    /// List all books.
    List,

    /// Delete a book.
    Del {
        /// Book id.
        id: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload validation limits.
    #[serde(default)]
    pub upload: UploadConfig,

    /// Viewer configuration.
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Library title.
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "My Library".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory holding book files, covers and metadata.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl StorageConfig {
    /// Directory for stored book files.
    pub fn books_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }

    /// Directory for stored cover images.
    pub fn covers_dir(&self) -> PathBuf {
        self.data_dir.join("image")
    }

    /// Path of the metadata collection.
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.json")
    }

    /// Path of the favorites collection.
    pub fn favorites_path(&self) -> PathBuf {
        self.data_dir.join("favorites.json")
    }
}

/// Upload validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum book file size in bytes.
    #[serde(default = "default_max_book_bytes")]
    pub max_book_bytes: u64,

    /// Maximum cover image size in bytes.
    #[serde(default = "default_max_cover_bytes")]
    pub max_cover_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_book_bytes: default_max_book_bytes(),
            max_cover_bytes: default_max_cover_bytes(),
        }
    }
}

fn default_max_book_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_cover_bytes() -> u64 {
    5 * 1024 * 1024
}

/// Viewer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Initial render scale for paginated documents.
    #[serde(default = "default_scale")]
    pub default_scale: f32,

    /// Timeout for asset fetches in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_scale: default_scale(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_scale() -> f32 {
    1.5
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("bookshelf-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("bookshelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/bookshelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# bookshelf-rs configuration

[server]
bind = "0.0.0.0:8080"
title = "My Library"

[storage]
# Book files land in <data_dir>/books, covers in <data_dir>/image.
data_dir = "data"

[upload]
# Size ceilings for uploads, in bytes.
max_book_bytes = 52428800
max_cover_bytes = 5242880

[viewer]
default_scale = 1.5
fetch_timeout_secs = 10
"#
        .to_string()
    }
}

/// Book formats the viewer can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    /// PDF format (Portable Document Format).
    Pdf,
    /// Plain text format.
    Txt,
    /// FB2 format (FictionBook).
    Fb2,
}

impl BookFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "application/pdf",
            BookFormat::Txt => "text/plain",
            BookFormat::Fb2 => "application/x-fictionbook+xml",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(BookFormat::Pdf),
            "txt" => Some(BookFormat::Txt),
            "fb2" => Some(BookFormat::Fb2),
            _ => None,
        }
    }
}

/// Cover image extensions accepted on upload.
pub const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Check whether a cover extension is accepted.
pub fn is_cover_extension(ext: &str) -> bool {
    let lower = ext.to_lowercase();
    COVER_EXTENSIONS.iter().any(|e| *e == lower)
}
