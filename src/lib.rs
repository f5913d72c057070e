//! bookshelf-rs: a local library server with in-place book reading.
//!
//! This crate stores book files and covers, tracks metadata and favorites,
//! and lets a user read a book without leaving the library: PDF documents
//! are rasterized page by page, TXT and FB2 files are decoded into plain
//! text. Unsupported formats fall back to a download-only view.
//!
//! # Features
//!
//! - Book upload with validation (PDF/TXT/FB2, optional cover image)
//! - Metadata and favorites persisted as atomically rewritten collections
//! - Favorites purged automatically when a book is deleted
//! - Incremental document viewer with page navigation and zoom
//! - Stale render suppression via monotonic request tokens
//! - Byte-range asset serving for efficient page access
//! - Download fallback for formats the viewer cannot decode

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// Error types.
pub mod error;
/// Library models and content store.
pub mod library;
/// HTTP server.
pub mod server;
/// Document viewing engine.
pub mod viewer;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use error::{AppError, Result};
pub use library::{Book, ContentStore};
pub use server::AppState;
pub use viewer::{PipelineKind, TextVariant, Viewer};
