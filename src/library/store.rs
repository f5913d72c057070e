//! Content store: book files, covers, metadata and favorites.
//!
//! Metadata and favorites are each one JSON collection, rewritten through a
//! temp-file rename on every mutation so a concurrent reader never observes
//! a partially written collection.

use crate::config::{BookFormat, StorageConfig, UploadConfig, is_cover_extension};
use crate::error::{AppError, Result};
use crate::library::book::{Book, locator_file_name};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// An uploaded file: original name plus content.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name, used for extension validation.
    pub name: String,
    /// File content.
    pub bytes: Vec<u8>,
}

/// Fields of a book creation request.
#[derive(Debug, Clone)]
pub struct NewBook {
    /// Book title (required, non-empty).
    pub title: String,
    /// Author name.
    pub author: Option<String>,
    /// Publication year, free text.
    pub year: Option<String>,
    /// The book file itself.
    pub file: UploadedFile,
    /// Optional cover image.
    pub cover: Option<UploadedFile>,
}

#[derive(Default)]
struct Collections {
    books: Vec<Book>,
    favorites: Vec<String>,
}

/// Persistent store for books, covers and favorites.
pub struct ContentStore {
    books_dir: PathBuf,
    covers_dir: PathBuf,
    metadata_path: PathBuf,
    favorites_path: PathBuf,
    limits: UploadConfig,
    inner: RwLock<Collections>,
}

impl ContentStore {
    /// Open the store, creating directories and empty collections on first run.
    pub fn open(storage: &StorageConfig, limits: UploadConfig) -> Result<Self> {
        let books_dir = storage.books_dir();
        let covers_dir = storage.covers_dir();
        fs::create_dir_all(&books_dir)?;
        fs::create_dir_all(&covers_dir)?;

        let metadata_path = storage.metadata_path();
        let favorites_path = storage.favorites_path();

        let books: Vec<Book> = load_or_init(&metadata_path)?;
        let favorites: Vec<String> = load_or_init(&favorites_path)?;

        tracing::info!(
            books = books.len(),
            favorites = favorites.len(),
            data_dir = %storage.data_dir.display(),
            "Opened content store"
        );

        Ok(Self {
            books_dir,
            covers_dir,
            metadata_path,
            favorites_path,
            limits,
            inner: RwLock::new(Collections { books, favorites }),
        })
    }

    /// All books, newest first.
    pub fn list_books(&self) -> Vec<Book> {
        self.inner.read().books.clone()
    }

    /// Look up a book by id.
    pub fn get_book(&self, id: &str) -> Option<Book> {
        self.inner.read().books.iter().find(|b| b.id == id).cloned()
    }

    /// Number of books in the library.
    pub fn book_count(&self) -> usize {
        self.inner.read().books.len()
    }

    /// Validate and store a new book, prepending it to the collection.
    pub fn create_book(&self, draft: NewBook) -> Result<Book> {
        let title = draft.title.trim().to_string();
        if title.is_empty() || draft.file.bytes.is_empty() {
            return Err(AppError::Validation(
                "Please provide book title and file".into(),
            ));
        }

        let ext = file_extension(&draft.file.name);
        if BookFormat::from_extension(&ext).is_none() {
            return Err(AppError::Validation(format!(
                "Unsupported file type: .{}. Only PDF, TXT, FB2 are supported.",
                ext
            )));
        }
        if draft.file.bytes.len() as u64 > self.limits.max_book_bytes {
            return Err(AppError::Validation(format!(
                "Book file exceeds the {} byte limit",
                self.limits.max_book_bytes
            )));
        }

        if let Some(ref cover) = draft.cover {
            let cover_ext = file_extension(&cover.name);
            if !is_cover_extension(&cover_ext) {
                return Err(AppError::Validation(format!(
                    "Unsupported cover type: .{}. Only JPG, JPEG, PNG, WEBP are supported.",
                    cover_ext
                )));
            }
            if cover.bytes.len() as u64 > self.limits.max_cover_bytes {
                return Err(AppError::Validation(format!(
                    "Cover image exceeds the {} byte limit",
                    self.limits.max_cover_bytes
                )));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();

        let stored_name = format!("{}.{}", id, ext);
        write_stored(&self.books_dir.join(&stored_name), &draft.file.bytes)?;

        let image = match draft.cover {
            Some(cover) => {
                let cover_name = format!("{}.{}", id, file_extension(&cover.name));
                match write_stored(&self.covers_dir.join(&cover_name), &cover.bytes) {
                    Ok(()) => Some(format!("/assets/image/{}", cover_name)),
                    Err(e) => {
                        // The book file is already on disk; roll it back so a
                        // failed create leaves no orphan.
                        remove_quietly(&self.books_dir.join(&stored_name));
                        return Err(e);
                    }
                }
            }
            None => None,
        };

        let book = Book {
            id,
            title,
            author: draft
                .author
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            year: draft
                .year
                .map(|y| y.trim().to_string())
                .unwrap_or_default(),
            format: ext.to_uppercase(),
            file: format!("/assets/books/{}", stored_name),
            image,
            added_at: Utc::now(),
        };

        {
            let mut inner = self.inner.write();
            inner.books.insert(0, book.clone());
            self.persist_books(&inner)?;
        }

        tracing::info!(book = %book.id, title = %book.title, "Added book");
        Ok(book)
    }

    /// Delete a book: stored files, metadata entry and any favorite mark.
    ///
    /// Missing underlying files are tolerated, removal failures are logged.
    pub fn delete_book(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();

        let Some(pos) = inner.books.iter().position(|b| b.id == id) else {
            return Err(AppError::NotFound(format!("book {}", id)));
        };
        let book = inner.books.remove(pos);

        remove_quietly(&self.books_dir.join(book.file_name()));
        if let Some(cover_name) = book.cover_name() {
            remove_quietly(&self.covers_dir.join(cover_name));
        }

        inner.favorites.retain(|fav| fav != id);
        self.persist_books(&inner)?;
        self.persist_favorites(&inner)?;

        tracing::info!(book = %id, title = %book.title, "Deleted book");
        Ok(())
    }

    /// Current favorite set.
    pub fn favorites(&self) -> Vec<String> {
        self.inner.read().favorites.clone()
    }

    /// Toggle a book in the favorite set, returning the updated set.
    ///
    /// Unknown ids are rejected so the set never references a missing book.
    pub fn toggle_favorite(&self, id: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write();

        if !inner.books.iter().any(|b| b.id == id) {
            return Err(AppError::NotFound(format!("book {}", id)));
        }

        if let Some(pos) = inner.favorites.iter().position(|fav| fav == id) {
            inner.favorites.remove(pos);
            tracing::debug!(book = %id, "Removed from favorites");
        } else {
            inner.favorites.push(id.to_string());
            tracing::debug!(book = %id, "Added to favorites");
        }

        self.persist_favorites(&inner)?;
        Ok(inner.favorites.clone())
    }

    /// Resolve a book locator to its path inside the store.
    pub fn asset_path(&self, book: &Book) -> PathBuf {
        self.books_dir.join(locator_file_name(&book.file))
    }

    fn persist_books(&self, inner: &Collections) -> Result<()> {
        write_atomic(&self.metadata_path, &inner.books)
    }

    fn persist_favorites(&self, inner: &Collections) -> Result<()> {
        write_atomic(&self.favorites_path, &inner.favorites)
    }
}

/// Lowercased extension of an uploaded file name.
fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn write_stored(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)
        .map_err(|e| AppError::Storage(format!("Failed to store {}: {}", path.display(), e)))
}

/// Rewrite a collection through a temp file so readers never see a partial one.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, data)
        .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| AppError::Storage(format!("Failed to replace {}: {}", path.display(), e)))
}

fn load_or_init<T: serde::de::DeserializeOwned + Serialize + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        let empty = T::default();
        write_atomic(path, &empty)?;
        Ok(empty)
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!(file = %path.display(), "Removed stored file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(file = %path.display(), "Stored file already gone");
        }
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "Failed to remove stored file"),
    }
}
