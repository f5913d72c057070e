//! Book metadata model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a book in the library.
///
/// The record is immutable once returned to a caller: mutations go through
/// the content store, which replaces the whole collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Unique identifier for the book.
    pub id: String,

    /// Book title.
    pub title: String,

    /// Author name ("Unknown" when not provided).
    pub author: String,

    /// Publication year, free text (empty when not provided).
    #[serde(default)]
    pub year: String,

    /// Declared format, uppercased file extension (e.g. "PDF").
    pub format: String,

    /// Locator of the stored book file, e.g. `/assets/books/<name>`.
    pub file: String,

    /// Locator of the stored cover image, if one was uploaded.
    pub image: Option<String>,

    /// When the book was added to the library.
    pub added_at: DateTime<Utc>,
}

impl Book {
    /// File name component of the book locator.
    pub fn file_name(&self) -> &str {
        locator_file_name(&self.file)
    }

    /// File name component of the cover locator, if any.
    pub fn cover_name(&self) -> Option<&str> {
        self.image.as_deref().map(locator_file_name)
    }
}

/// Last path segment of an asset locator.
pub(crate) fn locator_file_name(locator: &str) -> &str {
    locator.rsplit('/').next().unwrap_or(locator)
}
