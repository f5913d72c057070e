//! Ephemeral per-open-book reading session.

use crate::library::Book;
use crate::viewer::paginated::PaginatedDocument;

/// Minimum render scale.
pub const SCALE_MIN: f32 = 0.5;
/// Maximum render scale.
pub const SCALE_MAX: f32 = 3.0;
/// Zoom step.
pub const SCALE_STEP: f32 = 0.25;
/// Initial render scale.
pub const DEFAULT_SCALE: f32 = 1.5;

/// Decoded content held by a reading session.
pub enum SessionContent {
    /// Open page-addressable document handle.
    Paginated(PaginatedDocument),
    /// Decoded text buffer.
    Text(String),
    /// Nothing to decode; the session only offers a download.
    DownloadOnly,
}

/// Session state owned by the viewer while a book is open.
///
/// Created on open, destroyed when the viewer closes; every field returns
/// to its initial value when reading stops.
pub struct ViewerSession {
    /// The book this session was opened for.
    pub book: Book,
    pub(crate) content: Option<SessionContent>,
    /// Current page, `1..=total_pages` whenever `total_pages > 0`.
    pub current_page: u32,
    /// Page count reported by the paginated pipeline, 0 otherwise.
    pub total_pages: u32,
    /// Current render scale.
    pub scale: f32,
    /// Message of the failure that moved the session into Error, if any.
    pub last_error: Option<String>,
}

impl ViewerSession {
    pub(crate) fn new(book: Book, scale: f32) -> Self {
        Self {
            book,
            content: None,
            current_page: 1,
            total_pages: 0,
            scale,
            last_error: None,
        }
    }

    /// Decoded content, if the session reached Reading.
    pub fn content(&self) -> Option<&SessionContent> {
        self.content.as_ref()
    }

    /// Decoded text, for flat-text sessions.
    pub fn text(&self) -> Option<&str> {
        match self.content {
            Some(SessionContent::Text(ref text)) => Some(text),
            _ => None,
        }
    }

    /// Drop decoded content and return all cursors to their defaults.
    pub(crate) fn reset(&mut self, scale: f32) {
        self.content = None;
        self.current_page = 1;
        self.total_pages = 0;
        self.scale = scale;
        self.last_error = None;
    }
}
