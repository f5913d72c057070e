//! Document viewing engine.
//!
//! A viewer session takes a [`crate::library::Book`] record and decodes the
//! stored asset according to its declared format: PDF documents go through
//! the paginated pipeline (page count, per-page rasterization, zoom), TXT
//! and FB2 files through the flat-text pipeline. Formats outside that set
//! get a download-only session instead of an error.

mod engine;
mod env;
mod fetch;
mod flat_text;
mod machine;
mod paginated;
mod session;

pub use engine::{RenderEngine, engine};
pub use env::{EnvEvent, Environment, NoopEnvironment, ViewerKey};
pub use fetch::{AssetSource, HttpAssetSource};
pub use flat_text::load_text;
pub use machine::{RenderRequest, RenderSurface, Viewer, ViewerMode};
pub use paginated::{PageBitmap, PaginatedDocument};
pub use session::{
    DEFAULT_SCALE, SCALE_MAX, SCALE_MIN, SCALE_STEP, SessionContent, ViewerSession,
};

/// Flat-text decode variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextVariant {
    /// Bytes are displayed as text verbatim.
    Plain,
    /// Markup-wrapped text; paragraphs are extracted from the body element.
    Structured,
}

/// Decode pipeline selected for a declared format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Page-addressable binary document, rasterized page by page.
    Paginated,
    /// Whole-buffer text decode.
    FlatText(TextVariant),
    /// No decode path; the viewer offers a download instead.
    Unsupported,
}

impl PipelineKind {
    /// Map a declared format to its pipeline.
    ///
    /// Case-insensitive and total: unknown formats select [`Unsupported`]
    /// rather than failing, so the viewer always has a defined path.
    ///
    /// [`Unsupported`]: PipelineKind::Unsupported
    pub fn select(format: &str) -> Self {
        match format.trim().to_lowercase().as_str() {
            "pdf" => PipelineKind::Paginated,
            "txt" => PipelineKind::FlatText(TextVariant::Plain),
            "fb2" => PipelineKind::FlatText(TextVariant::Structured),
            _ => PipelineKind::Unsupported,
        }
    }
}
