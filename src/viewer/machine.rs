//! Viewer state machine.
//!
//! Modes move `Closed -> Preview -> Loading -> Reading`, with `Error`
//! reachable from `Loading`. Reading acquires scroll suppression and
//! keyboard capture from the environment; both are released on every exit
//! path, including teardown.
//!
//! Navigation and zoom are split into a synchronous state step plus a
//! `begin_render`/`commit_render` token handshake: every render carries a
//! monotonically increasing token, and only the completion whose token is
//! still the latest issued may touch the surface. Everything else is
//! discarded silently, so the last-issued request always wins.

use crate::error::Result;
use crate::library::Book;
use crate::viewer::PipelineKind;
use crate::viewer::env::{EnvEvent, Environment, ViewerKey};
use crate::viewer::fetch::AssetSource;
use crate::viewer::flat_text::load_text;
use crate::viewer::paginated::{PageBitmap, PaginatedDocument};
use crate::viewer::session::{SCALE_MAX, SCALE_MIN, SCALE_STEP, SessionContent, ViewerSession};
use std::sync::Arc;

/// Viewer modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerMode {
    /// No book open.
    Closed,
    /// Book record shown, nothing decoded yet.
    Preview,
    /// A pipeline is opening the asset.
    Loading,
    /// Decoded content on screen.
    Reading,
    /// The pipeline could not open the asset; download fallback offered.
    Error,
}

/// An issued render: token plus the page/scale it was issued for.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    /// Monotonic token; only the latest issued may commit.
    pub token: u64,
    /// Page the render targets.
    pub page: u32,
    /// Scale the render targets.
    pub scale: f32,
}

struct Frame {
    token: u64,
    bitmap: PageBitmap,
}

/// The single shared render surface.
///
/// At most one committed write per completed, non-stale render.
#[derive(Default)]
pub struct RenderSurface {
    frame: Option<Frame>,
}

impl RenderSurface {
    /// The last committed raster, if any.
    pub fn current(&self) -> Option<&PageBitmap> {
        self.frame.as_ref().map(|f| &f.bitmap)
    }

    fn commit(&mut self, token: u64, bitmap: PageBitmap) {
        tracing::debug!(token, page = bitmap.page, "Committing render");
        self.frame = Some(Frame { token, bitmap });
    }

    fn clear(&mut self) {
        self.frame = None;
    }
}

/// Orchestrates the reading session: mode transitions, pipelines, input.
pub struct Viewer<E: Environment> {
    env: E,
    assets: Arc<dyn AssetSource>,
    default_scale: f32,
    mode: ViewerMode,
    session: Option<ViewerSession>,
    surface: RenderSurface,
    issued: u64,
    fullscreen: bool,
    resources_held: bool,
    on_close: Option<Box<dyn FnMut() + Send>>,
}

impl<E: Environment> Viewer<E> {
    /// Create a closed viewer.
    ///
    /// The host should forward platform fullscreen notifications through
    /// [`handle_env_event`] for as long as the viewer exists, regardless of
    /// mode.
    ///
    /// [`handle_env_event`]: Viewer::handle_env_event
    pub fn new(env: E, assets: Arc<dyn AssetSource>, default_scale: f32) -> Self {
        Self {
            env,
            assets,
            default_scale: default_scale.clamp(SCALE_MIN, SCALE_MAX),
            mode: ViewerMode::Closed,
            session: None,
            surface: RenderSurface::default(),
            issued: 0,
            fullscreen: false,
            resources_held: false,
            on_close: None,
        }
    }

    /// Register the callback invoked when the viewer transitions to Closed.
    pub fn on_close(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_close = Some(Box::new(callback));
    }

    /// Current mode.
    pub fn mode(&self) -> ViewerMode {
        self.mode
    }

    /// Current session, while one exists.
    pub fn session(&self) -> Option<&ViewerSession> {
        self.session.as_ref()
    }

    /// The shared render surface.
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// Whether the viewer believes the display is fullscreen.
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// Open a book: `Closed -> Preview`.
    pub fn open(&mut self, book: Book) {
        if self.mode != ViewerMode::Closed {
            tracing::warn!(book = %book.id, "Viewer already open, ignoring");
            return;
        }
        self.session = Some(ViewerSession::new(book, self.default_scale));
        self.mode = ViewerMode::Preview;
    }

    /// Start reading: `Preview -> Loading`, then `Reading` or `Error`.
    pub async fn start_reading(&mut self) {
        if self.mode != ViewerMode::Preview {
            return;
        }
        let Some(book) = self.session.as_ref().map(|s| s.book.clone()) else {
            return;
        };

        self.mode = ViewerMode::Loading;
        tracing::info!(book = %book.id, format = %book.format, "Starting reading session");

        match PipelineKind::select(&book.format) {
            PipelineKind::Paginated => {
                match PaginatedDocument::open(self.assets.as_ref(), &book.file).await {
                    Ok(doc) => {
                        if let Some(session) = self.session.as_mut() {
                            session.total_pages = doc.total_pages;
                            session.current_page = 1;
                            session.content = Some(SessionContent::Paginated(doc));
                        }
                        self.enter_reading();
                        self.render_current().await;
                    }
                    Err(e) => self.fail_loading(&e),
                }
            }
            PipelineKind::FlatText(variant) => {
                match load_text(self.assets.as_ref(), &book.file, variant).await {
                    Ok(text) => {
                        if let Some(session) = self.session.as_mut() {
                            session.content = Some(SessionContent::Text(text));
                        }
                        self.enter_reading();
                    }
                    Err(e) => self.fail_loading(&e),
                }
            }
            PipelineKind::Unsupported => {
                tracing::info!(format = %book.format, "Unsupported format, offering download only");
                if let Some(session) = self.session.as_mut() {
                    session.content = Some(SessionContent::DownloadOnly);
                }
                self.enter_reading();
            }
        }
    }

    /// Stop reading: `Reading | Error -> Preview`, resetting the session.
    pub fn stop_reading(&mut self) {
        if !matches!(self.mode, ViewerMode::Reading | ViewerMode::Error) {
            return;
        }
        if self.fullscreen {
            self.env.exit_fullscreen();
            self.fullscreen = false;
        }
        self.release_resources();
        // Invalidate whatever renders are still in flight.
        self.issued += 1;
        self.surface.clear();
        if let Some(session) = self.session.as_mut() {
            session.reset(self.default_scale);
        }
        self.mode = ViewerMode::Preview;
    }

    /// Close the viewer from any mode, invoking the close callback.
    pub fn close(&mut self) {
        if self.mode == ViewerMode::Closed {
            return;
        }
        if self.fullscreen {
            self.env.exit_fullscreen();
            self.fullscreen = false;
        }
        self.release_resources();
        self.issued += 1;
        self.surface.clear();
        self.session = None;
        self.mode = ViewerMode::Closed;
        if let Some(callback) = self.on_close.as_mut() {
            callback();
        }
    }

    /// Escape: back out of Reading or Error, close from Preview.
    pub fn escape(&mut self) {
        match self.mode {
            ViewerMode::Reading | ViewerMode::Error => self.stop_reading(),
            ViewerMode::Preview => self.close(),
            _ => {}
        }
    }

    /// Route a key press.
    pub async fn handle_key(&mut self, key: ViewerKey) {
        match key {
            ViewerKey::Escape => self.escape(),
            ViewerKey::NextPage => self.next_page().await,
            ViewerKey::PrevPage => self.prev_page().await,
            ViewerKey::ZoomIn => self.zoom_in().await,
            ViewerKey::ZoomOut => self.zoom_out().await,
        }
    }

    /// Apply an environment notification.
    pub fn handle_env_event(&mut self, event: EnvEvent) {
        match event {
            EnvEvent::FullscreenChanged(active) => self.fullscreen = active,
        }
    }

    /// Toggle fullscreen; meaningful only while Reading.
    pub fn toggle_fullscreen(&mut self) {
        if self.mode != ViewerMode::Reading {
            return;
        }
        if self.fullscreen {
            if self.env.exit_fullscreen() {
                self.fullscreen = false;
            }
        } else if self.env.enter_fullscreen() {
            self.fullscreen = true;
        }
    }

    /// Advance one page; no-op at the last page.
    pub async fn next_page(&mut self) {
        if self.step_page(1) {
            self.render_current().await;
        }
    }

    /// Go back one page; no-op at the first page.
    pub async fn prev_page(&mut self) {
        if self.step_page(-1) {
            self.render_current().await;
        }
    }

    /// Zoom in one step, clamped; re-renders the current page.
    pub async fn zoom_in(&mut self) {
        if self.step_scale(SCALE_STEP) {
            self.render_current().await;
        }
    }

    /// Zoom out one step, clamped; re-renders the current page.
    pub async fn zoom_out(&mut self) {
        if self.step_scale(-SCALE_STEP) {
            self.render_current().await;
        }
    }

    /// Render the current page/scale through the token handshake.
    pub async fn render_current(&mut self) {
        let Some(request) = self.begin_render() else {
            return;
        };

        let outcome = match self.session.as_ref().and_then(|s| s.content()) {
            Some(SessionContent::Paginated(doc)) => {
                doc.render_page(request.page, request.scale).await
            }
            _ => return,
        };

        self.commit_render(request, outcome);
    }

    /// Issue a render token for the current page/scale.
    ///
    /// Returns None outside Reading or without a paginated document.
    pub(crate) fn begin_render(&mut self) -> Option<RenderRequest> {
        if self.mode != ViewerMode::Reading {
            return None;
        }
        let (page, scale) = {
            let session = self.session.as_ref()?;
            if !matches!(session.content, Some(SessionContent::Paginated(_))) {
                return None;
            }
            (session.current_page, session.scale)
        };

        self.issued += 1;
        Some(RenderRequest {
            token: self.issued,
            page,
            scale,
        })
    }

    /// Complete a render: commit if the token is still the latest issued.
    ///
    /// Stale completions are discarded silently. A failed render is logged
    /// and the surface keeps the last successfully committed page.
    pub(crate) fn commit_render(&mut self, request: RenderRequest, outcome: Result<PageBitmap>) {
        if request.token != self.issued || self.mode != ViewerMode::Reading {
            tracing::debug!(
                token = request.token,
                latest = self.issued,
                "Discarding stale render"
            );
            return;
        }

        match outcome {
            Ok(bitmap) => self.surface.commit(request.token, bitmap),
            Err(e) => tracing::warn!(page = request.page, error = %e, "Page render failed"),
        }
    }

    /// Clamped page step; false when the move would leave `[1, total_pages]`.
    pub(crate) fn step_page(&mut self, delta: i64) -> bool {
        if self.mode != ViewerMode::Reading {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.total_pages == 0
            || !matches!(session.content, Some(SessionContent::Paginated(_)))
        {
            return false;
        }

        let target = i64::from(session.current_page) + delta;
        if target < 1 || target > i64::from(session.total_pages) {
            return false;
        }
        session.current_page = target as u32;
        true
    }

    /// Clamped scale step; true when a paginated re-render is needed.
    pub(crate) fn step_scale(&mut self, delta: f32) -> bool {
        if self.mode != ViewerMode::Reading {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let next = (session.scale + delta).clamp(SCALE_MIN, SCALE_MAX);
        if (next - session.scale).abs() < f32::EPSILON {
            return false;
        }
        session.scale = next;
        matches!(session.content, Some(SessionContent::Paginated(_)))
    }

    fn enter_reading(&mut self) {
        self.mode = ViewerMode::Reading;
        self.acquire_resources();
    }

    fn fail_loading(&mut self, error: &crate::error::AppError) {
        tracing::warn!(error = %error, "Pipeline failed to open document");
        if let Some(session) = self.session.as_mut() {
            session.last_error = Some(error.to_string());
        }
        self.mode = ViewerMode::Error;
    }

    fn acquire_resources(&mut self) {
        if !self.resources_held {
            self.env.set_scroll_lock(true);
            self.env.set_keyboard_capture(true);
            self.resources_held = true;
        }
    }

    fn release_resources(&mut self) {
        if self.resources_held {
            self.env.set_keyboard_capture(false);
            self.env.set_scroll_lock(false);
            self.resources_held = false;
        }
    }
}

impl<E: Environment> Drop for Viewer<E> {
    fn drop(&mut self) {
        self.release_resources();
    }
}
