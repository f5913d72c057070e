//! Process-wide render engine.
//!
//! The engine is bootstrapped lazily, exactly once per process: the first
//! caller runs the bootstrap while concurrent callers await the same
//! in-flight initialization instead of racing a second one.

use crate::error::Result;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use tokio::sync::OnceCell;

static ENGINE: OnceCell<RenderEngine> = OnceCell::const_new();

/// Shared render engine handle, bootstrapping it on first use.
pub async fn engine() -> Result<&'static RenderEngine> {
    ENGINE.get_or_try_init(RenderEngine::bootstrap).await
}

/// Rasterization primitives shared by every paginated session.
pub struct RenderEngine {
    max_dimension: u32,
}

impl RenderEngine {
    /// One-time engine bootstrap: codec self-check round-trip.
    async fn bootstrap() -> Result<Self> {
        tracing::info!("Bootstrapping render engine");
        tokio::task::yield_now().await;

        let mut probe = Vec::new();
        RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]))
            .write_to(&mut Cursor::new(&mut probe), image::ImageFormat::Png)?;
        image::load_from_memory(&probe)?;

        tracing::debug!("Render engine ready");
        Ok(Self {
            max_dimension: 8192,
        })
    }

    /// White canvas for a page of `width_pt` x `height_pt` points at `scale`.
    pub fn canvas(&self, width_pt: f32, height_pt: f32, scale: f32) -> RgbaImage {
        let width = self.pixels(width_pt, scale);
        let height = self.pixels(height_pt, scale);
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    /// Compose decoded page content onto a canvas, centered, aspect preserved.
    pub fn compose(&self, canvas: &mut RgbaImage, content: &DynamicImage) {
        let resized = content
            .resize(canvas.width(), canvas.height(), FilterType::Lanczos3)
            .to_rgba8();

        let x = (i64::from(canvas.width()) - i64::from(resized.width())) / 2;
        let y = (i64::from(canvas.height()) - i64::from(resized.height())) / 2;
        image::imageops::overlay(canvas, &resized, x.max(0), y.max(0));
    }

    fn pixels(&self, points: f32, scale: f32) -> u32 {
        let px = (points * scale).round();
        (px as u32).clamp(1, self.max_dimension)
    }
}
