//! Paginated pipeline: page-addressable binary documents.
//!
//! Opens a URL-addressable PDF, reports its page count and rasterizes one
//! page at a time onto an RGBA canvas sized from the page MediaBox.

use crate::error::{AppError, Result};
use crate::viewer::engine::engine;
use crate::viewer::fetch::AssetSource;
use image::RgbaImage;
use lopdf::{Document, Object, ObjectId};

/// PDF file magic.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// MediaBox fallback when the document declares none (US Letter, points).
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// One rasterized page.
pub struct PageBitmap {
    /// Page number the raster was produced for (1-based).
    pub page: u32,
    /// Scale the raster was produced at.
    pub scale: f32,
    /// Pixel data.
    pub image: RgbaImage,
}

impl PageBitmap {
    /// Raster width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Raster height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// An open page-addressable document.
#[derive(Debug)]
pub struct PaginatedDocument {
    doc: Document,
    /// Number of pages in the document. Stable across repeated opens of the
    /// same asset.
    pub total_pages: u32,
}

impl PaginatedDocument {
    /// Open a document by URL and report its page count.
    ///
    /// Awaits the shared engine bootstrap, probes the file magic through a
    /// byte-range request before committing to the full download, then
    /// parses the body. Every failure on this path is a load failure.
    pub async fn open(assets: &dyn AssetSource, url: &str) -> Result<Self> {
        engine().await?;

        let head = assets
            .fetch_range(url, 0, 7)
            .await
            .map_err(|e| AppError::Load(format!("Failed to fetch document: {}", e)))?;
        if !head.starts_with(PDF_MAGIC) {
            return Err(AppError::Load("Not a PDF document".into()));
        }

        let bytes = assets
            .fetch(url)
            .await
            .map_err(|e| AppError::Load(format!("Failed to fetch document: {}", e)))?;

        let doc = Document::load_mem(&bytes)
            .map_err(|e| AppError::Load(format!("Failed to parse PDF: {}", e)))?;

        let total_pages = doc.get_pages().len() as u32;
        if total_pages == 0 {
            return Err(AppError::Load("Document has no pages".into()));
        }

        tracing::debug!(url, pages = total_pages, "Opened paginated document");
        Ok(Self { doc, total_pages })
    }

    /// Rasterize one page at the given scale.
    ///
    /// Pages without decodable raster content come back as a blank canvas;
    /// only a page lookup failure is a render error.
    pub async fn render_page(&self, page: u32, scale: f32) -> Result<PageBitmap> {
        let engine = engine().await?;

        let pages = self.doc.get_pages();
        let page_id = pages
            .get(&page)
            .copied()
            .ok_or_else(|| AppError::Render(format!("Page {} out of range", page)))?;

        let (width_pt, height_pt) = self.page_size(page_id);
        let mut canvas = engine.canvas(width_pt, height_pt, scale);

        match self.page_image(page_id) {
            Ok(Some(data)) => match image::load_from_memory(&data) {
                Ok(img) => engine.compose(&mut canvas, &img),
                Err(e) => {
                    tracing::debug!(page, error = %e, "Undecodable page image, leaving blank")
                }
            },
            Ok(None) => {}
            Err(e) => tracing::debug!(page, error = %e, "No drawable page content"),
        }

        Ok(PageBitmap {
            page,
            scale,
            image: canvas,
        })
    }

    /// Page dimensions in points from the MediaBox, walking up the page tree
    /// for inherited boxes.
    fn page_size(&self, page_id: ObjectId) -> (f32, f32) {
        let mut current = Some(page_id);
        let mut depth = 0;

        while let Some(id) = current {
            let Ok(dict) = self.doc.get_dictionary(id) else {
                break;
            };

            if let Ok(obj) = dict.get(b"MediaBox")
                && let Some(size) = self.media_box_size(obj)
            {
                return size;
            }

            current = match dict.get(b"Parent") {
                Ok(Object::Reference(r)) => Some(*r),
                _ => None,
            };

            depth += 1;
            if depth > 8 {
                break;
            }
        }

        DEFAULT_PAGE_SIZE
    }

    fn media_box_size(&self, obj: &Object) -> Option<(f32, f32)> {
        let array = match obj {
            Object::Array(a) => a,
            Object::Reference(r) => match self.doc.get_object(*r).ok()? {
                Object::Array(a) => a,
                _ => return None,
            },
            _ => return None,
        };

        if array.len() != 4 {
            return None;
        }

        let values: Vec<f32> = array.iter().filter_map(as_number).collect();
        if values.len() != 4 {
            return None;
        }

        let width = (values[2] - values[0]).abs();
        let height = (values[3] - values[1]).abs();
        (width > 0.0 && height > 0.0).then_some((width, height))
    }

    /// Find the first image XObject on a page and return encodable bytes.
    fn page_image(&self, page_id: ObjectId) -> Result<Option<Vec<u8>>> {
        let Ok(page) = self.doc.get_dictionary(page_id) else {
            return Ok(None);
        };

        // Resources may be a direct dict or a reference.
        let resources = match page.get(b"Resources") {
            Ok(Object::Reference(r)) => self.doc.get_dictionary(*r).ok(),
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        };
        let Some(resources) = resources else {
            return Ok(None);
        };

        let xobjects = match resources.get(b"XObject") {
            Ok(Object::Reference(r)) => self.doc.get_dictionary(*r).ok(),
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        };
        let Some(xobjects) = xobjects else {
            return Ok(None);
        };

        for (_name, obj) in xobjects.iter() {
            let Object::Reference(xobj_ref) = obj else {
                continue;
            };

            let Ok(Object::Stream(xobj_stream)) = self.doc.get_object(*xobj_ref) else {
                continue;
            };

            let is_image = matches!(
                xobj_stream.dict.get(b"Subtype"),
                Ok(Object::Name(n)) if n == b"Image"
            );
            if !is_image {
                continue;
            }

            // DCTDecode streams hold ready-to-decode JPEG data.
            let is_dct = match xobj_stream.dict.get(b"Filter") {
                Ok(Object::Name(n)) => n == b"DCTDecode",
                Ok(Object::Array(arr)) => arr
                    .iter()
                    .any(|item| matches!(item, Object::Name(n) if n == b"DCTDecode")),
                _ => false,
            };

            if is_dct {
                let data = if !xobj_stream.content.is_empty() {
                    xobj_stream.content.clone()
                } else if let Ok(decoded) = xobj_stream.decompressed_content() {
                    decoded
                } else {
                    continue;
                };

                if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
                    return Ok(Some(data));
                }
            }

            if let Ok(data) = xobj_stream.decompressed_content() {
                // JPEG or PNG after decompression.
                if data.starts_with(&[0xFF, 0xD8, 0xFF])
                    || data.starts_with(&[0x89, 0x50, 0x4E, 0x47])
                {
                    return Ok(Some(data));
                }

                // Raw samples: rebuild as PNG when dimensions are declared.
                let width = match xobj_stream.dict.get(b"Width") {
                    Ok(Object::Integer(i)) => Some(*i as u32),
                    _ => None,
                };
                let height = match xobj_stream.dict.get(b"Height") {
                    Ok(Object::Integer(i)) => Some(*i as u32),
                    _ => None,
                };

                if let (Some(w), Some(h)) = (width, height)
                    && let Some(img) = image::RgbImage::from_raw(w, h, data.clone())
                {
                    let mut png_data = Vec::new();
                    if image::DynamicImage::ImageRgb8(img)
                        .write_to(
                            &mut std::io::Cursor::new(&mut png_data),
                            image::ImageFormat::Png,
                        )
                        .is_ok()
                    {
                        return Ok(Some(png_data));
                    }
                }
            }
        }

        Ok(None)
    }
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}
