//! Flat-text pipeline: whole-buffer decode for plain and structured text.

use crate::error::{AppError, Result};
use crate::viewer::TextVariant;
use crate::viewer::fetch::AssetSource;

/// Fetch an asset and decode it as displayable text, single-shot.
///
/// The structured variant extracts paragraph text from the document body;
/// when the markup cannot be parsed or holds no body paragraphs, the raw
/// decoded bytes are returned instead of failing the session.
pub async fn load_text(assets: &dyn AssetSource, url: &str, variant: TextVariant) -> Result<String> {
    let bytes = assets
        .fetch(url)
        .await
        .map_err(|e| AppError::Load(format!("Failed to fetch text: {}", e)))?;

    let raw = String::from_utf8_lossy(&bytes).into_owned();

    Ok(match variant {
        TextVariant::Plain => raw,
        TextVariant::Structured => match extract_body_text(&raw) {
            Some(text) => text,
            None => {
                tracing::debug!(url, "No parsable body, falling back to raw text");
                raw
            }
        },
    })
}

/// Concatenate the text of paragraph nodes inside the first body element,
/// blank-line separated, in document order.
fn extract_body_text(xml: &str) -> Option<String> {
    let doc = roxmltree::Document::parse(xml).ok()?;
    let body = doc.descendants().find(|n| n.has_tag_name("body"))?;

    let mut out = String::new();
    for paragraph in body.descendants().filter(|n| n.has_tag_name("p")) {
        let mut text = String::new();
        for chunk in paragraph
            .descendants()
            .filter(|n| n.is_text())
            .filter_map(|n| n.text())
        {
            text.push_str(chunk);
        }

        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(text);
    }

    (!out.is_empty()).then_some(out)
}
