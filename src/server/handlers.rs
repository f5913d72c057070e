//! HTTP request handlers.

use crate::config::BookFormat;
use crate::error::{AppError, Result};
use crate::library::{Book, NewBook, UploadedFile};
use crate::server::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

/// All books, newest first.
pub async fn list_books(State(state): State<AppState>) -> Json<Vec<Book>> {
    Json(state.store.list_books())
}

/// Book metadata (JSON).
pub async fn book_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>> {
    let book = state
        .store
        .get_book(&id)
        .ok_or_else(|| AppError::NotFound(format!("book {}", id)))?;

    Ok(Json(book))
}

/// Create a book from a multipart upload.
///
/// Text fields: `title` (required), `author`, `year`. File fields: `book`
/// (required), `cover`.
pub async fn create_book(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Book>> {
    let mut title = None;
    let mut author = None;
    let mut year = None;
    let mut book_file: Option<UploadedFile> = None;
    let mut cover: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(field.text().await.map_err(bad_upload)?),
            "author" => author = Some(field.text().await.map_err(bad_upload)?),
            "year" => year = Some(field.text().await.map_err(bad_upload)?),
            "book" | "cover" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_upload)?.to_vec();
                let uploaded = UploadedFile {
                    name: file_name,
                    bytes,
                };
                if name == "book" {
                    book_file = Some(uploaded);
                } else {
                    cover = Some(uploaded);
                }
            }
            _ => {}
        }
    }

    let file = book_file
        .ok_or_else(|| AppError::Validation("Please provide book title and file".into()))?;

    let book = state.store.create_book(NewBook {
        title: title.unwrap_or_default(),
        author,
        year,
        file,
        cover,
    })?;

    Ok(Json(book))
}

/// Delete a book, its stored files and any favorite mark.
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.delete_book(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Book download with attachment disposition.
pub async fn book_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let book = state
        .store
        .get_book(&id)
        .ok_or_else(|| AppError::NotFound(format!("book {}", id)))?;

    let path = state.store.asset_path(&book);
    let file = tokio::fs::File::open(&path).await?;
    let size = file.metadata().await?.len();
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mime = BookFormat::from_extension(&book.format)
        .map(|f| f.mime_type())
        .unwrap_or("application/octet-stream");
    let content_disposition = format!("attachment; filename=\"{}\"", book.file_name());

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .header(header::CONTENT_LENGTH, size)
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}

/// Current favorite set.
pub async fn list_favorites(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.store.favorites())
}

/// Toggle a favorite, returning the updated set.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.store.toggle_favorite(&id)?))
}

fn bad_upload(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Invalid upload: {}", e))
}
