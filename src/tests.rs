use crate::config::{Config, StorageConfig, UploadConfig};
use crate::error::{AppError, Result};
use crate::library::{Book, ContentStore, NewBook, UploadedFile};
use crate::viewer::{
    AssetSource, DEFAULT_SCALE, EnvEvent, Environment, PageBitmap, PaginatedDocument,
    PipelineKind, SessionContent, TextVariant, Viewer, ViewerKey, ViewerMode, load_text,
};
use async_trait::async_trait;
use lopdf::{Object, Stream, dictionary};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// HELPERS
// ============================================================================

fn test_store() -> (ContentStore, StorageConfig, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        data_dir: dir.path().join("data"),
    };
    let store = ContentStore::open(&storage, UploadConfig::default()).unwrap();
    (store, storage, dir)
}

fn draft(title: &str, file_name: &str, bytes: &[u8]) -> NewBook {
    NewBook {
        title: title.to_string(),
        author: None,
        year: None,
        file: UploadedFile {
            name: file_name.to_string(),
            bytes: bytes.to_vec(),
        },
        cover: None,
    }
}

fn sample_book(format: &str, file: &str) -> Book {
    Book {
        id: "book-1".to_string(),
        title: "Test Book".to_string(),
        author: "Unknown".to_string(),
        year: String::new(),
        format: format.to_string(),
        file: file.to_string(),
        image: None,
        added_at: chrono::Utc::now(),
    }
}

/// Minimal valid PDF with the given number of empty Letter pages.
fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");

    let mut kids = Vec::new();
    let mut page_ids = Vec::new();
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
        page_ids.push(page_id);
    }

    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
    });

    for page_id in page_ids {
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

const SAMPLE_FB2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0">
  <description>
    <title-info><book-title>Test</book-title></title-info>
  </description>
  <body>
    <section>
      <p>First <emphasis>paragraph</emphasis>.</p>
      <p>Second paragraph.</p>
    </section>
  </body>
</FictionBook>"#;

/// In-memory asset source for pipeline and viewer tests.
struct MemorySource {
    assets: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    fn new(entries: &[(&str, &[u8])]) -> Arc<Self> {
        Arc::new(Self {
            assets: entries
                .iter()
                .map(|(url, bytes)| (url.to_string(), bytes.to_vec()))
                .collect(),
        })
    }
}

#[async_trait]
impl AssetSource for MemorySource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("asset {}", url)))
    }

    async fn fetch_range(&self, url: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let bytes = self.fetch(url).await?;
        Ok(bytes
            .into_iter()
            .skip(start as usize)
            .take((end - start + 1) as usize)
            .collect())
    }
}

#[derive(Default)]
struct EnvState {
    scroll_locked: bool,
    keyboard_captured: bool,
    fullscreen: bool,
    fullscreen_exits: usize,
}

/// Recording environment whose state stays observable after the viewer
/// takes ownership of a clone.
#[derive(Default, Clone)]
struct SharedEnv(Arc<Mutex<EnvState>>);

impl Environment for SharedEnv {
    fn set_scroll_lock(&mut self, locked: bool) {
        self.0.lock().scroll_locked = locked;
    }

    fn set_keyboard_capture(&mut self, active: bool) {
        self.0.lock().keyboard_captured = active;
    }

    fn enter_fullscreen(&mut self) -> bool {
        self.0.lock().fullscreen = true;
        true
    }

    fn exit_fullscreen(&mut self) -> bool {
        let mut state = self.0.lock();
        state.fullscreen = false;
        state.fullscreen_exits += 1;
        true
    }
}

fn test_viewer(assets: Arc<dyn AssetSource>) -> (Viewer<SharedEnv>, SharedEnv) {
    let env = SharedEnv::default();
    (Viewer::new(env.clone(), assets, DEFAULT_SCALE), env)
}

async fn render_for(viewer: &Viewer<SharedEnv>, page: u32, scale: f32) -> PageBitmap {
    match viewer.session().unwrap().content().unwrap() {
        SessionContent::Paginated(doc) => doc.render_page(page, scale).await.unwrap(),
        _ => panic!("expected paginated content"),
    }
}

// ============================================================================
// CONTENT STORE
// ============================================================================

#[test]
fn store_create_and_list_newest_first() {
    let (store, _storage, _dir) = test_store();

    store.create_book(draft("Older", "a.txt", b"aaa")).unwrap();
    let newer = store.create_book(draft("Newer", "b.txt", b"bbb")).unwrap();

    let books = store.list_books();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].id, newer.id);
    assert_eq!(books[0].title, "Newer");
    assert_eq!(books[1].title, "Older");
}

#[test]
fn store_create_fills_defaults() {
    let (store, _storage, _dir) = test_store();

    let book = store
        .create_book(draft("  Spaced  ", "book.fb2", b"<x/>"))
        .unwrap();

    assert_eq!(book.title, "Spaced");
    assert_eq!(book.author, "Unknown");
    assert_eq!(book.year, "");
    assert_eq!(book.format, "FB2");
    assert!(book.file.starts_with("/assets/books/"));
    assert!(book.image.is_none());
}

#[test]
fn store_create_requires_title_and_file() {
    let (store, _storage, _dir) = test_store();

    let err = store.create_book(draft("   ", "a.txt", b"aaa")).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = store.create_book(draft("Title", "a.txt", b"")).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn store_create_rejects_unsupported_extension() {
    let (store, _storage, _dir) = test_store();

    let err = store
        .create_book(draft("Doc", "letter.docx", b"PK"))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.list_books().is_empty());
}

#[test]
fn store_create_rejects_oversize_file() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        data_dir: dir.path().join("data"),
    };
    let limits = UploadConfig {
        max_book_bytes: 4,
        max_cover_bytes: 4,
    };
    let store = ContentStore::open(&storage, limits).unwrap();

    let err = store
        .create_book(draft("Big", "big.txt", b"too large"))
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[test]
fn store_create_rejects_bad_cover() {
    let (store, _storage, _dir) = test_store();

    let mut new_book = draft("Covered", "book.txt", b"text");
    new_book.cover = Some(UploadedFile {
        name: "cover.gif".to_string(),
        bytes: b"GIF89a".to_vec(),
    });

    let err = store.create_book(new_book).unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(store.list_books().is_empty());
}

#[test]
fn store_create_stores_cover() {
    let (store, storage, _dir) = test_store();

    let mut new_book = draft("Covered", "book.txt", b"text");
    new_book.cover = Some(UploadedFile {
        name: "cover.png".to_string(),
        bytes: vec![0x89, 0x50, 0x4E, 0x47],
    });

    let book = store.create_book(new_book).unwrap();
    let image = book.image.clone().unwrap();
    assert!(image.starts_with("/assets/image/"));
    assert!(storage.covers_dir().join(book.cover_name().unwrap()).exists());
}

#[test]
fn store_delete_removes_files_metadata_and_favorites() {
    let (store, storage, _dir) = test_store();

    let mut new_book = draft("Doomed", "gone.txt", b"bye");
    new_book.cover = Some(UploadedFile {
        name: "cover.jpg".to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF],
    });
    let book = store.create_book(new_book).unwrap();
    store.toggle_favorite(&book.id).unwrap();
    assert_eq!(store.favorites(), vec![book.id.clone()]);

    let book_path = store.asset_path(&book);
    let cover_path = storage.covers_dir().join(book.cover_name().unwrap());
    assert!(book_path.exists());
    assert!(cover_path.exists());

    store.delete_book(&book.id).unwrap();

    assert!(store.list_books().is_empty());
    assert!(store.favorites().is_empty());
    assert!(!book_path.exists());
    assert!(!cover_path.exists());
}

#[test]
fn store_delete_unknown_is_not_found() {
    let (store, _storage, _dir) = test_store();

    let err = store.delete_book("nope").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn store_delete_tolerates_missing_file() {
    let (store, _storage, _dir) = test_store();

    let book = store.create_book(draft("Ghost", "g.txt", b"boo")).unwrap();
    std::fs::remove_file(store.asset_path(&book)).unwrap();

    store.delete_book(&book.id).unwrap();
    assert!(store.list_books().is_empty());
}

#[test]
fn store_toggle_favorite_roundtrip() {
    let (store, _storage, _dir) = test_store();

    let book = store.create_book(draft("Fav", "f.txt", b"x")).unwrap();

    let favs = store.toggle_favorite(&book.id).unwrap();
    assert_eq!(favs, vec![book.id.clone()]);

    let favs = store.toggle_favorite(&book.id).unwrap();
    assert!(favs.is_empty());

    let err = store.toggle_favorite("unknown").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn store_collections_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let storage = StorageConfig {
        data_dir: dir.path().join("data"),
    };

    let book_id = {
        let store = ContentStore::open(&storage, UploadConfig::default()).unwrap();
        let book = store.create_book(draft("Kept", "k.txt", b"keep")).unwrap();
        store.toggle_favorite(&book.id).unwrap();
        book.id
    };

    let store = ContentStore::open(&storage, UploadConfig::default()).unwrap();
    let books = store.list_books();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, book_id);
    assert_eq!(store.favorites(), vec![book_id]);
}

#[test]
fn store_metadata_collection_uses_camel_case() {
    let (store, storage, _dir) = test_store();

    store.create_book(draft("Case", "c.txt", b"x")).unwrap();

    let content = std::fs::read_to_string(storage.metadata_path()).unwrap();
    assert!(content.contains("\"addedAt\""));
    assert!(!content.contains("\"added_at\""));
}

#[test]
fn store_create_then_read_roundtrip() {
    let (store, _storage, _dir) = test_store();

    let payload = b"exactly these bytes\n";
    let book = store.create_book(draft("T", "t.txt", payload)).unwrap();

    assert_eq!(
        PipelineKind::select(&book.format),
        PipelineKind::FlatText(TextVariant::Plain)
    );
    let stored = std::fs::read(store.asset_path(&book)).unwrap();
    assert_eq!(stored, payload);
}

// ============================================================================
// FORMAT DISPATCHER
// ============================================================================

#[test]
fn dispatcher_selects_pipelines_case_insensitively() {
    assert_eq!(PipelineKind::select("pdf"), PipelineKind::Paginated);
    assert_eq!(PipelineKind::select("PDF"), PipelineKind::Paginated);
    assert_eq!(
        PipelineKind::select("Txt"),
        PipelineKind::FlatText(TextVariant::Plain)
    );
    assert_eq!(
        PipelineKind::select("fb2"),
        PipelineKind::FlatText(TextVariant::Structured)
    );
}

#[test]
fn dispatcher_is_total_over_unknown_formats() {
    assert_eq!(PipelineKind::select("DOCX"), PipelineKind::Unsupported);
    assert_eq!(PipelineKind::select("epub"), PipelineKind::Unsupported);
    assert_eq!(PipelineKind::select(""), PipelineKind::Unsupported);
}

// ============================================================================
// FLAT-TEXT PIPELINE
// ============================================================================

#[tokio::test]
async fn flat_text_plain_returns_bytes_verbatim() {
    let assets = MemorySource::new(&[("mem://t.txt", b"hello world\n".as_slice())]);

    let text = load_text(assets.as_ref(), "mem://t.txt", TextVariant::Plain)
        .await
        .unwrap();
    assert_eq!(text, "hello world\n");
}

#[tokio::test]
async fn flat_text_structured_extracts_body_paragraphs() {
    let assets = MemorySource::new(&[("mem://b.fb2", SAMPLE_FB2.as_bytes())]);

    let text = load_text(assets.as_ref(), "mem://b.fb2", TextVariant::Structured)
        .await
        .unwrap();
    assert_eq!(text, "First paragraph.\n\nSecond paragraph.");
}

#[tokio::test]
async fn flat_text_structured_falls_back_on_invalid_markup() {
    let broken = "just some text, definitely <not xml";
    let assets = MemorySource::new(&[("mem://broken.fb2", broken.as_bytes())]);

    let text = load_text(assets.as_ref(), "mem://broken.fb2", TextVariant::Structured)
        .await
        .unwrap();
    assert_eq!(text, broken);
}

#[tokio::test]
async fn flat_text_structured_falls_back_without_body() {
    let headless = "<doc><p>unreachable</p></doc>";
    let assets = MemorySource::new(&[("mem://h.fb2", headless.as_bytes())]);

    let text = load_text(assets.as_ref(), "mem://h.fb2", TextVariant::Structured)
        .await
        .unwrap();
    assert_eq!(text, headless);
}

#[tokio::test]
async fn flat_text_fetch_failure_is_load_error() {
    let assets = MemorySource::new(&[]);

    let err = load_text(assets.as_ref(), "mem://missing.txt", TextVariant::Plain)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Load(_)));
}

// ============================================================================
// PAGINATED PIPELINE
// ============================================================================

#[tokio::test]
async fn paginated_open_reports_stable_page_count() {
    let pdf = sample_pdf(3);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);

    let first = PaginatedDocument::open(assets.as_ref(), "mem://a.pdf")
        .await
        .unwrap();
    let second = PaginatedDocument::open(assets.as_ref(), "mem://a.pdf")
        .await
        .unwrap();

    assert_eq!(first.total_pages, 3);
    assert_eq!(second.total_pages, first.total_pages);
}

#[tokio::test]
async fn paginated_open_rejects_non_pdf() {
    let assets = MemorySource::new(&[("mem://fake.pdf", b"hello, not a pdf".as_slice())]);

    let err = PaginatedDocument::open(assets.as_ref(), "mem://fake.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Load(_)));
}

#[tokio::test]
async fn paginated_open_fetch_failure_is_load_error() {
    let assets = MemorySource::new(&[]);

    let err = PaginatedDocument::open(assets.as_ref(), "mem://absent.pdf")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Load(_)));
}

#[tokio::test]
async fn paginated_render_scales_media_box() {
    let pdf = sample_pdf(1);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let doc = PaginatedDocument::open(assets.as_ref(), "mem://a.pdf")
        .await
        .unwrap();

    let full = doc.render_page(1, 1.0).await.unwrap();
    assert_eq!((full.width(), full.height()), (612, 792));

    let double = doc.render_page(1, 2.0).await.unwrap();
    assert_eq!((double.width(), double.height()), (1224, 1584));

    let half = doc.render_page(1, 0.5).await.unwrap();
    assert_eq!((half.width(), half.height()), (306, 396));
}

#[tokio::test]
async fn paginated_concurrent_opens_share_bootstrap() {
    let pdf = sample_pdf(2);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);

    let (first, second) = tokio::join!(
        PaginatedDocument::open(assets.as_ref(), "mem://a.pdf"),
        PaginatedDocument::open(assets.as_ref(), "mem://a.pdf"),
    );

    assert_eq!(first.unwrap().total_pages, 2);
    assert_eq!(second.unwrap().total_pages, 2);
}

// ============================================================================
// VIEWER STATE MACHINE
// ============================================================================

#[tokio::test]
async fn viewer_open_and_escape_from_preview_closes() {
    let assets = MemorySource::new(&[]);
    let (mut viewer, _env) = test_viewer(assets);

    let closed = Arc::new(AtomicUsize::new(0));
    let counter = closed.clone();
    viewer.on_close(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(viewer.mode(), ViewerMode::Closed);
    viewer.open(sample_book("TXT", "mem://t.txt"));
    assert_eq!(viewer.mode(), ViewerMode::Preview);

    viewer.escape();
    assert_eq!(viewer.mode(), ViewerMode::Closed);
    assert!(viewer.session().is_none());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn viewer_reads_text_and_acquires_resources() {
    let assets = MemorySource::new(&[("mem://t.txt", b"hello".as_slice())]);
    let (mut viewer, env) = test_viewer(assets);

    viewer.open(sample_book("TXT", "mem://t.txt"));
    viewer.start_reading().await;

    assert_eq!(viewer.mode(), ViewerMode::Reading);
    assert_eq!(viewer.session().unwrap().text(), Some("hello"));
    assert!(env.0.lock().scroll_locked);
    assert!(env.0.lock().keyboard_captured);

    // Navigation is meaningless for flat text.
    viewer.next_page().await;
    assert_eq!(viewer.session().unwrap().current_page, 1);
}

#[tokio::test]
async fn viewer_reads_structured_text() {
    let assets = MemorySource::new(&[("mem://b.fb2", SAMPLE_FB2.as_bytes())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("FB2", "mem://b.fb2"));
    viewer.start_reading().await;

    assert_eq!(viewer.mode(), ViewerMode::Reading);
    assert_eq!(
        viewer.session().unwrap().text(),
        Some("First paragraph.\n\nSecond paragraph.")
    );
}

#[tokio::test]
async fn viewer_reads_pdf_and_renders_first_page() {
    let pdf = sample_pdf(2);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;

    assert_eq!(viewer.mode(), ViewerMode::Reading);
    let session = viewer.session().unwrap();
    assert_eq!(session.total_pages, 2);
    assert_eq!(session.current_page, 1);

    let frame = viewer.surface().current().unwrap();
    assert_eq!(frame.page, 1);
    assert_eq!(frame.scale, DEFAULT_SCALE);
}

#[tokio::test]
async fn viewer_unsupported_format_is_download_only() {
    // Content is a perfectly good PDF; the declared format decides.
    let pdf = sample_pdf(1);
    let assets = MemorySource::new(&[("mem://d.docx", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("DOCX", "mem://d.docx"));
    viewer.start_reading().await;

    assert_eq!(viewer.mode(), ViewerMode::Reading);
    assert!(matches!(
        viewer.session().unwrap().content(),
        Some(SessionContent::DownloadOnly)
    ));
    assert!(viewer.surface().current().is_none());
    assert_eq!(viewer.session().unwrap().total_pages, 0);
}

#[tokio::test]
async fn viewer_load_failure_enters_error_then_preview() {
    let assets = MemorySource::new(&[]);
    let (mut viewer, env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://gone.pdf"));
    viewer.start_reading().await;

    assert_eq!(viewer.mode(), ViewerMode::Error);
    assert!(viewer.session().unwrap().last_error.is_some());
    assert!(!env.0.lock().scroll_locked);

    viewer.escape();
    assert_eq!(viewer.mode(), ViewerMode::Preview);
    assert!(viewer.session().unwrap().last_error.is_none());

    viewer.escape();
    assert_eq!(viewer.mode(), ViewerMode::Closed);
}

#[tokio::test]
async fn viewer_navigation_clamps_to_bounds() {
    let pdf = sample_pdf(2);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;

    viewer.prev_page().await;
    assert_eq!(viewer.session().unwrap().current_page, 1);

    viewer.next_page().await;
    assert_eq!(viewer.session().unwrap().current_page, 2);
    assert_eq!(viewer.surface().current().unwrap().page, 2);

    viewer.next_page().await;
    assert_eq!(viewer.session().unwrap().current_page, 2);
}

#[tokio::test]
async fn viewer_zoom_steps_and_clamps() {
    let pdf = sample_pdf(1);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;

    for _ in 0..10 {
        viewer.zoom_in().await;
        let scale = viewer.session().unwrap().scale;
        // Every reachable scale is a multiple of the 0.25 step.
        assert!((scale * 4.0).fract().abs() < 1e-4);
        assert!((0.5..=3.0).contains(&scale));
    }
    assert!((viewer.session().unwrap().scale - 3.0).abs() < 1e-6);

    for _ in 0..15 {
        viewer.zoom_out().await;
        let scale = viewer.session().unwrap().scale;
        assert!((0.5..=3.0).contains(&scale));
    }
    assert!((viewer.session().unwrap().scale - 0.5).abs() < 1e-6);

    // The surface follows the zoom to the clamped scale.
    assert!((viewer.surface().current().unwrap().scale - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn surface_shows_last_issued_navigation_target() {
    let pdf = sample_pdf(3);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;
    assert_eq!(viewer.surface().current().unwrap().page, 1);

    // Two navigations issued back to back while the first render is still
    // in flight.
    assert!(viewer.step_page(1));
    let first = viewer.begin_render().unwrap();
    assert!(viewer.step_page(1));
    let second = viewer.begin_render().unwrap();

    let first_bitmap = render_for(&viewer, first.page, first.scale).await;
    let second_bitmap = render_for(&viewer, second.page, second.scale).await;

    // The older completion lands after the newer request was issued: it
    // must be discarded, leaving the prior frame visible.
    viewer.commit_render(first, Ok(first_bitmap));
    assert_eq!(viewer.surface().current().unwrap().page, 1);

    viewer.commit_render(second, Ok(second_bitmap));
    assert_eq!(viewer.surface().current().unwrap().page, 3);
}

#[tokio::test]
async fn viewer_render_failure_keeps_previous_frame() {
    let pdf = sample_pdf(2);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;

    let request = viewer.begin_render().unwrap();
    viewer.commit_render(request, Err(AppError::Render("bad page".into())));

    assert_eq!(viewer.mode(), ViewerMode::Reading);
    assert_eq!(viewer.surface().current().unwrap().page, 1);
}

#[tokio::test]
async fn viewer_stop_reading_resets_session_and_drops_tokens() {
    let pdf = sample_pdf(3);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;
    viewer.next_page().await;
    viewer.zoom_in().await;

    // A render still in flight when the session ends.
    let stale = viewer.begin_render().unwrap();
    let stale_bitmap = render_for(&viewer, stale.page, stale.scale).await;

    viewer.stop_reading();

    assert_eq!(viewer.mode(), ViewerMode::Preview);
    let session = viewer.session().unwrap();
    assert_eq!(session.current_page, 1);
    assert_eq!(session.total_pages, 0);
    assert!((session.scale - DEFAULT_SCALE).abs() < 1e-6);
    assert!(session.content().is_none());
    assert!(viewer.surface().current().is_none());
    assert!(!env.0.lock().scroll_locked);
    assert!(!env.0.lock().keyboard_captured);

    // The abandoned completion may not touch the surface.
    viewer.commit_render(stale, Ok(stale_bitmap));
    assert!(viewer.surface().current().is_none());
}

#[tokio::test]
async fn viewer_keyboard_routes_navigation_and_escape() {
    let pdf = sample_pdf(2);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, _env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.start_reading().await;

    viewer.handle_key(ViewerKey::NextPage).await;
    assert_eq!(viewer.session().unwrap().current_page, 2);

    viewer.handle_key(ViewerKey::ZoomIn).await;
    assert!((viewer.session().unwrap().scale - 1.75).abs() < 1e-6);

    viewer.handle_key(ViewerKey::Escape).await;
    assert_eq!(viewer.mode(), ViewerMode::Preview);

    viewer.handle_key(ViewerKey::Escape).await;
    assert_eq!(viewer.mode(), ViewerMode::Closed);
}

#[tokio::test]
async fn viewer_fullscreen_only_while_reading_and_resyncs() {
    let pdf = sample_pdf(1);
    let assets = MemorySource::new(&[("mem://a.pdf", pdf.as_slice())]);
    let (mut viewer, env) = test_viewer(assets);

    viewer.open(sample_book("PDF", "mem://a.pdf"));
    viewer.toggle_fullscreen();
    assert!(!viewer.is_fullscreen());

    viewer.start_reading().await;
    viewer.toggle_fullscreen();
    assert!(viewer.is_fullscreen());
    assert!(env.0.lock().fullscreen);

    // Exited through a platform shortcut: the notification resynchronizes.
    viewer.handle_env_event(EnvEvent::FullscreenChanged(false));
    assert!(!viewer.is_fullscreen());

    // Ending the session from fullscreen asks the display to leave it.
    viewer.toggle_fullscreen();
    viewer.stop_reading();
    assert!(!viewer.is_fullscreen());
    assert_eq!(env.0.lock().fullscreen_exits, 1);
}

#[tokio::test]
async fn viewer_drop_releases_resources() {
    let assets = MemorySource::new(&[("mem://t.txt", b"hi".as_slice())]);
    let (mut viewer, env) = test_viewer(assets);

    viewer.open(sample_book("TXT", "mem://t.txt"));
    viewer.start_reading().await;
    assert!(env.0.lock().scroll_locked);

    drop(viewer);
    assert!(!env.0.lock().scroll_locked);
    assert!(!env.0.lock().keyboard_captured);
}

// ============================================================================
// CONFIG
// ============================================================================

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Library"

[storage]
data_dir = "/tmp/test-data"

[upload]
max_book_bytes = 1024
max_cover_bytes = 512

[viewer]
default_scale = 2.0
fetch_timeout_secs = 3
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Library");
    assert_eq!(config.storage.data_dir, std::path::PathBuf::from("/tmp/test-data"));
    assert_eq!(config.upload.max_book_bytes, 1024);
    assert_eq!(config.upload.max_cover_bytes, 512);
    assert!((config.viewer.default_scale - 2.0).abs() < 1e-6);
    assert_eq!(config.viewer.fetch_timeout_secs, 3);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.upload.max_book_bytes, 50 * 1024 * 1024);
    assert_eq!(config.upload.max_cover_bytes, 5 * 1024 * 1024);
    assert!((config.viewer.default_scale - 1.5).abs() < 1e-6);
    assert_eq!(config.storage.books_dir(), std::path::PathBuf::from("data/books"));
}
