//! Input resolution and text extraction.
//!
//! Turns a user-supplied file into the page sequence the rest of the
//! pipeline works on. Three source kinds are supported, detected by
//! extension and validated by content:
//!
//! * **PDF** — per-page text via `pdf_extract`, run inside `spawn_blocking`
//!   because parsing is CPU-bound and not async-safe.
//! * **Text** — split on form feeds when present, otherwise one page.
//! * **Image** — no text to extract; the file becomes a single synthetic
//!   page plus an inline part the model reads directly. Images are bounded
//!   (longest side 2048 px) and re-encoded as JPEG so request bodies stay
//!   under API upload limits.
//!
//! Empty pages are dropped here; the page numbering of the survivors is
//! preserved so chunk spans still match the printed document.

use crate::error::StudytexError;
use crate::llm::ImagePart;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Longest edge allowed for an inline image part, in pixels.
const MAX_IMAGE_DIMENSION: u32 = 2048;
/// JPEG re-encode quality for inline image parts.
const JPEG_QUALITY: u8 = 85;

/// One extracted page, 1-based numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// What kind of source a path points at, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
    Image,
}

/// Extraction result: the page sequence, plus the inline part for image inputs.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
    /// Present for image inputs; attached to every summarization request.
    pub image: Option<ImagePart>,
}

impl ExtractedDocument {
    /// Total characters of extracted text (feeds `characters_in`).
    pub fn char_count(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

/// Classify a path by extension.
pub fn detect_kind(path: &Path) -> Result<SourceKind, StudytexError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(SourceKind::Pdf),
        "txt" | "md" | "text" => Ok(SourceKind::Text),
        "png" | "jpg" | "jpeg" => Ok(SourceKind::Image),
        _ => Err(StudytexError::UnsupportedInput {
            path: path.to_path_buf(),
        }),
    }
}

/// Extract the page sequence from a local file.
pub async fn extract(path: &Path) -> Result<ExtractedDocument, StudytexError> {
    if !path.exists() {
        return Err(StudytexError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let kind = detect_kind(path)?;
    debug!(path = %path.display(), ?kind, "extracting document");

    match kind {
        SourceKind::Pdf => extract_pdf(path).await,
        SourceKind::Text => extract_text(path).await,
        SourceKind::Image => extract_image(path).await,
    }
}

async fn extract_pdf(path: &Path) -> Result<ExtractedDocument, StudytexError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StudytexError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(StudytexError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    let owned_path = path.to_path_buf();
    let raw_pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    })
    .await
    .map_err(|e| StudytexError::Internal(format!("extraction task panicked: {e}")))?
    .map_err(|e| StudytexError::ExtractionFailed {
        path: owned_path,
        detail: e.to_string(),
    })?;

    let pages = number_and_filter(raw_pages.into_iter());
    info!(pages = pages.len(), "extracted PDF text");
    Ok(ExtractedDocument { pages, image: None })
}

async fn extract_text(path: &Path) -> Result<ExtractedDocument, StudytexError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StudytexError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    // Form feed is the conventional page separator in plain-text exports.
    let pages = number_and_filter(content.split('\u{0c}').map(str::to_string));
    info!(pages = pages.len(), "read text document");
    Ok(ExtractedDocument { pages, image: None })
}

async fn extract_image(path: &Path) -> Result<ExtractedDocument, StudytexError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StudytexError::ExtractionFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let owned_path = path.to_path_buf();
    let part = tokio::task::spawn_blocking(move || bounded_jpeg_part(&bytes))
        .await
        .map_err(|e| StudytexError::Internal(format!("image task panicked: {e}")))?
        .map_err(|detail| StudytexError::ExtractionFailed {
            path: owned_path,
            detail,
        })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    info!(file = %name, "prepared inline image");

    // A synthetic one-page document; the model reads the attached image.
    let pages = vec![PageText {
        page_number: 1,
        text: format!("[Image document: {name}]"),
    }];
    Ok(ExtractedDocument {
        pages,
        image: Some(part),
    })
}

/// Decode, bound to `MAX_IMAGE_DIMENSION`, and re-encode as base64 JPEG.
fn bounded_jpeg_part(bytes: &[u8]) -> Result<ImagePart, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let img = if img.width() > MAX_IMAGE_DIMENSION || img.height() > MAX_IMAGE_DIMENSION {
        img.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buf), JPEG_QUALITY);
    rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;

    Ok(ImagePart {
        mime: "image/jpeg".to_string(),
        data_base64: BASE64.encode(&buf),
    })
}

fn number_and_filter<I: Iterator<Item = String>>(raw: I) -> Vec<PageText> {
    raw.enumerate()
        .map(|(i, text)| PageText {
            page_number: (i + 1) as u32,
            text: text.trim().to_string(),
        })
        .filter(|p| !p.text.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kind_detection_by_extension() {
        assert_eq!(detect_kind(Path::new("a.pdf")).unwrap(), SourceKind::Pdf);
        assert_eq!(detect_kind(Path::new("a.PDF")).unwrap(), SourceKind::Pdf);
        assert_eq!(detect_kind(Path::new("a.txt")).unwrap(), SourceKind::Text);
        assert_eq!(detect_kind(Path::new("a.md")).unwrap(), SourceKind::Text);
        assert_eq!(detect_kind(Path::new("a.jpeg")).unwrap(), SourceKind::Image);
        assert!(detect_kind(Path::new("a.docx")).is_err());
        assert!(detect_kind(Path::new("noext")).is_err());
    }

    #[test]
    fn numbering_survives_empty_page_drop() {
        let pages = number_and_filter(
            vec!["first".to_string(), "  ".to_string(), "third".to_string()].into_iter(),
        );
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 3);
        assert_eq!(pages[1].text, "third");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = extract(Path::new("/no/such/file.pdf")).await.unwrap_err();
        assert!(matches!(err, StudytexError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn text_file_splits_on_form_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "page one\u{0c}page two\u{0c}\u{0c}page four").unwrap();

        let doc = extract(&path).await.unwrap();
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[0].text, "page one");
        assert_eq!(doc.pages[2].page_number, 4);
        assert!(doc.image.is_none());
    }

    #[tokio::test]
    async fn text_file_without_form_feeds_is_one_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "just one body of text").unwrap();

        let doc = extract(&path).await.unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].page_number, 1);
    }

    #[tokio::test]
    async fn wrong_magic_bytes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"PK\x03\x04 not a pdf").unwrap();

        let err = extract(&path).await.unwrap_err();
        assert!(matches!(err, StudytexError::NotAPdf { .. }));
    }

    #[test]
    fn image_part_is_bounded_and_jpeg() {
        let wide = image::DynamicImage::ImageRgb8(image::RgbImage::new(3000, 90));
        let mut png = Vec::new();
        wide.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let part = bounded_jpeg_part(&png).unwrap();
        assert_eq!(part.mime, "image/jpeg");

        let decoded = image::load_from_memory(&BASE64.decode(part.data_base64).unwrap()).unwrap();
        assert!(decoded.width() <= MAX_IMAGE_DIMENSION);
        assert!(decoded.height() <= MAX_IMAGE_DIMENSION);
    }

    #[tokio::test]
    async fn image_input_yields_synthetic_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
        img.save(&path).unwrap();

        let doc = extract(&path).await.unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert!(doc.pages[0].text.contains("scan.png"));
        assert!(doc.image.is_some());
    }
}
