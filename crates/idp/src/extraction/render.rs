//! Turns uploaded documents into page images for the vision backends.
//!
//! PDFs are rasterized with `pdftoppm` (poppler-utils). Office and text
//! formats are first converted to PDF with `soffice --headless`. Raster
//! images are decoded with the `image` crate. Every page leaves as an RGB PNG
//! whose longest side is at most `max_dimension`.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tempfile::TempDir;

use super::error::RenderError;
use super::types::Page;

pub const DEFAULT_DPI: u32 = 300;
pub const MIN_DPI: u32 = 150;
pub const MAX_DPI: u32 = 400;
pub const DEFAULT_MAX_DIMENSION: u32 = 2048;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "gif", "webp"];
const OFFICE_EXTENSIONS: &[&str] = &["docx", "doc", "rtf", "pptx", "ppt", "txt"];

pub trait PageRenderer: Send + Sync {
    /// Renders `bytes` into pages. `filename` is only used to pick a format
    /// when the content itself is not recognizable.
    fn render(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Office,
}

impl DocumentKind {
    pub fn detect(bytes: &[u8], filename: &str) -> Result<Self, RenderError> {
        if bytes.starts_with(b"%PDF") {
            return Ok(Self::Pdf);
        }
        if image::guess_format(bytes).is_ok() {
            return Ok(Self::Image);
        }

        let ext = extension_of(filename);
        if ext == "pdf" {
            Ok(Self::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Image)
        } else if OFFICE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Office)
        } else {
            Err(RenderError::UnsupportedFormat(if ext.is_empty() {
                filename.to_string()
            } else {
                ext
            }))
        }
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct DefaultPageRenderer {
    dpi: u32,
    max_dimension: u32,
}

impl Default for DefaultPageRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_DPI, DEFAULT_MAX_DIMENSION)
    }
}

impl DefaultPageRenderer {
    pub fn new(dpi: u32, max_dimension: u32) -> Self {
        Self {
            dpi: dpi.clamp(MIN_DPI, MAX_DPI),
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn render_pdf(&self, pdf_bytes: &[u8]) -> Result<Vec<Page>, RenderError> {
        let _span = tracing::info_span!("render.pdf", dpi = self.dpi).entered();

        let expected = pdf_page_count(pdf_bytes);
        if expected == Some(0) {
            return Err(RenderError::NoPages);
        }

        let scratch = scratch_dir()?;
        let pdf_path = scratch.path().join("input.pdf");
        write_file(&pdf_path, pdf_bytes)?;

        let prefix = scratch.path().join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                RenderError::Pdf(format!(
                    "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(RenderError::Pdf(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let mut rendered = collect_page_files(scratch.path())?;
        rendered.sort_by_key(|(number, _)| *number);

        if let Some(expected) = expected {
            if expected != rendered.len() {
                tracing::warn!(
                    "PDF declares {} pages but {} were rendered",
                    expected,
                    rendered.len()
                );
            }
        }

        let mut pages = Vec::with_capacity(rendered.len());
        for (index, (_, path)) in rendered.into_iter().enumerate() {
            let raw = std::fs::read(&path).map_err(|e| RenderError::Io {
                path: path.clone(),
                source: e,
            })?;
            pages.push(Page {
                number: index + 1,
                png: normalize_image(&raw, self.max_dimension)?,
            });
        }
        Ok(pages)
    }

    fn render_office(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, RenderError> {
        let _span = tracing::info_span!("render.office").entered();

        let scratch = scratch_dir()?;
        let ext = extension_of(filename);
        let input = scratch.path().join(format!("input.{}", ext));
        write_file(&input, bytes)?;

        let output = Command::new("soffice")
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(scratch.path())
            .arg(&input)
            .output()
            .map_err(|e| {
                RenderError::UnsupportedFormat(format!(
                    "{} (soffice unavailable: {})",
                    ext, e
                ))
            })?;

        if !output.status.success() {
            return Err(RenderError::Pdf(format!(
                "soffice conversion failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let pdf_path = scratch.path().join("input.pdf");
        let pdf = std::fs::read(&pdf_path).map_err(|e| RenderError::Io {
            path: pdf_path,
            source: e,
        })?;
        self.render_pdf(&pdf)
    }
}

impl PageRenderer for DefaultPageRenderer {
    fn render(&self, bytes: &[u8], filename: &str) -> Result<Vec<Page>, RenderError> {
        if bytes.is_empty() {
            return Err(RenderError::NoPages);
        }

        let pages = match DocumentKind::detect(bytes, filename)? {
            DocumentKind::Pdf => self.render_pdf(bytes)?,
            DocumentKind::Image => vec![Page {
                number: 1,
                png: normalize_image(bytes, self.max_dimension)?,
            }],
            DocumentKind::Office => self.render_office(bytes, filename)?,
        };

        if pages.is_empty() {
            return Err(RenderError::NoPages);
        }
        tracing::debug!("Rendered {} page(s)", pages.len());
        Ok(pages)
    }
}

/// Page count from the PDF page tree, or `None` when lopdf cannot parse it.
pub fn pdf_page_count(pdf_bytes: &[u8]) -> Option<usize> {
    lopdf::Document::load_mem(pdf_bytes)
        .map(|doc| doc.get_pages().len())
        .ok()
}

/// Decodes, converts to RGB, downsizes to fit `max_dimension` and re-encodes as PNG.
pub fn normalize_image(bytes: &[u8], max_dimension: u32) -> Result<Vec<u8>, RenderError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| RenderError::Image(format!("Failed to load image: {}", e)))?;

    let mut rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = rgb.dimensions();
    if width.max(height) > max_dimension {
        rgb = rgb.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    }

    let mut out = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| RenderError::Image(format!("Failed to encode PNG: {}", e)))?;
    Ok(out)
}

/// `pdftoppm` writes `page-1.png`, `page-01.png` or `page-001.png`
/// depending on the page count.
fn collect_page_files(dir: &Path) -> Result<Vec<(usize, PathBuf)>, RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| RenderError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut pages = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let number = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(number) = number {
            pages.push((number, path));
        }
    }
    Ok(pages)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    std::fs::write(path, bytes).map_err(|e| RenderError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Temporary working directory, removed when dropped.
fn scratch_dir() -> Result<TempDir, RenderError> {
    tempfile::Builder::new()
        .prefix("idp_render_")
        .tempdir()
        .map_err(|e| RenderError::Io {
            path: std::env::temp_dir(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_scratch_dir_is_removed_on_drop() {
        let scratch = scratch_dir().unwrap();
        let path = scratch.path().to_path_buf();
        write_file(&path.join("input.pdf"), b"%PDF-1.7").unwrap();
        assert!(path.join("input.pdf").exists());

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_detect_by_content_then_extension() {
        assert_eq!(
            DocumentKind::detect(b"%PDF-1.7 ...", "upload.bin").unwrap(),
            DocumentKind::Pdf
        );
        assert_eq!(
            DocumentKind::detect(&png_bytes(2, 2), "noext").unwrap(),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::detect(b"PK\x03\x04", "report.DOCX").unwrap(),
            DocumentKind::Office
        );
        assert!(matches!(
            DocumentKind::detect(b"????", "archive.xyz"),
            Err(RenderError::UnsupportedFormat(ref e)) if e == "xyz"
        ));
    }

    #[test]
    fn test_normalize_downscales_longest_side() {
        let out = normalize_image(&png_bytes(4000, 1000), 2048).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (2048, 512));
        assert!(matches!(img, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_normalize_keeps_small_images() {
        let out = normalize_image(&png_bytes(300, 200), 2048).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (300, 200));
    }

    #[test]
    fn test_render_image_is_single_page() {
        let renderer = DefaultPageRenderer::default();
        let pages = renderer.render(&png_bytes(10, 10), "scan.png").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
    }

    #[test]
    fn test_render_empty_input_has_no_pages() {
        let renderer = DefaultPageRenderer::default();
        assert!(matches!(
            renderer.render(&[], "scan.png"),
            Err(RenderError::NoPages)
        ));
    }

    #[test]
    fn test_dpi_is_clamped() {
        assert_eq!(DefaultPageRenderer::new(72, 2048).dpi(), MIN_DPI);
        assert_eq!(DefaultPageRenderer::new(1200, 2048).dpi(), MAX_DPI);
    }

    #[test]
    fn test_pdf_page_count_rejects_garbage() {
        assert_eq!(pdf_page_count(b"not a pdf"), None);
    }

    #[test]
    fn test_collect_page_files_parses_numbering() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["page-01.png", "page-10.png", "page-02.png", "input.pdf"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut pages = collect_page_files(dir.path()).unwrap();
        pages.sort_by_key(|(n, _)| *n);
        let numbers: Vec<_> = pages.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
    }
}
