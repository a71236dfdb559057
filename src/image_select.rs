use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::GenericImageView;
use tracing::{debug, warn};

use crate::error::ValidationError;

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff"];

/// Decoded, downscaled RGBA pixels ready to be uploaded as a texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Ready(Thumbnail),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub path: PathBuf,
    pub preview: Preview,
}

impl SelectedImage {
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Accepts a path chosen in the file dialog.
pub fn select(path: PathBuf, max_edge: u32) -> Result<SelectedImage, ValidationError> {
    if !has_supported_extension(&path) {
        return Err(ValidationError::UnsupportedFile(file_label(&path)));
    }
    Ok(load(path, max_edge))
}

/// Accepts a drop payload. Only the first dropped item is considered.
pub fn select_dropped(
    dropped: impl IntoIterator<Item = Option<PathBuf>>,
    max_edge: u32,
) -> Result<SelectedImage, ValidationError> {
    let path = dropped
        .into_iter()
        .next()
        .flatten()
        .ok_or(ValidationError::NothingDropped)?;

    if !has_supported_extension(&path) {
        return Err(ValidationError::UnsupportedDrop(file_label(&path)));
    }
    Ok(load(path, max_edge))
}

pub fn pick_with_dialog() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("Select an image file")
        .add_filter("Image files", &SUPPORTED_EXTENSIONS)
        .add_filter("JPEG files", &["jpg", "jpeg"])
        .add_filter("PNG files", &["png"])
        .add_filter("All files", &["*"])
        .pick_file()
}

fn load(path: PathBuf, max_edge: u32) -> SelectedImage {
    let preview = match thumbnail(&path, max_edge) {
        Ok(thumb) => {
            debug!(path = %path.display(), width = thumb.width, height = thumb.height, "preview ready");
            Preview::Ready(thumb)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not decode preview");
            Preview::Failed(format!("Preview error: {}", e))
        }
    };
    SelectedImage { path, preview }
}

/// Decodes `path` and shrinks it so the longest edge is at most `max_edge`,
/// keeping the aspect ratio. Smaller images are left as they are.
pub fn thumbnail(path: &Path, max_edge: u32) -> image::ImageResult<Thumbnail> {
    let img = image::open(path)?;
    let (width, height) = img.dimensions();

    let img = if width > max_edge || height > max_edge {
        img.resize(max_edge, max_edge, FilterType::Lanczos3)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Thumbnail {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn extension_check_ignores_case_but_not_format() {
        assert!(has_supported_extension(Path::new("photo.PNG")));
        assert!(has_supported_extension(Path::new("scan.TiFf")));
        assert!(has_supported_extension(Path::new("/tmp/a.b/holiday.jpeg")));
        assert!(!has_supported_extension(Path::new("photo.WEBP")));
        assert!(!has_supported_extension(Path::new("photo.webp")));
        assert!(!has_supported_extension(Path::new("README")));
        assert!(!has_supported_extension(Path::new("archive.png.zip")));
    }

    #[test]
    fn unsupported_files_are_rejected_before_reading() {
        let err = select(PathBuf::from("/does/not/exist/photo.WEBP"), 150).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFile("photo.WEBP".to_string()));
        assert_eq!(err.title(), "Invalid File");
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "wide.PNG", 600, 300);

        let selected = select(path.clone(), 150).unwrap();
        assert_eq!(selected.path, path);
        assert_eq!(selected.display_name(), "wide.PNG");
        match selected.preview {
            Preview::Ready(thumb) => {
                assert_eq!((thumb.width, thumb.height), (150, 75));
                assert_eq!(thumb.rgba.len(), 150 * 75 * 4);
            }
            Preview::Failed(e) => panic!("unexpected preview failure: {e}"),
        }
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "icon.png", 32, 16);
        let thumb = thumbnail(&path, 150).unwrap();
        assert_eq!((thumb.width, thumb.height), (32, 16));
    }

    #[test]
    fn undecodable_images_get_a_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let selected = select(path, 150).unwrap();
        assert!(matches!(selected.preview, Preview::Failed(ref m) if m.starts_with("Preview error:")));
    }

    #[test]
    fn only_the_first_dropped_file_counts() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_png(dir.path(), "first.png", 10, 10);
        let second = write_png(dir.path(), "second.png", 10, 10);

        let selected = select_dropped(vec![Some(first.clone()), Some(second)], 150).unwrap();
        assert_eq!(selected.path, first);

        let err = select_dropped(vec![Some(PathBuf::from("notes.txt")), Some(first)], 150).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedDrop("notes.txt".to_string()));

        assert_eq!(select_dropped(vec![None], 150).unwrap_err(), ValidationError::NothingDropped);
        assert_eq!(select_dropped(Vec::new(), 150).unwrap_err(), ValidationError::NothingDropped);
    }
}
