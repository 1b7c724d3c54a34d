// mime.rs - MIME labels, format mapping and download names

use std::fmt;
use std::path::Path;

use image::ImageFormat;

/// A binary MIME label such as `image/jpeg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MimeType(String);

impl MimeType {
    pub const JPEG: &'static str = "image/jpeg";
    pub const PNG: &'static str = "image/png";
    pub const WEBP: &'static str = "image/webp";

    pub fn new(mime: impl Into<String>) -> Self {
        Self(mime.into().trim().to_ascii_lowercase())
    }

    pub fn jpeg() -> Self {
        Self::new(Self::JPEG)
    }

    pub fn png() -> Self {
        Self::new(Self::PNG)
    }

    pub fn webp() -> Self {
        Self::new(Self::WEBP)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME a browser file picker would report for this path.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        let mime = match ext.as_str() {
            "jpg" | "jpeg" | "jfif" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            _ => return None,
        };
        Some(Self::new(mime))
    }

    pub fn from_format(format: ImageFormat) -> Option<Self> {
        let mime = match format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            _ => return None,
        };
        Some(Self::new(mime))
    }

    pub fn image_format(&self) -> Option<ImageFormat> {
        match self.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }

    /// Output MIME when re-encoding in the same family as `self`.
    ///
    /// Only JPEG, PNG and WebP can be encoded; everything else comes out as
    /// PNG.
    pub fn primary_output(&self) -> Self {
        match self.image_format() {
            Some(ImageFormat::Jpeg) => Self::jpeg(),
            Some(ImageFormat::WebP) => Self::webp(),
            _ => Self::png(),
        }
    }

    /// `image/jpeg` maps to `jpg`, anything else to its subtype.
    pub fn extension(&self) -> &str {
        if self.image_format() == Some(ImageFormat::Jpeg) {
            return "jpg";
        }
        match self.0.split_once('/') {
            Some((_, subtype)) if !subtype.is_empty() => subtype,
            _ => "bin",
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File name without its last extension.
pub fn base_name(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(dot) => &file_name[..dot],
    }
}

/// Download name for a variant: the source extension swapped for the one
/// derived from `mime`.
pub fn derive_file_name(file_name: &str, mime: &MimeType) -> String {
    format!("{}.{}", base_name(file_name), mime.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_extension_is_jpg() {
        assert_eq!(MimeType::jpeg().extension(), "jpg");
        assert_eq!(MimeType::webp().extension(), "webp");
        assert_eq!(MimeType::new("image/gif").extension(), "gif");
    }

    #[test]
    fn download_names_replace_extension() {
        assert_eq!(derive_file_name("photo.jpeg", &MimeType::jpeg()), "photo.jpg");
        assert_eq!(derive_file_name("photo.jpeg", &MimeType::webp()), "photo.webp");
        assert_eq!(derive_file_name("archive.tar.png", &MimeType::png()), "archive.tar.png");
        assert_eq!(derive_file_name("noext", &MimeType::png()), "noext.png");
        assert_eq!(derive_file_name(".hidden", &MimeType::png()), ".hidden.png");
    }

    #[test]
    fn unencodable_families_fall_back_to_png() {
        assert_eq!(MimeType::new("image/gif").primary_output(), MimeType::png());
        assert_eq!(MimeType::new("image/bmp").primary_output(), MimeType::png());
        assert_eq!(MimeType::new("IMAGE/JPEG").primary_output(), MimeType::jpeg());
        assert_eq!(MimeType::webp().primary_output(), MimeType::webp());
    }

    #[test]
    fn mime_from_path_uses_extension() {
        assert_eq!(MimeType::from_path(Path::new("a/b.JPG")), Some(MimeType::jpeg()));
        assert_eq!(MimeType::from_path(Path::new("a/b.txt")), None);
        assert_eq!(MimeType::from_path(Path::new("a/b")), None);
    }
}
