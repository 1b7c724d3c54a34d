// intake.rs - Accepting files: classification, reading, folder walks, sample

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::IntakeError;
use crate::mime::MimeType;

/// One user-supplied image, immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Arc<[u8]>,
    pub mime: MimeType,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
}

impl SourceImage {
    /// Reads a file and its natural dimensions.
    pub async fn load(path: &Path) -> Result<Self, IntakeError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| IntakeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(bytes, display_name(path), MimeType::from_path(path))
    }

    /// Builds a source from raw bytes, sniffing the MIME when none is
    /// declared.
    pub fn from_bytes(
        bytes: Vec<u8>,
        file_name: String,
        declared: Option<MimeType>,
    ) -> Result<Self, IntakeError> {
        let mime = match declared {
            Some(mime) => mime,
            None => image::guess_format(&bytes)
                .ok()
                .and_then(MimeType::from_format)
                .ok_or_else(|| IntakeError::UnknownFormat(file_name.clone()))?,
        };
        let (width, height) = read_dimensions(&bytes, &file_name)?;

        Ok(Self {
            bytes: bytes.into(),
            mime,
            width,
            height,
            file_name,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Natural dimensions from the image header, without a full decode.
pub fn read_dimensions(bytes: &[u8], file_name: &str) -> Result<(u32, u32), IntakeError> {
    let dimensions_err = |message: String| IntakeError::Dimensions {
        file_name: file_name.to_string(),
        message,
    };
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| dimensions_err(e.to_string()))?
        .into_dimensions()
        .map_err(|e| dimensions_err(e.to_string()))
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// What a single picker, drop or folder event amounts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Single(PathBuf),
    Batch(Vec<PathBuf>),
}

impl Submission {
    /// `None` for an empty selection.
    pub fn classify(mut paths: Vec<PathBuf>) -> Option<Self> {
        match paths.len() {
            0 => None,
            1 => paths.pop().map(Self::Single),
            _ => Some(Self::Batch(paths)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expands folders into the images they contain, in a stable order.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() && is_image_file(path) {
            images.push(path.to_path_buf());
        } else if path.is_dir() {
            let walker = WalkDir::new(path).sort_by_file_name();
            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_file() && is_image_file(path) {
                    images.push(path.to_path_buf());
                }
            }
        }
    }

    images
}

pub fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg" | "jfif" | "png" | "gif" | "bmp" | "webp")
        }
        None => false,
    }
}

const SAMPLE_SPELLINGS: (&str, &str) = ("quetsche", "questche");

/// The sample path with the two known spellings of its name swapped.
pub fn alternate_sample_path(path: &Path) -> Option<PathBuf> {
    let text = path.to_string_lossy();
    let (a, b) = SAMPLE_SPELLINGS;
    if text.contains(b) {
        Some(PathBuf::from(text.replace(b, a)))
    } else if text.contains(a) {
        Some(PathBuf::from(text.replace(a, b)))
    } else {
        None
    }
}

/// Loads the bundled sample, trying the alternate spelling when the
/// configured file is missing. The file name follows whichever path worked.
pub async fn load_sample(path: &Path) -> Result<SourceImage, IntakeError> {
    match SourceImage::load(path).await {
        Ok(source) => Ok(source),
        Err(IntakeError::Read { .. }) => {
            let alternate = alternate_sample_path(path)
                .ok_or_else(|| IntakeError::SampleMissing(path.to_path_buf()))?;
            log::info!("Sample not found, trying {}", alternate.display());
            match SourceImage::load(&alternate).await {
                Ok(source) => Ok(source),
                Err(IntakeError::Read { .. }) => Err(IntakeError::SampleMissing(path.to_path_buf())),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}
