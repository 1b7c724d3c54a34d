// codec.rs - Decode, resize and re-encode one image

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::CodecError;
use crate::mime::MimeType;

/// Per-request encoding parameters, moved into the worker with the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    /// Encoder quality in `(0, 1]`.
    pub quality: f32,
    pub target_width: u32,
    pub target_height: u32,
    pub export_webp: bool,
    pub original_mime: MimeType,
    pub file_name: String,
}

/// Size, dimensions and MIME of one side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub mime: MimeType,
}

/// One encoded output.
///
/// The bytes are shared, so dropping the owning result releases them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub bytes: Arc<[u8]>,
    pub mime: MimeType,
}

impl Variant {
    pub fn new(bytes: Vec<u8>, mime: MimeType) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedResult {
    pub file_name: String,
    pub original: ImageMeta,
    pub processed: ImageMeta,
    pub primary: Variant,
    pub webp: Option<Variant>,
}

impl ProcessedResult {
    /// Smallest produced output: primary, or WebP when it is lighter.
    pub fn best_output_size(&self) -> u64 {
        match &self.webp {
            Some(webp) => self.primary.size().min(webp.size()),
            None => self.primary.size(),
        }
    }
}

/// Pixel work behind the worker protocol.
pub trait Codec: Send + 'static {
    fn decode(&self, buffer: &[u8], mime: &MimeType) -> Result<DynamicImage, CodecError>;

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    fn encode(
        &self,
        image: &DynamicImage,
        mime: &MimeType,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError>;
}

/// Codec backed by the `image` crate, with WebP encoding from `webp`.
#[derive(Debug, Clone)]
pub struct NativeCodec {
    filter: FilterType,
}

impl NativeCodec {
    pub fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for NativeCodec {
    fn default() -> Self {
        Self::new(FilterType::Lanczos3)
    }
}

impl Codec for NativeCodec {
    fn decode(&self, buffer: &[u8], mime: &MimeType) -> Result<DynamicImage, CodecError> {
        let format = mime
            .image_format()
            .ok_or_else(|| CodecError::Unsupported(mime.to_string()))?;
        image::load_from_memory_with_format(buffer, format)
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        image.resize_exact(width, height, self.filter)
    }

    fn encode(
        &self,
        image: &DynamicImage,
        mime: &MimeType,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError> {
        let encode_err = |message: String| CodecError::Encode {
            mime: mime.to_string(),
            message,
        };
        let mut buffer = Cursor::new(Vec::new());

        match mime.image_format() {
            Some(ImageFormat::Jpeg) => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent(quality));
                // JPEG has no alpha channel
                DynamicImage::ImageRgb8(image.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(e.to_string()))?;
            }
            Some(ImageFormat::Png) => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    PngFilter::Adaptive,
                );
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_err(e.to_string()))?;
            }
            Some(ImageFormat::WebP) => {
                let rgba = image.to_rgba8();
                let (width, height) = rgba.dimensions();
                let memory = webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                    .encode_simple(false, quality_percent(quality) as f32)
                    .map_err(|e| encode_err(format!("{e:?}")))?;
                return Ok(memory.to_vec());
            }
            _ => return Err(CodecError::Unsupported(mime.to_string())),
        }

        Ok(buffer.into_inner())
    }
}

/// `(0, 1]` quality to the 1..=100 scale encoders take.
pub fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Runs one `process` request, reporting phase labels through `progress`.
///
/// The primary variant is always in the source family (see
/// [`MimeType::primary_output`]). A failing WebP variant is logged and
/// dropped; every other failure fails the request.
pub fn process<C, P>(
    codec: &C,
    buffer: &[u8],
    options: &EncodeOptions,
    mut progress: P,
) -> Result<ProcessedResult, CodecError>
where
    C: Codec + ?Sized,
    P: FnMut(&str),
{
    progress("decoding");
    let decoded = codec.decode(buffer, &options.original_mime)?;
    let (source_width, source_height) = decoded.dimensions();

    let width = if options.target_width == 0 { source_width } else { options.target_width };
    let height = if options.target_height == 0 { source_height } else { options.target_height };
    if width == 0 || height == 0 {
        return Err(CodecError::InvalidTarget { width, height });
    }

    progress("resizing");
    let resized = codec.resize(&decoded, width, height);
    drop(decoded);

    progress("encoding");
    let primary_mime = options.original_mime.primary_output();
    let primary = codec.encode(&resized, &primary_mime, options.quality)?;
    let primary = Variant::new(primary, primary_mime);

    let webp = if options.export_webp {
        progress("encoding webp");
        match codec.encode(&resized, &MimeType::webp(), options.quality) {
            Ok(bytes) => Some(Variant::new(bytes, MimeType::webp())),
            Err(e) => {
                log::warn!("WebP variant skipped for {}: {}", options.file_name, e);
                None
            }
        }
    } else {
        None
    };

    Ok(ProcessedResult {
        file_name: options.file_name.clone(),
        original: ImageMeta {
            size: buffer.len() as u64,
            width: source_width,
            height: source_height,
            mime: options.original_mime.clone(),
        },
        processed: ImageMeta {
            size: primary.size(),
            width,
            height,
            mime: primary.mime.clone(),
        },
        primary,
        webp,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn options(mime: MimeType, width: u32, height: u32, export_webp: bool) -> EncodeOptions {
        EncodeOptions {
            quality: 0.75,
            target_width: width,
            target_height: height,
            export_webp,
            original_mime: mime,
            file_name: "gradient.png".into(),
        }
    }

    #[test]
    fn quality_maps_to_percent() {
        assert_eq!(quality_percent(0.75), 75);
        assert_eq!(quality_percent(1.0), 100);
        assert_eq!(quality_percent(0.001), 1);
    }

    #[test]
    fn png_round_produces_both_variants() {
        let source = gradient_png(64, 48);
        let mut labels = Vec::new();
        let result = process(
            &NativeCodec::default(),
            &source,
            &options(MimeType::png(), 32, 24, true),
            |label| labels.push(label.to_string()),
        )
        .unwrap();

        assert_eq!(labels, ["decoding", "resizing", "encoding", "encoding webp"]);
        assert_eq!((result.original.width, result.original.height), (64, 48));
        assert_eq!((result.processed.width, result.processed.height), (32, 24));
        assert_eq!(result.original.size, source.len() as u64);
        assert_eq!(result.primary.mime, MimeType::png());
        assert_eq!(result.processed.size, result.primary.size());
        let webp = result.webp.expect("webp variant");
        assert_eq!(&webp.bytes[..4], b"RIFF");
    }

    #[test]
    fn jpeg_primary_is_jpeg() {
        let source = gradient_png(40, 40);
        let img = NativeCodec::default().decode(&source, &MimeType::png()).unwrap();
        let jpeg = NativeCodec::default().encode(&img, &MimeType::jpeg(), 0.75).unwrap();

        let result = process(
            &NativeCodec::default(),
            &jpeg,
            &options(MimeType::jpeg(), 20, 20, false),
            |_| {},
        )
        .unwrap();
        assert_eq!(result.primary.mime, MimeType::jpeg());
        assert_eq!(&result.primary.bytes[..2], &[0xFF, 0xD8]);
        assert!(result.webp.is_none());
    }

    #[test]
    fn undecodable_buffer_is_an_error() {
        let err = process(
            &NativeCodec::default(),
            b"definitely not an image",
            &options(MimeType::png(), 10, 10, true),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn unknown_mime_is_unsupported() {
        let err = process(
            &NativeCodec::default(),
            &gradient_png(4, 4),
            &options(MimeType::new("image/tiff"), 4, 4, false),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::Unsupported(_)));
    }
}
