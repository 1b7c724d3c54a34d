// config.rs - Runtime settings with environment overrides

use std::path::PathBuf;

use image::imageops::FilterType;

use crate::error::ConfigError;
use crate::resize::ResizePolicy;

pub const ENV_QUALITY: &str = "IMAGE_SQUEEZER_QUALITY";
pub const ENV_EXPORT_WEBP: &str = "IMAGE_SQUEEZER_EXPORT_WEBP";
pub const ENV_MAX_SIDE: &str = "IMAGE_SQUEEZER_MAX_SIDE";
pub const ENV_OUTPUT_DIR: &str = "IMAGE_SQUEEZER_OUTPUT_DIR";
pub const ENV_SAMPLE: &str = "IMAGE_SQUEEZER_SAMPLE";
pub const ENV_FILTER: &str = "IMAGE_SQUEEZER_FILTER";

/// Everything the window and the pipeline can be tuned with.
///
/// Quality is fixed for a session; the resize policy is only the initial
/// selection and the user changes it live.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Encoder quality in `(0, 1]`.
    pub quality: f32,
    /// Also produce a WebP variant for every image.
    pub export_webp: bool,
    /// Resize choices offered in the window, in display order.
    pub presets: Vec<ResizePolicy>,
    pub default_policy: ResizePolicy,
    /// Where downloads and ZIP archives are written.
    pub output_dir: PathBuf,
    pub sample_path: PathBuf,
    pub resize_filter: FilterType,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 0.75,
            export_webp: true,
            presets: vec![
                ResizePolicy::Original,
                ResizePolicy::MaxSide(2560),
                ResizePolicy::MaxSide(1920),
                ResizePolicy::MaxSide(1200),
                ResizePolicy::MaxSide(800),
            ],
            default_policy: ResizePolicy::MaxSide(1200),
            output_dir: PathBuf::from("compressed"),
            sample_path: PathBuf::from("assets/sample-quetsche.jpg"),
            resize_filter: FilterType::Lanczos3,
        }
    }
}

impl Settings {
    /// Defaults overridden by whichever `IMAGE_SQUEEZER_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(value) = lookup(ENV_QUALITY) {
            settings.quality = parse_quality(&value)?;
        }
        if let Some(value) = lookup(ENV_EXPORT_WEBP) {
            settings.export_webp = parse_bool(ENV_EXPORT_WEBP, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_SIDE) {
            settings.default_policy =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: ENV_MAX_SIDE,
                    value: value.clone(),
                    expected: "`original` or a positive pixel count",
                })?;
            if !settings.presets.contains(&settings.default_policy) {
                settings.presets.push(settings.default_policy);
            }
        }
        if let Some(value) = lookup(ENV_OUTPUT_DIR) {
            settings.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_SAMPLE) {
            settings.sample_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_FILTER) {
            settings.resize_filter = parse_filter(&value)?;
        }

        Ok(settings)
    }
}

fn parse_quality(value: &str) -> Result<f32, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: ENV_QUALITY,
        value: value.to_string(),
        expected: "a number in (0, 1]",
    };
    let quality: f32 = value.trim().parse().map_err(|_| invalid())?;
    if quality > 0.0 && quality <= 1.0 {
        Ok(quality)
    } else {
        Err(invalid())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            expected: "true or false",
        }),
    }
}

fn parse_filter(value: &str) -> Result<FilterType, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "nearest" => Ok(FilterType::Nearest),
        "triangle" | "bilinear" => Ok(FilterType::Triangle),
        "catmullrom" | "bicubic" => Ok(FilterType::CatmullRom),
        "gaussian" => Ok(FilterType::Gaussian),
        "lanczos3" => Ok(FilterType::Lanczos3),
        _ => Err(ConfigError::InvalidValue {
            key: ENV_FILTER,
            value: value.to_string(),
            expected: "nearest, triangle, catmullrom, gaussian or lanczos3",
        }),
    }
}
