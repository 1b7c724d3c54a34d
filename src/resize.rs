// resize.rs - Target dimension policy

use std::fmt;
use std::str::FromStr;

/// User-selected resize constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResizePolicy {
    /// Keep the source dimensions.
    #[default]
    Original,
    /// Longest side must not exceed this many pixels.
    MaxSide(u32),
}

impl ResizePolicy {
    /// Dimensions to encode at, preserving aspect ratio.
    ///
    /// Images that already fit pass through unchanged. Otherwise the longer
    /// side (width on ties) becomes the limit and the shorter side is scaled
    /// by the same ratio, rounded to the nearest pixel and never below 1.
    pub fn target_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        let max_side = match self {
            Self::Original => return (width, height),
            Self::MaxSide(0) => return (width, height),
            Self::MaxSide(max_side) => max_side,
        };

        if width.max(height) <= max_side {
            return (width, height);
        }

        let scale = |short: u32, long: u32| -> u32 {
            let scaled = (max_side as f64 * short as f64 / long as f64).round();
            (scaled as u32).max(1)
        };

        if width >= height {
            (max_side, scale(height, width))
        } else {
            (scale(width, height), max_side)
        }
    }

    pub fn max_side(self) -> Option<u32> {
        match self {
            Self::Original => None,
            Self::MaxSide(side) => Some(side),
        }
    }
}

impl fmt::Display for ResizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "Original"),
            Self::MaxSide(side) => write!(f, "{} px", side),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicyError(pub String);

impl fmt::Display for ParsePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid resize choice `{}`", self.0)
    }
}

impl std::error::Error for ParsePolicyError {}

impl FromStr for ResizePolicy {
    type Err = ParsePolicyError;

    /// `original` means no constraint; any positive number is that constraint.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("original") {
            return Ok(Self::Original);
        }
        match trimmed.parse::<u32>() {
            Ok(side) if side > 0 => Ok(Self::MaxSide(side)),
            _ => Err(ParsePolicyError(value.to_string())),
        }
    }
}
