// metrics.rs - Savings figures shown next to results

use std::fmt;

use crate::codec::{ProcessedResult, Variant};

pub const MIB: f64 = 1024.0 * 1024.0;

/// Grams of CO₂ credited per MiB not transferred. Illustrative only.
pub const CO2_GRAMS_PER_MIB: f64 = 0.5;

/// `(1 - processed / original) × 100`; negative when the output is heavier.
pub fn savings_percent(original: u64, processed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - processed as f64 / original as f64) * 100.0
}

pub fn bytes_saved(original: u64, processed: u64) -> u64 {
    original.saturating_sub(processed)
}

pub fn co2_saved_grams(original: u64, processed: u64) -> f64 {
    bytes_saved(original, processed) as f64 / MIB * CO2_GRAMS_PER_MIB
}

pub fn format_co2(grams: f64) -> String {
    format!("{:.2} g", grams)
}

pub fn bits_per_pixel(size: u64, width: u32, height: u32) -> f64 {
    let pixels = (width as u64 * height as u64).max(1);
    (size * 8) as f64 / pixels as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Lighter,
    Heavier,
}

/// Signed size change, rendered as `-50.0%` when lighter and `+12.3%` when
/// heavier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainLabel {
    pub percent: f64,
    pub direction: Direction,
}

impl GainLabel {
    pub fn new(original: u64, processed: u64) -> Self {
        let percent = savings_percent(original, processed);
        let direction = if percent >= 0.0 {
            Direction::Lighter
        } else {
            Direction::Heavier
        };
        Self {
            percent: percent.abs(),
            direction,
        }
    }

    /// Unsigned magnitude, e.g. `50.0%`.
    pub fn percent_text(&self) -> String {
        format!("{:.1}%", self.percent)
    }

    pub fn description(&self) -> String {
        match self.direction {
            Direction::Lighter => format!("{} lighter", self.percent_text()),
            Direction::Heavier => format!("{} heavier", self.percent_text()),
        }
    }
}

impl fmt::Display for GainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.direction {
            Direction::Lighter => '-',
            Direction::Heavier => '+',
        };
        write!(f, "{}{}", sign, self.percent_text())
    }
}

/// Human-readable size in 1024 steps.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit > 0 && value < 10.0 {
        format!("{:.2} {}", value, UNITS[unit])
    } else {
        format!("{:.0} {}", value, UNITS[unit])
    }
}

/// Everything the single-image panel displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMetrics {
    pub gain: GainLabel,
    pub bytes_saved: u64,
    pub co2_grams: f64,
    pub original_bpp: f64,
    pub processed_bpp: f64,
}

impl ResultMetrics {
    /// Metrics for the primary output.
    pub fn for_result(result: &ProcessedResult) -> Self {
        Self::for_variant(result, &result.primary)
    }

    /// Metrics for whichever output is on screen. Every variant shares the
    /// processed dimensions; only the byte count differs.
    pub fn for_variant(result: &ProcessedResult, variant: &Variant) -> Self {
        let original = &result.original;
        let processed = &result.processed;
        let size = variant.size();
        Self {
            gain: GainLabel::new(original.size, size),
            bytes_saved: bytes_saved(original.size, size),
            co2_grams: co2_saved_grams(original.size, size),
            original_bpp: bits_per_pixel(original.size, original.width, original.height),
            processed_bpp: bits_per_pixel(size, processed.width, processed.height),
        }
    }
}
