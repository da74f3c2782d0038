use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod aoi;
pub mod mask;
pub mod series;
pub mod window;

pub use aoi::{Aoi, AoiError, AoiId, load_aois, parse_aois, snake_case_name};
pub use mask::{MaskError, PixelMask};
pub use series::{Composite, CompositeSeries, composite_schedule, subseries};
pub use window::{
    MonthDay, TimeWindow, WindowDefinitions, WindowError, WindowKind, WindowSet, windows,
};

pub const SQUARE_METRES_PER_KM2: f64 = 1_000_000.0;

/// Area figures for one composite over one AOI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub area_m2: f64,
    pub vegetation_cover_m2: f64,
    pub observation_date: NaiveDate,
}

impl MetricsSnapshot {
    /// Vegetation cover as a percentage of the AOI area.
    pub fn vegetation_share(&self) -> f64 {
        if self.area_m2 == 0.0 {
            return 0.0;
        }
        self.vegetation_cover_m2 / self.area_m2 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub area_change: f64,
    /// `None` when the starting cover is zero.
    pub relative_change: Option<f64>,
    pub vegetation_gain: f64,
    pub vegetation_loss: f64,
    pub vegetation_gain_relative: f64,
    pub vegetation_loss_relative: f64,
    pub vegetation_share_start: f64,
    pub vegetation_share_end: f64,
    pub vegetation_share_change: f64,
}

/// `100 - last/first * 100`, negated when the cover shrank, so growth
/// also comes out negative.
pub fn relative_change(first_cover: f64, last_cover: f64) -> Option<f64> {
    if first_cover == 0.0 {
        return None;
    }

    let raw = 100.0 - (last_cover / first_cover) * 100.0;
    let area_change = last_cover - first_cover;
    Some(if area_change < 0.0 { -raw } else { raw })
}
