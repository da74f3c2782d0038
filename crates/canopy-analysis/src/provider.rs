use canopy_core::{Aoi, Composite, MaskError, PixelMask};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("mask error: {0}")]
    Mask(#[from] MaskError),
    #[error("unknown composite {0}")]
    UnknownComposite(String),
    #[error("requested resolution {requested} m does not match native {native} m")]
    Resolution { requested: f64, native: f64 },
    #[error("{0}")]
    Message(String),
}

/// Imagery/compute backend. The engine only needs dated composites and a
/// region-sum reduction over masks on the provider's own grid.
pub trait ImageryProvider {
    /// One composite per schedule date that has usable acquisitions, in
    /// schedule order.
    fn composites(
        &self,
        aoi: &Aoi,
        schedule: &[NaiveDate],
    ) -> Result<Vec<Composite>, ProviderError>;

    /// 1 for every pixel of the AOI footprint.
    fn coverage_mask(&self, composite: &Composite, aoi: &Aoi) -> Result<PixelMask, ProviderError>;

    /// 1 where the normalized vegetation index is at or above `ndvi_threshold`.
    fn vegetation_mask(
        &self,
        composite: &Composite,
        aoi: &Aoi,
        ndvi_threshold: f64,
    ) -> Result<PixelMask, ProviderError>;

    /// Sum of `mask * pixel_area` over the AOI geometry.
    fn region_sum(
        &self,
        mask: &PixelMask,
        aoi: &Aoi,
        resolution_m: f64,
    ) -> Result<f64, ProviderError>;
}
