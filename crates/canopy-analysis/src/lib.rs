//! Per-window vegetation change analysis over an imagery provider.

use std::path::PathBuf;

use canopy_core::{
    Aoi, AoiId, CompositeSeries, MaskError, SQUARE_METRES_PER_KM2, TimeWindow, composite_schedule,
};
use canopy_store::WindowRecord;
use chrono::NaiveDate;
use thiserror::Error;

mod change;
mod extract;
mod provider;
mod raster;

pub use change::{ChangeDetector, Detection, change_metrics};
pub use extract::{
    Extraction, ExtractionParams, MetricExtractor, Observation, PairSource, select_pair,
};
pub use provider::{ImageryProvider, ProviderError};
pub use raster::{
    Acquisition, CompositingParams, GeoTransform, LocalRasterProvider, RasterScene, ndvi,
};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("imagery provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("mask error: {0}")]
    Mask(#[from] MaskError),
    #[error("need at least two composites, found {available}")]
    InsufficientData { available: usize },
    #[error("AOI {aoi_id} covers no pixels")]
    EmptyAoi { aoi_id: AoiId },
}

/// Everything computed for one window of one AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAnalysis {
    pub window: TimeWindow,
    pub extraction: Extraction,
    pub detection: Detection,
    /// Composites that fell inside the window before any fallback.
    pub subseries_len: usize,
}

impl WindowAnalysis {
    pub fn record(&self, project_name: &str, artifact_path: PathBuf) -> WindowRecord {
        let first = self.extraction.first.metrics;
        let last = self.extraction.last.metrics;
        WindowRecord {
            window: self.window.kind,
            project_name: project_name.to_owned(),
            window_start: self.window.start,
            window_end: self.window.end,
            first_date: first.observation_date,
            last_date: last.observation_date,
            first,
            last,
            change: self.detection.change,
            project_area_km2: first.area_m2 / SQUARE_METRES_PER_KM2,
            artifact_path,
        }
    }
}

pub struct WindowAnalyzer<'a, P: ImageryProvider + ?Sized> {
    provider: &'a P,
    params: ExtractionParams,
}

impl<'a, P: ImageryProvider + ?Sized> WindowAnalyzer<'a, P> {
    pub fn new(provider: &'a P, params: ExtractionParams) -> Self {
        Self { provider, params }
    }

    /// The global composite sequence for `aoi`, from `series_start` up to
    /// and including `anchor`.
    pub fn series(
        &self,
        aoi: &Aoi,
        series_start: NaiveDate,
        anchor: NaiveDate,
        interval_days: u32,
    ) -> Result<CompositeSeries, AnalysisError> {
        let schedule = composite_schedule(series_start, anchor, interval_days);
        let composites = self.provider.composites(aoi, &schedule)?;
        let series = CompositeSeries::new(composites);
        tracing::info!(
            aoi = %aoi.id,
            scheduled = schedule.len(),
            composites = series.len(),
            "loaded composite series"
        );
        Ok(series)
    }

    pub fn analyze(
        &self,
        series: &CompositeSeries,
        window: &TimeWindow,
        aoi: &Aoi,
    ) -> Result<WindowAnalysis, AnalysisError> {
        let subseries = series.subseries(window);
        let extraction =
            MetricExtractor::new(self.provider, self.params).extract(series, &subseries, aoi)?;
        let detection = ChangeDetector::new(self.provider, self.params.resolution_m).detect(
            &extraction.first,
            &extraction.last,
            aoi,
        )?;

        tracing::debug!(
            aoi = %aoi.id,
            window = %window.kind,
            source = ?extraction.source,
            first = %extraction.first.metrics.observation_date,
            last = %extraction.last.metrics.observation_date,
            area_change = detection.change.area_change,
            "window analysed"
        );

        Ok(WindowAnalysis {
            window: *window,
            extraction,
            detection,
            subseries_len: subseries.len(),
        })
    }
}
