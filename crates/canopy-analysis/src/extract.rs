use canopy_core::{Aoi, Composite, CompositeSeries, MetricsSnapshot, PixelMask};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;
use crate::provider::ImageryProvider;

/// Where the comparison pair for a window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSource {
    /// First and last composite inside the window.
    Window,
    /// The window held fewer than two composites; the last two of the whole
    /// series were used, even if they fall outside the window.
    GlobalFallback,
}

/// Chooses the two composites to compare for one window.
pub fn select_pair<'a>(
    series: &'a CompositeSeries,
    subseries: &'a [Composite],
) -> Result<(&'a Composite, &'a Composite, PairSource), AnalysisError> {
    if let [first, .., last] = subseries {
        return Ok((first, last, PairSource::Window));
    }

    series
        .last_two()
        .map(|(previous, latest)| (previous, latest, PairSource::GlobalFallback))
        .ok_or(AnalysisError::InsufficientData {
            available: series.len(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionParams {
    pub ndvi_threshold: f64,
    pub resolution_m: f64,
}

/// Metrics for one composite plus the vegetation mask they were summed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub composite: Composite,
    pub metrics: MetricsSnapshot,
    pub vegetation: PixelMask,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub first: Observation,
    pub last: Observation,
    pub source: PairSource,
}

pub struct MetricExtractor<'a, P: ImageryProvider + ?Sized> {
    provider: &'a P,
    params: ExtractionParams,
}

impl<'a, P: ImageryProvider + ?Sized> MetricExtractor<'a, P> {
    pub fn new(provider: &'a P, params: ExtractionParams) -> Self {
        Self { provider, params }
    }

    pub fn extract(
        &self,
        series: &CompositeSeries,
        subseries: &[Composite],
        aoi: &Aoi,
    ) -> Result<Extraction, AnalysisError> {
        let (first, last, source) = select_pair(series, subseries)?;
        if source == PairSource::GlobalFallback {
            tracing::debug!(
                aoi = %aoi.id,
                in_window = subseries.len(),
                first = %first.observation_date,
                last = %last.observation_date,
                "window too sparse, comparing last two composites of the series"
            );
        }

        Ok(Extraction {
            first: self.observe(first, aoi)?,
            last: self.observe(last, aoi)?,
            source,
        })
    }

    /// Areas are rounded to whole square metres so later sums and
    /// differences stay exact.
    pub fn observe(&self, composite: &Composite, aoi: &Aoi) -> Result<Observation, AnalysisError> {
        let coverage = self.provider.coverage_mask(composite, aoi)?;
        let area_m2 = self
            .provider
            .region_sum(&coverage, aoi, self.params.resolution_m)?
            .round();
        if area_m2 <= 0.0 {
            return Err(AnalysisError::EmptyAoi {
                aoi_id: aoi.id.clone(),
            });
        }

        let vegetation = self
            .provider
            .vegetation_mask(composite, aoi, self.params.ndvi_threshold)?;
        let vegetation_cover_m2 = self
            .provider
            .region_sum(&vegetation, aoi, self.params.resolution_m)?
            .round();

        Ok(Observation {
            composite: composite.clone(),
            metrics: MetricsSnapshot {
                area_m2,
                vegetation_cover_m2,
                observation_date: composite.observation_date,
            },
            vegetation,
        })
    }
}
