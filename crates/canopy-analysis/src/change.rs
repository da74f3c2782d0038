use canopy_core::{Aoi, ChangeResult, MetricsSnapshot, PixelMask, relative_change};

use crate::AnalysisError;
use crate::extract::Observation;
use crate::provider::ImageryProvider;

/// Change figures for two snapshots, given the area that newly crossed the
/// vegetation threshold. Loss is derived so that gain + loss == area change.
pub fn change_metrics(
    first: &MetricsSnapshot,
    last: &MetricsSnapshot,
    vegetation_gain: f64,
) -> ChangeResult {
    let area_change = last.vegetation_cover_m2 - first.vegetation_cover_m2;
    let vegetation_loss = area_change - vegetation_gain;
    let project_area = first.area_m2;
    let percent_of_project = |value: f64| {
        if project_area == 0.0 {
            0.0
        } else {
            value / project_area * 100.0
        }
    };

    let vegetation_share_start = first.vegetation_share();
    let vegetation_share_end = last.vegetation_share();

    ChangeResult {
        area_change,
        relative_change: relative_change(first.vegetation_cover_m2, last.vegetation_cover_m2),
        vegetation_gain,
        vegetation_loss,
        vegetation_gain_relative: percent_of_project(vegetation_gain),
        vegetation_loss_relative: percent_of_project(-vegetation_loss),
        vegetation_share_start,
        vegetation_share_end,
        vegetation_share_change: vegetation_share_end - vegetation_share_start,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub change: ChangeResult,
    /// +1 newly vegetated, -1 no longer vegetated, 0 unchanged.
    pub difference: PixelMask,
}

pub struct ChangeDetector<'a, P: ImageryProvider + ?Sized> {
    provider: &'a P,
    resolution_m: f64,
}

impl<'a, P: ImageryProvider + ?Sized> ChangeDetector<'a, P> {
    pub fn new(provider: &'a P, resolution_m: f64) -> Self {
        Self {
            provider,
            resolution_m,
        }
    }

    pub fn detect(
        &self,
        first: &Observation,
        last: &Observation,
        aoi: &Aoi,
    ) -> Result<Detection, AnalysisError> {
        let difference = PixelMask::signed_difference(&first.vegetation, &last.vegetation)?;
        let vegetation_gain = self
            .provider
            .region_sum(&difference.select(1), aoi, self.resolution_m)?
            .round();

        let change = change_metrics(&first.metrics, &last.metrics, vegetation_gain);
        if change.relative_change.is_none() {
            tracing::warn!(
                aoi = %aoi.id,
                first = %first.metrics.observation_date,
                "no vegetation cover at the start of the window, relative change undefined"
            );
        }

        Ok(Detection { change, difference })
    }
}

#[cfg(test)]
mod tests {
    use canopy_core::Composite;
    use ndarray::array;

    use super::*;
    use crate::tests::{FakeProvider, aoi, date};

    fn snapshot(area_m2: f64, vegetation_cover_m2: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            area_m2,
            vegetation_cover_m2,
            observation_date: date(2024, 1, 1),
        }
    }

    fn observation(vegetation: PixelMask, cover: f64) -> Observation {
        Observation {
            composite: Composite::new("c", date(2024, 1, 1)),
            metrics: snapshot(1_600.0, cover),
            vegetation,
        }
    }

    #[test]
    fn cover_decline_matches_worked_example() {
        let result = change_metrics(
            &snapshot(10_000.0, 1_000.0),
            &snapshot(10_000.0, 800.0),
            100.0,
        );

        assert_eq!(result.area_change, -200.0);
        assert_eq!(result.relative_change, Some(-20.0));
        assert_eq!(result.vegetation_gain, 100.0);
        assert_eq!(result.vegetation_loss, -300.0);
        assert_eq!(result.vegetation_gain_relative, 1.0);
        assert_eq!(result.vegetation_loss_relative, 3.0);
        assert_eq!(result.vegetation_share_start, 10.0);
        assert_eq!(result.vegetation_share_end, 8.0);
        assert_eq!(result.vegetation_share_change, -2.0);
    }

    #[test]
    fn zero_baseline_reports_undefined_relative_change() {
        let result = change_metrics(&snapshot(10_000.0, 0.0), &snapshot(10_000.0, 500.0), 500.0);
        assert_eq!(result.relative_change, None);
        assert_eq!(result.area_change, 500.0);
        assert_eq!(result.vegetation_loss, 0.0);
    }

    #[test]
    fn gain_and_loss_always_reconcile_to_area_change() {
        for (first, last, gain) in [
            (1_000.0, 800.0, 100.0),
            (0.0, 300.0, 300.0),
            (4_200.0, 4_200.0, 700.0),
            (123_457.0, 98_765.0, 5_432.0),
        ] {
            let result =
                change_metrics(&snapshot(200_000.0, first), &snapshot(200_000.0, last), gain);
            assert_eq!(result.vegetation_gain + result.vegetation_loss, result.area_change);
        }
    }

    #[test]
    fn detector_sums_newly_vegetated_pixels() {
        let provider = FakeProvider::default();
        let detector = ChangeDetector::new(&provider, 10.0);

        let first = observation(
            PixelMask::from_array(array![[1, 1, 0, 0], [1, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
            300.0,
        );
        let last = observation(
            PixelMask::from_array(array![[1, 0, 1, 1], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 1]]),
            400.0,
        );

        let detection = detector.detect(&first, &last, &aoi()).expect("detect");
        assert_eq!(detection.difference.count(1), 3);
        assert_eq!(detection.difference.count(-1), 2);
        assert_eq!(detection.change.vegetation_gain, 300.0);
        assert_eq!(detection.change.vegetation_loss, -200.0);
        assert_eq!(
            detection.change.vegetation_gain + detection.change.vegetation_loss,
            detection.change.area_change
        );
    }

    #[test]
    fn mismatched_masks_are_rejected() {
        let provider = FakeProvider::default();
        let detector = ChangeDetector::new(&provider, 10.0);
        let first = observation(PixelMask::zeros((4, 4)), 0.0);
        let last = observation(PixelMask::zeros((2, 2)), 0.0);

        assert!(matches!(
            detector.detect(&first, &last, &aoi()),
            Err(AnalysisError::Mask(_))
        ));
    }
}
