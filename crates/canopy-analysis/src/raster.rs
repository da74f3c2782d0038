//! File-backed imagery provider.
//!
//! A scene holds dated red/NIR acquisitions on one north-up grid. Composites
//! are mosaics of the cloud-filtered acquisitions inside each compositing
//! interval, dated by the interval start. The AOI is rasterised by pixel
//! centre containment.

use std::fs;
use std::path::Path;

use canopy_core::{Aoi, Composite, PixelMask};
use chrono::{Days, NaiveDate};
use geo::{Contains, Point};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::provider::{ImageryProvider, ProviderError};

const COMPOSITE_ID_FORMAT: &str = "%Y-%m-%d";

/// North-up affine transform: `x = origin_x + col * pixel_width`,
/// `y = origin_y + row * pixel_height` (pixel_height is usually negative).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    pub fn resolution(&self) -> f64 {
        self.pixel_width.abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub id: String,
    pub date: NaiveDate,
    pub cloudy_pixel_percentage: f64,
    pub red: Array2<f64>,
    pub nir: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterScene {
    transform: GeoTransform,
    shape: (usize, usize),
    acquisitions: Vec<Acquisition>,
}

#[derive(Debug, Deserialize)]
struct SceneDoc {
    geotransform: GeoTransform,
    rows: usize,
    cols: usize,
    acquisitions: Vec<AcquisitionDoc>,
}

#[derive(Debug, Deserialize)]
struct AcquisitionDoc {
    id: String,
    date: NaiveDate,
    #[serde(default)]
    cloudy_pixel_percentage: f64,
    red: Vec<Vec<Option<f64>>>,
    nir: Vec<Vec<Option<f64>>>,
}

impl RasterScene {
    pub fn new(transform: GeoTransform, shape: (usize, usize)) -> Self {
        Self {
            transform,
            shape,
            acquisitions: Vec::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let raw = fs::read_to_string(path)?;
        let doc: SceneDoc = serde_json::from_str(&raw)?;

        let mut scene = Self::new(doc.geotransform, (doc.rows, doc.cols));
        for acquisition in doc.acquisitions {
            let red = band(&acquisition.id, "red", acquisition.red, scene.shape)?;
            let nir = band(&acquisition.id, "nir", acquisition.nir, scene.shape)?;
            scene.push(Acquisition {
                id: acquisition.id,
                date: acquisition.date,
                cloudy_pixel_percentage: acquisition.cloudy_pixel_percentage,
                red,
                nir,
            })?;
        }
        Ok(scene)
    }

    pub fn push(&mut self, acquisition: Acquisition) -> Result<(), ProviderError> {
        if acquisition.red.dim() != self.shape || acquisition.nir.dim() != self.shape {
            return Err(ProviderError::Message(format!(
                "acquisition {} does not match scene shape {:?}",
                acquisition.id, self.shape
            )));
        }
        self.acquisitions.push(acquisition);
        self.acquisitions.sort_by_key(|acquisition| acquisition.date);
        Ok(())
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn acquisitions(&self) -> &[Acquisition] {
        &self.acquisitions
    }
}

fn band(
    id: &str,
    name: &str,
    rows: Vec<Vec<Option<f64>>>,
    shape: (usize, usize),
) -> Result<Array2<f64>, ProviderError> {
    let mismatch = || {
        ProviderError::Message(format!(
            "acquisition {id}: {name} band does not match scene shape {shape:?}"
        ))
    };
    if rows.len() != shape.0 || rows.iter().any(|row| row.len() != shape.1) {
        return Err(mismatch());
    }

    let values = rows
        .into_iter()
        .flatten()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect();
    Array2::from_shape_vec(shape, values).map_err(|_| mismatch())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositingParams {
    pub interval_days: u32,
    pub max_cloud_pct: f64,
}

pub struct LocalRasterProvider {
    scene: RasterScene,
    params: CompositingParams,
}

struct Mosaic {
    red: Array2<f64>,
    nir: Array2<f64>,
}

impl LocalRasterProvider {
    pub fn new(scene: RasterScene, params: CompositingParams) -> Self {
        Self { scene, params }
    }

    pub fn scene(&self) -> &RasterScene {
        &self.scene
    }

    /// Later acquisitions are laid over earlier ones; missing pixels keep
    /// whatever lies underneath.
    fn mosaic(&self, start: NaiveDate) -> Option<Mosaic> {
        let end = start.checked_add_days(Days::new(u64::from(self.params.interval_days)))?;
        let mut layers = self
            .scene
            .acquisitions
            .iter()
            .filter(|acquisition| {
                start <= acquisition.date
                    && acquisition.date < end
                    && acquisition.cloudy_pixel_percentage < self.params.max_cloud_pct
            })
            .peekable();
        layers.peek()?;

        let mut mosaic = Mosaic {
            red: Array2::from_elem(self.scene.shape, f64::NAN),
            nir: Array2::from_elem(self.scene.shape, f64::NAN),
        };
        for layer in layers {
            Zip::from(&mut mosaic.red)
                .and(&mut mosaic.nir)
                .and(&layer.red)
                .and(&layer.nir)
                .for_each(|red, nir, &top_red, &top_nir| {
                    if top_red.is_finite() && top_nir.is_finite() {
                        *red = top_red;
                        *nir = top_nir;
                    }
                });
        }
        Some(mosaic)
    }

    fn composite_mosaic(&self, composite: &Composite) -> Result<Mosaic, ProviderError> {
        self.mosaic(composite.observation_date)
            .ok_or_else(|| ProviderError::UnknownComposite(composite.id.clone()))
    }

    fn footprint(&self, aoi: &Aoi) -> Array2<bool> {
        let transform = self.scene.transform;
        Array2::from_shape_fn(self.scene.shape, |(row, col)| {
            let (x, y) = transform.pixel_center(row, col);
            aoi.geometry.contains(&Point::new(x, y))
        })
    }
}

pub fn ndvi(red: &Array2<f64>, nir: &Array2<f64>) -> Array2<f64> {
    Zip::from(red).and(nir).map_collect(|&red, &nir| {
        let value = (nir - red) / (nir + red);
        if value.is_finite() { value } else { f64::NAN }
    })
}

impl ImageryProvider for LocalRasterProvider {
    fn composites(
        &self,
        _aoi: &Aoi,
        schedule: &[NaiveDate],
    ) -> Result<Vec<Composite>, ProviderError> {
        let composites: Vec<Composite> = schedule
            .iter()
            .filter(|start| self.mosaic(**start).is_some())
            .map(|start| Composite::new(start.format(COMPOSITE_ID_FORMAT).to_string(), *start))
            .collect();

        tracing::debug!(
            scheduled = schedule.len(),
            composites = composites.len(),
            "built composite series"
        );
        Ok(composites)
    }

    fn coverage_mask(&self, composite: &Composite, aoi: &Aoi) -> Result<PixelMask, ProviderError> {
        self.composite_mosaic(composite)?;
        Ok(PixelMask::from_array(self.footprint(aoi).mapv(i8::from)))
    }

    fn vegetation_mask(
        &self,
        composite: &Composite,
        aoi: &Aoi,
        ndvi_threshold: f64,
    ) -> Result<PixelMask, ProviderError> {
        let mosaic = self.composite_mosaic(composite)?;
        let index = ndvi(&mosaic.red, &mosaic.nir);
        let footprint = self.footprint(aoi);

        let values = Zip::from(&index)
            .and(&footprint)
            .map_collect(|&value, &inside| i8::from(inside && value >= ndvi_threshold));
        Ok(PixelMask::from_array(values))
    }

    fn region_sum(
        &self,
        mask: &PixelMask,
        aoi: &Aoi,
        resolution_m: f64,
    ) -> Result<f64, ProviderError> {
        let native = self.scene.transform.resolution();
        if (resolution_m - native).abs() > f64::EPSILON * native.max(1.0) {
            return Err(ProviderError::Resolution {
                requested: resolution_m,
                native,
            });
        }

        let (er, ec) = self.scene.shape;
        let (ar, ac) = mask.shape();
        if (er, ec) != (ar, ac) {
            return Err(canopy_core::MaskError::ShapeMismatch { er, ec, ar, ac }.into());
        }

        let pixel_area = self.scene.transform.pixel_area();
        let footprint = self.footprint(aoi);
        let mut total = 0.0;
        Zip::from(mask.values())
            .and(&footprint)
            .for_each(|&value, &inside| {
                if inside {
                    total += f64::from(value) * pixel_area;
                }
            });
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use geo::{LineString, MultiPolygon, Polygon};
    use ndarray::array;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn square_aoi(size: f64) -> Aoi {
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (size, 0.0),
            (size, size),
            (0.0, size),
            (0.0, 0.0),
        ]);
        Aoi::new("North Park", MultiPolygon::new(vec![Polygon::new(ring, vec![])]))
    }

    fn acquisition(id: &str, date: NaiveDate, cloud: f64, nir: Array2<f64>) -> Acquisition {
        let red = Array2::from_elem(nir.dim(), 0.1);
        Acquisition {
            id: id.to_owned(),
            date,
            cloudy_pixel_percentage: cloud,
            red,
            nir,
        }
    }

    /// 4x4 grid of 10 m pixels covering x 0..40, y 0..40.
    fn scene() -> RasterScene {
        RasterScene::new(GeoTransform::new(0.0, 40.0, 10.0, -10.0), (4, 4))
    }

    fn params() -> CompositingParams {
        CompositingParams {
            interval_days: 40,
            max_cloud_pct: 1.0,
        }
    }

    #[test]
    fn ndvi_of_dense_vegetation() {
        let index = ndvi(&array![[0.2, 0.0]], &array![[0.8, 0.0]]);
        assert!((index[[0, 0]] - 0.6).abs() < 1e-12);
        assert!(index[[0, 1]].is_nan());
    }

    #[test]
    fn composites_skip_empty_and_cloudy_intervals() {
        let mut scene = scene();
        let green = Array2::from_elem((4, 4), 0.5);
        scene
            .push(acquisition("s2-a", date(2024, 1, 5), 0.2, green.clone()))
            .expect("push");
        scene
            .push(acquisition("s2-cloudy", date(2024, 2, 15), 30.0, green.clone()))
            .expect("push");
        scene
            .push(acquisition("s2-b", date(2024, 3, 25), 0.0, green))
            .expect("push");
        let provider = LocalRasterProvider::new(scene, params());

        let schedule = [date(2024, 1, 1), date(2024, 2, 10), date(2024, 3, 21)];
        let composites = provider
            .composites(&square_aoi(40.0), &schedule)
            .expect("composites");

        assert_eq!(
            composites,
            vec![
                Composite::new("2024-01-01", date(2024, 1, 1)),
                Composite::new("2024-03-21", date(2024, 3, 21)),
            ]
        );
    }

    #[test]
    fn later_acquisitions_overwrite_valid_pixels_only() {
        let mut scene = scene();
        scene
            .push(acquisition(
                "early",
                date(2024, 1, 2),
                0.0,
                Array2::from_elem((4, 4), 0.5),
            ))
            .expect("push");
        let mut late = Array2::from_elem((4, 4), f64::NAN);
        late[[0, 0]] = 0.1;
        scene
            .push(acquisition("late", date(2024, 1, 20), 0.0, late))
            .expect("push");
        let provider = LocalRasterProvider::new(scene, params());
        let aoi = square_aoi(40.0);
        let composite = Composite::new("2024-01-01", date(2024, 1, 1));

        let mask = provider
            .vegetation_mask(&composite, &aoi, 0.2)
            .expect("mask");
        assert_eq!(mask.count(1), 15);
        assert_eq!(mask.values()[[0, 0]], 0);
    }

    #[test]
    fn region_sum_only_counts_pixels_inside_the_aoi() {
        let mut scene = scene();
        scene
            .push(acquisition(
                "s2",
                date(2024, 1, 2),
                0.0,
                Array2::from_elem((4, 4), 0.5),
            ))
            .expect("push");
        let provider = LocalRasterProvider::new(scene, params());
        let composite = Composite::new("2024-01-01", date(2024, 1, 1));

        let half = square_aoi(20.0);
        let coverage = provider.coverage_mask(&composite, &half).expect("coverage");
        assert_eq!(coverage.count(1), 4);
        assert_eq!(
            provider.region_sum(&coverage, &half, 10.0).expect("sum"),
            400.0
        );

        let everything = PixelMask::ones((4, 4));
        assert_eq!(
            provider.region_sum(&everything, &half, 10.0).expect("sum"),
            400.0
        );
    }

    #[test]
    fn region_sum_rejects_foreign_resolution_and_shape() {
        let provider = LocalRasterProvider::new(scene(), params());
        let aoi = square_aoi(40.0);

        assert!(matches!(
            provider.region_sum(&PixelMask::ones((4, 4)), &aoi, 20.0),
            Err(ProviderError::Resolution { .. })
        ));
        assert!(matches!(
            provider.region_sum(&PixelMask::ones((2, 2)), &aoi, 10.0),
            Err(ProviderError::Mask(_))
        ));
    }

    #[test]
    fn unknown_composite_is_an_error() {
        let provider = LocalRasterProvider::new(scene(), params());
        let composite = Composite::new("2020-01-01", date(2020, 1, 1));
        assert!(matches!(
            provider.coverage_mask(&composite, &square_aoi(40.0)),
            Err(ProviderError::UnknownComposite(_))
        ));
    }

    #[test]
    fn scene_file_loads_with_masked_pixels() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("scene.json");
        fs::write(
            &path,
            r#"{
                "geotransform":
                    {"origin_x": 0, "origin_y": 20, "pixel_width": 10, "pixel_height": -10},
                "rows": 2, "cols": 2,
                "acquisitions": [{
                    "id": "s2-1", "date": "2024-01-02", "cloudy_pixel_percentage": 0.1,
                    "red": [[0.1, 0.1], [null, 0.1]],
                    "nir": [[0.5, 0.5], [0.5, 0.1]]
                }]
            }"#,
        )
        .expect("write scene");

        let scene = RasterScene::load(&path).expect("load");
        assert_eq!(scene.shape(), (2, 2));
        assert_eq!(scene.acquisitions().len(), 1);
        assert!(scene.acquisitions()[0].red[[1, 0]].is_nan());

        fs::write(
            &path,
            r#"{
                "geotransform":
                    {"origin_x": 0, "origin_y": 20, "pixel_width": 10, "pixel_height": -10},
                "rows": 2, "cols": 2,
                "acquisitions":
                    [{"id": "bad", "date": "2024-01-02", "red": [[0.1]], "nir": [[0.1]]}]
            }"#,
        )
        .expect("write scene");
        assert!(matches!(
            RasterScene::load(&path),
            Err(ProviderError::Message(_))
        ));
    }
}
