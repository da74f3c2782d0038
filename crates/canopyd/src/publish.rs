use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canopy_core::{Aoi, PixelMask};
use chrono::NaiveDate;
use serde::Serialize;

use crate::report::AssembledReport;

/// Turns a signed difference mask into the map artifact referenced by a
/// window record.
pub trait MapRenderer {
    fn render(&self, aoi: &Aoi, difference: &PixelMask, path: &Path) -> Result<()>;
}

/// Delivers an assembled report. Called at most once per AOI per run.
pub trait ReportPublisher {
    fn publish(&self, report: &AssembledReport, anchor: NaiveDate) -> Result<PathBuf>;
}

#[derive(Debug, Serialize)]
struct MaskArtifact<'a> {
    aoi_id: &'a str,
    project_name: &'a str,
    rows: usize,
    cols: usize,
    gain_pixels: usize,
    loss_pixels: usize,
    values: &'a ndarray::Array2<i8>,
}

/// Writes the difference mask as JSON next to its counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMaskRenderer;

impl MapRenderer for JsonMaskRenderer {
    fn render(&self, aoi: &Aoi, difference: &PixelMask, path: &Path) -> Result<()> {
        let (rows, cols) = difference.shape();
        let artifact = MaskArtifact {
            aoi_id: &aoi.id,
            project_name: &aoi.name,
            rows,
            cols,
            gain_pixels: difference.count(1),
            loss_pixels: difference.count(-1),
            values: difference.values(),
        };
        write_json(path, &artifact)
            .with_context(|| format!("failed to write mask artifact {}", path.display()))?;
        tracing::debug!(aoi = %aoi.id, path = %path.display(), "rendered difference mask");
        Ok(())
    }
}

/// Writes `<output>/<YYYYMMDD>-<name>-Vegetation-Cover-Report.json`.
#[derive(Debug, Clone)]
pub struct JsonReportPublisher {
    output_dir: PathBuf,
}

impl JsonReportPublisher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Path separators in the project name become `_`.
    pub fn report_path(&self, project_name: &str, anchor: NaiveDate) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}-Vegetation-Cover-Report.json",
            anchor.format("%Y%m%d"),
            project_name.replace(['/', '\\'], "_")
        ))
    }
}

impl ReportPublisher for JsonReportPublisher {
    fn publish(&self, report: &AssembledReport, anchor: NaiveDate) -> Result<PathBuf> {
        let path = self.report_path(&report.project_name, anchor);
        write_json(&path, report)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!(
            project = %report.project_name,
            sections = report.sections.len(),
            path = %path.display(),
            "report published"
        );
        Ok(path)
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
