use std::path::PathBuf;

use canopy_config::{WindowLabel, WindowLabels};
use canopy_core::WindowKind;
use canopy_store::{LedgerEntry, WindowRecord};
use serde::Serialize;

pub const REPORT_TITLE: &str = "Vegetation Cover Change Report";
const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub window: WindowKind,
    pub heading: String,
    pub bullets: Vec<String>,
    pub figures: Vec<String>,
    pub artifact_path: PathBuf,
    pub record: WindowRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledReport {
    pub title: String,
    pub project_name: String,
    pub processing_date: String,
    pub sections: Vec<ReportSection>,
    /// Requested windows the entry had no record for.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_windows: Vec<WindowKind>,
}

/// Builds one report from a finalized ledger entry, one section per window
/// in canonical order.
pub fn assemble(
    entry: &LedgerEntry,
    windows: &[WindowKind],
    labels: &WindowLabels,
) -> AssembledReport {
    let mut kinds = windows.to_vec();
    kinds.sort();
    kinds.dedup();

    let mut sections = Vec::with_capacity(kinds.len());
    let mut missing_windows = Vec::new();
    for kind in kinds {
        let Some(record) = entry.windows.get(&kind) else {
            missing_windows.push(kind);
            continue;
        };

        let label = match kind {
            WindowKind::TwoWeeks => short_term_label(record, labels.get(kind)),
            _ => labels.get(kind).clone(),
        };
        sections.push(ReportSection {
            window: kind,
            heading: format!(
                "{} comparison ({} to {})",
                label.heading,
                record.first_date.format(DISPLAY_DATE_FORMAT),
                record.last_date.format(DISPLAY_DATE_FORMAT)
            ),
            bullets: label.bullets,
            figures: figures(record),
            artifact_path: record.artifact_path.clone(),
            record: record.clone(),
        });
    }

    if !missing_windows.is_empty() {
        tracing::warn!(
            processing_date = %entry.processing_date,
            missing = ?missing_windows,
            "report assembled without some windows"
        );
    }

    AssembledReport {
        title: REPORT_TITLE.to_owned(),
        project_name: sections
            .first()
            .map(|section| section.record.project_name.clone())
            .unwrap_or_default(),
        processing_date: entry.processing_date.clone(),
        sections,
        missing_windows,
    }
}

/// The short-term heading names the actual week span between the two
/// satellite observations. The first bullet follows it; the rest come from
/// configuration.
pub fn short_term_label(record: &WindowRecord, configured: &WindowLabel) -> WindowLabel {
    let weeks = record.satellite_span_weeks().round() as i64;
    let (heading, lead) = if weeks <= 1 {
        (
            "Short-term: One-week".to_owned(),
            "Direct irrigation, pruning and maintenance control for the last week".to_owned(),
        )
    } else {
        (
            format!("Short-term: {weeks}-weeks"),
            format!(
                "Direct irrigation, pruning and maintenance control for the last {weeks} weeks"
            ),
        )
    };

    WindowLabel {
        heading,
        bullets: std::iter::once(lead)
            .chain(configured.bullets.iter().skip(1).cloned())
            .collect(),
    }
}

fn figures(record: &WindowRecord) -> Vec<String> {
    let change = &record.change;
    vec![
        format!("Project area: {:.3} km²", record.project_area_km2),
        format!(
            "Vegetation cover ({}): {} m² ({:.2} %)",
            record.first_date.format(DISPLAY_DATE_FORMAT),
            group_thousands(record.first.vegetation_cover_m2),
            change.vegetation_share_start
        ),
        format!(
            "Vegetation cover ({}): {} m² ({:.2} %)",
            record.last_date.format(DISPLAY_DATE_FORMAT),
            group_thousands(record.last.vegetation_cover_m2),
            change.vegetation_share_end
        ),
        format!(
            "Vegetation health increase (green): {} m² ({:.2} %)",
            group_thousands(change.vegetation_gain),
            change.vegetation_gain_relative
        ),
        format!(
            "Vegetation health decrease (red): {} m² ({:.2} %)",
            group_thousands(change.vegetation_loss),
            change.vegetation_loss_relative
        ),
        format!(
            "Net vegetation change: {} m² ({:.2} %)",
            group_thousands(record.net_change_m2()),
            change.vegetation_share_change
        ),
    ]
}

/// `1234567.4` -> `1,234,567`.
fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        grouped.push('-');
    }
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
