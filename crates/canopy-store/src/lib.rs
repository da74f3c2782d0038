use std::path::PathBuf;

use canopy_core::{AoiId, ChangeResult, MetricsSnapshot, WindowKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod json;
mod ledger;

pub use json::{JsonLedgerStore, LedgerLock};
pub use ledger::{Ledger, LedgerEntry, Reconciliation};

/// Persisted result for one (AOI, window, processing date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub window: WindowKind,
    pub project_name: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub first: MetricsSnapshot,
    pub last: MetricsSnapshot,
    pub change: ChangeResult,
    pub project_area_km2: f64,
    pub artifact_path: PathBuf,
}

impl WindowRecord {
    /// Net change in cover, as shown in reports.
    pub fn net_change_m2(&self) -> f64 {
        self.change.area_change
    }

    /// Whole weeks (fractional) between the two satellite observations.
    pub fn satellite_span_weeks(&self) -> f64 {
        (self.last_date - self.first_date).num_days() as f64 / 7.0
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize ledger for {aoi_id}: {source}")]
    Serialize {
        aoi_id: AoiId,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger for {aoi_id} is locked by another writer")]
    Locked { aoi_id: AoiId },
    #[error("no entry for processing date {0}")]
    MissingEntry(String),
    #[error("no earlier record to fill {windows:?} on {processing_date}")]
    NoHistory {
        processing_date: String,
        windows: Vec<WindowKind>,
    },
}

/// One persisted ledger per AOI: read once per run, written back once.
pub trait LedgerStore {
    fn load(&self, aoi_id: &str) -> Result<Ledger, LedgerError>;
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    pub fn record(window: WindowKind, first_date: NaiveDate, last_date: NaiveDate) -> WindowRecord {
        WindowRecord {
            window,
            project_name: "North Park".to_owned(),
            window_start: first_date,
            window_end: last_date,
            first_date,
            last_date,
            first: MetricsSnapshot {
                area_m2: 10_000.0,
                vegetation_cover_m2: 1_000.0,
                observation_date: first_date,
            },
            last: MetricsSnapshot {
                area_m2: 10_000.0,
                vegetation_cover_m2: 800.0,
                observation_date: last_date,
            },
            change: ChangeResult {
                area_change: -200.0,
                relative_change: Some(-20.0),
                vegetation_gain: 100.0,
                vegetation_loss: -300.0,
                vegetation_gain_relative: 1.0,
                vegetation_loss_relative: 3.0,
                vegetation_share_start: 10.0,
                vegetation_share_end: 8.0,
                vegetation_share_change: -2.0,
            },
            project_area_km2: 0.01,
            artifact_path: PathBuf::from(format!("north_park_{last_date}_{window}.json")),
        }
    }
}
