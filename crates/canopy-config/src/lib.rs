use std::fs;
use std::path::{Path, PathBuf};

use canopy_core::window::default_epoch;
use canopy_core::{MonthDay, WindowDefinitions, WindowKind};
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CANOPY_DIR_NAME: &str = ".canopy";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_LEDGER_DIR: &str = ".canopy/ledger";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_NAME_PROPERTY: &str = "REF_CL_CAT";
pub const DEFAULT_ARTIFACT_PREFIX: &str = "growth_decline";
pub const DEFAULT_INTERVAL_DAYS: u32 = 40;
pub const DEFAULT_MAX_CLOUD_PCT: f64 = 1.0;
pub const DEFAULT_NDVI_THRESHOLD: f64 = 0.2;
pub const DEFAULT_RESOLUTION_M: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CanopyConfig {
    #[serde(default)]
    pub windows: WindowsConfig,
    #[serde(default)]
    pub imagery: ImageryConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowsConfig {
    #[serde(default = "default_epoch")]
    pub epoch: NaiveDate,
    #[serde(default = "default_seasonal_a")]
    pub seasonal_a: MonthDay,
    #[serde(default = "default_seasonal_b")]
    pub seasonal_b: MonthDay,
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,
    #[serde(default = "default_enabled_windows")]
    pub enabled: Vec<WindowKind>,
}

impl Default for WindowsConfig {
    fn default() -> Self {
        let definitions = WindowDefinitions::default();
        Self {
            epoch: definitions.epoch,
            seasonal_a: definitions.seasonal_a,
            seasonal_b: definitions.seasonal_b,
            lookback_years: definitions.lookback_years,
            enabled: definitions.enabled,
        }
    }
}

impl WindowsConfig {
    pub fn definitions(&self) -> WindowDefinitions {
        WindowDefinitions {
            epoch: self.epoch,
            seasonal_a: self.seasonal_a,
            seasonal_b: self.seasonal_b,
            lookback_years: self.lookback_years,
            enabled: self.enabled.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryConfig {
    #[serde(default = "default_series_start")]
    pub series_start: NaiveDate,
    #[serde(default = "default_interval_days")]
    pub interval_days: u32,
    #[serde(default = "default_max_cloud_pct")]
    pub max_cloud_pct: f64,
    #[serde(default = "default_ndvi_threshold")]
    pub ndvi_threshold: f64,
    #[serde(default = "default_resolution_m")]
    pub resolution_m: f64,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            series_start: default_series_start(),
            interval_days: DEFAULT_INTERVAL_DAYS,
            max_cloud_pct: DEFAULT_MAX_CLOUD_PCT,
            ndvi_threshold: DEFAULT_NDVI_THRESHOLD,
            resolution_m: DEFAULT_RESOLUTION_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: default_ledger_dir(),
            date_format: default_date_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub labels: WindowLabels,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            labels: WindowLabels::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLabel {
    pub heading: String,
    #[serde(default)]
    pub bullets: Vec<String>,
}

impl WindowLabel {
    fn new(heading: &str, bullets: &[&str]) -> Self {
        Self {
            heading: heading.to_owned(),
            bullets: bullets.iter().map(|bullet| (*bullet).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLabels {
    #[serde(default = "default_two_weeks_label")]
    pub two_weeks: WindowLabel,
    #[serde(default = "default_one_year_label")]
    pub one_year: WindowLabel,
    #[serde(default = "default_since_epoch_label")]
    pub since_epoch: WindowLabel,
    #[serde(default = "default_seasonal_a_label")]
    pub seasonal_a: WindowLabel,
    #[serde(default = "default_seasonal_b_label")]
    pub seasonal_b: WindowLabel,
}

impl Default for WindowLabels {
    fn default() -> Self {
        Self {
            two_weeks: default_two_weeks_label(),
            one_year: default_one_year_label(),
            since_epoch: default_since_epoch_label(),
            seasonal_a: default_seasonal_a_label(),
            seasonal_b: default_seasonal_b_label(),
        }
    }
}

impl WindowLabels {
    pub fn get(&self, kind: WindowKind) -> &WindowLabel {
        match kind {
            WindowKind::TwoWeeks => &self.two_weeks,
            WindowKind::OneYear => &self.one_year,
            WindowKind::SinceEpoch => &self.since_epoch,
            WindowKind::SeasonalA => &self.seasonal_a,
            WindowKind::SeasonalB => &self.seasonal_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub geojson: PathBuf,
    pub scenes: PathBuf,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn canopy_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(CANOPY_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    canopy_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<CanopyConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(CanopyConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: CanopyConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<CanopyConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(canopy_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = CanopyConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &CanopyConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.windows.enabled.is_empty() {
        warnings.push(ConfigWarning {
            code: "no_windows",
            message: "windows.enabled is empty; no window will be evaluated".to_owned(),
        });
    }

    if !(-1.0..=1.0).contains(&config.imagery.ndvi_threshold) {
        warnings.push(ConfigWarning {
            code: "ndvi_threshold_out_of_range",
            message: format!(
                "imagery.ndvi_threshold = {} is outside -1.0..=1.0",
                config.imagery.ndvi_threshold
            ),
        });
    }

    if !(0.0..=100.0).contains(&config.imagery.max_cloud_pct) {
        warnings.push(ConfigWarning {
            code: "max_cloud_pct_out_of_range",
            message: format!(
                "imagery.max_cloud_pct = {} is outside 0..=100",
                config.imagery.max_cloud_pct
            ),
        });
    }

    if config.imagery.resolution_m <= 0.0 {
        warnings.push(ConfigWarning {
            code: "resolution_not_positive",
            message: format!(
                "imagery.resolution_m = {} must be positive",
                config.imagery.resolution_m
            ),
        });
    }

    if !is_valid_date_format(&config.ledger.date_format) {
        warnings.push(ConfigWarning {
            code: "invalid_date_format",
            message: format!(
                "ledger.date_format '{}' is not a valid strftime pattern",
                config.ledger.date_format
            ),
        });
    }

    if config.projects.is_empty() {
        warnings.push(ConfigWarning {
            code: "no_projects",
            message: "no [[projects]] configured; `run` has nothing to process".to_owned(),
        });
    }

    warnings
}

pub fn is_valid_date_format(format: &str) -> bool {
    !format.trim().is_empty()
        && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

fn default_seasonal_a() -> MonthDay {
    WindowDefinitions::default().seasonal_a
}

fn default_seasonal_b() -> MonthDay {
    WindowDefinitions::default().seasonal_b
}

fn default_lookback_years() -> u32 {
    canopy_core::window::DEFAULT_LOOKBACK_YEARS
}

fn default_enabled_windows() -> Vec<WindowKind> {
    WindowKind::ALL.to_vec()
}

fn default_series_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2016, 7, 1).expect("default series start is a valid date")
}

fn default_interval_days() -> u32 {
    DEFAULT_INTERVAL_DAYS
}

fn default_max_cloud_pct() -> f64 {
    DEFAULT_MAX_CLOUD_PCT
}

fn default_ndvi_threshold() -> f64 {
    DEFAULT_NDVI_THRESHOLD
}

fn default_resolution_m() -> f64 {
    DEFAULT_RESOLUTION_M
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_DIR)
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_owned()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_name_property() -> String {
    DEFAULT_NAME_PROPERTY.to_owned()
}

fn default_artifact_prefix() -> String {
    DEFAULT_ARTIFACT_PREFIX.to_owned()
}

fn default_two_weeks_label() -> WindowLabel {
    WindowLabel::new(
        "Short-term: One-week",
        &[
            "Direct irrigation, pruning and maintenance control for last two weeks",
            "Focus on areas under maintenance (parks, roads)",
        ],
    )
}

fn default_one_year_label() -> WindowLabel {
    WindowLabel::new(
        "Medium-term: One-year",
        &[
            "Trends in maintenance performance and construction for one year",
            "Indicative of environmental changes (weather, groundwater)",
        ],
    )
}

fn default_since_epoch_label() -> WindowLabel {
    WindowLabel::new(
        "Long-term: Five-year",
        &["Long-term trends in maintenance, construction, and environmental changes"],
    )
}

fn default_seasonal_a_label() -> WindowLabel {
    WindowLabel::new(
        "Long-term: Five-year winter",
        &["Long-term trends in natural and managed vegetation in favourable weather"],
    )
}

fn default_seasonal_b_label() -> WindowLabel {
    WindowLabel::new(
        "Long-term: Five-year summer",
        &["Long-term trends in natural and managed vegetation in heat and water stress"],
    )
}

fn normalize_text(input: String, fallback: fn() -> String) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: CanopyConfig) -> CanopyConfig {
    config.ledger.date_format =
        normalize_text(std::mem::take(&mut config.ledger.date_format), default_date_format);

    if config.imagery.interval_days == 0 {
        config.imagery.interval_days = DEFAULT_INTERVAL_DAYS;
    }

    config.windows.enabled.sort();
    config.windows.enabled.dedup();

    for project in &mut config.projects {
        project.name_property = normalize_text(
            std::mem::take(&mut project.name_property),
            default_name_property,
        );
        project.artifact_prefix = normalize_text(
            std::mem::take(&mut project.artifact_prefix),
            default_artifact_prefix,
        );
    }

    config
}
