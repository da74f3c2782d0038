use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use canopy_analysis::{
    AnalysisError, CompositingParams, ExtractionParams, ImageryProvider, LocalRasterProvider,
    RasterScene, WindowAnalyzer,
};
use canopy_config::{CanopyConfig, ProjectConfig};
use canopy_core::{Aoi, AoiId, WindowKind, load_aois, windows};
use canopy_store::{JsonLedgerStore, LedgerError, LedgerStore};
use chrono::NaiveDate;

use crate::publish::{MapRenderer, ReportPublisher};
use crate::report::assemble;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub anchor: NaiveDate,
    /// Assemble but never publish.
    pub local: bool,
    /// Publish the latest entry even when no window has new data.
    pub force_publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AoiOutcome {
    pub aoi_id: AoiId,
    pub processing_date: String,
    pub new_windows: Vec<WindowKind>,
    pub skipped_windows: Vec<WindowKind>,
    pub filled_windows: Vec<WindowKind>,
    pub published: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<AoiOutcome>,
    pub failures: Vec<(String, anyhow::Error)>,
}

/// Collaborators and settings shared by every AOI of one run.
pub struct Pipeline<'a> {
    pub config: &'a CanopyConfig,
    pub workspace: &'a Path,
    pub renderer: &'a dyn MapRenderer,
    pub publisher: &'a dyn ReportPublisher,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a CanopyConfig,
        workspace: &'a Path,
        renderer: &'a dyn MapRenderer,
        publisher: &'a dyn ReportPublisher,
    ) -> Self {
        Self {
            config,
            workspace,
            renderer,
            publisher,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(self.workspace, path)
    }

    pub fn ledger_store(&self) -> Result<JsonLedgerStore> {
        let dir = self.resolve(&self.config.ledger.dir);
        JsonLedgerStore::open(&dir)
            .with_context(|| format!("failed to open ledger directory {}", dir.display()))
    }

    pub fn load_project_aois(&self, project: &ProjectConfig) -> Result<Vec<Aoi>> {
        let path = self.resolve(&project.geojson);
        load_aois(&path, &project.name_property)
            .with_context(|| format!("failed to load AOIs from {}", path.display()))
    }

    pub fn provider_for(&self, project: &ProjectConfig) -> Result<LocalRasterProvider> {
        let path = self.resolve(&project.scenes);
        let scene = RasterScene::load(&path)
            .with_context(|| format!("failed to load scenes from {}", path.display()))?;
        Ok(LocalRasterProvider::new(
            scene,
            CompositingParams {
                interval_days: self.config.imagery.interval_days,
                max_cloud_pct: self.config.imagery.max_cloud_pct,
            },
        ))
    }

    /// Runs every configured project. A failing project or AOI is logged and
    /// recorded; the remaining ones still run.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let store = self.ledger_store()?;
        let mut summary = RunSummary::default();

        for project in &self.config.projects {
            let label = project.geojson.display().to_string();
            let prepared = self
                .load_project_aois(project)
                .and_then(|aois| Ok((aois, self.provider_for(project)?)));
            let (aois, provider) = match prepared {
                Ok(prepared) => prepared,
                Err(err) => {
                    tracing::error!(
                        project = %label,
                        error = %format!("{err:#}"),
                        "project skipped"
                    );
                    summary.failures.push((label, err));
                    continue;
                }
            };

            for aoi in &aois {
                match self.run_aoi(project, aoi, &provider, &store, options) {
                    Ok(outcome) => summary.outcomes.push(outcome),
                    Err(err) => {
                        tracing::error!(aoi = %aoi.id, error = %format!("{err:#}"), "AOI failed");
                        summary.failures.push((aoi.id.clone(), err));
                    }
                }
            }
        }

        Ok(summary)
    }

    pub fn run_aoi<P: ImageryProvider + ?Sized>(
        &self,
        project: &ProjectConfig,
        aoi: &Aoi,
        provider: &P,
        store: &JsonLedgerStore,
        options: &RunOptions,
    ) -> Result<AoiOutcome> {
        let imagery = &self.config.imagery;
        let processing_date = processing_date(options.anchor, &self.config.ledger.date_format)?;
        let window_set = windows(options.anchor, &self.config.windows.definitions())?;
        let kinds = window_set.kinds();
        let output_dir = self.resolve(&self.config.report.output_dir);

        let _lock = store.lock(&aoi.id)?;
        let mut ledger = store.load(&aoi.id)?;
        let had_history = !ledger.is_empty();

        let analyzer = WindowAnalyzer::new(
            provider,
            ExtractionParams {
                ndvi_threshold: imagery.ndvi_threshold,
                resolution_m: imagery.resolution_m,
            },
        );
        let series = analyzer.series(
            aoi,
            imagery.series_start,
            options.anchor,
            imagery.interval_days,
        )?;

        let mut new_windows = Vec::new();
        let mut skipped_windows = Vec::new();
        for window in &window_set {
            let analysis = match analyzer.analyze(&series, window, aoi) {
                Ok(analysis) => analysis,
                Err(
                    err @ (AnalysisError::InsufficientData { .. }
                    | AnalysisError::EmptyAoi { .. }),
                ) => {
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(
                        aoi = %aoi.id,
                        window = %window.kind,
                        error = %err,
                        "window skipped"
                    );
                    skipped_windows.push(window.kind);
                    continue;
                }
            };

            let last_date = analysis.extraction.last.metrics.observation_date;
            if !ledger.is_new(window.kind, last_date) {
                tracing::info!(
                    aoi = %aoi.id,
                    window = %window.kind,
                    %last_date,
                    "no new satellite data"
                );
                continue;
            }

            let artifact_path = output_dir.join(artifact_name(
                &aoi.id,
                &project.artifact_prefix,
                &processing_date,
                window.kind,
            ));
            if let Err(err) = self
                .renderer
                .render(aoi, &analysis.detection.difference, &artifact_path)
            {
                tracing::warn!(
                    aoi = %aoi.id,
                    window = %window.kind,
                    error = %format!("{err:#}"),
                    "window skipped"
                );
                skipped_windows.push(window.kind);
                continue;
            }

            if ledger.upsert(&processing_date, analysis.record(&aoi.name, artifact_path)) {
                new_windows.push(window.kind);
            }
        }

        let mut filled_windows = Vec::new();
        if !new_windows.is_empty() {
            match ledger.reconcile(&processing_date, &kinds) {
                Ok(reconciliation) => filled_windows = reconciliation.filled,
                Err(LedgerError::NoHistory { windows, .. }) if !had_history => {
                    tracing::info!(
                        aoi = %aoi.id,
                        ?windows,
                        "first run, some windows have no history yet"
                    );
                }
                Err(LedgerError::NoHistory { windows, .. }) => {
                    tracing::warn!(aoi = %aoi.id, ?windows, "ledger history is missing windows");
                }
                Err(err) => return Err(err.into()),
            }
            store.save(&ledger)?;
        }

        let entry = if !new_windows.is_empty() {
            ledger.entry(&processing_date)
        } else if options.force_publish {
            ledger.latest()
        } else {
            None
        };

        let mut published = None;
        match entry {
            Some(entry) => {
                let report = assemble(entry, &kinds, &self.config.report.labels);
                if options.local {
                    tracing::info!(
                        aoi = %aoi.id,
                        processing_date = %report.processing_date,
                        sections = report.sections.len(),
                        "local run, report not published"
                    );
                } else {
                    published = Some(self.publisher.publish(&report, options.anchor)?);
                }
            }
            None => tracing::info!(aoi = %aoi.id, %processing_date, "no new data, no report"),
        }

        Ok(AoiOutcome {
            aoi_id: aoi.id.clone(),
            processing_date,
            new_windows,
            skipped_windows,
            filled_windows,
            published,
        })
    }
}

/// Ledger key for `anchor`. Formats chrono cannot render for a plain date
/// are an error rather than a panic.
pub fn processing_date(anchor: NaiveDate, format: &str) -> Result<String> {
    let mut key = String::new();
    write!(key, "{}", anchor.format(format))
        .map_err(|_| anyhow!("ledger.date_format '{format}' cannot format a date"))?;
    Ok(key)
}

/// Mask artifact file name. The AOI id keeps AOIs of one project apart.
pub fn artifact_name(
    aoi_id: &str,
    prefix: &str,
    processing_date: &str,
    window: WindowKind,
) -> String {
    format!("{aoi_id}_{prefix}_{processing_date}_{window}.json")
}

/// Config paths are relative to the workspace root unless absolute.
pub fn resolve_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}
