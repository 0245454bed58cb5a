//! End-to-end run: fetch → units → bundles → super-bundle → publish.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument};
use url::Url;

use hashstack_artifacts::{
    BundleSummary, SuperBundleSummary, UnitBuilder, bundle_archive_path, package_bundle,
    package_super_bundle, super_archive_path,
};
use hashstack_crawler::{Fetcher, FetcherPool, build_fetcher, parse_locators, sample_size};
use hashstack_shared::{AppConfig, HashColor, Result};

use crate::publish::{GitPublisher, PublishGate, PublishReport, Publisher};
use crate::scheduler::{Scheduler, Stage, TaskOutcome, TaskRecord};

/// Outcome of one run, built from the scheduler ledger.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub super_index: u32,
    pub tasks: Vec<TaskRecord>,
    pub bundles: Vec<BundleSummary>,
    pub super_bundle: Option<SuperBundleSummary>,
    /// Stage that prevented the super-bundle, when there is none.
    pub failed_stage: Option<String>,
    pub publish: PublishReport,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn super_hash(&self) -> Option<&str> {
        self.super_bundle.as_ref().map(|s| s.super_hash.as_str())
    }

    /// Operator-facing colour of the super hash.
    pub fn super_color(&self) -> Option<HashColor> {
        self.super_hash().map(HashColor::from_hash)
    }

    /// Ledger lines of one stage that completed, with their hashes.
    pub fn completed(&self, stage: Stage) -> impl Iterator<Item = (&str, &str)> {
        self.tasks.iter().filter_map(move |t| match &t.outcome {
            TaskOutcome::Completed { hash } if t.stage == stage => {
                Some((t.label.as_str(), hash.as_str()))
            }
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, TaskOutcome::Failed { .. }))
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after every unit, successful or not.
    fn unit_done(&self, current: usize, total: usize);
    /// Called after every bundle, successful or not.
    fn bundle_done(&self, bundle_index: u32, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_done(&self, _current: usize, _total: usize) {}
    fn bundle_done(&self, _bundle_index: u32, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// A configured producer of one super-bundle per run.
pub struct Pipeline {
    config: AppConfig,
    locators: Vec<Url>,
    pool: FetcherPool,
    builder: UnitBuilder,
    gate: PublishGate,
}

impl Pipeline {
    /// Build from explicit collaborators. The config is validated first.
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn Fetcher>,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self> {
        config.validate()?;
        let locators = parse_locators(&config.sources)?;
        let pool = FetcherPool::new(fetcher, &config.fetch);
        let builder = UnitBuilder::new(&config.categories, config.excerpt.clone())?;
        let gate = PublishGate::new(
            publisher,
            config.archive.super_dir(),
            config.publish.enabled,
        );

        Ok(Self {
            config,
            locators,
            pool,
            builder,
            gate,
        })
    }

    /// Build with the fetcher selected by `fetch.mode` and the git publisher.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let fetcher = build_fetcher(&config.fetch)?;
        let publisher = Arc::new(GitPublisher::new(&config.publish));
        Self::new(config, fetcher, publisher)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.config.archive.bundles_dir()
    }

    pub fn super_dir(&self) -> PathBuf {
        self.config.archive.super_dir()
    }

    /// Produce super-bundle `super_index` and hand it to the publish gate.
    ///
    /// Unit and bundle failures are recorded and the run carries on; a
    /// super-bundle is only packaged when every bundle succeeded.
    #[instrument(skip_all, fields(super_index = super_index))]
    pub async fn run<R: Rng + ?Sized>(
        &self,
        super_index: u32,
        rng: &mut R,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let batch = self.config.batch;
        let units_per_bundle = batch.units_per_bundle;
        let bundles_per_super = batch.bundles_per_super;
        let total_units = units_per_bundle * bundles_per_super;
        let bundle_indexes = (1..=bundles_per_super)
            .map(|n| batch.bundle_index(super_index, n))
            .collect::<Result<Vec<_>>>()?;

        info!(
            units_per_bundle,
            bundles_per_super,
            workers = self.pool.workers(),
            "starting run"
        );

        let mut scheduler = Scheduler::new();
        let mut bundles = Vec::with_capacity(bundles_per_super);
        let mut first_failed_bundle = None;
        let mut units_done = 0;

        for (n, bundle_index) in (1..).zip(bundle_indexes) {
            let bundle_label = format!("bundle_{bundle_index:04}");
            progress.phase(&format!("Building {bundle_label}"));

            let mut units = Vec::with_capacity(units_per_bundle);
            for u in 1..=units_per_bundle {
                let k = sample_size(&self.config.sampling, rng);
                let chosen = FetcherPool::select(&self.locators, k, rng);
                let fetched = self.pool.fetch_all(chosen).await;

                let label = format!("{bundle_label}/unit_{u:02}");
                let unit = scheduler
                    .submit(Stage::Unit, label, async {
                        self.builder.build(&fetched, Utc::now())
                    })
                    .await;
                units.extend(unit);

                units_done += 1;
                progress.unit_done(units_done, total_units);
            }

            let path = bundle_archive_path(&self.bundles_dir(), bundle_index, units_per_bundle);
            let summary = scheduler
                .submit(Stage::Bundle, bundle_label.clone(), async {
                    package_bundle(units, bundle_index, units_per_bundle, Utc::now(), &path)
                })
                .await;
            match summary {
                Some(summary) => bundles.push(summary),
                None if first_failed_bundle.is_none() => first_failed_bundle = Some(bundle_label),
                None => {}
            }
            progress.bundle_done(bundle_index, n, bundles_per_super);
        }

        let super_label = format!("super_{super_index:04}");
        let super_bundle = match first_failed_bundle.as_deref() {
            Some(failed) => {
                scheduler.skip(
                    Stage::SuperBundle,
                    &super_label,
                    format!("{failed} failed"),
                );
                None
            }
            None => {
                progress.phase("Packaging super-bundle");
                let path = super_archive_path(&self.super_dir(), super_index, bundles_per_super);
                let summaries = bundles.clone();
                scheduler
                    .submit(Stage::SuperBundle, &super_label, async {
                        package_super_bundle(
                            summaries,
                            super_index,
                            bundles_per_super,
                            Utc::now(),
                            &path,
                        )
                    })
                    .await
            }
        };

        let failed_stage = match (&super_bundle, &first_failed_bundle) {
            (Some(_), _) => None,
            (None, Some(bundle)) => Some(format!("{} ({bundle})", Stage::Bundle)),
            (None, None) => Some(Stage::SuperBundle.to_string()),
        };

        let publish = match &super_bundle {
            Some(summary) => {
                progress.phase("Publishing");
                let report = self.gate.submit(summary).await;
                let outcome = match &report {
                    PublishReport::Published { .. } => TaskOutcome::Completed {
                        hash: summary.super_hash.clone(),
                    },
                    PublishReport::Failed { .. } | PublishReport::Rejected { .. } => {
                        TaskOutcome::Failed {
                            error: report.to_string(),
                        }
                    }
                    PublishReport::NothingToPublish
                    | PublishReport::Disabled
                    | PublishReport::Skipped { .. } => {
                        TaskOutcome::Skipped {
                            reason: report.to_string(),
                        }
                    }
                };
                scheduler.record(Stage::Publish, &super_label, outcome);
                report
            }
            None => {
                let reason = "no super-bundle".to_string();
                scheduler.skip(Stage::Publish, &super_label, reason.clone());
                PublishReport::Skipped { reason }
            }
        };

        let report = RunReport {
            super_index,
            tasks: scheduler.into_records(),
            bundles,
            super_bundle,
            failed_stage,
            publish,
            elapsed: start.elapsed(),
        };

        info!(
            super_hash = report.super_hash().unwrap_or("-"),
            bundles = report.bundles.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "run complete"
        );
        progress.done(&report);

        Ok(report)
    }
}
