use crate::config::{ScanEnv, ScannerConfig};
use crate::errors::Result;
use crate::lifecycle::ScanLifecycle;
use crate::metadata::MetadataProvider;
use crate::net::AnalyticsApi;
use crate::report::ResultReporter;
use crate::types::{ScanTarget, ScanType, StatusPolicy};
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Tally for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Reports that could not be written (the target is also counted above).
    pub unpersisted: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Immediate subdirectories of `input_root`, sorted by name, each bound to
/// `image`. Symlinked directories count; unreadable entries are skipped.
pub fn list_targets(input_root: &Path, image: Option<&str>) -> Result<Vec<ScanTarget>> {
    let entries =
        fs::read_dir(input_root).with_context(|| format!("list {}", input_root.display()))?;

    let mut targets = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(input = %input_root.display(), "skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.path().is_dir() {
            continue;
        }
        targets.push(ScanTarget::new(
            entry.file_name().to_string_lossy().into_owned(),
            image.map(str::to_string),
        ));
    }
    targets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(targets)
}

/// Composition root for one invocation. Targets run one after another;
/// each report is on disk before the next target starts.
pub struct Orchestrator<'a> {
    config: &'a ScannerConfig,
    env: ScanEnv,
    provider: &'a MetadataProvider,
    api: &'a dyn AnalyticsApi,
    reporter: ResultReporter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a ScannerConfig,
        env: ScanEnv,
        provider: &'a MetadataProvider,
        api: &'a dyn AnalyticsApi,
    ) -> Self {
        let reporter = ResultReporter::new(
            &config.output_root,
            &config.result_file,
            &config.scanner_name,
        );
        Self {
            config,
            env,
            provider,
            api,
            reporter,
        }
    }

    fn status_policy(&self) -> StatusPolicy {
        self.config.status_policy
    }

    /// Fails only when the input root cannot be listed. Per-target problems
    /// end up in that target's report; write failures are logged and skipped.
    pub fn run(&self, scan_type: ScanType) -> Result<RunSummary> {
        let targets = list_targets(&self.config.input_root, self.env.image_name.as_deref())?;
        tracing::info!(
            count = targets.len(),
            input = %self.config.input_root.display(),
            %scan_type,
            "scan targets found"
        );

        let mut summary = RunSummary::default();
        for target in &targets {
            let outcome = ScanLifecycle::new(
                target,
                &self.env,
                self.provider,
                self.api,
                self.status_policy(),
            )
            .run();

            if outcome.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            tracing::info!(
                target_id = %target.id,
                "Scanner execution status: {}",
                outcome.success
            );

            if let Err(e) = self.reporter.persist(target, scan_type, &outcome) {
                summary.unpersisted += 1;
                tracing::error!(target_id = %target.id, "could not write report: {e}");
            }
        }
        Ok(summary)
    }
}
