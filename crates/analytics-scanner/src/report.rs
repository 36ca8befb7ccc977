use crate::errors::{Result, ScannerError};
use crate::paths::{result_file_path, target_output_dir};
use crate::types::{ScanOutcome, ScanTarget, ScanType};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Fixed JSON shape the host framework collects. Field order is the
/// serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    #[serde(rename = "Start Time")]
    pub start_time: String,
    #[serde(rename = "Finished Time")]
    pub finished_time: String,
    #[serde(rename = "Successful")]
    pub successful: bool,
    #[serde(rename = "Scan Type")]
    pub scan_type: ScanType,
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "CVE Feed Last Updated")]
    pub cve_feed_last_updated: String,
    #[serde(rename = "Scanner")]
    pub scanner: String,
    #[serde(rename = "Scan Results")]
    pub scan_results: Value,
    #[serde(rename = "Summary")]
    pub summary: String,
}

impl ScanReport {
    /// Pure projection; nothing is re-derived from the clock.
    pub fn from_outcome(
        target: &ScanTarget,
        scan_type: ScanType,
        scanner: &str,
        outcome: &ScanOutcome,
    ) -> Self {
        Self {
            start_time: outcome.started_at.clone(),
            finished_time: outcome.finished_at.clone(),
            successful: outcome.success,
            scan_type,
            uuid: target.id.clone(),
            cve_feed_last_updated: "NA".to_string(),
            scanner: scanner.to_string(),
            scan_results: outcome.results(),
            summary: outcome.summary(),
        }
    }

    /// 4-space indented UTF-8 JSON.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut ser)?;
        Ok(buf)
    }
}

/// Writes one report per target under `<output_root>/<target>/`.
#[derive(Debug, Clone)]
pub struct ResultReporter {
    output_root: PathBuf,
    result_file: String,
    scanner_name: String,
}

impl ResultReporter {
    pub fn new(
        output_root: impl Into<PathBuf>,
        result_file: impl Into<String>,
        scanner_name: impl Into<String>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            result_file: result_file.into(),
            scanner_name: scanner_name.into(),
        }
    }

    /// Write-once: an existing target directory is an error, never reused.
    pub fn persist(
        &self,
        target: &ScanTarget,
        scan_type: ScanType,
        outcome: &ScanOutcome,
    ) -> Result<PathBuf> {
        let report = ScanReport::from_outcome(target, scan_type, &self.scanner_name, outcome);
        let bytes = report.to_json_bytes()?;

        let persist_err = |path: &Path, source: io::Error| ScannerError::Persist {
            target: target.id.clone(),
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(&self.output_root).map_err(|e| persist_err(&self.output_root, e))?;
        let dir = target_output_dir(&self.output_root, &target.id);
        fs::create_dir(&dir).map_err(|e| persist_err(&dir, e))?;

        let path = result_file_path(&self.output_root, &target.id, &self.result_file);
        fs::write(&path, bytes).map_err(|e| persist_err(&path, e))?;
        tracing::info!(target_id = %target.id, path = %path.display(), "report written");
        Ok(path)
    }
}
