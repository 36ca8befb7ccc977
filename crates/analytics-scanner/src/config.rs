//! Run configuration. Everything is resolved once in `main` and handed down;
//! nothing below the orchestrator reads the process environment.

use crate::paths::{DEFAULT_INPUT_ROOT, DEFAULT_OUTPUT_ROOT, RESULT_FILE_NAME, SCANNER_NAME};
use crate::types::{KeySet, MetadataStrategy, StatusPolicy};
use std::path::PathBuf;

pub const ENV_SERVER: &str = "SERVER";
pub const ENV_IMAGE_NAME: &str = "IMAGE_NAME";

pub const DEFAULT_EXTRACT_TOOL: &str = "/usr/local/bin/extract-git-metadata";
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub result_file: String,
    pub scanner_name: String,
    pub strategy: MetadataStrategy,
    pub key_set: KeySet,
    pub extraction_tool: PathBuf,
    pub container_cli: String,
    pub status_policy: StatusPolicy,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            input_root: DEFAULT_INPUT_ROOT.clone(),
            output_root: DEFAULT_OUTPUT_ROOT.clone(),
            result_file: RESULT_FILE_NAME.to_string(),
            scanner_name: SCANNER_NAME.to_string(),
            strategy: MetadataStrategy::default(),
            key_set: KeySet::default(),
            extraction_tool: PathBuf::from(DEFAULT_EXTRACT_TOOL),
            container_cli: DEFAULT_CONTAINER_CLI.to_string(),
            status_policy: StatusPolicy::default(),
        }
    }
}

impl ScannerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Applies `SCANNER_*` overrides on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("SCANNER_INDIR") {
            cfg.input_root = PathBuf::from(v);
        }
        if let Some(v) = get("SCANNER_OUTDIR") {
            cfg.output_root = PathBuf::from(v);
        }
        if let Some(v) = get("SCANNER_METADATA_SOURCE") {
            cfg.strategy = match v.to_ascii_lowercase().as_str() {
                "tool" | "extract" | "script" => MetadataStrategy::ExtractionTool,
                _ => MetadataStrategy::Labels,
            };
        }
        if get("SCANNER_REQUIRE_CONTACT").is_some_and(|v| truthy(&v)) {
            cfg.key_set = KeySet::WithContact;
        }
        if let Some(v) = get("SCANNER_EXTRACT_TOOL") {
            cfg.extraction_tool = PathBuf::from(v);
        }
        if let Some(v) = get("SCANNER_CONTAINER_CLI") {
            cfg.container_cli = v;
        }
        if let Some(v) = get("SCANNER_STATUS_POLICY") {
            cfg.status_policy = if v.eq_ignore_ascii_case("lenient") {
                StatusPolicy::Lenient
            } else {
                StatusPolicy::Strict
            };
        }

        let effective = cfg.key_set.for_strategy(cfg.strategy);
        if effective != cfg.key_set {
            tracing::warn!(
                "SCANNER_REQUIRE_CONTACT ignored: the extraction tool only reports git-url and git-sha"
            );
            cfg.key_set = effective;
        }
        cfg
    }
}

fn truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

/// Per-invocation inputs the host passes through the environment.
/// Empty values count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanEnv {
    pub server: Option<String>,
    pub image_name: Option<String>,
}

impl ScanEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            server: get(ENV_SERVER),
            image_name: get(ENV_IMAGE_NAME),
        }
    }

    pub fn new(server: impl Into<String>, image_name: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            image_name: Some(image_name.into()),
        }
    }
}
