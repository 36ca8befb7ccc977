//! Metadata provider: turns an image reference into a `MetadataRecord`.
//!
//! Two interchangeable sources, picked once per run:
//! - `Labels`: read `git-url` / `git-sha` / `email-ids` straight off the image.
//!   Every required label is checked; all misses are reported together.
//! - `ExtractionTool`: run an external script with the image as its only
//!   argument and parse the last two `key=value` lines it prints. Any
//!   problem fails the whole resolution.

pub mod inspect;
pub mod labels;
pub mod tool;

use crate::config::ScannerConfig;
use crate::types::{KeySet, MetadataKey, MetadataRecord, MetadataStrategy};
use std::fmt;
use thiserror::Error;

pub use inspect::{parse_labels, ContainerCli, ImageInspector};
pub use tool::{parse_tool_output, ExtractionRunner, ScriptRunner, ToolOutput};

/// A single reason metadata could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Image {image} does not have {label} label configured.")]
    MissingLabel { image: String, label: MetadataKey },

    #[error("could not inspect image {image}: {reason}")]
    Inspect { image: String, reason: String },

    #[error("could not run extraction tool {tool}: {reason}")]
    ToolSpawn { tool: String, reason: String },

    #[error("extraction tool {tool} exited with code {code} for image {image}: {stderr}")]
    ToolExit {
        tool: String,
        image: String,
        code: i32,
        stderr: String,
    },

    #[error("unparsable output from extraction tool {tool}: {reason}")]
    UnparsableOutput { tool: String, reason: String },
}

/// All causes collected while resolving one image, in discovery order,
/// plus whatever values were found before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub causes: Vec<ExtractionError>,
    pub partial: MetadataRecord,
}

impl ExtractionFailure {
    pub fn single(cause: ExtractionError) -> Self {
        Self {
            causes: vec![cause],
            partial: MetadataRecord::new(),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.causes.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ExtractionFailure {}

pub type Resolution = std::result::Result<MetadataRecord, ExtractionFailure>;

/// Stateless across calls; shared by every target in a run.
pub struct MetadataProvider {
    strategy: MetadataStrategy,
    required: &'static [MetadataKey],
    inspector: Box<dyn ImageInspector>,
    runner: Box<dyn ExtractionRunner>,
}

impl MetadataProvider {
    /// `key_set` is narrowed to what `strategy` can deliver.
    pub fn new(
        strategy: MetadataStrategy,
        key_set: KeySet,
        inspector: Box<dyn ImageInspector>,
        runner: Box<dyn ExtractionRunner>,
    ) -> Self {
        Self {
            strategy,
            required: key_set.for_strategy(strategy).keys(),
            inspector,
            runner,
        }
    }

    /// Real collaborators: container CLI for labels/IDs, script for extraction.
    pub fn from_config(cfg: &ScannerConfig) -> Self {
        Self::new(
            cfg.strategy,
            cfg.key_set,
            Box::new(ContainerCli::new(cfg.container_cli.clone())),
            Box::new(ScriptRunner::new(cfg.extraction_tool.clone())),
        )
    }

    pub fn required_keys(&self) -> &'static [MetadataKey] {
        self.required
    }

    pub fn resolve(&self, image: &str) -> Resolution {
        match self.strategy {
            MetadataStrategy::Labels => {
                labels::resolve_from_labels(self.inspector.as_ref(), image, self.required)
            }
            MetadataStrategy::ExtractionTool => tool::resolve_from_tool(self.runner.as_ref(), image),
        }
    }

    /// Content-addressed image ID, `sha256:` prefix stripped.
    pub fn image_id(&self, image: &str) -> std::result::Result<String, ExtractionError> {
        self.inspector.image_id(image)
    }
}
