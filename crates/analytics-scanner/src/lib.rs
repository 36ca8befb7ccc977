//! analytics-scanner
//!
//! Container image scan plugin for the analytics server.
//! - Lists scan targets mounted under the input root.
//! - Reads `git-url` / `git-sha` (optionally `email-ids`) from image labels
//!   or from an external extraction tool.
//! - Registers them via `POST /api/v1/register`; failures go to
//!   `POST /api/v1/scanner-error` on a best-effort basis.
//! - Writes one JSON report per target under the output root.
//!
//! Everything is blocking and strictly sequential.

pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod metadata;
pub mod net;
pub mod orchestrator;
pub mod paths;
pub mod report;
pub mod types;

pub use config::{ScanEnv, ScannerConfig};
pub use errors::{Result, ScannerError};
pub use lifecycle::ScanLifecycle;
pub use metadata::{
    ContainerCli, ExtractionError, ExtractionFailure, ImageInspector, MetadataProvider,
    ScriptRunner,
};
pub use net::{AnalyticsApi, AnalyticsClient, ErrorReport, RegistrationError};
pub use orchestrator::{list_targets, Orchestrator, RunSummary};
pub use paths::*;
pub use report::{ResultReporter, ScanReport};
pub use types::*;
