use super::{ExtractionError, ExtractionFailure, Resolution};
use crate::types::{MetadataKey, MetadataRecord};
use std::io;
use std::path::PathBuf;
use std::process::Command;

/// Captured result of one extraction tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the external extraction tool once for an image.
pub trait ExtractionRunner {
    fn program(&self) -> String;
    fn run(&self, image: &str) -> io::Result<ToolOutput>;
}

/// Spawns `<tool> <image>` and waits for it.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    tool: PathBuf,
}

impl ScriptRunner {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }
}

impl ExtractionRunner for ScriptRunner {
    fn program(&self) -> String {
        self.tool.display().to_string()
    }

    fn run(&self, image: &str) -> io::Result<ToolOutput> {
        tracing::debug!(tool = %self.tool.display(), image, "running extraction tool");
        let out = Command::new(&self.tool).arg(image).output()?;
        Ok(ToolOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Exactly one spawn, no retries. Every failure is a single aggregate cause.
pub fn resolve_from_tool(runner: &dyn ExtractionRunner, image: &str) -> Resolution {
    let tool = runner.program();
    let out = runner.run(image).map_err(|e| {
        ExtractionFailure::single(ExtractionError::ToolSpawn {
            tool: tool.clone(),
            reason: e.to_string(),
        })
    })?;

    if !out.success() {
        let stderr = out.stderr.trim();
        return Err(ExtractionFailure::single(ExtractionError::ToolExit {
            tool,
            image: image.to_string(),
            code: out.code.unwrap_or(-1),
            stderr: if stderr.is_empty() {
                "no stderr".to_string()
            } else {
                stderr.to_string()
            },
        }));
    }

    parse_tool_output(&out.stdout).map_err(|reason| {
        ExtractionFailure::single(ExtractionError::UnparsableOutput { tool, reason })
    })
}

/// Reads the last two non-empty lines as `key=value`. Both `git-url` and
/// `git-sha` must come out of them; their order does not matter.
pub fn parse_tool_output(stdout: &str) -> Result<MetadataRecord, String> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(format!(
            "expected two key=value lines, got {}",
            lines.len()
        ));
    }

    let mut record = MetadataRecord::new();
    for line in &lines[lines.len() - 2..] {
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {line:?} is not key=value"))?;
        let key = MetadataKey::from_label(key)
            .ok_or_else(|| format!("unknown key {:?}", key.trim()))?;
        record.insert(key, value);
    }

    let missing = record.missing(&[MetadataKey::GitUrl, MetadataKey::GitSha]);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|k| k.label()).collect();
        return Err(format!("no value for {}", names.join(", ")));
    }
    Ok(record)
}
