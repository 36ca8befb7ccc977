use super::ExtractionError;
use anyhow::Context;
use std::collections::HashMap;
use std::process::Command;

/// Read-only view of a local image: its labels and its content ID.
pub trait ImageInspector {
    fn labels(&self, image: &str) -> Result<HashMap<String, String>, ExtractionError>;
    fn image_id(&self, image: &str) -> Result<String, ExtractionError>;
}

/// `docker inspect` (or any CLI with the same flags, e.g. `podman`).
#[derive(Debug, Clone)]
pub struct ContainerCli {
    program: String,
}

impl ContainerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn inspect(&self, image: &str, format: &str) -> Result<String, ExtractionError> {
        tracing::debug!(program = %self.program, image, format, "inspecting image");
        let out = Command::new(&self.program)
            .args(["inspect", "--type", "image", "--format", format, image])
            .output()
            .map_err(|e| ExtractionError::Inspect {
                image: image.to_string(),
                reason: format!("failed to spawn {}: {e}", self.program),
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ExtractionError::Inspect {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl ImageInspector for ContainerCli {
    fn labels(&self, image: &str) -> Result<HashMap<String, String>, ExtractionError> {
        let raw = self.inspect(image, "{{json .Config.Labels}}")?;
        parse_labels(&raw).map_err(|e| ExtractionError::Inspect {
            image: image.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn image_id(&self, image: &str) -> Result<String, ExtractionError> {
        let raw = self.inspect(image, "{{.Id}}")?;
        let id = strip_digest_prefix(raw.trim());
        if id.is_empty() {
            return Err(ExtractionError::Inspect {
                image: image.to_string(),
                reason: "empty image ID".into(),
            });
        }
        Ok(id.to_string())
    }
}

/// Parses `{{json .Config.Labels}}` output. `null` and empty mean no labels.
pub fn parse_labels(output: &str) -> anyhow::Result<HashMap<String, String>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(HashMap::new());
    }
    let labels: HashMap<String, String> =
        serde_json::from_str(trimmed).context("invalid labels JSON from image inspect")?;
    Ok(labels)
}

/// "sha256:abcd" -> "abcd"
fn strip_digest_prefix(id: &str) -> &str {
    id.rsplit(':').next().unwrap_or(id)
}
