use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Marker key the server adds once a repository has been registered before.
pub const LAST_SCAN_REPORT_KEY: &str = "last_scan_report";

/// First CLI positional. Anything unrecognised falls back to `Register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Register,
    Scan,
}

impl ScanType {
    pub fn from_arg(arg: &str) -> Self {
        match arg.trim().to_ascii_lowercase().as_str() {
            "scan" => ScanType::Scan,
            _ => ScanType::Register,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanType::Register => "register",
            ScanType::Scan => "scan",
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration fields, declared in the order they are checked and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetadataKey {
    #[serde(rename = "git-url")]
    GitUrl,
    #[serde(rename = "git-sha")]
    GitSha,
    #[serde(rename = "email-ids")]
    EmailIds,
}

impl MetadataKey {
    /// Image label / tool output key carrying this value.
    pub fn label(self) -> &'static str {
        match self {
            MetadataKey::GitUrl => "git-url",
            MetadataKey::GitSha => "git-sha",
            MetadataKey::EmailIds => "email-ids",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "git-url" => Some(MetadataKey::GitUrl),
            "git-sha" => Some(MetadataKey::GitSha),
            "email-ids" => Some(MetadataKey::EmailIds),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which keys a deployment insists on before registering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySet {
    /// `git-url`, `git-sha`
    #[default]
    Standard,
    /// `git-url`, `git-sha`, `email-ids`
    WithContact,
}

impl KeySet {
    pub fn keys(self) -> &'static [MetadataKey] {
        match self {
            KeySet::Standard => &[MetadataKey::GitUrl, MetadataKey::GitSha],
            KeySet::WithContact => &[
                MetadataKey::GitUrl,
                MetadataKey::GitSha,
                MetadataKey::EmailIds,
            ],
        }
    }

    /// The extraction tool only ever reports `git-url` and `git-sha`, so it
    /// always runs with the standard set.
    pub fn for_strategy(self, strategy: MetadataStrategy) -> KeySet {
        match strategy {
            MetadataStrategy::Labels => self,
            MetadataStrategy::ExtractionTool => KeySet::Standard,
        }
    }
}

/// How metadata is obtained for an image. Picked once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataStrategy {
    #[default]
    Labels,
    ExtractionTool,
}

/// What a non-2xx registration response means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Non-2xx is a server error and fails the target.
    #[default]
    Strict,
    /// Non-2xx is accepted; the payload records the status instead.
    Lenient,
}

/// One directory under the input root and the image it stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub id: String,
    /// `None` when the host did not pass `IMAGE_NAME`.
    pub image: Option<String>,
}

impl ScanTarget {
    pub fn new(id: impl Into<String>, image: Option<String>) -> Self {
        Self {
            id: id.into(),
            image,
        }
    }
}

/// Resolved registration values, kept in `MetadataKey` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetadataRecord {
    values: BTreeMap<MetadataKey, String>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the trimmed value.
    pub fn insert(&mut self, key: MetadataKey, value: &str) {
        self.values.insert(key, value.trim().to_string());
    }

    pub fn get(&self, key: MetadataKey) -> Option<&str> {
        self.values
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Required keys with no non-empty value, in the order given.
    pub fn missing(&self, required: &[MetadataKey]) -> Vec<MetadataKey> {
        required
            .iter()
            .copied()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// JSON object keyed by label name, e.g. `{"git-url": "...", "git-sha": "..."}`.
    pub fn to_json(&self) -> Map<String, Value> {
        self.iter()
            .map(|(k, v)| (k.label().to_string(), Value::String(v.to_string())))
            .collect()
    }
}

/// Final state of one target after the lifecycle ran.
///
/// Only `ScanLifecycle` builds these, and it stamps `finished_at` exactly
/// once. `success == errors.is_empty()` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub success: bool,
    pub errors: Vec<String>,
    pub metadata: MetadataRecord,
    /// `image_name`, `server_url`, `image_id` and the recorded metadata.
    pub scan_data: Map<String, Value>,
    /// Registration payload, present only after a successful POST.
    pub response: Option<Value>,
    pub started_at: String,
    pub finished_at: String,
}

impl ScanOutcome {
    /// Server has seen this repository before and attached its last report.
    pub fn has_previous_report(&self) -> bool {
        self.response
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(|o| o.contains_key(LAST_SCAN_REPORT_KEY))
    }

    pub fn summary(&self) -> String {
        if !self.success {
            return format!("Error: {}", self.errors.join("; "));
        }
        if self.has_previous_report() {
            "Last scan report available in 'Scan Results' field.".to_string()
        } else {
            "Registered repository for scan, report will be available in next run after some time."
                .to_string()
        }
    }

    /// What ends up under `"Scan Results"`.
    pub fn results(&self) -> Value {
        match &self.response {
            Some(resp) if self.success && self.has_previous_report() => resp.clone(),
            _ => Value::Object(self.scan_data.clone()),
        }
    }
}
