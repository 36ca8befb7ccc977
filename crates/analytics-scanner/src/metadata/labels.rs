use super::{ExtractionError, ExtractionFailure, ImageInspector, Resolution};
use crate::types::{MetadataKey, MetadataRecord};

/// Looks up every required key as an image label. Blank values count as
/// missing. Misses are collected in `required` order; nothing short-circuits.
pub fn resolve_from_labels(
    inspector: &dyn ImageInspector,
    image: &str,
    required: &[MetadataKey],
) -> Resolution {
    let labels = inspector.labels(image).map_err(ExtractionFailure::single)?;

    let mut record = MetadataRecord::new();
    let mut causes = Vec::new();

    for key in required {
        match labels.get(key.label()).map(|v| v.trim()) {
            Some(v) if !v.is_empty() => record.insert(*key, v),
            _ => {
                tracing::warn!(image, label = key.label(), "required label missing");
                causes.push(ExtractionError::MissingLabel {
                    image: image.to_string(),
                    label: *key,
                });
            }
        }
    }

    if causes.is_empty() {
        Ok(record)
    } else {
        Err(ExtractionFailure {
            causes,
            partial: record,
        })
    }
}
