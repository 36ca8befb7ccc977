use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

/// Host framework mounts one directory per target here.
pub static DEFAULT_INPUT_ROOT: Lazy<PathBuf> = Lazy::new(|| PathBuf::from("/scanin"));

/// Host framework collects `<target>/<result file>` from here.
pub static DEFAULT_OUTPUT_ROOT: Lazy<PathBuf> = Lazy::new(|| PathBuf::from("/scanout"));

pub const RESULT_FILE_NAME: &str = "analytics_scanner_results.json";

pub const SCANNER_NAME: &str = "scanner-analytics-integration";

/// <output_root>/<target>
pub fn target_output_dir(output_root: &Path, target_id: &str) -> PathBuf {
    output_root.join(target_id)
}

/// <output_root>/<target>/<result_file>
pub fn result_file_path(output_root: &Path, target_id: &str, result_file: &str) -> PathBuf {
    target_output_dir(output_root, target_id).join(result_file)
}
