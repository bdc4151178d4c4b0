use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Load a labels file: one label per line, line N naming output index N.
///
/// Blank lines keep their index (they name an unlabeled class) except at the end
/// of the file.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels file {}", path.display()))?;
    let mut labels: Vec<String> = raw.lines().map(|line| line.trim().to_string()).collect();
    while labels.last().is_some_and(|l| l.is_empty()) {
        labels.pop();
    }
    if labels.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(labels)
}

/// Label for output index `idx`, falling back to `class_<idx>`.
pub fn label_for(labels: &[String], idx: usize) -> String {
    match labels.get(idx) {
        Some(label) if !label.is_empty() => label.clone(),
        _ => format!("class_{}", idx),
    }
}
