// THEORY:
// The results log records one row per classified picture, in the order the pictures
// were classified:
//
//     [sequence_num, reference_index, true_label, guessed_index, guessed_label, is_correct]
//
// The file is a JSON array written one row per line, indented by four spaces, so it
// stays diffable and greppable while remaining plain JSON for any reader.

use crate::core_modules::image::Label;
use crate::error::ExperimentError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `(sequence_num, reference_index, true_label, guessed_index, guessed_label, is_correct)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow(
    pub usize,
    pub Option<usize>,
    pub Option<Label>,
    pub Option<usize>,
    pub Option<Label>,
    pub bool,
);

impl ResultRow {
    pub fn is_correct(&self) -> bool {
        self.5
    }
}

/// Renders rows in the log layout.
pub fn render(rows: &[ResultRow]) -> Result<String, serde_json::Error> {
    if rows.is_empty() {
        return Ok("[]".to_string());
    }
    let lines = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("[\n    {}\n]", lines.join(",\n    ")))
}

/// Writes the log to `path`, creating parent directories as needed.
pub fn write_results(path: &Path, rows: &[ResultRow]) -> Result<(), ExperimentError> {
    let text = render(rows)?;
    let io_error = |source| ExperimentError::Results {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    std::fs::write(path, text).map_err(io_error)
}

pub fn read_results(path: &Path) -> Result<Vec<ResultRow>, ExperimentError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExperimentError::Results {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}
