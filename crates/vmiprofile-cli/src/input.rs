//! Loading intensity images from disk.

use std::path::Path;

use ndarray::Array2;

use crate::{CliError, CliResult};

/// Extensions read as plain-text matrices instead of through `image`.
const TEXT_EXTENSIONS: [&str; 4] = ["txt", "dat", "csv", "asc"];

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixParseError {
    /// No numeric rows in the input.
    Empty,
    /// A token is not a number.
    BadNumber { line: usize, token: String },
    /// A row has a different number of columns than the first one.
    RaggedRow {
        line: usize,
        expected: usize,
        got: usize,
    },
}

impl std::fmt::Display for MatrixParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "matrix has no rows"),
            Self::BadNumber { line, token } => {
                write!(f, "line {}: cannot parse {:?} as a number", line, token)
            }
            Self::RaggedRow {
                line,
                expected,
                got,
            } => write!(f, "line {}: expected {} columns, got {}", line, expected, got),
        }
    }
}

impl std::error::Error for MatrixParseError {}

/// Read an image as an intensity array.
///
/// Text matrices are parsed with [`parse_text_matrix`]; anything else is
/// decoded with `image::open`.
pub fn load_intensity(path: &Path) -> CliResult<Array2<f64>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        let text = std::fs::read_to_string(path).map_err(|e| -> CliError {
            format!("Failed to read {}: {}", path.display(), e).into()
        })?;
        let arr = parse_text_matrix(&text).map_err(|e| -> CliError {
            format!("Failed to parse {}: {}", path.display(), e).into()
        })?;
        return Ok(arr);
    }

    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    Ok(vmiprofile::raster::dynamic_to_array(&img))
}

/// Parse a whitespace- or comma-separated numeric matrix, one image row per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_text_matrix(text: &str) -> Result<Array2<f64>, MatrixParseError> {
    let mut data = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0usize;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let before = data.len();
        for token in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let v: f64 = token.parse().map_err(|_| MatrixParseError::BadNumber {
                line: line_no,
                token: token.to_string(),
            })?;
            data.push(v);
        }
        let n = data.len() - before;
        match cols {
            None => cols = Some(n),
            Some(expected) if expected != n => {
                return Err(MatrixParseError::RaggedRow {
                    line: line_no,
                    expected,
                    got: n,
                })
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or(MatrixParseError::Empty)?;
    Array2::from_shape_vec((rows, cols), data).map_err(|_| MatrixParseError::Empty)
}
