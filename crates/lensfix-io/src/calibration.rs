use std::path::Path;

use crate::error::IoError;

const DELIMITER: &str = ", ";

fn format_row(row: &[f64]) -> String {
    row.iter()
        .map(|v| format!("{v:.18e}"))
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

fn invalid(path: &Path, reason: impl Into<String>) -> IoError {
    IoError::InvalidCalibrationFile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse the numeric rows of a calibration file.
///
/// Values are separated by commas and/or whitespace; blank lines and lines starting
/// with `#` are skipped.
fn read_rows(path: &Path) -> Result<Vec<Vec<f64>>, IoError> {
    if !path.exists() {
        return Err(IoError::FileDoesNotExist(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;

    let mut rows = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(|token| {
                token.parse::<f64>().map_err(|e| {
                    invalid(path, format!("line {}: '{token}': {e}", line_no + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes a 3x3 camera matrix, one row per line with values separated by `", "`.
pub fn write_camera_matrix(
    file_path: impl AsRef<Path>,
    camera_matrix: &[[f64; 3]; 3],
) -> Result<(), IoError> {
    let content = camera_matrix
        .iter()
        .map(|row| format_row(row))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(file_path, content + "\n")?;
    Ok(())
}

/// Reads a 3x3 camera matrix written by [`write_camera_matrix`].
///
/// # Errors
///
/// Returns [`IoError::InvalidCalibrationFile`] unless the file holds exactly three
/// rows of three finite values.
pub fn read_camera_matrix(file_path: impl AsRef<Path>) -> Result<[[f64; 3]; 3], IoError> {
    let path = file_path.as_ref();
    let rows = read_rows(path)?;
    if rows.len() != 3 {
        return Err(invalid(path, format!("expected 3 rows, found {}", rows.len())));
    }

    let mut camera_matrix = [[0.0; 3]; 3];
    for (i, row) in rows.iter().enumerate() {
        if row.len() != 3 {
            return Err(invalid(
                path,
                format!("row {}: expected 3 values, found {}", i + 1, row.len()),
            ));
        }
        camera_matrix[i].copy_from_slice(row);
    }
    if camera_matrix.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid(path, "non-finite value"));
    }
    Ok(camera_matrix)
}

/// Writes the five distortion coefficients `k1, k2, p1, p2, k3` on a single line.
pub fn write_distortion_coefficients(
    file_path: impl AsRef<Path>,
    coefficients: &[f64; 5],
) -> Result<(), IoError> {
    std::fs::write(file_path, format_row(coefficients) + "\n")?;
    Ok(())
}

/// Reads the distortion coefficients written by [`write_distortion_coefficients`].
///
/// The values may span several lines; exactly five are expected.
pub fn read_distortion_coefficients(file_path: impl AsRef<Path>) -> Result<[f64; 5], IoError> {
    let path = file_path.as_ref();
    let values = read_rows(path)?.into_iter().flatten().collect::<Vec<_>>();
    let coefficients: [f64; 5] = values
        .as_slice()
        .try_into()
        .map_err(|_| invalid(path, format!("expected 5 values, found {}", values.len())))?;
    if coefficients.iter().any(|v| !v.is_finite()) {
        return Err(invalid(path, "non-finite value"));
    }
    Ok(coefficients)
}
