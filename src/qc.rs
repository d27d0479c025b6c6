use std::path::Path;

use crate::error::{PolylocError, Result};

pub fn check_equal_length(
    left_len: usize,
    right_len: usize,
    left_name: &str,
    right_name: &str,
) -> Result<()> {
    if left_len != right_len {
        return Err(PolylocError::ShapeMismatch(format!(
            "number of {left_name} ({left_len}) does not match number of {right_name} ({right_len})"
        )));
    }
    Ok(())
}

pub fn check_positive(value: f64, name: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PolylocError::Configuration(format!(
            "{name} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

pub fn check_file_exists(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        return Err(PolylocError::MissingFile(format!(
            "{} (required by {name}) not found",
            path.display()
        )));
    }
    Ok(())
}

pub fn check_dir_exists(path: &Path, name: &str) -> Result<()> {
    if !path.is_dir() {
        return Err(PolylocError::MissingFile(format!(
            "{name} directory {} doesn't exist",
            path.display()
        )));
    }
    Ok(())
}
