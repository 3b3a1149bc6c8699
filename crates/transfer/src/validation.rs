use std::path::{Component, Path};

use crate::TransferError;

/// Validates a client-supplied filename before it is used under the
/// artifacts directory.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Anything with more than one path component (`a/b`, `..`, `C:`)
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty() {
        return Err(TransferError::InvalidFilename("empty filename".into()));
    }

    let path = Path::new(filename);

    if path.is_absolute() {
        return Err(TransferError::InvalidFilename(format!(
            "absolute path not allowed: {filename}"
        )));
    }

    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => {
            return Err(TransferError::InvalidFilename(format!(
                "not a plain filename: {filename}"
            )));
        }
    }
    if components.next().is_some() {
        return Err(TransferError::InvalidFilename(format!(
            "path separators not allowed: {filename}"
        )));
    }

    Ok(())
}
