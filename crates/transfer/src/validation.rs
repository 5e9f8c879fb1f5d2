use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a session id or file name is usable as one path segment.
///
/// Rejects:
/// - Empty values
/// - Separators (`/` or `\`), so the value cannot span directories
/// - `.` and `..`
/// - Windows prefix components (`C:`)
pub fn validate_path_segment(what: &str, value: &str) -> Result<(), TransferError> {
    if value.is_empty() {
        return Err(TransferError::InvalidName(format!("empty {what}")));
    }

    if value.contains('/') || value.contains('\\') {
        return Err(TransferError::InvalidName(format!(
            "{what} must not contain path separators: {value}"
        )));
    }

    if value.contains(':') {
        return Err(TransferError::InvalidName(format!(
            "{what} must not contain a path prefix: {value}"
        )));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) | (Some(Component::CurDir), _) => Err(
            TransferError::InvalidName(format!("{what} must not be a relative reference: {value}")),
        ),
        _ => Err(TransferError::InvalidName(format!(
            "{what} is not a single path segment: {value}"
        ))),
    }
}
