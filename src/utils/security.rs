use std::path::{Component, Path};

/// Used when a client sends no usable file name.
pub const FALLBACK_UPLOAD_NAME: &str = "Upload";

//===============
// Path Handling
//===============
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path contains parent directory (..)")]
    ContainsParentDir,
    #[error("Path is absolute")]
    AbsolutePath,
    #[error("Path contains invalid component")]
    InvalidComponent,
    #[error("Path contains null byte")]
    NullByte,
    #[error("Path is empty")]
    Empty,
    #[error("Name must be a single path component")]
    NotSingleComponent,
}

// Rejects: empty strings, null bytes, parent directory traversal, absolute paths
fn validate_path_components(path_str: &str) -> Result<(), PathValidationError> {
    if path_str.is_empty() {
        return Err(PathValidationError::Empty);
    }

    // rust uses C-style APIs so \0 can end str early
    if path_str.contains('\0') {
        return Err(PathValidationError::NullByte);
    }

    for component in Path::new(path_str).components() {
        match component {
            Component::Normal(_) => continue,
            Component::ParentDir => return Err(PathValidationError::ContainsParentDir),
            Component::RootDir => return Err(PathValidationError::AbsolutePath),
            Component::CurDir => continue,
            Component::Prefix(_) => return Err(PathValidationError::InvalidComponent), // Windows
        }
    }

    Ok(())
}

/// Uploaded files land directly in the upload directory, so the name must be
/// exactly one normal component.
pub fn validate_filename(filename: &str) -> Result<(), PathValidationError> {
    validate_path_components(filename)?;

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PathValidationError::NotSingleComponent),
    }
}

/// Turn a client-supplied file name into one safe to create in the upload directory.
///
/// Browsers sometimes send a full path (`C:\fakepath\x.txt`), so only the part
/// after the last separator is kept. Control characters are dropped.
pub fn upload_file_name(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return FALLBACK_UPLOAD_NAME.to_string();
    };

    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    match validate_filename(cleaned) {
        Ok(()) => cleaned.to_string(),
        Err(err) => {
            tracing::debug!(name = raw, error = %err, "Replacing unusable upload name");
            FALLBACK_UPLOAD_NAME.to_string()
        }
    }
}
