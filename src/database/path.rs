use crate::database::error::{invalid_argument, DatabaseResult};

const MAX_KEY_BYTES: usize = 768;
const INVALID_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// Splits a slash-separated database path into validated segments.
///
/// Leading and trailing slashes are ignored, so `""`, `"/"` and `"//"` all
/// name the root.
pub fn normalize_path(path: &str) -> DatabaseResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid_argument(format!(
                "Database path '{path}' contains an empty segment"
            )));
        }
        validate_key(segment)?;
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// Validates a single child key.
pub fn validate_key(key: &str) -> DatabaseResult<()> {
    if key.is_empty() {
        return Err(invalid_argument("Database keys cannot be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(invalid_argument(format!(
            "Database key exceeds {MAX_KEY_BYTES} bytes"
        )));
    }
    if let Some(ch) = key
        .chars()
        .find(|ch| INVALID_KEY_CHARS.contains(ch) || ch.is_ascii_control() || *ch == '/')
    {
        return Err(invalid_argument(format!(
            "Database key '{key}' contains the invalid character {ch:?}"
        )));
    }
    Ok(())
}

/// Joins segments back into the canonical (unslashed) form used in listener keys.
pub fn join_path(segments: &[String]) -> String {
    segments.join("/")
}

pub fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    if prefix.len() > path.len() {
        return false;
    }
    prefix
        .iter()
        .zip(path.iter())
        .all(|(left, right)| left == right)
}

pub fn paths_related(a: &[String], b: &[String]) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}
