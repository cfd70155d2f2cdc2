//! Tag name validation.

/// Maximum tag length in bytes.
pub const MAX_TAG_LEN: usize = 512;

/// Validate a tag name.
///
/// Tags are stored as backend object names, so they must not be able to
/// escape a backend's key space.
pub fn validate_tag(tag: &str) -> crate::Result<()> {
    if tag.is_empty() {
        return Err(crate::Error::InvalidTag("tag cannot be empty".to_string()));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(crate::Error::InvalidTag(format!(
            "tag exceeds {MAX_TAG_LEN} bytes: {} bytes",
            tag.len()
        )));
    }
    if tag.starts_with('/') {
        return Err(crate::Error::InvalidTag(format!(
            "tag cannot start with '/': {tag}"
        )));
    }
    if let Some(c) = tag.chars().find(|c| c.is_control()) {
        return Err(crate::Error::InvalidTag(format!(
            "tag contains control character {c:?}"
        )));
    }
    if tag.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(crate::Error::InvalidTag(format!(
            "tag contains relative path segment: {tag}"
        )));
    }
    Ok(())
}
