//! YAML front matter parsing and rendering.
//!
//! Mirror files carry their structured metadata as YAML front matter above
//! a free-text markdown body:
//!
//! ```text
//! ---
//! id: 9f8b7c6d-...
//! kind: skill
//! title: Access Management
//! ---
//! The distilled knowledge document body.
//! ```

use crate::{Error, Result};

/// The front matter delimiter.
const DELIMITER: &str = "---";

/// Splits a mirror file into parsed metadata and body.
///
/// Content without a leading delimiter is treated as all-body with empty
/// metadata. The single trailing newline that [`render`] appends is
/// stripped from the body, so render and parse round-trip.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the YAML is malformed or the closing
/// delimiter is missing.
///
/// # Examples
///
/// ```rust
/// use vaultsync::storage::frontmatter;
///
/// let content = "---\nkind: skill\n---\nBody text";
/// let (metadata, body) = frontmatter::parse(content).unwrap();
/// assert_eq!(metadata["kind"], "skill");
/// assert_eq!(body, "Body text");
/// ```
pub fn parse(content: &str) -> Result<(serde_json::Value, String)> {
    let content = content.trim_start();

    if !content.starts_with(DELIMITER) {
        return Ok((
            serde_json::Value::Object(serde_json::Map::new()),
            strip_trailing_newline(content).to_string(),
        ));
    }

    let after_open = content[DELIMITER.len()..].trim_start_matches(['\r', '\n']);

    let Some(end_pos) = after_open.find(DELIMITER) else {
        return Err(Error::InvalidInput(
            "front matter missing closing delimiter".to_string(),
        ));
    };

    let yaml = after_open[..end_pos].trim();
    let body = after_open[end_pos + DELIMITER.len()..].trim_start_matches(['\r', '\n']);

    let metadata: serde_json::Value = serde_yaml::from_str(yaml)
        .map_err(|e| Error::InvalidInput(format!("invalid YAML front matter: {e}")))?;

    Ok((metadata, strip_trailing_newline(body).to_string()))
}

/// Removes the one trailing newline that `render` appends; interior
/// newlines are left alone.
fn strip_trailing_newline(body: &str) -> &str {
    let body = body.strip_suffix('\n').unwrap_or(body);
    body.strip_suffix('\r').unwrap_or(body)
}

/// Renders metadata and body into mirror file content.
///
/// Empty metadata renders as the bare body. A trailing newline is always
/// present so committed files diff cleanly.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if YAML serialization fails.
pub fn render(metadata: &serde_json::Value, body: &str) -> Result<String> {
    let body = body.trim_end();

    if metadata.is_null()
        || (metadata.is_object() && metadata.as_object().is_some_and(serde_json::Map::is_empty))
    {
        return Ok(format!("{body}\n"));
    }

    let yaml = serde_yaml::to_string(metadata).map_err(|e| Error::OperationFailed {
        operation: "serialize_front_matter".to_string(),
        cause: e.to_string(),
    })?;

    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}\n"))
}
