//! Turns a schema reference string (as carried on an event, or as a nested
//! `$ref`) into the ordered list of candidate URLs the fetcher should try.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

use crate::events::EventGateError;

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9+.\-]+://").unwrap());

/// True if `s` already carries an explicit URI scheme (`http://`, `file://`,
/// ...).
pub fn has_scheme(s: &str) -> bool {
    SCHEME_RE.is_match(s)
}

/// True if the last path segment has a file extension (a `.` not at the
/// start of the segment, followed by a non-numeric suffix — so a version
/// component like `1.0.0` doesn't count as an extension).
pub fn has_extension(s: &str) -> bool {
    let last_segment = s.rsplit('/').next().unwrap_or(s);
    match last_segment.rfind('.') {
        Some(0) => false,
        Some(idx) => {
            let ext = &last_segment[idx + 1..];
            !ext.is_empty() && ext.parse::<u64>().is_err()
        }
        None => false,
    }
}

/// Resolves a schema reference to the ordered list of URLs to try fetching,
/// per the schema-reference resolution rules: append the configured default
/// extension if missing, then either treat the reference as absolute, join
/// it against each configured base URI in order, or — with no base URIs
/// configured — treat it as a local filesystem path.
pub fn resolve_uri(
    schema_ref: &str,
    base_uris: &[String],
    default_extension: Option<&str>,
    allow_absolute: bool,
) -> Result<Vec<String>, EventGateError> {
    let originally_absolute = has_scheme(schema_ref);
    if originally_absolute && !allow_absolute {
        return Err(EventGateError::SchemaLoadFailure {
            schema_ref: schema_ref.to_string(),
            message: "absolute schema URIs are not permitted by this server's configuration"
                .to_string(),
        });
    }

    let mut with_extension = schema_ref.to_string();
    if !has_extension(&with_extension) {
        if let Some(ext) = default_extension {
            if !ext.is_empty() {
                if ext.starts_with('.') {
                    with_extension.push_str(ext);
                } else {
                    with_extension.push('.');
                    with_extension.push_str(ext);
                }
            }
        }
    }

    if originally_absolute {
        return Ok(vec![with_extension]);
    }

    if base_uris.is_empty() {
        let path = PathBuf::from(&with_extension);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(|e| EventGateError::SchemaLoadFailure {
                    schema_ref: schema_ref.to_string(),
                    message: format!("cannot resolve local schema path: {e}"),
                })?
                .join(path)
        };
        return Ok(vec![format!("file://{}", absolute.display())]);
    }

    Ok(base_uris
        .iter()
        .map(|base| join_base(base, &with_extension))
        .collect())
}

fn join_base(base: &str, reference: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{reference}")
    } else {
        format!("{base}/{reference}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_scheme() {
        assert!(has_scheme("https://example.org/x"));
        assert!(has_scheme("file:///tmp/x"));
        assert!(!has_scheme("my/schema/1.0.0"));
    }

    #[test]
    fn version_like_segment_is_not_an_extension() {
        assert!(!has_extension("my/schema/1.0.0"));
        assert!(has_extension("my/schema/1.0.0.yaml"));
    }

    #[test]
    fn appends_default_extension_when_missing() {
        let urls = resolve_uri(
            "test/event",
            &["https://schemas.example.org".to_string()],
            Some("yaml"),
            false,
        )
        .unwrap();
        assert_eq!(urls, vec!["https://schemas.example.org/test/event.yaml"]);
    }

    #[test]
    fn does_not_double_append_extension() {
        let urls = resolve_uri(
            "test/event.json",
            &["https://schemas.example.org".to_string()],
            Some("yaml"),
            false,
        )
        .unwrap();
        assert_eq!(urls, vec!["https://schemas.example.org/test/event.json"]);
    }

    #[test]
    fn rejects_absolute_ref_when_disallowed() {
        let err = resolve_uri("https://evil.example.org/x", &[], None, false).unwrap_err();
        assert!(matches!(err, EventGateError::SchemaLoadFailure { .. }));
    }

    #[test]
    fn allows_absolute_ref_when_permitted() {
        let urls = resolve_uri("https://trusted.example.org/x.json", &[], None, true).unwrap();
        assert_eq!(urls, vec!["https://trusted.example.org/x.json"]);
    }

    #[test]
    fn falls_back_to_file_uri_with_no_base_uris() {
        let urls = resolve_uri("/abs/path/schema.json", &[], None, false).unwrap();
        assert_eq!(urls, vec!["file:///abs/path/schema.json"]);
    }

    #[test]
    fn tries_every_base_in_order() {
        let urls = resolve_uri(
            "test/event.json",
            &[
                "https://primary.example.org".to_string(),
                "https://fallback.example.org/schemas/".to_string(),
            ],
            None,
            false,
        )
        .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://primary.example.org/test/event.json",
                "https://fallback.example.org/schemas/test/event.json",
            ]
        );
    }
}
