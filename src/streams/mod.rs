//! Stream authorization: which schema (by title) a destination stream is
//! allowed to carry, loaded from a hot-reloadable configuration document.

use regex::Regex;
use serde_yaml::Value as YamlValue;
use std::sync::RwLock;

use crate::events::EventGateError;

/// A stream-config key: either a literal stream name, or a `/regex/`-style
/// pattern. Keys are tried in document order, first match wins.
#[derive(Debug)]
enum StreamKey {
    Literal(String),
    Pattern(Regex),
}

impl StreamKey {
    fn parse(raw: &str) -> Result<Self, EventGateError> {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            let pattern = &raw[1..raw.len() - 1];
            Regex::new(pattern)
                .map(StreamKey::Pattern)
                .map_err(|e| EventGateError::InternalError(format!(
                    "invalid stream config regex {pattern:?}: {e}"
                )))
        } else {
            Ok(StreamKey::Literal(raw.to_string()))
        }
    }

    fn matches(&self, stream: &str) -> bool {
        match self {
            StreamKey::Literal(s) => s == stream,
            StreamKey::Pattern(re) => re.is_match(stream),
        }
    }
}

#[derive(Debug)]
pub struct StreamConfigEntry {
    pub schema_title: Option<String>,
}

/// An ordered, parsed stream-configuration document.
#[derive(Debug)]
pub struct StreamConfig {
    entries: Vec<(StreamKey, StreamConfigEntry)>,
}

impl StreamConfig {
    /// Parses a YAML or JSON stream-config document (JSON is valid YAML).
    /// `title_field` is the key within each stream's entry that names the
    /// schema title the stream may carry.
    pub fn parse(text: &str, title_field: &str) -> Result<Self, EventGateError> {
        let doc: YamlValue = serde_yaml::from_str(text).map_err(|e| {
            EventGateError::SchemaLoadFailure {
                schema_ref: "stream config".to_string(),
                message: format!("invalid YAML/JSON: {e}"),
            }
        })?;

        let mapping = doc.as_mapping().ok_or_else(|| EventGateError::SchemaLoadFailure {
            schema_ref: "stream config".to_string(),
            message: "stream config document must be a map".to_string(),
        })?;

        let mut entries = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key_str = key.as_str().ok_or_else(|| EventGateError::SchemaLoadFailure {
                schema_ref: "stream config".to_string(),
                message: "stream config keys must be strings".to_string(),
            })?;
            let schema_title = value
                .as_mapping()
                .and_then(|m| m.get(&YamlValue::String(title_field.to_string())))
                .and_then(|v| v.as_str())
                .map(str::to_string);
            entries.push((StreamKey::parse(key_str)?, StreamConfigEntry { schema_title }));
        }

        Ok(Self { entries })
    }

    fn find(&self, stream: &str) -> Option<&StreamConfigEntry> {
        self.entries
            .iter()
            .find(|(key, _)| key.matches(stream))
            .map(|(_, entry)| entry)
    }
}

/// Authorizes a (schema title, destination stream) pair against the
/// currently-loaded [`StreamConfig`], replaced wholesale on reload.
pub struct StreamAuthorizer {
    config_uri: Option<String>,
    title_field: String,
    current: RwLock<Option<StreamConfig>>,
}

impl StreamAuthorizer {
    pub fn new(config_uri: Option<String>, title_field: String) -> Self {
        Self {
            config_uri,
            title_field,
            current: RwLock::new(None),
        }
    }

    /// (Re)loads the stream config from `config_uri`. A no-op, clearing any
    /// previously loaded config, when no `config_uri` is set — in that case
    /// every stream is implicitly authorized.
    pub async fn reload(&self) -> Result<(), EventGateError> {
        let Some(uri) = &self.config_uri else {
            *self.current.write().unwrap() = None;
            return Ok(());
        };
        let text = fetch_raw_text(uri).await?;
        let parsed = StreamConfig::parse(&text, &self.title_field)?;
        *self.current.write().unwrap() = Some(parsed);
        Ok(())
    }

    /// Checks whether `stream` is allowed to carry an event whose schema has
    /// title `schema_title`. Authorization is implicitly granted when no
    /// stream config is loaded at all.
    pub fn ensure_allowed(&self, schema_title: Option<&str>, stream: &str) -> Result<(), EventGateError> {
        let guard = self.current.read().unwrap();
        let Some(config) = guard.as_ref() else {
            return Ok(());
        };

        let entry = config
            .find(stream)
            .ok_or_else(|| EventGateError::UnauthorizedStream {
                stream: stream.to_string(),
            })?;

        match (schema_title, entry.schema_title.as_deref()) {
            (Some(title), Some(expected)) if title == expected => Ok(()),
            _ => Err(EventGateError::UnauthorizedStream {
                stream: stream.to_string(),
            }),
        }
    }
}

async fn fetch_raw_text(url: &str) -> Result<String, EventGateError> {
    if let Some(path) = url.strip_prefix("file://") {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EventGateError::SchemaLoadFailure {
                schema_ref: url.to_string(),
                message: format!("read error: {e}"),
            })
    } else {
        reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EventGateError::SchemaLoadFailure {
                schema_ref: url.to_string(),
                message: format!("request error: {e}"),
            })?
            .text()
            .await
            .map_err(|e| EventGateError::SchemaLoadFailure {
                schema_ref: url.to_string(),
                message: format!("body read error: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_key_matches_exactly() {
        let config = StreamConfig::parse(
            "my.stream:\n  schema_title: widget.create\n",
            "schema_title",
        )
        .unwrap();
        assert!(config.find("my.stream").is_some());
        assert!(config.find("other.stream").is_none());
    }

    #[test]
    fn regex_key_matches_pattern() {
        let config = StreamConfig::parse(
            "/^events\\..*$/:\n  schema_title: widget.create\n",
            "schema_title",
        )
        .unwrap();
        assert!(config.find("events.widgets").is_some());
        assert!(config.find("other").is_none());
    }

    #[test]
    fn first_matching_key_wins() {
        let config = StreamConfig::parse(
            "/^events\\..*$/:\n  schema_title: generic\nevents.widgets:\n  schema_title: specific\n",
            "schema_title",
        )
        .unwrap();
        let entry = config.find("events.widgets").unwrap();
        assert_eq!(entry.schema_title.as_deref(), Some("generic"));
    }

    #[tokio::test]
    async fn no_config_uri_authorizes_everything() {
        let authorizer = StreamAuthorizer::new(None, "schema_title".to_string());
        authorizer.reload().await.unwrap();
        assert!(authorizer.ensure_allowed(Some("anything"), "anything").is_ok());
    }

    #[tokio::test]
    async fn rejects_mismatched_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams.yaml");
        tokio::fs::write(&path, "my.stream:\n  schema_title: widget.create\n")
            .await
            .unwrap();

        let authorizer = StreamAuthorizer::new(
            Some(format!("file://{}", path.display())),
            "schema_title".to_string(),
        );
        authorizer.reload().await.unwrap();

        assert!(authorizer.ensure_allowed(Some("widget.create"), "my.stream").is_ok());
        assert!(authorizer.ensure_allowed(Some("wrong.title"), "my.stream").is_err());
        assert!(authorizer.ensure_allowed(Some("widget.create"), "unknown.stream").is_err());
    }
}
