//! Root configuration: one struct per concern, composed via `#[serde(default)]`
//! so a config file only needs to mention what it overrides, loaded from a
//! TOML file with `${VAR_NAME}` environment-variable interpolation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8192,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Dotted-path candidates, tried in order, for an event's schema
    /// reference.
    pub uri_field: Vec<String>,
    pub base_uris: Vec<String>,
    pub file_extension: Option<String>,
    pub allow_absolute_uris: bool,
    pub precache_uris: Vec<String>,
    pub meta_schema_id_regex: Option<String>,
    /// Additional meta-schema documents to fetch and register at startup,
    /// beyond the bundled draft-04/06/07 set.
    pub extra_meta_schema_uris: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            uri_field: vec!["$schema".to_string()],
            base_uris: Vec::new(),
            file_extension: Some("yaml".to_string()),
            allow_absolute_uris: false,
            precache_uris: Vec::new(),
            meta_schema_id_regex: Some(r"^https?://json-schema\.org/".to_string()),
            extra_meta_schema_uris: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Used only for log correlation, never for dispatch decisions.
    pub id_field: Vec<String>,
    /// ISO-8601 timestamp, forwarded to the producer as the record timestamp.
    pub dt_field: Vec<String>,
    pub key_field: Vec<String>,
    pub partition_field: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Dotted-path candidates for an event's destination stream. Empty means
    /// "derive from the sanitized schema reference".
    pub field: Vec<String>,
    pub config_uri: Option<String>,
    pub config_title_field: String,
    pub topic_prefix: String,
    pub error_schema_uri: Option<String>,
    pub error_stream: Option<String>,
    /// When true, any invalid event in a batch fails the whole request with
    /// 400 instead of the default 207 partial-success response.
    pub strict: bool,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            field: Vec::new(),
            config_uri: None,
            config_title_field: "schema_title".to_string(),
            topic_prefix: String::new(),
            error_schema_uri: None,
            error_stream: None,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub hasty_enabled: bool,
    pub hasty_queue_capacity: usize,
    pub background_deadline_secs: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            hasty_enabled: true,
            hasty_queue_capacity: 10_000,
            background_deadline_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventGateConfig {
    pub server: ServerConfig,
    pub schema: SchemaConfig,
    pub streams: StreamsConfig,
    pub producer: ProducerConfig,
    pub observability: ObservabilityConfig,
    pub fields: FieldsConfig,
}

impl EventGateConfig {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_str(&raw)
    }

    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(raw);
        let config: Self = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pattern) = &self.schema.meta_schema_id_regex {
            Regex::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("invalid meta_schema_id_regex: {e}")))?;
        }
        if self.streams.error_schema_uri.is_some() != self.streams.error_stream.is_some() {
            return Err(ConfigError::Invalid(
                "streams.error_schema_uri and streams.error_stream must be set together"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Replaces every `${VAR_NAME}` in `raw` with the matching environment
/// variable's value, leaving the placeholder untouched if the variable is
/// unset.
fn expand_env_vars(raw: &str) -> String {
    ENV_VAR_RE
        .replace_all(raw, |caps: &regex::Captures| {
            let name = &caps[1];
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = EventGateConfig::from_str("").unwrap();
        assert_eq!(config.server.port, 8192);
        assert_eq!(config.schema.file_extension.as_deref(), Some("yaml"));
    }

    #[test]
    fn expands_env_vars() {
        std::env::set_var("EVENTGATE_TEST_HOST", "10.0.0.5");
        let config = EventGateConfig::from_str("[server]\nhost = \"${EVENTGATE_TEST_HOST}\"\n").unwrap();
        assert_eq!(config.server.host, "10.0.0.5");
        std::env::remove_var("EVENTGATE_TEST_HOST");
    }

    #[test]
    fn unset_env_var_is_left_untouched() {
        let config = EventGateConfig::from_str(
            "[server]\nhost = \"${EVENTGATE_DEFINITELY_UNSET_VAR}\"\n",
        )
        .unwrap();
        assert_eq!(config.server.host, "${EVENTGATE_DEFINITELY_UNSET_VAR}");
    }

    #[test]
    fn rejects_invalid_meta_schema_regex() {
        let err = EventGateConfig::from_str("[schema]\nmeta_schema_id_regex = \"(\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn fields_default_to_empty() {
        let config = EventGateConfig::from_str("").unwrap();
        assert!(config.fields.id_field.is_empty());
        assert!(config.fields.dt_field.is_empty());
        assert!(config.fields.key_field.is_empty());
        assert!(config.fields.partition_field.is_empty());
    }

    #[test]
    fn rejects_half_configured_error_stream() {
        let err = EventGateConfig::from_str("[streams]\nerror_stream = \"eventgate.error\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
