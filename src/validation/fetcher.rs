//! Retrieves a schema document from one of a list of candidate URLs.
//!
//! Bodies are parsed as YAML regardless of the scheme, since JSON is a
//! syntactic subset of YAML — this lets a `.json` and a `.yaml` schema file
//! share one parser, the same way the teacher's schema loader treats an
//! OpenAPI document.

use serde_json::Value;

use crate::events::EventGateError;

#[derive(Debug, Clone)]
pub struct SchemaFetcher {
    client: reqwest::Client,
}

impl Default for SchemaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Tries each candidate URL in order, returning the first one that loads
    /// and parses successfully, along with the URL it was fetched from (so
    /// callers can resolve further relative `$ref`s against it). Fails with
    /// every per-candidate error joined together once the whole list is
    /// exhausted.
    pub async fn fetch(&self, candidates: &[String]) -> Result<(Value, String), EventGateError> {
        let mut failures = Vec::new();
        for url in candidates {
            match self.fetch_one(url).await {
                Ok(value) => return Ok((value, url.clone())),
                Err(message) => failures.push(format!("{url}: {message}")),
            }
        }
        Err(EventGateError::SchemaLoadFailure {
            schema_ref: candidates.join(", "),
            message: if failures.is_empty() {
                "no candidate URLs to try".to_string()
            } else {
                failures.join("; ")
            },
        })
    }

    async fn fetch_one(&self, url: &str) -> Result<Value, String> {
        let body = if let Some(path) = url.strip_prefix("file://") {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("read error: {e}"))?
        } else if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("request error: {e}"))?;
            if !response.status().is_success() {
                return Err(format!("unexpected status {}", response.status()));
            }
            response
                .text()
                .await
                .map_err(|e| format!("body read error: {e}"))?
        } else {
            return Err(format!("unsupported URI scheme in {url:?}"));
        };

        serde_yaml::from_str::<Value>(&body).map_err(|e| format!("parse error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_and_parses_a_local_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.yaml");
        tokio::fs::write(&path, "type: object\nproperties:\n  test:\n    type: string\n")
            .await
            .unwrap();

        let fetcher = SchemaFetcher::new();
        let url = format!("file://{}", path.display());
        let (doc, fetched_from) = fetcher.fetch(&[url.clone()]).await.unwrap();
        assert_eq!(doc["type"], "object");
        assert_eq!(fetched_from, url);
    }

    #[tokio::test]
    async fn falls_through_to_second_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("event.json");
        tokio::fs::write(&good, r#"{"type": "object"}"#).await.unwrap();
        let missing = dir.path().join("does-not-exist.json");

        let fetcher = SchemaFetcher::new();
        let good_url = format!("file://{}", good.display());
        let urls = vec![format!("file://{}", missing.display()), good_url.clone()];
        let (doc, fetched_from) = fetcher.fetch(&urls).await.unwrap();
        assert_eq!(doc["type"], "object");
        assert_eq!(fetched_from, good_url);
    }

    #[tokio::test]
    async fn all_candidates_failing_is_a_schema_load_failure() {
        let fetcher = SchemaFetcher::new();
        let err = fetcher
            .fetch(&["file:///does/not/exist.json".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EventGateError::SchemaLoadFailure { .. }));
    }

    #[tokio::test]
    async fn http_candidate_is_fetched_over_wiremock() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/event.json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(r#"{"type": "object"}"#))
            .mount(&server)
            .await;

        let fetcher = SchemaFetcher::new();
        let url = format!("{}/event.json", server.uri());
        let (doc, _) = fetcher.fetch(&[url]).await.unwrap();
        assert_eq!(doc["type"], "object");
    }
}
