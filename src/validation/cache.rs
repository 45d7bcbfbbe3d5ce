//! The Validator Cache: compiles a schema reference into a reusable
//! `jsonschema::Validator` at most once, sharing the in-flight compile
//! across concurrent callers racing on the same ref.

use dashmap::DashMap;
use futures::future::BoxFuture;
use jsonschema::Validator;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::fetcher::SchemaFetcher;
use super::meta_schemas;
use super::uri::{has_scheme, resolve_uri};
use crate::events::{EventGateError, ValidationIssue};

/// A compiled schema's supporting metadata: the fully `$ref`-inlined
/// document (used to read `title`/`$id`, and to apply `default`s to
/// incoming events) alongside the schema itself.
pub struct Schema {
    pub document: Value,
    pub title: Option<String>,
    pub id: Option<String>,
}

pub struct ValidatorEntry {
    pub schema: Arc<Schema>,
    pub validator: Validator,
}

type CacheSlot = Arc<OnceCell<Result<Arc<ValidatorEntry>, EventGateError>>>;

#[derive(Debug, Clone)]
pub struct ValidatorCacheConfig {
    pub base_uris: Vec<String>,
    pub default_extension: Option<String>,
    pub allow_absolute_schema_uris: bool,
    pub meta_schema_id_regex: Option<Regex>,
}

pub struct ValidatorCache {
    fetcher: SchemaFetcher,
    config: ValidatorCacheConfig,
    entries: DashMap<String, CacheSlot>,
    /// Meta-schemas fetched at startup beyond the bundled draft-04/06/07 set,
    /// keyed by `$id`. Unlike `entries`, never cleared on reload — these are
    /// operator-provided documents, not event-declared schema refs.
    extra_meta_schemas: DashMap<String, Value>,
}

impl ValidatorCache {
    pub fn new(fetcher: SchemaFetcher, config: ValidatorCacheConfig) -> Self {
        Self {
            fetcher,
            config,
            entries: DashMap::new(),
            extra_meta_schemas: DashMap::new(),
        }
    }

    /// Fetches `uri` and registers it as an additional meta-schema, keyed by
    /// its own `$id` (falling back to `uri` if the document declares none).
    /// Called once per configured extra meta-schema, at startup.
    pub async fn preload_meta_schema(&self, uri: &str) -> Result<(), EventGateError> {
        let (document, _) = self.fetcher.fetch(&[uri.to_string()]).await?;
        let id = document
            .get("$id")
            .or_else(|| document.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uri.to_string());
        self.extra_meta_schemas.insert(id, document);
        Ok(())
    }

    /// Drops every cached entry so the next lookup recompiles from scratch.
    /// Called when the stream/schema configuration is hot-reloaded.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub async fn schema_for(&self, schema_ref: &str) -> Result<Arc<Schema>, EventGateError> {
        Ok(self.get_or_compile(schema_ref).await?.schema.clone())
    }

    /// Applies the schema's `default`s to `event`, then validates it.
    /// Mutates `event` in place regardless of whether validation ultimately
    /// succeeds, since filling in defaults is meant to happen before the
    /// result is judged valid or invalid.
    pub async fn validate(&self, schema_ref: &str, event: &mut Value) -> Result<(), EventGateError> {
        let entry = self.get_or_compile(schema_ref).await?;
        apply_defaults(&entry.schema.document, event);

        let issues: Vec<ValidationIssue> = entry
            .validator
            .iter_errors(event)
            .map(|e| ValidationIssue {
                data_path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            let errors_text = issues
                .iter()
                .map(|i| format!("{}: {}", i.data_path, i.message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(EventGateError::ValidationFailure {
                issues,
                errors_text,
            })
        }
    }

    async fn get_or_compile(&self, schema_ref: &str) -> Result<Arc<ValidatorEntry>, EventGateError> {
        let slot = self
            .entries
            .entry(schema_ref.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_init(|| async { self.compile(schema_ref).await.map(Arc::new) })
            .await
            .clone();

        if let Ok(entry) = &result {
            if let Some(id) = &entry.schema.id {
                if id != schema_ref {
                    self.entries
                        .entry(id.clone())
                        .or_insert_with(|| slot.clone());
                }
            }
        }

        result
    }

    async fn compile(&self, schema_ref: &str) -> Result<ValidatorEntry, EventGateError> {
        let document = self
            .resolve_document(schema_ref, None, &mut HashSet::new())
            .await?;

        let validator = jsonschema::validator_for(&document).map_err(|e| {
            EventGateError::SchemaLoadFailure {
                schema_ref: schema_ref.to_string(),
                message: format!("failed to compile schema: {e}"),
            }
        })?;

        let title = document
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = document
            .get("$id")
            .or_else(|| document.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ValidatorEntry {
            schema: Arc::new(Schema { document, title, id }),
            validator,
        })
    }

    /// Fetches `schema_ref` (resolved against `base`, the enclosing
    /// document's own location, when it has no scheme of its own) and
    /// inlines every non-local `$ref` it contains.
    async fn resolve_document(
        &self,
        schema_ref: &str,
        base: Option<&str>,
        visiting: &mut HashSet<String>,
    ) -> Result<Value, EventGateError> {
        let visit_key = format!("{}|{schema_ref}", base.unwrap_or(""));
        if !visiting.insert(visit_key) {
            // Circular $ref: stop recursing and accept anything further in.
            return Ok(Value::Bool(true));
        }

        if let Some(doc) = self.extra_meta_schemas.get(schema_ref) {
            return Ok(doc.clone());
        }

        if let Some(regex) = &self.config.meta_schema_id_regex {
            if regex.is_match(schema_ref) {
                if let Some(doc) = meta_schemas::lookup(schema_ref) {
                    return Ok(doc.clone());
                }
            }
        }

        let candidates = if has_scheme(schema_ref) {
            vec![schema_ref.to_string()]
        } else if let Some(base_id) = base.filter(|b| has_scheme(b)) {
            let joined = url::Url::parse(base_id)
                .and_then(|b| b.join(schema_ref))
                .map_err(|e| EventGateError::SchemaLoadFailure {
                    schema_ref: schema_ref.to_string(),
                    message: format!("cannot resolve relative $ref against {base_id}: {e}"),
                })?;
            vec![joined.to_string()]
        } else {
            resolve_uri(
                schema_ref,
                &self.config.base_uris,
                self.config.default_extension.as_deref(),
                self.config.allow_absolute_schema_uris,
            )?
        };

        let (mut document, fetched_from) = self.fetcher.fetch(&candidates).await?;
        let new_base = document
            .get("$id")
            .or_else(|| document.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(fetched_from);

        self.inline_external_refs(&mut document, Some(new_base), visiting)
            .await?;
        Ok(document)
    }

    fn inline_external_refs<'a>(
        &'a self,
        value: &'a mut Value,
        base: Option<String>,
        visiting: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<(), EventGateError>> {
        Box::pin(async move {
            if let Some(r) = value
                .as_object()
                .and_then(|m| m.get("$ref"))
                .and_then(Value::as_str)
                .filter(|r| !r.starts_with('#'))
                .map(str::to_string)
            {
                let (target_ref, fragment) = split_ref(&r);
                let resolved = self
                    .resolve_document(&target_ref, base.as_deref(), visiting)
                    .await?;
                *value = match fragment {
                    Some(frag) => resolved
                        .pointer(&frag)
                        .cloned()
                        .unwrap_or(Value::Bool(true)),
                    None => resolved,
                };
                return Ok(());
            }

            match value {
                Value::Object(map) => {
                    for v in map.values_mut() {
                        self.inline_external_refs(v, base.clone(), visiting).await?;
                    }
                }
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        self.inline_external_refs(item, base.clone(), visiting).await?;
                    }
                }
                _ => {}
            }
            Ok(())
        })
    }
}

fn split_ref(r: &str) -> (String, Option<String>) {
    match r.split_once('#') {
        Some((path, frag)) if frag.is_empty() => (path.to_string(), None),
        Some((path, frag)) => (path.to_string(), Some(frag.to_string())),
        None => (r.to_string(), None),
    }
}

/// Recursively fills in `default` values from `schema` for any object key
/// missing from `instance`, following `properties` into nested objects that
/// are themselves present in the instance.
pub fn apply_defaults(schema: &Value, instance: &mut Value) {
    let (Some(properties), Some(instance_obj)) = (
        schema.get("properties").and_then(Value::as_object),
        instance.as_object_mut(),
    ) else {
        return;
    };

    for (key, subschema) in properties {
        if !instance_obj.contains_key(key) {
            if let Some(default) = subschema.get("default") {
                instance_obj.insert(key.clone(), default.clone());
            }
        }
        if let Some(nested) = instance_obj.get_mut(key) {
            apply_defaults(subschema, nested);
        }
    }
}
