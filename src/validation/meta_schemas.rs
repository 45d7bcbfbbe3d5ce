//! A fixed set of JSON Schema meta-schemas, bundled so that a schema
//! declaring `"$schema": "http://json-schema.org/draft-07/schema#"` (or
//! draft-04/06) resolves without a network round trip.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

const DRAFT_07: &str = include_str!("meta_schemas/draft-07.json");
const DRAFT_06: &str = include_str!("meta_schemas/draft-06.json");
const DRAFT_04: &str = include_str!("meta_schemas/draft-04.json");

/// Maps a meta-schema `$id` (with and without the trailing `#`) to its
/// bundled document.
pub static META_SCHEMAS: Lazy<HashMap<String, Value>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for raw in [DRAFT_04, DRAFT_06, DRAFT_07] {
        let doc: Value = serde_json::from_str(raw).expect("bundled meta-schema is valid JSON");
        if let Some(id) = doc.get("$id").and_then(Value::as_str) {
            map.insert(id.trim_end_matches('#').to_string(), doc.clone());
            map.insert(format!("{}#", id.trim_end_matches('#')), doc);
        }
    }
    map
});

/// Looks up a bundled meta-schema by `$id`, ignoring a trailing `#`.
pub fn lookup(id: &str) -> Option<&'static Value> {
    META_SCHEMAS.get(id.trim_end_matches('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundles_draft_07() {
        assert!(lookup("http://json-schema.org/draft-07/schema").is_some());
        assert!(lookup("http://json-schema.org/draft-07/schema#").is_some());
    }

    #[test]
    fn bundles_draft_06_and_04() {
        assert!(lookup("http://json-schema.org/draft-06/schema").is_some());
        assert!(lookup("http://json-schema.org/draft-04/schema").is_some());
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(lookup("http://json-schema.org/draft-99/schema").is_none());
    }
}
