//! SCM integrations configured on an organization.
//!
//! Integrations only exist in the v1 API, which answers
//! `GET v1/org/{id}/integrations` with a map of integration name to id:
//!
//! ```json
//! {"github": "9a3e5d90-...", "gitlab": "1b2c..."}
//! ```
//!
//! Some accounts also return an `org` member or per-name objects and lists;
//! those shapes are accepted too.

use serde::Serialize;
use serde_json::{Map, Value};

/// One integration of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Integration {
    pub id: String,
    /// Integration name as the API reports it, e.g. `github` or
    /// `azure repos`.
    pub name: String,
}

impl Integration {
    /// Whether this integration is the one a project `origin` was imported
    /// through. Case-insensitive; `github-enterprise` and `azure-repos`
    /// also match their spaced names.
    pub fn matches_origin(&self, origin: &str) -> bool {
        let name = self.name.to_lowercase();
        let origin = origin.to_lowercase();
        name == origin
            || matches!(
                (origin.as_str(), name.as_str()),
                ("github-enterprise", "github enterprise") | ("azure-repos", "azure repos")
            )
    }
}

/// Parse a v1 integrations payload. Entries without an id are skipped.
pub(crate) fn parse_integrations(payload: &Value) -> Option<Vec<Integration>> {
    match payload {
        Value::Object(map) => Some(from_map(map)),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| from_object(item, None))
                .collect(),
        ),
        _ => None,
    }
}

fn from_map(map: &Map<String, Value>) -> Vec<Integration> {
    let mut integrations = Vec::new();
    for (name, value) in map.iter().filter(|(name, _)| name.as_str() != "org") {
        match value {
            Value::String(id) if !id.is_empty() => integrations.push(Integration {
                id: id.clone(),
                name: name.clone(),
            }),
            Value::Object(_) => integrations.extend(from_object(value, Some(name))),
            Value::Array(items) => {
                integrations.extend(items.iter().filter_map(|item| from_object(item, Some(name))))
            }
            _ => {}
        }
    }
    integrations
}

fn from_object(value: &Value, fallback_name: Option<&str>) -> Option<Integration> {
    let id = value.get("id").and_then(Value::as_str)?;
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .or(fallback_name)?;
    Some(Integration {
        id: id.to_string(),
        name: name.to_string(),
    })
}
