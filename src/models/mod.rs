//! Snyk entity types.
//!
//! The graph is Group → Organization → Project → Issue, with Policies under
//! Organizations and Assets under Groups. Shared JSON:API plumbing lives
//! here.

mod asset;
mod group;
mod integration;
mod issue;
mod organization;
mod policy;
mod project;
mod purl;

pub use asset::*;
pub use group::*;
pub use integration::Integration;
pub use issue::*;
pub use organization::*;
pub use policy::*;
pub use project::*;
pub use purl::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SnykError};

pub(crate) use integration::parse_integrations;

/// The kinds of entity in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Group,
    Organization,
    Project,
    Issue,
    Policy,
    Asset,
}

impl EntityKind {
    /// Lowercase name, matching the JSON:API `type` member where one exists.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Group => "group",
            EntityKind::Organization => "organization",
            EntityKind::Project => "project",
            EntityKind::Issue => "issue",
            EntityKind::Policy => "policy",
            EntityKind::Asset => "asset",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier-only reference to another entity.
///
/// Resolved through the entity cache on demand; never owns its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ParentRef {
    pub kind: EntityKind,
    pub id: String,
    /// The organization an org-scoped entity (e.g. a project) lives in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl ParentRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            org_id: None,
        }
    }

    /// Record the organization the referenced entity belongs to.
    #[must_use]
    pub fn within_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// The id, if this reference points at `kind`.
    pub fn id_of(&self, kind: EntityKind) -> Option<&str> {
        (self.kind == kind).then_some(self.id.as_str())
    }

    /// The organization of the referenced entity: the entity itself when it
    /// is an organization, otherwise its recorded org scope.
    pub fn org_id(&self) -> Option<&str> {
        self.id_of(EntityKind::Organization).or(self.org_id.as_deref())
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}

/// An id qualified by the organization it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrgScopedId {
    pub org_id: String,
    pub id: String,
}

impl OrgScopedId {
    pub fn new(org_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            id: id.into(),
        }
    }
}

/// An id qualified by the group it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupScopedId {
    pub group_id: String,
    pub id: String,
}

impl GroupScopedId {
    pub fn new(group_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            id: id.into(),
        }
    }
}

/// One JSON:API resource object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub relationships: Value,
    #[serde(default)]
    pub links: Value,
}

impl Resource {
    /// Parse a resource object, requiring a string `id`.
    pub fn from_value(kind: EntityKind, value: Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SnykError::InvalidResource {
                kind,
                id: String::new(),
                reason: "resource has no string id".to_string(),
            })?;

        serde_json::from_value(value).map_err(|e| SnykError::InvalidResource {
            kind,
            id,
            reason: e.to_string(),
        })
    }

    /// Deserialize the `attributes` member.
    pub fn attributes<T: DeserializeOwned>(&self, kind: EntityKind) -> Result<T> {
        let attributes = if self.attributes.is_null() {
            Value::Object(Default::default())
        } else {
            self.attributes.clone()
        };
        serde_json::from_value(attributes).map_err(|e| SnykError::InvalidResource {
            kind,
            id: self.id.clone(),
            reason: format!("attributes: {e}"),
        })
    }

    /// `relationships.{name}.data.id`
    pub fn related_id(&self, name: &str) -> Option<&str> {
        self.relationships
            .get(name)?
            .get("data")?
            .get("id")?
            .as_str()
    }

    /// `relationships.{name}.data.type`
    pub fn related_type(&self, name: &str) -> Option<&str> {
        self.relationships
            .get(name)?
            .get("data")?
            .get("type")?
            .as_str()
    }

    /// `relationships.{name}.links.related`, as a string or `{href}` object.
    pub fn related_link(&self, name: &str) -> Option<&str> {
        let link = self.relationships.get(name)?.get("links")?.get("related")?;
        link.as_str()
            .or_else(|| link.get("href").and_then(Value::as_str))
    }

    pub(crate) fn invalid(&self, kind: EntityKind, reason: impl Into<String>) -> SnykError {
        SnykError::InvalidResource {
            kind,
            id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Percent-encode an id for use as one path segment.
pub(crate) fn segment(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}

/// Deserialize `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_relationship_accessors() {
        let resource = Resource::from_value(
            EntityKind::Issue,
            json!({
                "id": "i1",
                "type": "issue",
                "attributes": {"title": "XSS"},
                "relationships": {
                    "organization": {"data": {"id": "o1", "type": "organization"}},
                    "scan_item": {"data": {"id": "p1", "type": "project"}},
                    "projects": {"links": {"related": {"href": "/rest/x"}}}
                }
            }),
        )
        .unwrap();

        assert_eq!(resource.related_id("organization"), Some("o1"));
        assert_eq!(resource.related_type("scan_item"), Some("project"));
        assert_eq!(resource.related_link("projects"), Some("/rest/x"));
        assert_eq!(resource.related_id("target"), None);
    }

    #[test]
    fn test_resource_requires_id() {
        let err = Resource::from_value(EntityKind::Project, json!({"type": "project"})).unwrap_err();
        assert!(matches!(err, SnykError::InvalidResource { kind: EntityKind::Project, .. }));

        let err = Resource::from_value(EntityKind::Project, json!({"id": 7})).unwrap_err();
        assert!(matches!(err, SnykError::InvalidResource { .. }));
    }

    #[test]
    fn test_missing_attributes_deserialize_as_empty_object() {
        #[derive(Deserialize)]
        struct Attrs {
            #[serde(default)]
            name: Option<String>,
        }

        let resource = Resource::from_value(EntityKind::Group, json!({"id": "g1"})).unwrap();
        let attrs: Attrs = resource.attributes(EntityKind::Group).unwrap();
        assert!(attrs.name.is_none());
    }

    #[test]
    fn test_parent_ref_display() {
        let parent = ParentRef::new(EntityKind::Organization, "o1");
        assert_eq!(parent.to_string(), "organization 'o1'");
        assert_eq!(parent.id_of(EntityKind::Organization), Some("o1"));
        assert_eq!(parent.id_of(EntityKind::Group), None);
        assert_eq!(parent.org_id(), Some("o1"));
    }

    #[test]
    fn test_parent_ref_org_scope() {
        let project = ParentRef::new(EntityKind::Project, "p1").within_org("o1");
        assert_eq!(project.to_string(), "project 'p1'");
        assert_eq!(project.id_of(EntityKind::Organization), None);
        assert_eq!(project.org_id(), Some("o1"));

        let group = ParentRef::new(EntityKind::Group, "g1");
        assert_eq!(group.org_id(), None);
    }
}
