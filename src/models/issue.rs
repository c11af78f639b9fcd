//! Issue model and trait implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{
    null_as_default, segment, EntityKind, OrgScopedId, Organization, ParentRef, Project, Resource,
};
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

/// Issue attributes.
///
/// Field names follow the REST API; camelCase spellings from older payloads
/// are accepted too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueAttributes {
    pub title: String,

    /// Issue type (e.g., "package_vulnerability", "code", "license").
    #[serde(rename = "type", default)]
    pub issue_type: Option<String>,

    /// "open" or "resolved".
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, alias = "effectiveSeverityLevel")]
    pub effective_severity_level: Option<String>,

    #[serde(default)]
    pub ignored: bool,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub tool: Option<String>,

    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub resolution: Option<IssueResolution>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub problems: Vec<IssueProblem>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub coordinates: Vec<IssueCoordinate>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub severities: Vec<IssueSeverity>,
}

/// An upstream problem record, such as a CVE or a Snyk vulnerability id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueProblem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "disclosedAt")]
    pub disclosed_at: Option<DateTime<Utc>>,
}

/// Where the issue was found and how it can be fixed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueCoordinate {
    #[serde(default, alias = "isFixableManually")]
    pub is_fixable_manually: bool,
    #[serde(default, alias = "isFixableSnyk")]
    pub is_fixable_snyk: bool,
    #[serde(default, alias = "isFixableUpstream")]
    pub is_fixable_upstream: Option<bool>,
    #[serde(default, alias = "isUpgradeable")]
    pub is_upgradeable: Option<bool>,
    #[serde(default, alias = "isPatchable")]
    pub is_patchable: Option<bool>,
    #[serde(default)]
    pub reachability: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub representations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSeverity {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub vector: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResolution {
    #[serde(rename = "type", default)]
    pub resolution_type: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// The scanned item an issue was reported against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: String,
}

/// A Snyk issue.
#[derive(Debug, Serialize)]
pub struct Issue {
    pub id: String,
    /// Owning organization, when the payload or listing names one.
    pub org_id: Option<String>,
    pub scan_item: Option<ScanItem>,
    #[serde(flatten)]
    pub attributes: IssueAttributes,
    #[serde(skip)]
    session: SessionRef,
}

impl Issue {
    pub fn title(&self) -> &str {
        &self.attributes.title
    }

    pub fn status(&self) -> Option<&str> {
        self.attributes.status.as_deref()
    }

    /// Effective severity, falling back to the first reported severity.
    pub fn severity(&self) -> Option<&str> {
        self.attributes.effective_severity_level.as_deref().or_else(|| {
            self.attributes
                .severities
                .iter()
                .find_map(|s| s.level.as_deref())
        })
    }

    /// CVE identifiers among the issue's problems.
    pub fn cves(&self) -> Vec<&str> {
        self.attributes
            .problems
            .iter()
            .map(|p| p.id.as_str())
            .filter(|id| id.starts_with("CVE-"))
            .collect()
    }

    /// Whether any coordinate can be fixed by Snyk or an upgrade.
    pub fn is_fixable(&self) -> bool {
        self.attributes
            .coordinates
            .iter()
            .any(|c| c.is_fixable_snyk || c.is_upgradeable == Some(true))
    }

    /// The project this issue was found in, if its scan item is a project.
    pub async fn project(&self) -> Result<Option<Arc<Project>>> {
        let (Some(org_id), Some(scan_item)) = (&self.org_id, &self.scan_item) else {
            return Ok(None);
        };
        if scan_item.item_type != "project" {
            return Ok(None);
        }
        Project::get(&self.session.upgrade()?, OrgScopedId::new(org_id, &scan_item.id))
            .await
            .map(Some)
    }

    pub async fn organization(&self) -> Result<Option<Arc<Organization>>> {
        match &self.org_id {
            Some(org_id) => Organization::get(&self.session.upgrade()?, org_id.clone())
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}

impl Entity for Issue {
    const KIND: EntityKind = EntityKind::Issue;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let attributes: IssueAttributes = resource.attributes(Self::KIND)?;
        let org_id = resource
            .related_id("organization")
            .or_else(|| parent.and_then(ParentRef::org_id))
            .map(str::to_string);

        let scan_item = ["scan_item", "scanItem"].iter().find_map(|name| {
            Some(ScanItem {
                id: resource.related_id(name)?.to_string(),
                item_type: resource.related_type(name)?.to_string(),
            })
        });

        Ok(Self {
            session: session.downgrade(),
            org_id,
            scan_item,
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Issue {
    type Id = OrgScopedId;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!(
            "rest/orgs/{}/issues/{}",
            segment(&id.org_id),
            segment(&id.id)
        ));
        let parent = ParentRef::new(EntityKind::Organization, &id.org_id);
        session.fetch_one(&id.id, request, Some(&parent)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SnykClient;
    use serde_json::json;

    fn issue(value: serde_json::Value) -> Arc<Issue> {
        let session = Session::new(SnykClient::new("token", "http://localhost:1").unwrap());
        session.materialize(value, None).unwrap()
    }

    #[test]
    fn test_parse_rest_issue() {
        let issue = issue(json!({
            "id": "i1",
            "type": "issue",
            "attributes": {
                "title": "Prototype Pollution",
                "type": "package_vulnerability",
                "status": "open",
                "effective_severity_level": "high",
                "created_at": "2024-03-01T10:00:00Z",
                "problems": [
                    {"id": "SNYK-JS-LODASH-1", "source": "SNYK"},
                    {"id": "CVE-2020-8203", "source": "NVD"}
                ],
                "coordinates": [{"is_fixable_snyk": true, "representations": null}]
            },
            "relationships": {
                "organization": {"data": {"id": "o1", "type": "organization"}},
                "scan_item": {"data": {"id": "p1", "type": "project"}}
            }
        }));

        assert_eq!(issue.title(), "Prototype Pollution");
        assert_eq!(issue.severity(), Some("high"));
        assert_eq!(issue.cves(), vec!["CVE-2020-8203"]);
        assert!(issue.is_fixable());
        assert_eq!(issue.org_id.as_deref(), Some("o1"));
        assert_eq!(
            issue.scan_item,
            Some(ScanItem {
                id: "p1".to_string(),
                item_type: "project".to_string()
            })
        );
    }

    #[test]
    fn test_camel_case_aliases_and_severity_fallback() {
        let issue = issue(json!({
            "id": "i2",
            "attributes": {
                "title": "Hardcoded secret",
                "createdAt": "2024-03-01T10:00:00Z",
                "severities": [{"level": "medium", "score": 5.3}]
            }
        }));

        assert!(issue.attributes.created_at.is_some());
        assert_eq!(issue.severity(), Some("medium"));
        assert!(issue.cves().is_empty());
        assert!(issue.org_id.is_none());
        assert!(issue.scan_item.is_none());
    }

    #[tokio::test]
    async fn test_project_lookup_skipped_for_non_project_scan_items() {
        let issue = issue(json!({
            "id": "i3",
            "attributes": {"title": "t"},
            "relationships": {
                "organization": {"data": {"id": "o1"}},
                "scan_item": {"data": {"id": "env1", "type": "environment"}}
            }
        }));

        assert!(issue.project().await.unwrap().is_none());
    }
}
