//! Project model and trait implementations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::models::{
    null_as_default, segment, EntityKind, Integration, Issue, OrgScopedId, Organization, ParentRef,
    Resource,
};
use crate::relation::LazyRelation;
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

/// Web roots of the SCM integrations a project can be imported from.
const ORIGIN_URLS: &[(&str, &str)] = &[
    ("github", "https://github.com"),
    ("github-enterprise", "https://github.com"),
    ("gitlab", "https://gitlab.com"),
    ("bitbucket-server", "https://bitbucket.org"),
    ("bitbucket-cloud", "https://bitbucket.org"),
    ("bitbucket-connect-app", "https://bitbucket.org"),
    ("azure-devops", "https://dev.azure.com"),
    ("azure-repos", "https://dev.azure.com"),
];

/// Project attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAttributes {
    /// Display name, e.g. `acme/api(main):package.json`.
    pub name: String,

    /// Project type (e.g., "npm", "sast", "maven").
    #[serde(rename = "type", default)]
    pub project_type: Option<String>,

    /// Integration the project was imported through (e.g., "github", "cli").
    #[serde(default)]
    pub origin: Option<String>,

    /// "active" or "inactive".
    #[serde(default)]
    pub status: Option<String>,

    /// Branch or other reference of the target.
    #[serde(default)]
    pub target_reference: Option<String>,

    #[serde(default)]
    pub target_file: Option<String>,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,

    #[serde(default)]
    pub read_only: Option<bool>,

    #[serde(default)]
    pub test_frequency: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<ProjectTag>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub business_criticality: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub environment: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub lifecycle: Vec<String>,
}

/// A key/value project tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTag {
    pub key: String,
    pub value: String,
}

/// A Snyk project.
///
/// A project is one scanned manifest or code target inside an
/// organization. Its issues come from the organization's issue listing
/// filtered to this project as scan item.
#[derive(Debug, Serialize)]
pub struct Project {
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// Target the project was imported from, when reported.
    pub target_id: Option<String>,
    #[serde(flatten)]
    pub attributes: ProjectAttributes,
    #[serde(skip)]
    session: SessionRef,
    #[serde(skip)]
    issues: LazyRelation<Issue>,
}

impl Project {
    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn origin(&self) -> Option<&str> {
        self.attributes.origin.as_deref()
    }

    pub fn parent_ref(&self) -> ParentRef {
        ParentRef::new(EntityKind::Project, &self.id).within_org(&self.org_id)
    }

    /// Issues whose scan item is this project.
    pub fn issues(&self) -> &LazyRelation<Issue> {
        &self.issues
    }

    pub async fn organization(&self) -> Result<Arc<Organization>> {
        Organization::get(&self.session.upgrade()?, self.org_id.clone()).await
    }

    /// The organization integration this project was imported through,
    /// matched on the project's origin.
    pub async fn integration(&self) -> Result<Option<Integration>> {
        let Some(origin) = self.origin() else {
            return Ok(None);
        };
        let integrations = self.organization().await?.integrations().await?;
        let found = integrations
            .iter()
            .find(|integration| integration.matches_origin(origin))
            .cloned();
        if found.is_none() {
            debug!(project = %self.id, origin, "no integration matches origin");
        }
        Ok(found)
    }

    /// Repository URL for projects imported through a known SCM integration.
    ///
    /// `None` unless the owning organization has an integration matching the
    /// project's origin and the origin has a known web root.
    pub async fn repo_url(&self) -> Result<Option<String>> {
        if self.origin_root().is_none() {
            return Ok(None);
        }
        Ok(self
            .integration()
            .await?
            .and_then(|_| self.repository_url()))
    }

    /// The origin's web root joined with the repository part of the project
    /// name (everything before a branch or manifest suffix).
    fn repository_url(&self) -> Option<String> {
        let root = self.origin_root()?;
        let repo = self
            .name()
            .split(['(', ':'])
            .next()
            .map(str::trim)
            .filter(|repo| !repo.is_empty())?;
        Some(format!("{root}/{repo}"))
    }

    fn origin_root(&self) -> Option<&'static str> {
        let origin = self.origin()?;
        ORIGIN_URLS
            .iter()
            .find(|(name, _)| *name == origin)
            .map(|(_, root)| *root)
    }

    /// Look up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.attributes
            .tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

impl Entity for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let attributes: ProjectAttributes = resource.attributes(Self::KIND)?;
        let org_id = resource
            .related_id("organization")
            .or_else(|| parent.and_then(ParentRef::org_id))
            .map(str::to_string)
            .ok_or_else(|| resource.invalid(Self::KIND, "no owning organization"))?;

        let issues = LazyRelation::new(
            session,
            ParentRef::new(Self::KIND, &resource.id).within_org(&org_id),
            "issues",
            session
                .rest(format!("rest/orgs/{}/issues", segment(&org_id)))
                .query("scan_item.id", resource.id.clone())
                .query("scan_item.type", "project"),
        );

        Ok(Self {
            target_id: resource.related_id("target").map(str::to_string),
            session: session.downgrade(),
            issues,
            org_id,
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Project {
    type Id = OrgScopedId;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!(
            "rest/orgs/{}/projects/{}",
            segment(&id.org_id),
            segment(&id.id)
        ));
        let parent = ParentRef::new(EntityKind::Organization, &id.org_id);
        session.fetch_one(&id.id, request, Some(&parent)).await
    }
}
