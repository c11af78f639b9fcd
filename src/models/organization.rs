//! Organization model.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::RequestSpec;
use crate::error::{Result, SnykError};
use crate::models::{
    parse_integrations, segment, EntityKind, Group, Integration, Issue, OrgScopedId, PackageUrl,
    ParentRef, Policy, Project, Resource,
};
use crate::relation::{Collection, FilteredRelations, LazyRelation};
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

/// Organization attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationAttributes {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Owning group. Filled from the relationship or the listing group when
    /// the attribute is absent.
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub is_personal: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A Snyk organization.
///
/// Owns projects, issues and policies, and knows its SCM integrations.
/// Issue listings can also be narrowed
/// with arbitrary query filters or by package URL; each distinct filter is
/// its own cached relation.
#[derive(Debug, Serialize)]
pub struct Organization {
    pub id: String,
    #[serde(flatten)]
    pub attributes: OrganizationAttributes,
    #[serde(skip)]
    session: SessionRef,
    #[serde(skip)]
    projects: LazyRelation<Project>,
    #[serde(skip)]
    issues: LazyRelation<Issue>,
    #[serde(skip)]
    policies: LazyRelation<Policy>,
    #[serde(skip)]
    filtered_issues: FilteredRelations<Issue>,
    #[serde(skip)]
    integrations: Mutex<Arc<OnceCell<Arc<Vec<Integration>>>>>,
}

impl Organization {
    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn slug(&self) -> Option<&str> {
        self.attributes.slug.as_deref()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.attributes.group_id.as_deref()
    }

    pub fn parent_ref(&self) -> ParentRef {
        ParentRef::new(EntityKind::Organization, &self.id)
    }

    pub fn projects(&self) -> &LazyRelation<Project> {
        &self.projects
    }

    pub fn issues(&self) -> &LazyRelation<Issue> {
        &self.issues
    }

    pub fn policies(&self) -> &LazyRelation<Policy> {
        &self.policies
    }

    /// Issues narrowed by API query parameters, e.g.
    /// `[("type", "package_vulnerability"), ("status", "open")]`.
    pub fn issues_matching<I, K, V>(&self, params: I) -> LazyRelation<Issue>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let path = format!("rest/orgs/{}/issues", segment(&self.id));
        self.filtered_issues
            .for_request(self.session.rest(path).extend_query(params))
    }

    /// Issues affecting one package version.
    pub fn issues_for_purl(&self, purl: &PackageUrl) -> LazyRelation<Issue> {
        let path = format!(
            "rest/orgs/{}/packages/{}/issues",
            segment(&self.id),
            purl.encoded()
        );
        self.filtered_issues.for_request(self.session.rest(path))
    }

    /// Every filtered issue relation made through this organization.
    pub fn filtered_issues(&self) -> &FilteredRelations<Issue> {
        &self.filtered_issues
    }

    /// The owning group, when known.
    pub async fn group(&self) -> Result<Option<Arc<Group>>> {
        match self.group_id() {
            Some(id) => Group::get(&self.session.upgrade()?, id.to_string()).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn project(&self, project_id: &str) -> Result<Arc<Project>> {
        Project::get(&self.session.upgrade()?, OrgScopedId::new(&self.id, project_id)).await
    }

    pub async fn issue(&self, issue_id: &str) -> Result<Arc<Issue>> {
        Issue::get(&self.session.upgrade()?, OrgScopedId::new(&self.id, issue_id)).await
    }

    pub async fn policy(&self, policy_id: &str) -> Result<Arc<Policy>> {
        Policy::get(&self.session.upgrade()?, OrgScopedId::new(&self.id, policy_id)).await
    }

    /// SCM integrations of this organization, fetched once from the v1 API.
    ///
    /// Concurrent callers share one request. [`refresh`](Self::refresh)
    /// discards the result.
    pub async fn integrations(&self) -> Result<Arc<Vec<Integration>>> {
        let cell = Arc::clone(&self.integrations.lock().unwrap_or_else(PoisonError::into_inner));
        let integrations = cell.get_or_try_init(|| self.fetch_integrations()).await?;
        Ok(Arc::clone(integrations))
    }

    #[tracing::instrument(skip(self), fields(org = %self.id))]
    async fn fetch_integrations(&self) -> Result<Arc<Vec<Integration>>> {
        let session = self.session.upgrade()?;
        let request = RequestSpec::get(format!("v1/org/{}/integrations", segment(&self.id)));
        let response = session.client().send(&request).await?;

        let integrations = parse_integrations(&response.payload).ok_or_else(|| {
            SnykError::InvalidResource {
                kind: EntityKind::Organization,
                id: self.id.clone(),
                reason: "integrations response is neither an object nor a list".to_string(),
            }
        })?;
        debug!(count = integrations.len(), "fetched integrations");
        Ok(Arc::new(integrations))
    }

    /// Every project paired with its issues, fetched concurrently.
    pub async fn issues_by_project(&self) -> Result<Vec<(Arc<Project>, Collection<Issue>)>> {
        let projects = self.projects.resolve().await?;
        let issues = try_join_all(projects.iter().map(|project| project.issues().resolve())).await?;
        Ok(projects.iter().cloned().zip(issues).collect())
    }

    /// Forget every resolved relation.
    pub fn refresh(&self) {
        self.projects.refresh();
        self.issues.refresh();
        self.policies.refresh();
        self.filtered_issues.refresh_all();
        *self.integrations.lock().unwrap_or_else(PoisonError::into_inner) = Arc::default();
    }
}

impl Entity for Organization {
    const KIND: EntityKind = EntityKind::Organization;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let mut attributes: OrganizationAttributes = resource.attributes(Self::KIND)?;
        if attributes.group_id.is_none() {
            attributes.group_id = resource
                .related_id("group")
                .or_else(|| parent.and_then(|p| p.id_of(EntityKind::Group)))
                .map(str::to_string);
        }

        let owner = ParentRef::new(Self::KIND, &resource.id);
        let id = segment(&resource.id).into_owned();

        Ok(Self {
            projects: LazyRelation::new(
                session,
                owner.clone(),
                "projects",
                session.rest(format!("rest/orgs/{id}/projects")),
            ),
            issues: LazyRelation::new(
                session,
                owner.clone(),
                "issues",
                session.rest(format!("rest/orgs/{id}/issues")),
            ),
            policies: LazyRelation::new(
                session,
                owner.clone(),
                "policies",
                session.rest(format!("rest/orgs/{id}/policies")),
            ),
            filtered_issues: FilteredRelations::new(session, owner, "issues"),
            integrations: Mutex::default(),
            session: session.downgrade(),
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Organization {
    type Id = String;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!("rest/orgs/{}", segment(&id)));
        session.fetch_one(&id, request, None).await
    }
}
