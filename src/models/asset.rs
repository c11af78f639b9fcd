//! Asset model.
//!
//! Assets come from the closed-beta inventory endpoints. An asset tracked by
//! Snyk itself lists its organizations inline and links to its projects.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::models::{
    null_as_default, segment, EntityKind, GroupScopedId, Organization, ParentRef, Project, Resource,
};
use crate::relation::{Collection, LazyRelation};
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

/// Source name of assets tracked by Snyk projects.
const SNYK_SOURCE: &str = "snyk";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetAttributes {
    pub name: String,
    /// Asset class; `rank` 1 to 4 maps to business criticality.
    #[serde(rename = "class", default)]
    pub class: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub app_context: Option<AppContext>,
    #[serde(default)]
    pub browse_url: Option<String>,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub repository_freshness: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub issues_counts: Option<Value>,
    /// Organizations embedded in the asset, as `{id, name, ...}` stubs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub organizations: Vec<EmbeddedOrganization>,
}

/// Application catalog metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppContext {
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub catalog_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub lifecycle: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedOrganization {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Lifecycle stage from the asset's application context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Production,
    Development,
    Sandbox,
}

/// An inventory asset (repository, package or image).
#[derive(Debug, Serialize)]
pub struct Asset {
    pub id: String,
    /// Resource type, e.g. "repository".
    pub asset_type: String,
    pub group_id: Option<String>,
    #[serde(flatten)]
    pub attributes: AssetAttributes,
    #[serde(skip)]
    session: SessionRef,
    #[serde(skip)]
    projects: Option<LazyRelation<Project>>,
}

impl Asset {
    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    /// Whether Snyk itself is one of the asset's sources.
    pub fn is_snyk_sourced(&self) -> bool {
        self.attributes.sources.iter().any(|s| s == SNYK_SOURCE)
    }

    /// The projects relation, present only for Snyk-sourced assets that
    /// link their projects.
    pub fn projects_relation(&self) -> Option<&LazyRelation<Project>> {
        self.projects.as_ref()
    }

    /// Projects behind this asset; empty when there is no projects link.
    pub async fn projects(&self) -> Result<Collection<Project>> {
        match &self.projects {
            Some(relation) => relation.resolve().await,
            None => Ok(Arc::new(Vec::new())),
        }
    }

    /// Fetch every embedded organization concurrently.
    ///
    /// Stubs without an id are skipped. Assets not sourced from Snyk have no
    /// organizations.
    pub async fn organizations(&self) -> Result<Vec<Arc<Organization>>> {
        if !self.is_snyk_sourced() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = self
            .attributes
            .organizations
            .iter()
            .filter_map(|org| org.id.clone())
            .collect();
        debug!(asset = %self.id, count = ids.len(), "resolving embedded organizations");

        let session = self.session.upgrade()?;
        try_join_all(ids.into_iter().map(|id| Organization::get(&session, id))).await
    }

    /// Business criticality from the class rank.
    pub fn business_criticality(&self) -> Option<&'static str> {
        let rank = self.attributes.class.as_ref()?.get("rank")?;
        let rank = rank
            .as_i64()
            .or_else(|| rank.as_str().and_then(|s| s.trim().parse().ok()))?;
        match rank {
            1 => Some("critical"),
            2 => Some("high"),
            3 => Some("medium"),
            4 => Some("low"),
            _ => None,
        }
    }

    /// `(repository, owner)` from a GitHub browse URL.
    pub fn github_name_and_owner(&self) -> Option<(String, String)> {
        let url = Url::parse(self.attributes.browse_url.as_deref()?).ok()?;
        if !url.host_str()?.to_ascii_lowercase().contains("github.com") {
            return None;
        }
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let repo = segments.next()?;
        Some((repo.to_string(), owner.to_string()))
    }

    /// Lifecycle stage. Unrecognised values count as development.
    pub fn lifecycle(&self) -> Option<Lifecycle> {
        let lifecycle = self.attributes.app_context.as_ref()?.lifecycle.as_deref()?;
        Some(match lifecycle {
            "production" => Lifecycle::Production,
            "sandbox" => Lifecycle::Sandbox,
            _ => Lifecycle::Development,
        })
    }
}

impl Entity for Asset {
    const KIND: EntityKind = EntityKind::Asset;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let attributes: AssetAttributes = resource.attributes(Self::KIND)?;
        let snyk_sourced = attributes.sources.iter().any(|s| s == SNYK_SOURCE);

        let projects = resource
            .related_link("projects")
            .filter(|_| snyk_sourced)
            .map(|link| {
                LazyRelation::new(
                    session,
                    ParentRef::new(Self::KIND, &resource.id),
                    "projects",
                    session.link(link),
                )
            });

        Ok(Self {
            asset_type: resource.resource_type.clone(),
            group_id: parent
                .and_then(|p| p.id_of(EntityKind::Group))
                .map(str::to_string),
            session: session.downgrade(),
            projects,
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Asset {
    type Id = GroupScopedId;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!(
            "closed-beta/groups/{}/assets/{}",
            segment(&id.group_id),
            segment(&id.id)
        ));
        let parent = ParentRef::new(EntityKind::Group, &id.group_id);
        session.fetch_one(&id.id, request, Some(&parent)).await
    }
}
