//! Group model: the root of the entity graph.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, SnykError};
use crate::models::{
    segment, Asset, EntityKind, GroupScopedId, Issue, Organization, ParentRef, Project, Resource,
};
use crate::relation::{FilteredRelations, LazyRelation};
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

/// Group attributes as returned by `rest/groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAttributes {
    pub name: String,
}

/// A Snyk group.
///
/// Groups own organizations and assets, and expose a group-wide issue
/// listing. Building a group fetches nothing beneath it: every relation
/// waits for an explicit `resolve()`.
#[derive(Debug, Serialize)]
pub struct Group {
    pub id: String,
    #[serde(flatten)]
    pub attributes: GroupAttributes,
    #[serde(skip)]
    session: SessionRef,
    #[serde(skip)]
    organizations: LazyRelation<Organization>,
    #[serde(skip)]
    issues: LazyRelation<Issue>,
    #[serde(skip)]
    assets: FilteredRelations<Asset>,
}

impl Group {
    /// Find the single group visible to the session's token.
    ///
    /// # Errors
    ///
    /// - [`SnykError::NotFound`] if the token sees no group
    /// - [`SnykError::AmbiguousScope`] if it sees more than one
    #[tracing::instrument(skip(session))]
    pub async fn discover(session: &Session) -> Result<Arc<Self>> {
        let mut groups = session
            .paginate(session.rest("rest/groups"))
            .collect_items()
            .await?;

        match groups.len() {
            0 => Err(SnykError::NotFound(
                "no groups are visible to this token".to_string(),
            )),
            1 => {
                let group: Arc<Self> = session.materialize(groups.remove(0), None)?;
                info!(group = %group.id, name = %group.name(), "discovered group");
                Ok(group)
            }
            count => Err(SnykError::AmbiguousScope {
                count,
                names: groups.iter().map(display_name).collect(),
            }),
        }
    }

    /// Use `id` if given, otherwise discover the token's group.
    pub async fn get_or_discover(session: &Session, id: Option<String>) -> Result<Arc<Self>> {
        match id {
            Some(id) => Self::get(session, id).await,
            None => Self::discover(session).await,
        }
    }

    pub fn name(&self) -> &str {
        &self.attributes.name
    }

    pub fn parent_ref(&self) -> ParentRef {
        ParentRef::new(EntityKind::Group, &self.id)
    }

    /// Organizations in this group.
    pub fn organizations(&self) -> &LazyRelation<Organization> {
        &self.organizations
    }

    /// Issues across every organization in the group.
    pub fn issues(&self) -> &LazyRelation<Issue> {
        &self.issues
    }

    /// Assets matching a search body, e.g.
    /// `{"query": {"attributes": {"operator": "and", "values": [...]}}}`.
    ///
    /// Each distinct body is cached separately.
    pub fn assets(&self, query: Value) -> LazyRelation<Asset> {
        let path = format!("closed-beta/groups/{}/assets/search", segment(&self.id));
        self.assets.for_request(self.session.rest_post(path, query))
    }

    /// Every asset search made through this group.
    pub fn asset_searches(&self) -> &FilteredRelations<Asset> {
        &self.assets
    }

    /// Fetch one organization of this group.
    pub async fn organization(&self, org_id: &str) -> Result<Arc<Organization>> {
        Organization::get(&self.session.upgrade()?, org_id.to_string()).await
    }

    /// Fetch one asset of this group.
    pub async fn asset(&self, asset_id: &str) -> Result<Arc<Asset>> {
        Asset::get(&self.session.upgrade()?, GroupScopedId::new(&self.id, asset_id)).await
    }

    /// Projects of every organization, fetched concurrently.
    pub async fn projects(&self) -> Result<Vec<Arc<Project>>> {
        let orgs = self.organizations.resolve().await?;
        let per_org = try_join_all(orgs.iter().map(|org| org.projects().resolve())).await?;
        Ok(per_org
            .iter()
            .flat_map(|projects| projects.iter().cloned())
            .collect())
    }

    /// Forget every resolved relation.
    pub fn refresh(&self) {
        self.organizations.refresh();
        self.issues.refresh();
        self.assets.refresh_all();
    }
}

fn display_name(group: &Value) -> String {
    group
        .pointer("/attributes/name")
        .or_else(|| group.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

impl Entity for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        _parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let attributes: GroupAttributes = resource.attributes(Self::KIND)?;
        let owner = ParentRef::new(Self::KIND, &resource.id);
        let id = segment(&resource.id).into_owned();

        Ok(Self {
            organizations: LazyRelation::new(
                session,
                owner.clone(),
                "organizations",
                session.rest(format!("rest/groups/{id}/orgs")),
            ),
            issues: LazyRelation::new(
                session,
                owner.clone(),
                "issues",
                session.rest(format!("rest/groups/{id}/issues")),
            ),
            assets: FilteredRelations::new(session, owner, "assets"),
            session: session.downgrade(),
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Group {
    type Id = String;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!("rest/groups/{}", segment(&id)));
        session.fetch_one(&id, request, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SnykClient;
    use crate::relation::RelationStatus;
    use serde_json::json;

    fn session() -> Session {
        Session::new(SnykClient::new("token", "http://localhost:1").unwrap())
    }

    #[test]
    fn test_construction_leaves_relations_unfetched() {
        let session = session();
        let group: Arc<Group> = session
            .materialize(json!({"id": "g1", "attributes": {"name": "Acme"}}), None)
            .unwrap();

        assert_eq!(group.name(), "Acme");
        assert_eq!(group.organizations().status(), RelationStatus::Unfetched);
        assert_eq!(group.issues().request().path, "rest/groups/g1/issues");
        assert!(group.asset_searches().is_empty());
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let err = session()
            .materialize::<Group>(json!({"id": "g1", "attributes": {}}), None)
            .unwrap_err();
        assert!(matches!(err, SnykError::InvalidResource { kind: EntityKind::Group, .. }));
    }

    #[test]
    fn test_distinct_asset_queries_get_distinct_relations() {
        let session = session();
        let group: Arc<Group> = session
            .materialize(json!({"id": "g1", "attributes": {"name": "Acme"}}), None)
            .unwrap();

        group.assets(json!({"query": {"type": "repository"}}));
        group.assets(json!({"query": {"type": "image"}}));
        group.assets(json!({"query": {"type": "repository"}}));
        assert_eq!(group.asset_searches().len(), 2);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(display_name(&json!({"id": "g2"})), "g2");
        assert_eq!(display_name(&json!({"id": "g2", "attributes": {"name": "B"}})), "B");
    }
}
