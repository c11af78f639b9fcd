//! Policy model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{segment, EntityKind, OrgScopedId, Organization, ParentRef, Resource};
use crate::session::{Session, SessionRef};
use crate::traits::{Entity, Get};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "actionType")]
    pub action_type: Option<String>,
    #[serde(default)]
    pub action: Option<PolicyAction>,
    #[serde(default, alias = "conditionsGroup")]
    pub conditions_group: Option<ConditionsGroup>,
    #[serde(default, alias = "createdBy")]
    pub created_by: Option<PolicyCreator>,
    #[serde(default)]
    pub review: Option<Value>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAction {
    #[serde(default)]
    pub data: Option<PolicyActionData>,
}

/// Details of an ignore action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyActionData {
    #[serde(default, alias = "ignoreType")]
    pub ignore_type: Option<String>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Conditions joined by a logical operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionsGroup {
    #[serde(default, alias = "logicalOperator")]
    pub logical_operator: Option<String>,
    /// A single condition object is accepted as a one-element list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub conditions: Vec<PolicyCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCondition {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyCreator {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<PolicyCondition>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<PolicyCondition>),
        One(PolicyCondition),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::Many(conditions)) => conditions,
        Some(OneOrMany::One(condition)) => vec![condition],
        None => Vec::new(),
    })
}

/// An organization policy, such as an ignore rule.
#[derive(Debug, Serialize)]
pub struct Policy {
    pub id: String,
    pub org_id: Option<String>,
    #[serde(flatten)]
    pub attributes: PolicyAttributes,
    #[serde(skip)]
    session: SessionRef,
}

impl Policy {
    pub fn name(&self) -> Option<&str> {
        self.attributes.name.as_deref()
    }

    fn action_data(&self) -> Option<&PolicyActionData> {
        self.attributes.action.as_ref()?.data.as_ref()
    }

    pub fn ignore_type(&self) -> Option<&str> {
        self.action_data()?.ignore_type.as_deref()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.action_data()?.expires
    }

    pub fn reason(&self) -> Option<&str> {
        self.action_data()?.reason.as_deref()
    }

    pub fn created_by_name(&self) -> Option<&str> {
        self.attributes.created_by.as_ref()?.name.as_deref()
    }

    pub fn conditions(&self) -> &[PolicyCondition] {
        self.attributes
            .conditions_group
            .as_ref()
            .map(|group| group.conditions.as_slice())
            .unwrap_or_default()
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

impl Entity for Policy {
    const KIND: EntityKind = EntityKind::Policy;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_resource(
        session: &Session,
        resource: Resource,
        parent: Option<&ParentRef>,
    ) -> Result<Self> {
        let attributes = resource.attributes(Self::KIND)?;
        let org_id = resource
            .related_id("organization")
            .or_else(|| parent.and_then(ParentRef::org_id))
            .map(str::to_string);

        Ok(Self {
            session: session.downgrade(),
            org_id,
            id: resource.id,
            attributes,
        })
    }
}

#[async_trait]
impl Get for Policy {
    type Id = OrgScopedId;

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>> {
        let request = session.rest(format!(
            "rest/orgs/{}/policies/{}",
            segment(&id.org_id),
            segment(&id.id)
        ));
        let parent = ParentRef::new(EntityKind::Organization, &id.org_id);
        session.fetch_one(&id.id, request, Some(&parent)).await
    }
}
