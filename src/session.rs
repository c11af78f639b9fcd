//! The context object threaded through the entity graph.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::cache::EntityCache;
use crate::client::{RequestSpec, SnykClient};
use crate::config::ClientConfig;
use crate::error::{Result, SnykError};
use crate::models::{ParentRef, Resource};
use crate::pagination::PageCursor;
use crate::traits::Entity;

/// A client paired with the entity cache its graph shares.
///
/// A `Session` owns the cache. Clones share both the connection/worker pools
/// and the cache; the cache and every entity in it are dropped with the last
/// clone. Entities only keep a [`SessionRef`], so keep a `Session` alive for
/// as long as you traverse the graph.
#[derive(Debug, Clone)]
pub struct Session {
    client: SnykClient,
    cache: Arc<EntityCache>,
}

impl Session {
    /// Start a session with an empty cache.
    pub fn new(client: SnykClient) -> Self {
        Self::with_cache(client, Arc::new(EntityCache::new()))
    }

    /// Start a session that shares an existing cache.
    pub fn with_cache(client: SnykClient, cache: Arc<EntityCache>) -> Self {
        Self { client, cache }
    }

    /// Start a session from `SNYK_TOKEN` / `SNYK_API`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SnykClient::from_env()?))
    }

    /// Start a session from `SNYK_TOKEN` and explicit settings.
    pub fn from_env_with_config(config: ClientConfig) -> Result<Self> {
        Ok(Self::new(SnykClient::from_env_with_config(config)?))
    }

    /// The transport.
    pub fn client(&self) -> &SnykClient {
        &self.client
    }

    /// The entity cache.
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// A `GET` for a REST path with the configured `version` parameter.
    pub fn rest(&self, path: impl Into<String>) -> RequestSpec {
        versioned(&self.client, RequestSpec::get(path))
    }

    /// A `POST` for a REST path with the configured `version` parameter.
    pub fn rest_post(&self, path: impl Into<String>, body: Value) -> RequestSpec {
        versioned(&self.client, RequestSpec::post(path, body))
    }

    /// A `GET` for a link taken from a payload, which may carry its own
    /// query string. The configured `version` is added if the link has none.
    pub fn link(&self, link: &str) -> RequestSpec {
        link_request(&self.client, link)
    }

    /// A page cursor over `request`.
    pub fn paginate(&self, request: RequestSpec) -> PageCursor {
        PageCursor::new(self.client.clone(), request)
    }

    /// Shut down the client's worker pool and drop every cached entity.
    pub fn close(&self) {
        self.client.close();
        self.cache.invalidate_all();
    }

    /// A handle that does not keep the cache alive.
    pub(crate) fn downgrade(&self) -> SessionRef {
        SessionRef {
            client: self.client.clone(),
            cache: Arc::downgrade(&self.cache),
        }
    }

    /// Turn one resource object into the shared entity instance.
    pub(crate) fn materialize<E: Entity>(
        &self,
        value: Value,
        parent: Option<&ParentRef>,
    ) -> Result<Arc<E>> {
        let resource = Resource::from_value(E::KIND, value)?;
        let id = resource.id.clone();
        self.cache
            .get_or_create(&id, || E::from_resource(self, resource, parent))
    }

    /// Fetch a single resource unless it is already cached.
    pub(crate) async fn fetch_one<E: Entity>(
        &self,
        id: &str,
        request: RequestSpec,
        parent: Option<&ParentRef>,
    ) -> Result<Arc<E>> {
        if let Some(cached) = self.cache.get::<E>(id) {
            tracing::debug!(kind = %E::KIND, id, "cache hit");
            return Ok(cached);
        }

        let response = self.client.send(&request).await?;
        let data = response.data().clone();
        if data.is_null() {
            return Err(SnykError::InvalidResource {
                kind: E::KIND,
                id: id.to_string(),
                reason: "response has no data member".to_string(),
            });
        }
        self.materialize(data, parent)
    }
}

/// The session as seen from inside the graph.
///
/// The cache owns every entity, so entities and relations hold the cache
/// weakly. Anything that reads or fills the cache goes through
/// [`upgrade`](Self::upgrade).
#[derive(Debug, Clone)]
pub(crate) struct SessionRef {
    client: SnykClient,
    cache: Weak<EntityCache>,
}

impl SessionRef {
    /// The owning session, or [`SnykError::SessionDropped`].
    pub(crate) fn upgrade(&self) -> Result<Session> {
        let cache = self.cache.upgrade().ok_or(SnykError::SessionDropped)?;
        Ok(Session::with_cache(self.client.clone(), cache))
    }

    pub(crate) fn rest(&self, path: impl Into<String>) -> RequestSpec {
        versioned(&self.client, RequestSpec::get(path))
    }

    pub(crate) fn rest_post(&self, path: impl Into<String>, body: Value) -> RequestSpec {
        versioned(&self.client, RequestSpec::post(path, body))
    }
}

fn versioned(client: &SnykClient, request: RequestSpec) -> RequestSpec {
    if request.has_query("version") {
        request
    } else {
        request.query("version", client.config().api_version.clone())
    }
}

fn link_request(client: &SnykClient, link: &str) -> RequestSpec {
    let (path, query) = link.split_once('?').unwrap_or((link, ""));
    let request = RequestSpec::get(path)
        .extend_query(url::form_urlencoded::parse(query.as_bytes()).into_owned());
    versioned(client, request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SnykClient::new("token", "http://localhost:1").unwrap())
    }

    #[test]
    fn test_link_keeps_its_own_version() {
        let request = session().link("/closed-beta/groups/g/assets/a/projects?version=2024-10-15~beta&limit=5");
        assert_eq!(request.path, "/closed-beta/groups/g/assets/a/projects");
        assert_eq!(
            request.query,
            vec![
                ("version".to_string(), "2024-10-15~beta".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );

        let request = session().link("/rest/orgs/o/projects");
        assert!(request.has_query("version"));
    }

    #[test]
    fn test_ref_upgrades_while_a_session_lives() {
        let session = session();
        let handle = session.downgrade();

        let upgraded = handle.upgrade().unwrap();
        assert!(std::ptr::eq(upgraded.cache(), session.cache()));

        drop(upgraded);
        drop(session);
        assert!(matches!(handle.upgrade(), Err(SnykError::SessionDropped)));
    }

    #[test]
    fn test_ref_builds_versioned_requests_after_drop() {
        let handle = session().downgrade();
        let request = handle.rest("rest/orgs/o");
        assert!(request.has_query("version"));
    }
}
