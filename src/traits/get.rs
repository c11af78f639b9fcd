//! Get trait for fetching single entities.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::Session;
use crate::traits::Entity;

/// Fetch a single entity by ID.
///
/// Implementations consult the session's
/// [`EntityCache`](crate::EntityCache) first and only reach the network on
/// a miss, so repeated lookups of one id return the same instance.
///
/// # Example
///
/// ```ignore
/// use snyker::{Get, Organization, Session};
///
/// let session = Session::from_env()?;
/// let org = Organization::get(&session, "org-id".to_string()).await?;
/// ```
#[async_trait]
pub trait Get: Entity {
    /// The ID type for this entity (a plain id, or an id plus its scope).
    type Id: Send + Sync;

    /// Fetch the entity by ID.
    ///
    /// # Arguments
    ///
    /// * `session` - The session holding the client and entity cache
    /// * `id` - The entity identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found or the request fails.
    async fn get(session: &Session, id: Self::Id) -> Result<Arc<Self>>;
}
