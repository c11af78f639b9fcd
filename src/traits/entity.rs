//! The capability set every graph entity shares.

use crate::error::Result;
use crate::models::{EntityKind, ParentRef, Resource};
use crate::session::Session;

/// A typed domain object backed by one API resource.
///
/// Implementations must not perform I/O in
/// [`from_resource`](Self::from_resource): it runs under the
/// [`EntityCache`](crate::EntityCache) lock, and descendants are only ever
/// fetched through lazy relations.
pub trait Entity: Send + Sync + Sized + 'static {
    /// The kind this type is cached under.
    const KIND: EntityKind;

    /// The entity's identifier, unique within its kind.
    fn id(&self) -> &str;

    /// Build the entity from a resource.
    ///
    /// `parent` names the entity whose relation produced this resource, when
    /// there is one. It fills in parent references the payload omits.
    fn from_resource(session: &Session, resource: Resource, parent: Option<&ParentRef>)
        -> Result<Self>;
}
