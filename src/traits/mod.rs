//! Trait definitions shared by the entity types.
//!
//! Every entity implements [`Entity`], which ties it to an
//! [`EntityKind`](crate::EntityKind) and knows how to build it from a
//! JSON:API resource. Entities that can be fetched directly also implement
//! [`Get`].

mod entity;
mod get;

pub use entity::Entity;
pub use get::Get;
