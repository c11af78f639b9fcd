//! Snyk API client library.
//!
//! A Rust library for the Snyk REST API. Entities form a lazily loaded
//! graph: a [`Group`] owns [`Organization`]s, which own [`Project`]s,
//! [`Issue`]s and [`Policy`]s; groups also own inventory [`Asset`]s.
//! Descendants are fetched only when a relation is resolved.
//!
//! # Quick Start
//!
//! ```no_run
//! use snyker::{Group, Session};
//!
//! #[tokio::main]
//! async fn main() -> snyker::Result<()> {
//!     // Create a session from environment variables
//!     let session = Session::from_env()?;
//!
//!     // Find the group the token is scoped to
//!     let group = Group::discover(&session).await?;
//!
//!     // Walk organizations and their projects
//!     for org in group.organizations().resolve().await?.iter() {
//!         let projects = org.projects().resolve().await?;
//!         println!("{}: {} projects", org.name(), projects.len());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`SnykClient`] executes authenticated calls with retry, backoff and
//!   rate-limit handling, bounded by a worker pool.
//! - [`PageCursor`] walks `links.next` pagination one page at a time.
//! - [`EntityCache`] keeps one shared instance per `(kind, id)`.
//! - [`LazyRelation`] fetches a relation once, shares in-flight fetches
//!   between callers and caches the result until refreshed.
//! - [`Session`] bundles a client and a cache and is passed to every entity.
//!
//! Entities implement [`Entity`]; those fetchable by id also implement
//! [`Get`].
//!
//! # Configuration
//!
//! - `SNYK_TOKEN` (required) - API token
//! - `SNYK_API` (optional) - Base URL (defaults to `https://api.snyk.io`)
//!
//! Further settings come from [`ClientConfig`], optionally loaded from a
//! TOML file.

mod cache;
mod client;
mod config;
mod error;
mod models;
mod pagination;
mod relation;
mod retry;
mod session;
mod traits;

pub mod cli;
pub mod output;

// Re-export core types
pub use cache::EntityCache;
pub use client::{ApiResponse, RequestSpec, SnykClient};
pub use config::{ClientConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
pub use error::{Result, SnykError};
pub use pagination::{Cursor, Page, PageCursor};
pub use relation::{Collection, FilteredRelations, LazyRelation, RelationStatus};
pub use retry::RetryPolicy;
pub use session::Session;

// Re-export traits
pub use traits::{Entity, Get};

// Re-export models
pub use models::{
    // Graph plumbing
    EntityKind,
    GroupScopedId,
    OrgScopedId,
    ParentRef,
    Resource,
    // Group types
    Group,
    GroupAttributes,
    // Organization types
    Organization,
    OrganizationAttributes,
    Integration,
    // Project types
    Project,
    ProjectAttributes,
    ProjectTag,
    // Issue types
    Issue,
    IssueAttributes,
    IssueCoordinate,
    IssueProblem,
    IssueResolution,
    IssueSeverity,
    ScanItem,
    // Policy types
    ConditionsGroup,
    Policy,
    PolicyAction,
    PolicyActionData,
    PolicyAttributes,
    PolicyCondition,
    PolicyCreator,
    // Asset types
    AppContext,
    Asset,
    AssetAttributes,
    EmbeddedOrganization,
    Lifecycle,
    // Package URLs
    PackageUrl,
};
