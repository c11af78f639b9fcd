//! Lazy, memoizing one-to-many relations between entities.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use crate::client::RequestSpec;
use crate::error::{Result, SnykError};
use crate::models::ParentRef;
use crate::session::{Session, SessionRef};
use crate::traits::Entity;

/// The resolved members of a relation, in API order.
pub type Collection<E> = Arc<Vec<Arc<E>>>;

type Outcome<E> = std::result::Result<Collection<E>, Arc<SnykError>>;
type InFlight<E> = Shared<BoxFuture<'static, Outcome<E>>>;

/// Observable state of a [`LazyRelation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationStatus {
    /// Never resolved, or refreshed since.
    Unfetched,
    /// A fetch is in flight.
    Fetching,
    /// Members are cached.
    Fetched,
    /// The last fetch failed; the next resolve tries again.
    Failed,
}

enum State<E> {
    Unfetched,
    Fetching(InFlight<E>),
    Fetched(Collection<E>),
    Failed(Arc<SnykError>),
}

struct Slot<E> {
    generation: u64,
    state: State<E>,
}

struct Inner<E> {
    session: SessionRef,
    owner: ParentRef,
    name: &'static str,
    request: RequestSpec,
    slot: Mutex<Slot<E>>,
}

/// A deferred accessor for the children of one entity.
///
/// Nothing is fetched until [`resolve`](Self::resolve) is called. The first
/// call spawns a fetch that walks every page of the relation's list
/// endpoint; callers arriving while it runs await that same fetch. A
/// successful result is kept until [`refresh`](Self::refresh). A failure is
/// reported to every waiting caller and then forgotten, so the next call
/// tries again.
///
/// A relation does not keep its [`Session`] alive; resolving after the last
/// session is dropped fails with [`SnykError::SessionDropped`].
///
/// Clones share state.
pub struct LazyRelation<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for LazyRelation<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> std::fmt::Debug for LazyRelation<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyRelation")
            .field("owner", &self.inner.owner)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

impl<E: Entity> LazyRelation<E> {
    /// Bind a relation named `name` of `owner` to a list request.
    pub fn new(session: &Session, owner: ParentRef, name: &'static str, request: RequestSpec) -> Self {
        Self::bound(session.downgrade(), owner, name, request)
    }

    pub(crate) fn bound(
        session: SessionRef,
        owner: ParentRef,
        name: &'static str,
        request: RequestSpec,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                owner,
                name,
                request,
                slot: Mutex::new(Slot {
                    generation: 0,
                    state: State::Unfetched,
                }),
            }),
        }
    }

    /// The relation's name, e.g. `"projects"`.
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The entity this relation belongs to.
    pub fn owner(&self) -> &ParentRef {
        &self.inner.owner
    }

    /// The list request the relation fetches.
    pub fn request(&self) -> &RequestSpec {
        &self.inner.request
    }

    /// Current state.
    pub fn status(&self) -> RelationStatus {
        match self.inner.lock().state {
            State::Unfetched => RelationStatus::Unfetched,
            State::Fetching(_) => RelationStatus::Fetching,
            State::Fetched(_) => RelationStatus::Fetched,
            State::Failed(_) => RelationStatus::Failed,
        }
    }

    /// The cached members, without fetching.
    pub fn cached(&self) -> Option<Collection<E>> {
        match &self.inner.lock().state {
            State::Fetched(members) => Some(Arc::clone(members)),
            _ => None,
        }
    }

    /// Return the members, fetching them if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SnykError::RelationResolutionFailed`] wrapping the transport
    /// or pagination error. Concurrent callers of one fetch share the same
    /// wrapped error.
    pub async fn resolve(&self) -> Result<Collection<E>> {
        let pending = {
            let mut slot = self.inner.lock();
            let in_flight = match &slot.state {
                State::Fetched(members) => return Ok(Arc::clone(members)),
                State::Fetching(pending) => Some(pending.clone()),
                State::Unfetched | State::Failed(_) => None,
            };
            match in_flight {
                Some(pending) => pending,
                None => {
                    slot.generation += 1;
                    let pending = self.start(slot.generation);
                    slot.state = State::Fetching(pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(|source| SnykError::RelationResolutionFailed {
            owner: self.inner.owner.to_string(),
            relation: self.inner.name,
            source,
        })
    }

    /// Discard the cached members so the next resolve fetches again.
    ///
    /// Child entities stay in the entity cache. A fetch still in flight
    /// completes for its current waiters but is not stored.
    pub fn refresh(&self) {
        let mut slot = self.inner.lock();
        slot.generation += 1;
        slot.state = State::Unfetched;
        debug!(owner = %self.inner.owner, relation = self.inner.name, "relation refreshed");
    }

    /// Spawn the fetch so it finishes even if every caller stops waiting.
    fn start(&self, generation: u64) -> InFlight<E> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let outcome = inner.fetch().await.map_err(Arc::new);
            inner.settle(generation, &outcome);
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(Arc::new(SnykError::Join(e))))
        }
        .boxed()
        .shared()
    }
}

impl<E: Entity> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, Slot<E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[tracing::instrument(skip(self), fields(owner = %self.owner, relation = self.name))]
    async fn fetch(&self) -> Result<Collection<E>> {
        let session = self.session.upgrade()?;
        let mut pages = session.paginate(self.request.clone());
        let mut members = Vec::new();

        while let Some(page) = pages.next_page().await? {
            for value in page.items {
                members.push(session.materialize::<E>(value, Some(&self.owner))?);
            }
        }

        info!(count = members.len(), pages = pages.pages_fetched(), "relation resolved");
        Ok(Arc::new(members))
    }

    fn settle(&self, generation: u64, outcome: &Outcome<E>) {
        let mut slot = self.lock();
        if slot.generation != generation {
            return;
        }
        slot.state = match outcome {
            Ok(members) => State::Fetched(Arc::clone(members)),
            Err(e) => State::Failed(Arc::clone(e)),
        };
    }
}

/// Relations of one owner keyed by filter.
///
/// Each distinct request (path, query and body) gets its own
/// [`LazyRelation`], so different filters never share members.
pub struct FilteredRelations<E> {
    session: SessionRef,
    owner: ParentRef,
    name: &'static str,
    relations: Mutex<HashMap<String, LazyRelation<E>>>,
}

impl<E: Entity> std::fmt::Debug for FilteredRelations<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredRelations")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("filters", &self.len())
            .finish()
    }
}

impl<E: Entity> FilteredRelations<E> {
    /// An empty set of filtered relations named `name`.
    pub fn new(session: &Session, owner: ParentRef, name: &'static str) -> Self {
        Self {
            session: session.downgrade(),
            owner,
            name,
            relations: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, LazyRelation<E>>> {
        self.relations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The relation for `request`, created on first use.
    pub fn for_request(&self, request: RequestSpec) -> LazyRelation<E> {
        let key = filter_key(&request);
        self.lock()
            .entry(key)
            .or_insert_with(|| {
                LazyRelation::bound(self.session.clone(), self.owner.clone(), self.name, request)
            })
            .clone()
    }

    /// Refresh every filtered relation.
    pub fn refresh_all(&self) {
        for relation in self.lock().values() {
            relation.refresh();
        }
    }

    /// Number of distinct filters seen.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no filter has been used yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Order-insensitive identity of a request.
fn filter_key(request: &RequestSpec) -> String {
    let mut query = request.query.clone();
    query.sort();
    let query: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let body = request
        .body
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!("{} {}?{}#{}", request.method, request.path, query.join("&"), body)
}
