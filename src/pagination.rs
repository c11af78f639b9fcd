//! Cursor pagination for Snyk list endpoints.
//!
//! List responses carry their items under `data` and a `links.next` link
//! pointing at the following page. A [`PageCursor`] follows those links one
//! page at a time.

use futures::stream::{self, Stream};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::{RequestSpec, SnykClient};
use crate::error::{Result, SnykError};

/// A page of results from the Snyk API.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Page number within this sequence (1-indexed).
    pub number: u32,
    /// The items on this page, in API order.
    pub items: Vec<T>,
    /// Cursor for the following page, if any.
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// Whether there are more pages.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }

    /// Map the items to a different type.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            number: self.number,
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
        }
    }

    /// Returns true if this page has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns an iterator over the items in this page.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Opaque position in a page sequence: the API's `next` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    /// The raw link.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Forward-only iterator over the pages of one list request.
///
/// Each call to [`next_page`](Self::next_page) issues exactly one transport
/// call. Errors are returned on the page where they happen; the cursor is
/// exhausted afterwards. Build a new cursor to start over from page one.
#[derive(Debug)]
pub struct PageCursor {
    client: SnykClient,
    base: RequestSpec,
    cursor: Option<Cursor>,
    pages: u32,
    max_pages: Option<u32>,
    exhausted: bool,
}

impl PageCursor {
    /// Create a cursor for `request`, adding the configured `version` and
    /// `limit` unless the request already has them.
    pub fn new(client: SnykClient, mut request: RequestSpec) -> Self {
        if !request.has_query("version") {
            request = request.query("version", client.config().api_version.clone());
        }
        let base = if request.has_query("limit") {
            request
        } else {
            let limit = client.config().page_size.to_string();
            request.query("limit", limit)
        };

        Self {
            client,
            base,
            cursor: None,
            pages: 0,
            max_pages: None,
            exhausted: false,
        }
    }

    /// Stop after `max` pages even if the API reports more.
    #[must_use]
    pub fn max_pages(mut self, max: u32) -> Self {
        self.max_pages = Some(max);
        self
    }

    /// The first-page request.
    pub fn request(&self) -> &RequestSpec {
        &self.base
    }

    /// Whether the sequence has ended.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Pages requested so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// Fetch the next page, or `None` once the API reports no further pages.
    #[tracing::instrument(skip(self), fields(path = %self.base.path, page = self.pages + 1))]
    pub async fn next_page(&mut self) -> Result<Option<Page<Value>>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.pages >= max) {
            debug!(max_pages = self.pages, "page limit reached");
            self.exhausted = true;
            return Ok(None);
        }

        let request = match &self.cursor {
            None => self.base.clone(),
            Some(cursor) => match self.follow(cursor) {
                Ok(request) => request,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            },
        };

        self.pages += 1;
        let result = self.client.send(&request).await.and_then(|response| {
            parse_page(&response.payload)
                .map_err(|reason| self.pagination_error(reason))
        });

        let (items, next) = match result {
            Ok(parsed) => parsed,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        let next = match next {
            Some(link) if self.cursor.as_ref().is_some_and(|c| c.as_str() == link) => {
                self.exhausted = true;
                return Err(self.pagination_error(format!("next link repeats current page: {link}")));
            }
            Some(link) => Some(Cursor(link)),
            None => None,
        };

        debug!(items = items.len(), has_more = next.is_some(), "received page");

        self.exhausted = next.is_none();
        self.cursor = next.clone();

        Ok(Some(Page {
            number: self.pages,
            items,
            next,
        }))
    }

    /// Drive the cursor as a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page<Value>>> + Send {
        stream::unfold(self, |mut cursor| async move {
            match cursor.next_page().await {
                Ok(Some(page)) => Some((Ok(page), cursor)),
                Ok(None) => None,
                Err(e) => Some((Err(e), cursor)),
            }
        })
    }

    /// Fetch every remaining page and flatten the items.
    pub async fn collect_items(mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }

    /// Build the request for a `next` link: its own query merged over the
    /// base query. Only the first page carries a body.
    fn follow(&self, cursor: &Cursor) -> Result<RequestSpec> {
        let url = self.client.base_url().join(cursor.as_str())?;

        let mut query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        for (key, value) in &self.base.query {
            if !query.iter().any(|(k, _)| k == key) {
                query.push((key.clone(), value.clone()));
            }
        }

        let mut target = url;
        target.set_query(None);
        target.set_fragment(None);

        Ok(RequestSpec {
            method: Method::GET,
            path: target.to_string(),
            query,
            body: None,
        })
    }

    fn pagination_error(&self, reason: String) -> SnykError {
        SnykError::PaginationError {
            path: self.base.path.clone(),
            page: self.pages,
            reason,
        }
    }
}

/// Split a list payload into its items and the raw `next` link.
fn parse_page(payload: &Value) -> std::result::Result<(Vec<Value>, Option<String>), String> {
    let items = match payload.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => return Err(format!("expected data array, found {}", type_name(other))),
        None => return Err("response has no data member".to_string()),
    };

    let next = match payload.get("links") {
        None | Some(Value::Null) => None,
        Some(Value::Object(links)) => match links.get("next") {
            None | Some(Value::Null) => None,
            Some(Value::String(link)) if link.trim().is_empty() => None,
            Some(Value::String(link)) => Some(link.clone()),
            Some(Value::Object(link)) => match link.get("href") {
                Some(Value::String(href)) if !href.trim().is_empty() => Some(href.clone()),
                _ => return Err("next link object has no href".to_string()),
            },
            Some(other) => return Err(format!("next link is a {}", type_name(other))),
        },
        Some(other) => return Err(format!("links member is a {}", type_name(other))),
    };

    Ok((items, next))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
