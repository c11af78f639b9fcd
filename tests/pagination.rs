//! Pagination tests: `links.next` traversal over mocked list endpoints.

use futures::TryStreamExt;
use serde_json::{json, Value};
use snyker::{ClientConfig, PageCursor, RequestSpec, SnykClient, SnykError};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> SnykClient {
    SnykClient::with_config(
        "test-token",
        ClientConfig {
            base_url: server.uri(),
            backoff_factor: 0.0,
            max_attempts: 2,
            page_size: 2,
            ..ClientConfig::default()
        },
    )
    .unwrap()
}

fn page(ids: &[&str], next: Option<&str>) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "type": "project", "attributes": {"name": id}}))
        .collect();
    match next {
        Some(next) => json!({"data": data, "links": {"next": next}}),
        None => json!({"data": data, "links": {}}),
    }
}

/// Mount `pages` on `list_path`; page N links to `?starting_after=cN`.
async fn mount_pages(server: &MockServer, list_path: &str, pages: &[&[&str]]) {
    for (n, ids) in pages.iter().enumerate().skip(1).rev() {
        let next = (n + 1 < pages.len()).then(|| format!("{list_path}?starting_after=c{n}&limit=2"));
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("starting_after", format!("c{}", n - 1)))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(ids, next.as_deref())))
            .expect(1)
            .mount(server)
            .await;
    }

    let next = (pages.len() > 1).then(|| format!("{list_path}?starting_after=c0&limit=2"));
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(pages[0], next.as_deref())))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_collects_every_page_in_order() {
    let server = MockServer::start().await;
    mount_pages(
        &server,
        "/rest/orgs/o1/projects",
        &[&["p1", "p2"], &["p3", "p4"], &["p5"]],
    )
    .await;

    let cursor = PageCursor::new(client(&server), RequestSpec::get("rest/orgs/o1/projects"));
    let items = cursor.collect_items().await.unwrap();

    let ids: Vec<&str> = items.iter().map(|i| i["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["p1", "p2", "p3", "p4", "p5"]);
}

#[tokio::test]
async fn test_page_numbers_and_exhaustion() {
    let server = MockServer::start().await;
    mount_pages(&server, "/rest/orgs/o1/projects", &[&["p1", "p2"], &["p3"]]).await;

    let mut cursor = PageCursor::new(client(&server), RequestSpec::get("rest/orgs/o1/projects"));
    assert!(cursor.request().has_query("limit"));

    let first = cursor.next_page().await.unwrap().unwrap();
    assert_eq!(first.number, 1);
    assert!(first.has_more());
    assert!(!cursor.is_exhausted());

    let second = cursor.next_page().await.unwrap().unwrap();
    assert_eq!(second.number, 2);
    assert_eq!(second.len(), 1);
    assert!(!second.has_more());
    assert!(cursor.is_exhausted());

    assert!(cursor.next_page().await.unwrap().is_none());
    assert_eq!(cursor.pages_fetched(), 2);
}

#[tokio::test]
async fn test_max_pages_stops_before_the_limit_is_exceeded() {
    let server = MockServer::start().await;
    let list_path = "/rest/orgs/o1/projects";
    Mock::given(method("GET"))
        .and(path(list_path))
        .and(query_param("starting_after", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["p5"], None)))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(list_path))
        .and(query_param("starting_after", "c0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["p3", "p4"],
            Some("/rest/orgs/o1/projects?starting_after=c1&limit=2"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["p1", "p2"],
            Some("/rest/orgs/o1/projects?starting_after=c0&limit=2"),
        )))
        .expect(2)
        .mount(&server)
        .await;

    let mut cursor =
        PageCursor::new(client(&server), RequestSpec::get("rest/orgs/o1/projects")).max_pages(2);

    let second = {
        cursor.next_page().await.unwrap().unwrap();
        cursor.next_page().await.unwrap().unwrap()
    };
    assert!(second.has_more(), "the API still reports a next page");
    assert!(cursor.next_page().await.unwrap().is_none());
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.pages_fetched(), 2);

    let items = PageCursor::new(client(&server), RequestSpec::get("rest/orgs/o1/projects"))
        .max_pages(1)
        .collect_items()
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_follow_up_keeps_base_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/orgs/o1/issues"))
        .and(query_param("starting_after", "c0"))
        .and(query_param("status", "open"))
        .and(query_param("version", "2024-10-15"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["i2"], None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/orgs/o1/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["i1"],
            Some("/rest/orgs/o1/issues?starting_after=c0"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestSpec::get("rest/orgs/o1/issues")
        .query("version", "2024-10-15")
        .query("status", "open");
    let items = PageCursor::new(client(&server), request)
        .collect_items()
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_post_body_only_on_first_page() {
    let server = MockServer::start().await;
    let search = json!({"query": {"type": "repository"}});

    Mock::given(method("POST"))
        .and(path("/closed-beta/groups/g1/assets/search"))
        .and(body_json(&search))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["a1"],
            Some("/closed-beta/groups/g1/assets/search?starting_after=c0"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/closed-beta/groups/g1/assets/search"))
        .and(query_param("starting_after", "c0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["a2"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestSpec::post("closed-beta/groups/g1/assets/search", search.clone());
    let items = PageCursor::new(client(&server), request)
        .collect_items()
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_error_mid_sequence_propagates_after_earlier_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/groups/g1/orgs"))
        .and(query_param("starting_after", "c0"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/groups/g1/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["o1", "o2"],
            Some("/rest/groups/g1/orgs?starting_after=c0"),
        )))
        .mount(&server)
        .await;

    let cursor = PageCursor::new(client(&server), RequestSpec::get("rest/groups/g1/orgs"));
    let results: Vec<_> = futures::StreamExt::collect(cursor.into_stream()).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().len(), 2);
    assert!(matches!(results[1], Err(SnykError::Forbidden(_))));
}

#[tokio::test]
async fn test_stream_stops_on_first_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let cursor = PageCursor::new(client(&server), RequestSpec::get("rest/orgs/missing/projects"));
    let err = cursor
        .into_stream()
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_repeated_next_link_is_a_pagination_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/orgs/o1/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["p1"],
            Some("/rest/orgs/o1/projects?starting_after=stuck"),
        )))
        .mount(&server)
        .await;

    let err = PageCursor::new(client(&server), RequestSpec::get("rest/orgs/o1/projects"))
        .collect_items()
        .await
        .unwrap_err();

    match err {
        SnykError::PaginationError { page, reason, .. } => {
            assert_eq!(page, 2);
            assert!(reason.contains("repeats"));
        }
        other => panic!("expected PaginationError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_payloads_are_pagination_errors() {
    for payload in [
        json!({"data": {"id": "not-a-list"}}),
        json!({"links": {}}),
        json!({"data": [], "links": {"next": 42}}),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&payload))
            .mount(&server)
            .await;

        let mut cursor = PageCursor::new(client(&server), RequestSpec::get("rest/groups"));
        let err = cursor.next_page().await.unwrap_err();
        assert!(
            matches!(err, SnykError::PaginationError { page: 1, .. }),
            "{payload} gave {err:?}"
        );
        assert!(cursor.is_exhausted());
    }
}

#[tokio::test]
async fn test_empty_or_null_next_ends_sequence() {
    for links in [json!({"next": null}), json!({"next": ""}), Value::Null] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "x"}], "links": links})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let items = PageCursor::new(client(&server), RequestSpec::get("rest/groups"))
            .collect_items()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }
}
