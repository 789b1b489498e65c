//! HTTP store tests against a mock content API.

use refsync::core::types::{Document, DocumentId};
use refsync::store::http::HttpStore;
use refsync::store::{DocumentStore, Filter, Patch, StoreError};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY_PATH: &str = "/v1/data/query/production";
const MUTATE_PATH: &str = "/v1/data/mutate/production";

fn id(s: &str) -> DocumentId {
    DocumentId::new(s).unwrap()
}

fn store(server: &MockServer, token: Option<&str>) -> HttpStore {
    HttpStore::with_api_base(
        format!("{}/v1", server.uri()),
        "production",
        token.map(str::to_string),
    )
}

#[tokio::test]
async fn get_returns_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("query", "*[_id == $id][0]"))
        .and(query_param("$id", "\"artist-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "_id": "artist-1", "_type": "artist", "name": "Nina" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let doc = store(&server, None).get(&id("artist-1")).await.unwrap().unwrap();
    assert_eq!(doc.doc_type, "artist");
    assert_eq!(doc.field("name"), Some(&json!("Nina")));
}

#[tokio::test]
async fn get_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .mount(&server)
        .await;

    assert_eq!(store(&server, None).get(&id("nope")).await.unwrap(), None);
}

#[tokio::test]
async fn fetch_sends_reference_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("$type", "\"event\""))
        .and(query_param("$ref", "\"artist-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                { "_id": "e1", "_type": "event", "artist": [{ "_type": "reference", "_ref": "artist-1", "_key": "k1" }] }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filter = Filter::of_type("event").referencing("artist", &id("artist-1"));
    let docs = store(&server, None).fetch(&filter).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].references("artist", &id("artist-1")));
}

#[tokio::test]
async fn patch_posts_mutations_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MUTATE_PATH))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({
            "mutations": [
                { "patch": { "id": "e1", "unset": ["artist"] } }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let patch = Patch::new(id("e1")).unset("artist");
    store(&server, Some("secret")).patch(patch).await.unwrap();
}

#[tokio::test]
async fn publish_replaces_published_and_deletes_draft() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(query_param("$id", "\"drafts.artist-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "_id": "drafts.artist-1", "_type": "artist", "_rev": "r1", "name": "Nina" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MUTATE_PATH))
        .and(body_json(json!({
            "mutations": [
                { "createOrReplace": { "_id": "artist-1", "_type": "artist", "name": "Nina" } },
                { "delete": { "id": "drafts.artist-1" } }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, Some("secret"))
        .publish(&id("artist-1"))
        .await
        .unwrap();
}

#[tokio::test]
async fn publish_without_draft_is_nothing_to_publish() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": null })))
        .mount(&server)
        .await;

    let result = store(&server, Some("secret")).publish(&id("artist-1")).await;
    assert!(matches!(result, Err(StoreError::NothingToPublish(_))));
}

#[tokio::test]
async fn status_codes_map_to_errors() {
    let cases = [
        (401, json!({})),
        (403, json!({ "error": { "description": "no write access" } })),
        (409, json!({ "error": { "description": "revision mismatch" } })),
        (429, json!({})),
        (503, json!({ "message": "maintenance" })),
    ];

    for (status, body) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MUTATE_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        let err = store(&server, Some("secret"))
            .delete(&id("a"))
            .await
            .unwrap_err();
        match status {
            401 => assert!(matches!(err, StoreError::AuthFailed(_))),
            403 => assert_eq!(
                err,
                StoreError::AuthFailed("Permission denied: no write access".into())
            ),
            409 => assert_eq!(err, StoreError::Conflict("revision mismatch".into())),
            429 => assert_eq!(err, StoreError::RateLimited),
            _ => assert!(matches!(err, StoreError::ApiError { status: 503, .. })),
        }
    }
}

#[tokio::test]
async fn fetch_decodes_serialized_documents() {
    let server = MockServer::start().await;
    let event = Document::new(id("e1"), "event").with_references("artist", &[&id("artist-1")]);
    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "result": [event.clone()] })),
        )
        .mount(&server)
        .await;

    let docs = store(&server, None)
        .fetch(&Filter::of_type("event"))
        .await
        .unwrap();
    assert_eq!(docs, vec![event]);
}
