//! PostgREST client tests against a mock HTTP server.

use serde_json::json;
use supabase_clone::{PostgrestStore, Predicate, RemoteErrorKind, RemoteStore, StoreConfig};
use wiremock::matchers::{body_json, header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> PostgrestStore {
    PostgrestStore::new("destination", &StoreConfig::new(server.uri(), "service-key")).unwrap()
}

fn row(value: serde_json::Value) -> supabase_clone::Row {
    value.as_object().cloned().unwrap()
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_count_reads_content_range_total() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/farms"))
        .and(header("prefer", "count=exact"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-49/1234"))
        .expect(1)
        .mount(&server)
        .await;

    let total = store(&server).count("farms", None).await.unwrap();
    assert_eq!(total, Some(1234));
}

#[tokio::test]
async fn test_count_without_total_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/farms"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-49/*"))
        .mount(&server)
        .await;

    assert_eq!(store(&server).count("farms", None).await.unwrap(), None);
}

#[tokio::test]
async fn test_count_with_filter() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/rest/v1/farms"))
        .and(query_param("id", "neq.0"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "*/7"))
        .expect(1)
        .mount(&server)
        .await;

    let filter = Predicate::not_equal("id", 0);
    assert_eq!(store(&server).count("farms", Some(&filter)).await.unwrap(), Some(7));
}

#[tokio::test]
async fn test_select_page_sends_offset_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/farms"))
        .and(query_param("select", "*"))
        .and(query_param("offset", "50"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 51, "name": "North", "area": 1.5},
            {"id": 52, "name": "South", "area": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = store(&server).select_page("farms", 50, 50).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("North"));
    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["id", "name", "area"]);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/farms"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = store(&server).select_page("farms", 0, 50).await.unwrap_err();
    assert_eq!(err.remote_kind(), RemoteErrorKind::Transient);
    assert!(err.to_string().contains("upstream unavailable"));
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_insert_posts_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/farms"))
        .and(header("prefer", "return=minimal"))
        .and(body_json(json!([{"id": 1, "name": "North"}])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .insert("farms", &[row(json!({"id": 1, "name": "North"}))])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_duplicate_key_is_unique_violation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/farms"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint \"farms_pkey\"",
            "details": "Key (id)=(1) already exists.",
            "hint": null
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .insert("farms", &[row(json!({"id": 1}))])
        .await
        .unwrap_err();

    assert!(err.is_unique_violation());
    let remote = err.remote().unwrap();
    assert_eq!(remote.code.as_deref(), Some("23505"));
    assert_eq!(remote.status, Some(409));
    assert_eq!(remote.details.as_deref(), Some("Key (id)=(1) already exists."));
}

#[tokio::test]
async fn test_upsert_names_conflict_column() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/farms"))
        .and(query_param("on_conflict", "uuid"))
        .and(headers("prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .upsert("farms", &[row(json!({"uuid": "a", "name": "North"}))], "uuid")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_sends_filter() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/farms"))
        .and(query_param("created_at", "gte.1970-01-01"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store(&server)
        .delete("farms", &Predicate::greater_or_equal("created_at", "1970-01-01"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_on_missing_column_is_invalid_predicate() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/farms"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "42703",
            "message": "column farms.id does not exist"
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .delete("farms", &Predicate::not_equal("id", 0))
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), RemoteErrorKind::InvalidPredicate);
}

// =============================================================================
// Existence and Catalog
// =============================================================================

#[tokio::test]
async fn test_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/farms"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "42P01",
            "message": "relation \"public.ghost\" does not exist"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store(&server);
    assert!(store.exists("farms").await.unwrap());
    assert!(!store.exists("ghost").await.unwrap());
    assert!(store.exists("flaky").await.is_err());
}

#[tokio::test]
async fn test_catalog_columns_via_rpc() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_table_definition"))
        .and(body_json(json!({"table_name": "farms"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"column_name": "id", "data_type": "bigint", "udt_name": "int8"},
            {"column_name": "area", "data_type": "numeric", "udt_name": "numeric",
             "numeric_precision": 10, "numeric_scale": 2},
            {"column_name": "tags", "data_type": "ARRAY", "udt_name": "_text"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let columns = store(&server).catalog_columns("farms").await.unwrap();
    assert_eq!(columns.len(), 3);
    assert_eq!(columns[1].column_name, "area");
    assert_eq!(columns[1].numeric_precision, Some(10));
    assert_eq!(columns[2].udt_name.as_deref(), Some("_text"));
}

#[tokio::test]
async fn test_missing_catalog_function_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/get_table_definition"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": "PGRST202",
            "message": "Could not find the function public.get_table_definition(table_name) in the schema cache"
        })))
        .mount(&server)
        .await;

    let err = store(&server).catalog_columns("farms").await.unwrap_err();
    assert_eq!(err.remote_kind(), RemoteErrorKind::NotFound);
}

#[tokio::test]
async fn test_information_schema_columns_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/columns"))
        .and(header("accept-profile", "information_schema"))
        .and(query_param("table_schema", "eq.public"))
        .and(query_param("table_name", "eq.farms"))
        .and(query_param("order", "ordinal_position"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"column_name": "id", "data_type": "bigint", "udt_name": "int8",
             "numeric_precision": 64, "numeric_scale": 0},
            {"column_name": "name", "data_type": "text", "udt_name": "text",
             "numeric_precision": null, "numeric_scale": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let columns = store(&server).information_schema_columns("farms").await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.column_name.as_str()).collect();
    assert_eq!(names, vec!["id", "name"]);
    assert_eq!(columns[1].numeric_precision, None);
}
