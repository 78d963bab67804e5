// Tool listing and HTTP surface tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use dbmeta_catalog::InMemoryCatalog;
use dbmeta_core::LimitsConfig;
use dbmeta_server::{MetadataServer, ToolDispatcher, create_router, mcp_tools, tool_definitions};
use dbmeta_telemetry::NoopAuditSink;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn server(catalog: InMemoryCatalog) -> MetadataServer {
    let dispatcher = ToolDispatcher::from_config(
        &LimitsConfig::default(),
        Arc::new(catalog),
        Arc::new(NoopAuditSink),
    );
    MetadataServer::new(Arc::new(dispatcher))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[test]
fn test_tool_names_and_required_arguments() {
    let expected = [
        ("list_tables", json!([])),
        ("get_table_metadata", json!(["schema_name", "table_name"])),
        ("get_tables_metadata", json!(["schema_name", "table_names"])),
        ("get_schema_overview", json!(["schema_name"])),
    ];

    let tools = tool_definitions();
    assert_eq!(tools.len(), expected.len());
    for (tool, (name, required)) in tools.iter().zip(expected.iter()) {
        assert_eq!(tool.name, *name);
        assert!(!tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object");
        assert_eq!(&tool.input_schema["required"], required, "{}", name);
    }
}

#[test]
fn test_argument_types() {
    let tools = tool_definitions();

    let list_schema = &tools[0].input_schema["properties"]["schema_name"];
    assert_eq!(list_schema["type"], json!(["string", "null"]));

    let table_names = &tools[2].input_schema["properties"]["table_names"];
    assert_eq!(table_names["type"], "array");
    assert_eq!(table_names["items"], json!({"type": "string"}));
}

#[test]
fn test_mcp_tools_match_definitions() {
    let names: Vec<String> = mcp_tools().iter().map(|t| t.name.to_string()).collect();
    let expected: Vec<String> = tool_definitions().iter().map(|t| t.name.to_string()).collect();
    assert_eq!(names, expected);

    for tool in mcp_tools() {
        let schema = Value::Object(tool.input_schema.as_ref().clone());
        assert!(schema["properties"].is_object());
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = create_router(server(InMemoryCatalog::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_readiness_opens_a_session() {
    let catalog = InMemoryCatalog::new();
    let app = create_router(server(catalog.clone()));

    let response = app
        .oneshot(Request::builder().uri("/readiness").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "READY");
    assert_eq!(catalog.sessions_opened(), 1);
    assert_eq!(catalog.sessions_closed(), 1);
}

#[tokio::test]
async fn test_readiness_reports_database_failure() {
    let app = create_router(server(InMemoryCatalog::new().failing_connections()));

    let response = app
        .oneshot(Request::builder().uri("/readiness").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let value: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(value, json!({"error": "database connection failed: connection refused"}));
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_router(server(InMemoryCatalog::new()));

    let response = app
        .oneshot(Request::builder().uri("/tables").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
