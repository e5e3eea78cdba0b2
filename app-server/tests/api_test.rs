//! End-to-end tests of the HTTP API against a server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use vector_rules_app_server::serve;
use vector_rules_retrieval::RuleEngine;

struct TestServer {
    base: String,
    client: Client,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let engine = RuleEngine::builder()
            .with_dimension(32)
            .in_memory()
            .build()
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, Arc::new(engine), shutdown.clone()));

        Self {
            base: format!("http://{addr}/api/v1"),
            client: Client::new(),
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .put(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn delete(&self, path: &str) -> StatusCode {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .unwrap()
            .status()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_rule_lifecycle() {
    let server = TestServer::start().await;

    let (status, rule_type) = server.post("/rule-types", json!({"name": "style"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule_type["name"], "style");

    let (status, rule) = server
        .post(
            "/rules",
            json!({"type": "style", "content": {"text": "Indent with four spaces"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rule["rule_type_name"], "style");
    assert_eq!(rule["content"]["text"], "Indent with four spaces");
    assert!(rule.get("embedding").is_none());
    let id = rule["id"].as_i64().unwrap();

    let (status, fetched) = server.get(&format!("/rules/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id);

    let (status, updated) = server
        .put(
            &format!("/rules/{id}"),
            json!({"id": id, "type": "style", "content": "Indent with tabs"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "Indent with tabs");

    assert_eq!(
        server.delete(&format!("/rules/{id}")).await,
        StatusCode::NO_CONTENT
    );
    let (status, body) = server.get(&format!("/rules/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_retrieve() {
    let server = TestServer::start().await;
    server.post("/rule-types", json!({"name": "style"})).await;
    server.post("/rule-types", json!({"name": "naming"})).await;
    for (rule_type, text) in [
        ("style", "Indent with four spaces"),
        ("naming", "Use snake_case for functions"),
        ("naming", "Use CamelCase for types"),
    ] {
        let (status, _) = server
            .post("/rules", json!({"type": rule_type, "content": text}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = server
        .post(
            "/rules/retrieve",
            json!({"n": 2, "queries": ["Use CamelCase for types"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rules = body["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0]["content"], "Use CamelCase for types");
    assert!((rules[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);

    let (_, body) = server
        .post(
            "/rules/retrieve",
            json!({"n": 5, "type": "style", "queries": ["anything"]}),
        )
        .await;
    let rules = body["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["rule_type_name"], "style");

    let (status, body) = server
        .post(
            "/rules/retrieve",
            json!({"n": 5, "type": "security", "queries": ["anything"]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rules"], json!([]));
}

#[tokio::test]
async fn test_retrieve_rejects_bad_input() {
    let server = TestServer::start().await;

    for body in [
        json!({"n": 0, "queries": ["tabs"]}),
        json!({"n": 101, "queries": ["tabs"]}),
        json!({"n": 3, "queries": []}),
        json!({"n": 3, "queries": [""]}),
        json!({"queries": ["tabs"]}),
    ] {
        let (status, response) = server.post("/rules/retrieve", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response["error"].is_string());
    }
}

#[tokio::test]
async fn test_error_statuses() {
    let server = TestServer::start().await;

    let (status, _) = server
        .post("/rules", json!({"type": "missing", "content": "x"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    server.post("/rule-types", json!({"name": "style"})).await;
    let (status, _) = server.post("/rule-types", json!({"name": "style"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    server
        .post("/rules", json!({"type": "style", "content": "x"}))
        .await;
    assert_eq!(server.delete("/rule-types/1").await, StatusCode::CONFLICT);

    let (status, body) = server.get("/rules/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid id");

    let response = server
        .client
        .post(server.url("/rules"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_pagination() {
    let server = TestServer::start().await;
    for name in ["security", "naming", "style"] {
        server.post("/rule-types", json!({"name": name})).await;
    }
    for i in 0..12 {
        server
            .post("/rules", json!({"type": "style", "content": format!("rule {i}")}))
            .await;
    }

    let (_, body) = server.get("/rules").await;
    assert_eq!(body["rules"].as_array().unwrap().len(), 10);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["offset"], 0);

    let (_, body) = server.get("/rules?limit=5&offset=10").await;
    assert_eq!(body["rules"].as_array().unwrap().len(), 2);
    assert_eq!(body["limit"], 5);

    let (_, body) = server.get("/rules?limit=-3&offset=x&type=naming").await;
    assert_eq!(body["rules"], json!([]));
    assert_eq!(body["limit"], 10);
    assert_eq!(body["offset"], 0);

    let (_, body) = server.get("/rule-types?limit=2").await;
    let names: Vec<&str> = body["rule_types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["naming", "security"]);
}

#[tokio::test]
async fn test_rename_rule_type() {
    let server = TestServer::start().await;
    server.post("/rule-types", json!({"name": "style"})).await;
    server
        .post("/rules", json!({"type": "style", "content": "x"}))
        .await;

    let (status, renamed) = server
        .put("/rule-types/1", json!({"id": 1, "name": "formatting"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "formatting");

    let (_, rule) = server.get("/rules/1").await;
    assert_eq!(rule["rule_type_name"], "formatting");

    let (status, stats) = server.get("/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["rules"], 1);
    assert_eq!(stats["indexed_vectors"], 1);
}
