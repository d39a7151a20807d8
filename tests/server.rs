//! HTTP API tests: a real server on a free port, driven with reqwest.

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::TempDir;

use studymate::config::Config;
use studymate::server;
use studymate::service::StudyMate;

fn test_config_with_port(tmp: &TempDir, port: u16) -> Config {
    let root = tmp.path();
    let config_content = format!(
        r#"[db]
path = "{root}/data/studymate.sqlite"

[storage]
upload_dir = "{root}/uploads"

[embedding]
provider = "hash"
dims = 512

[generation]
provider = "extractive"

[server]
bind = "127.0.0.1:{port}"
"#,
        root = root.display(),
        port = port
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server and return its base URL. The temp dir must outlive it.
async fn start_server(tmp: &TempDir) -> String {
    let port = find_free_port();
    let app = Arc::new(StudyMate::open(test_config_with_port(tmp, port)).await.unwrap());
    tokio::spawn(async move {
        server::serve(app).await.ok();
    });
    wait_for_server(port).await;
    format!("http://127.0.0.1:{}", port)
}

async fn upload(
    client: &reqwest::Client,
    base: &str,
    user: &str,
    name: &str,
    body: &str,
) -> reqwest::Response {
    let form = Form::new().part(
        "file",
        Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string()),
    );
    client
        .post(format!("{}/documents/upload", base))
        .header("x-user-id", user)
        .multipart(form)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_and_root_need_no_user() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let resp = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn missing_user_header_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/documents", base)).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn upload_query_history_delete() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &base,
        "alice",
        "biology.txt",
        "Mitochondria are the powerhouse of the cell. They produce ATP.",
    )
    .await;
    assert_eq!(resp.status(), 200);
    let uploaded: Value = resp.json().await.unwrap();
    assert_eq!(uploaded["message"], "Document uploaded successfully");
    assert_eq!(uploaded["filename"], "biology.txt");
    assert_eq!(uploaded["chunks"], 1);
    let doc_id = uploaded["document_id"].as_str().unwrap().to_string();

    let listed: Value = client
        .get(format!("{}/documents", base))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], doc_id.as_str());
    assert_eq!(listed[0]["num_chunks"], 1);

    let resp = client
        .post(format!("{}/chat/query", base))
        .header("x-user-id", "alice")
        .json(&serde_json::json!({ "message": "What produces ATP?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let answer: Value = resp.json().await.unwrap();
    assert!(answer["answer"].as_str().unwrap().contains("Mitochondria"));
    assert_eq!(answer["sources"], serde_json::json!([doc_id.as_str()]));
    assert!(answer["timestamp"].is_string());

    let history: Value = client
        .get(format!("{}/chat/history?limit=5", base))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["question"], "What produces ATP?");

    let resp = client
        .delete(format!("{}/documents/{}", base, doc_id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Document deleted successfully");

    let resp = client
        .delete(format!("{}/documents/{}", base, doc_id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn query_without_documents_is_no_documents() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    upload(&client, &base, "alice", "a.txt", "Alice's private notes on genetics.").await;

    let resp = client
        .post(format!("{}/chat/query", base))
        .header("x-user-id", "bob")
        .json(&serde_json::json!({ "message": "genetics?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_documents");
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = upload(&client, &base, "alice", "slides.pptx", "nope").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/chat/query", base))
        .header("x-user-id", "alice")
        .json(&serde_json::json!({ "message": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("{}/chat/history?limit=0", base))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn malformed_bodies_use_error_contract() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/chat/query", base))
        .header("x-user-id", "alice")
        .json(&serde_json::json!({ "message": "x", "top_k": -1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].is_string());

    let resp = client
        .post(format!("{}/chat/query", base))
        .header("x-user-id", "alice")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .get(format!("{}/chat/history?limit=abc", base))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/documents/upload", base))
        .header("x-user-id", "alice")
        .body("plain body")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn documents_are_scoped_to_user() {
    let tmp = TempDir::new().unwrap();
    let base = start_server(&tmp).await;
    let client = reqwest::Client::new();

    let uploaded: Value = upload(&client, &base, "alice", "a.txt", "Alice's notes.")
        .await
        .json()
        .await
        .unwrap();
    let doc_id = uploaded["document_id"].as_str().unwrap();

    let listed: Value = client
        .get(format!("{}/documents/list", base))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().is_empty());

    let resp = client
        .delete(format!("{}/documents/{}", base, doc_id))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
