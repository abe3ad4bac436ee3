use std::sync::Arc;

use rdb_backend_core::Backend;
use rdb_backend_memory::MemoryBackend;
use rdb_server::{AppState, build_app};

async fn spawn_server(dir: &std::path::Path) -> String {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new(dir, 1));
    backend.open().await.unwrap();
    let app = build_app(AppState { backend });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn put_get_delete_round_trip_over_a_real_connection() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(tmp.path()).await;
    let client = reqwest::Client::new();

    let put = client
        .put(format!("{base}/data/bacon"))
        .body(r#"{"type":"object","value":"is yummy"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 200);

    let get = client.get(format!("{base}/data/bacon")).send().await.unwrap();
    assert_eq!(get.status(), 200);
    let body: serde_json::Value = get.json().await.unwrap();
    assert_eq!(body["value"], "is yummy");

    let delete = client
        .delete(format!("{base}/data/bacon"))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), 200);

    let miss = client.get(format!("{base}/data/bacon")).send().await.unwrap();
    assert_eq!(miss.status(), 404);
}

#[tokio::test]
async fn bulk_endpoint_over_a_real_connection() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(tmp.path()).await;
    let client = reqwest::Client::new();

    let mut form = std::collections::HashMap::new();
    form.insert(
        "put",
        r#"{"bacon":{"type":"object","value":"is yummy"},"eggs":{"type":"object","value":"scrambled"}}"#,
    );
    let resp = client
        .post(format!("{base}/_bulk"))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut form = std::collections::HashMap::new();
    form.insert("get", r#"{"keys":["bacon","eggs","missing"]}"#);
    let resp = client
        .post(format!("{base}/_get_multi"))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["bacon"]["value"], "is yummy");
    assert_eq!(body["eggs"]["value"], "scrambled");
    assert!(body.get("missing").is_none());
}

#[tokio::test]
async fn all_keys_and_stats_over_a_real_connection() {
    let tmp = tempfile::tempdir().unwrap();
    let base = spawn_server(tmp.path()).await;
    let client = reqwest::Client::new();

    client
        .put(format!("{base}/data/bacon"))
        .body(r#"{"type":"object","value":1}"#)
        .send()
        .await
        .unwrap();

    let keys = client.get(format!("{base}/_all_keys")).send().await.unwrap();
    assert_eq!(keys.status(), 200);
    let keys: Vec<String> = keys.json().await.unwrap();
    assert_eq!(keys, vec!["bacon".to_string()]);

    let stats = client.get(format!("{base}/_stats")).send().await.unwrap();
    assert_eq!(stats.status(), 200);
    let stats: serde_json::Value = stats.json().await.unwrap();
    assert!(stats.is_object());
}
