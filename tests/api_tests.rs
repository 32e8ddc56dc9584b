mod common;

use common::Harness;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;

use tenantbox::api::ApiState;
use tenantbox::server::create_app;

async fn serve(h: &Harness) -> String {
    let app = create_app(ApiState::new(h.orchestrator.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_instance_endpoints() {
    let h = Harness::new(14000, 14001).await;
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "alpha", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["identifier"], "alpha-demo");
    assert_eq!(created["port"], 14000);
    assert_eq!(created["status"], "running");

    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "alpha", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "already_exists");

    let listed: Value = client
        .get(format!("{}/api/instances?status=running", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);

    let response = client
        .post(format!("{}/api/instances/alpha-demo/stop", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let stopped: Value = response.json().await.unwrap();
    assert_eq!(stopped["status"], "stopped");

    let logs: Value = client
        .get(format!("{}/api/instances/alpha-demo/logs?lines=7", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["logs"], "alpha-demo: last 7 lines");

    let response = client
        .delete(format!("{}/api/instances/alpha-demo", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let deleted: Value = response.json().await.unwrap();
    assert_eq!(deleted["released_port"], 14000);
    assert_eq!(deleted["proxy_site"], "deleted");

    let response = client
        .get(format!("{}/api/instances/alpha-demo", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_error_status_mapping() {
    let h = Harness::new(14000, 14000).await;
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "Bad Name", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "invalid_input");
    assert!(body["error"]["message"].as_str().unwrap().contains("instance_name"));

    client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "alpha", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "beta", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "pool_exhausted");

    h.proxy.fail_create_site.store(true, Ordering::SeqCst);
    client
        .delete(format!("{}/api/instances/alpha-demo", base))
        .send()
        .await
        .unwrap();
    let response = client
        .post(format!("{}/api/instances", base))
        .json(&json!({"instance_name": "gamma", "template_name": "demo"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "proxy_failure");

    let templates: Value = client
        .get(format!("{}/api/templates", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(templates["templates"][0]["name"], "demo");

    let ports: Value = client.get(format!("{}/api/ports", base)).send().await.unwrap().json().await.unwrap();
    assert_eq!(ports["available"], 1);
}
