#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use warden::authz::loader::FileLoader;
use warden::authz::service::DecisionService;
use warden::authz::store::PolicyStore;

pub const SAMPLE_AUDIENCE: &str = "https://sample.yaml";

pub const SAMPLE_POLICY: &str = include_str!("../../policies/sample.kdl");

/// Temporary policy directory holding `sample.kdl`.
pub struct TestPolicies {
    pub dir: tempfile::TempDir,
}

impl TestPolicies {
    pub fn sample() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("sample.kdl"), SAMPLE_POLICY)
            .expect("Failed to write policy");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).expect("Failed to write policy");
    }

    pub fn service(&self) -> Arc<DecisionService> {
        let service = DecisionService::new(
            Arc::new(PolicyStore::new()),
            Arc::new(FileLoader::new(self.path())),
        );
        service.reload().expect("Failed to load policies");
        Arc::new(service)
    }
}

pub async fn post(app: &Router, uri: &str, origin: Option<&str>, body: Body) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

pub async fn allowed(app: &Router, origin: Option<&str>, body: Value) -> (StatusCode, Value) {
    post(app, "/allowed", origin, Body::from(body.to_string())).await
}
