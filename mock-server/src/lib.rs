use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Credentials the ingestion endpoint accepts.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub access_key: String,
    pub access_secret: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            access_key: "test-key".to_string(),
            access_secret: "test-secret".to_string(),
        }
    }
}

/// Body of an upload: `{"documents":[...]}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Batch {
    pub documents: Vec<Value>,
}

/// Reply to an accepted upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch: Uuid,
    pub count: usize,
}

/// Every accepted document, per collection, in arrival order.
type Db = Arc<RwLock<HashMap<String, Vec<Value>>>>;

#[derive(Clone)]
struct AppState {
    credentials: Credentials,
    db: Db,
}

pub fn app() -> Router {
    app_with_credentials(Credentials::default())
}

pub fn app_with_credentials(credentials: Credentials) -> Router {
    let state = AppState {
        credentials,
        db: Arc::new(RwLock::new(HashMap::new())),
    };
    Router::new()
        .route("/echo", get(echo).post(echo))
        .route("/status/{code}", get(status))
        .route(
            "/projects/collections/{name}/documents",
            get(list_documents).post(upload_documents),
        )
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_credentials(
    listener: TcpListener,
    credentials: Credentials,
) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_credentials(credentials)).await
}

/// Plain-text dump of the request: method, query, headers, body.
async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: String) -> String {
    let mut out = format!("method: {method}\nquery: {}\n", query.unwrap_or_default());
    for (name, value) in &headers {
        out.push_str(&format!(
            "header {}: {}\n",
            name.as_str(),
            value.to_str().unwrap_or("<binary>")
        ));
    }
    out.push_str("body: ");
    out.push_str(&body);
    out
}

async fn status(Path(code): Path<u16>) -> (StatusCode, String) {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")),
        Err(_) => (StatusCode::BAD_REQUEST, format!("bad status {code}")),
    }
}

fn authorized(headers: &HeaderMap, credentials: &Credentials) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("AuthAccessKey") == Some(credentials.access_key.as_str())
        && header("AuthAccessSecret") == Some(credentials.access_secret.as_str())
}

async fn upload_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<BatchReceipt>, StatusCode> {
    if !authorized(&headers, &state.credentials) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let batch: Batch = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;

    let receipt = BatchReceipt {
        batch: Uuid::new_v4(),
        count: batch.documents.len(),
    };
    state
        .db
        .write()
        .await
        .entry(name)
        .or_default()
        .extend(batch.documents);
    Ok(Json(receipt))
}

async fn list_documents(State(state): State<AppState>, Path(name): Path<String>) -> Json<Vec<Value>> {
    let db = state.db.read().await;
    let documents = db.get(&name).cloned().unwrap_or_default();
    Json(documents)
}
