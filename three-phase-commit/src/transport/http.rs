//! HTTP transport.
//!
//! Peer-facing routes mirror the participant calls; a 200 answer means ok and a
//! 400 answer means not ok:
//!
//! | Route                     | Call                      |
//! |---------------------------|---------------------------|
//! | `POST /3pc/init`          | initialize (body: record) |
//! | `GET /3pc/abort/:id`      | abort                     |
//! | `GET /3pc/precommit/:id`  | pre-commit                |
//! | `GET /3pc/commit/:id`     | do-commit                 |
//! | `GET /3pc/check/:id`      | check-commit              |
//! | `GET /3pc/read/:key`      | local read (empty if none)|
//!
//! Client-facing routes: `GET /log/:value` creates `{"entry": value}` and
//! answers with the transaction id, `GET /data/:key` runs a coordinated read,
//! `GET /stats` dumps storage, `GET /` shows alive hosts and storage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use reqwest::{Client, RequestBuilder, Response, Url};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::cohort::LivenessChecker;
use crate::comm::{CommError, CommunicationHandler};
use crate::engine::ThreePhase;
use crate::error::{OperationError, TxError};

const SUCCESS: &str = "Success";
const FAILURE: &str = "Failure";

#[derive(Clone)]
struct AppState {
    engine: ThreePhase,
    liveness: Arc<dyn LivenessChecker>,
}

/// Builds the router a node serves.
pub fn router(engine: ThreePhase, liveness: Arc<dyn LivenessChecker>) -> Router {
    Router::new()
        .route("/3pc/init", post(initialize))
        .route("/3pc/abort/:id", get(abort))
        .route("/3pc/precommit/:id", get(pre_commit))
        .route("/3pc/commit/:id", get(do_commit))
        .route("/3pc/check/:id", get(check_commit))
        .route("/3pc/read/:key", get(local_read))
        .route("/log/:value", get(client_create))
        .route("/data/:key", get(client_read))
        .route("/stats", get(stats))
        .route("/", get(overview))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { engine, liveness })
}

/// Serves `engine` on `listener` until `shutdown` resolves.
pub async fn serve_until<F>(
    listener: TcpListener,
    engine: ThreePhase,
    liveness: Arc<dyn LivenessChecker>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(engine, liveness);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn verdict(ok: bool) -> (StatusCode, &'static str) {
    if ok {
        (StatusCode::OK, SUCCESS)
    } else {
        (StatusCode::BAD_REQUEST, FAILURE)
    }
}

fn outcome(result: Result<(), TxError>) -> (StatusCode, &'static str) {
    verdict(result.is_ok())
}

async fn initialize(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    outcome(state.engine.initialize_transaction(&body))
}

async fn abort(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    outcome(state.engine.abort(&id))
}

async fn pre_commit(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    outcome(state.engine.pre_commit(&id))
}

async fn do_commit(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    outcome(state.engine.do_commit(&id))
}

async fn check_commit(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    verdict(state.engine.check_commit(&id))
}

async fn local_read(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    state.engine.local_read(key.as_bytes()).unwrap_or_default()
}

async fn client_create(State(state): State<AppState>, Path(value): Path<String>) -> impl IntoResponse {
    let payload = serde_json::json!({ "entry": value }).to_string();
    match state.engine.create(payload.as_bytes()).await {
        Ok(id) => (StatusCode::OK, id),
        Err(err) => (operation_status(&err), err.to_string()),
    }
}

async fn client_read(State(state): State<AppState>, Path(key): Path<String>) -> impl IntoResponse {
    match state.engine.read(key.as_bytes()).await {
        Ok(merged) => (StatusCode::OK, merged).into_response(),
        Err(err) => (operation_status(&err), err.to_string()).into_response(),
    }
}

fn operation_status(err: &OperationError) -> StatusCode {
    match err {
        OperationError::NodeSet(_) => StatusCode::SERVICE_UNAVAILABLE,
        OperationError::Rejected { .. } => StatusCode::BAD_REQUEST,
        OperationError::ReadFailed { .. } => StatusCode::BAD_GATEWAY,
        OperationError::MergeFailed => StatusCode::NOT_FOUND,
    }
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.stats()
}

async fn overview(State(state): State<AppState>) -> impl IntoResponse {
    let mut page = String::from("====== Connections ======\n\n");
    for host in state.liveness.alive_hosts() {
        page.push_str(&format!("* {host}\n"));
    }
    page.push_str("\n====== Database ======\n\n");
    page.push_str(&state.engine.stats());
    page
}

/// Client side of the routes above.
///
/// Every request carries the timeout given at construction, which is what
/// bounds a coordinator round when a peer stops answering.
#[derive(Clone)]
pub struct HttpCommunicationHandler {
    client: Client,
}

impl HttpCommunicationHandler {
    pub fn new(request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    async fn send(&self, destination: &str, request: RequestBuilder) -> Result<Response, CommError> {
        request.send().await.map_err(|err| {
            if err.is_timeout() {
                CommError::Timeout {
                    destination: destination.to_string(),
                }
            } else {
                CommError::unreachable(destination, err)
            }
        })
    }

    async fn acknowledge(&self, destination: &str, segments: &[&str]) -> Result<bool, CommError> {
        let url = endpoint(destination, segments)?;
        let response = self.send(destination, self.client.get(url)).await?;
        acknowledged(destination, &response)
    }
}

/// `http://{destination}/` followed by `segments`, each percent-encoded.
fn endpoint(destination: &str, segments: &[&str]) -> Result<Url, CommError> {
    let mut url = Url::parse(&format!("http://{destination}/"))
        .map_err(|err| CommError::unreachable(destination, err))?;
    url.path_segments_mut()
        .map_err(|_| CommError::unreachable(destination, "destination is not a base url"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn acknowledged(destination: &str, response: &Response) -> Result<bool, CommError> {
    match response.status() {
        StatusCode::OK => Ok(true),
        StatusCode::BAD_REQUEST => Ok(false),
        status => {
            warn!(%destination, %status, "unexpected status from peer");
            Err(CommError::Rejected {
                destination: destination.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl CommunicationHandler for HttpCommunicationHandler {
    async fn initialize_transaction(&self, record: &[u8], destination: &str) -> Result<bool, CommError> {
        let url = endpoint(destination, &["3pc", "init"])?;
        let request = self.client.post(url).body(record.to_vec());
        let response = self.send(destination, request).await?;
        acknowledged(destination, &response)
    }

    async fn abort(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        self.acknowledge(destination, &["3pc", "abort", id]).await
    }

    async fn pre_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        self.acknowledge(destination, &["3pc", "precommit", id]).await
    }

    async fn do_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        self.acknowledge(destination, &["3pc", "commit", id]).await
    }

    async fn check_commit(&self, id: &str, destination: &str) -> Result<bool, CommError> {
        self.acknowledge(destination, &["3pc", "check", id]).await
    }

    async fn read_data(&self, request: &[u8], destination: &str) -> Result<Vec<u8>, CommError> {
        let key = std::str::from_utf8(request).map_err(|_| CommError::InvalidKey {
            destination: destination.to_string(),
        })?;
        let url = endpoint(destination, &["3pc", "read", key])?;
        let response = self.send(destination, self.client.get(url)).await?;
        if response.status() != StatusCode::OK {
            return Err(CommError::Rejected {
                destination: destination.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| CommError::unreachable(destination, err))?;
        Ok(body.to_vec())
    }
}
