//! HTTP API: chat and tool authorization as JSON endpoints.

use std::sync::Arc;

use approval::RequestToken;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use runtime::{Host, LlmBackend, Reply, ToolProvider};
use serde::{Deserialize, Serialize};
use storage::{Identity, SessionToken};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Browser session to continue; a new one is started when absent.
    #[serde(default)]
    pub user_session_id: Option<SessionToken>,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
}

/// Login details forwarded by the front end.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl From<UserInfo> for Identity {
    fn from(info: UserInfo) -> Self {
        Identity {
            id: info.user_id,
            name: info.name,
            email: info.email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// The token from the proposal's `authorization.request`.
    #[serde(alias = "session_id")]
    pub request: RequestToken,
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type HostState<P, B> = State<Arc<Host<P, B>>>;

pub fn router<P, B>(host: Arc<Host<P, B>>) -> Router
where
    P: ToolProvider + 'static,
    B: LlmBackend + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat::<P, B>))
        .route("/authorize_tool", post(authorize_tool::<P, B>))
        .with_state(host)
}

/// Serve the API on `address` until Ctrl-C.
pub async fn serve<P, B>(host: Arc<Host<P, B>>, address: &str) -> std::io::Result<()>
where
    P: ToolProvider + 'static,
    B: LlmBackend + 'static,
{
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(address = %listener.local_addr()?, "http api listening");

    axum::serve(listener, router(host))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupted, draining requests");
        })
        .await
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        message: format!("gangway v{} is running", env!("CARGO_PKG_VERSION")),
    })
}

pub async fn chat<P, B>(State(host): HostState<P, B>, Json(request): Json<ChatRequest>) -> Json<Reply>
where
    P: ToolProvider,
    B: LlmBackend,
{
    tracing::debug!(session = ?request.user_session_id, "chat request");
    let reply = host
        .submit(
            &request.message,
            request.user_session_id,
            request.user_info.map(Identity::from),
        )
        .await;
    Json(reply)
}

pub async fn authorize_tool<P, B>(
    State(host): HostState<P, B>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Json<Reply>, (StatusCode, Json<ApiError>)>
where
    P: ToolProvider,
    B: LlmBackend,
{
    host.resolve_auth(request.request, request.authorized)
        .await
        .map(Json)
        .map_err(error_response)
}

fn error_response(error: runtime::Error) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        runtime::Error::Approval(approval::Error::UnknownToken(_)) => StatusCode::NOT_FOUND,
        runtime::Error::Approval(approval::Error::Expired(_)) => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %error, "authorization failed");
    }
    (
        status,
        Json(ApiError {
            error: error.to_string(),
        }),
    )
}
