//! Agentverse chat UI
//!
//! Server-rendered pages over Axum. Every request resolves (or starts) a
//! cookie-keyed session. POST actions use post/redirect/get and report failures
//! through a one-shot flash message on the next page render.
//!
//! Routes:
//! - GET  /               chat page, or the sign-in prompt
//! - GET  /login          redirect to the provider's consent page
//! - GET  /oauth/callback finish sign-in (path follows `oauth.redirect_uri`;
//!                        a root redirect URI is served by `GET /` itself)
//! - POST /send           form field `text`
//! - POST /logout         drop the session
//! - GET  /health         liveness

use std::sync::Arc;

use agentverse_core::{AgentverseConfig, AgentverseError};
use anyhow::Result;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::{AppendHeaders, Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::chat::{CallbackParams, ChatService};
use crate::session::{session_cookie, session_id_from};
use crate::ui::render_page;

pub const DEFAULT_CALLBACK_PATH: &str = "/oauth/callback";

#[derive(Clone)]
pub struct ChatState {
    pub service: ChatService,
}

#[derive(Debug, Deserialize)]
pub struct SendForm {
    #[serde(default)]
    pub text: String,
}

/// Path component of the configured redirect URI, which may be `/`.
pub fn callback_path(redirect_uri: &str) -> String {
    Url::parse(redirect_uri)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| DEFAULT_CALLBACK_PATH.to_string())
}

/// Origin users should open: cookies are per host, so it must match the
/// host the provider redirects back to.
pub fn public_origin(redirect_uri: &str, addr: &str) -> String {
    Url::parse(redirect_uri)
        .ok()
        .map(|u| u.origin().ascii_serialization())
        .filter(|o| o != "null")
        .unwrap_or_else(|| format!("http://{}", addr))
}

pub fn build_router(state: Arc<ChatState>, callback: &str) -> Router {
    let router = if callback == "/" {
        Router::new().route("/", get(index_or_callback_handler))
    } else {
        Router::new()
            .route("/", get(index_handler))
            .route(callback, get(callback_handler))
    };

    router
        .route("/login", get(login_handler))
        .route("/send", post(send_handler))
        .route("/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_chat_server(
    service: ChatService,
    config: AgentverseConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.chat.host, config.chat.port);
    let callback = callback_path(&config.oauth.redirect_uri);
    let app = build_router(Arc::new(ChatState { service }), &callback);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        bind = %addr,
        callback = %callback,
        "Agentverse chat listening on {}",
        public_origin(&config.oauth.redirect_uri, &addr)
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Chat server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn resolve_session(state: &ChatState, headers: &HeaderMap) -> Uuid {
    state.service.sessions().resolve(session_id_from(headers)).await
}

fn with_cookie(sid: Uuid, response: impl IntoResponse) -> Response {
    (AppendHeaders([(SET_COOKIE, session_cookie(sid))]), response).into_response()
}

async fn flash_and_return(state: &ChatState, sid: Uuid, error: AgentverseError) -> Response {
    state.service.flash(sid, &error).await;
    with_cookie(sid, Redirect::to("/"))
}

// ============================================================================
// Handlers
// ============================================================================

async fn index_handler(State(state): State<Arc<ChatState>>, headers: HeaderMap) -> Response {
    render_index(&state, &headers).await
}

async fn index_or_callback_handler(
    State(state): State<Arc<ChatState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if params.is_callback() {
        complete_callback(&state, &headers, params).await
    } else {
        render_index(&state, &headers).await
    }
}

async fn render_index(state: &ChatState, headers: &HeaderMap) -> Response {
    let sid = resolve_session(state, headers).await;
    let flash = state
        .service
        .sessions()
        .update(sid, |s| s.flash.take())
        .await
        .flatten();

    match state.service.sessions().snapshot(sid).await {
        Some(session) => with_cookie(
            sid,
            Html(render_page(
                &session,
                flash.as_deref(),
                state.service.login_available(),
            )),
        ),
        None => Redirect::to("/").into_response(),
    }
}

async fn login_handler(State(state): State<Arc<ChatState>>, headers: HeaderMap) -> Response {
    let sid = resolve_session(&state, &headers).await;
    match state.service.start_login(sid).await {
        Ok(url) => with_cookie(sid, Redirect::to(&url)),
        Err(e) => flash_and_return(&state, sid, e).await,
    }
}

async fn callback_handler(
    State(state): State<Arc<ChatState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    complete_callback(&state, &headers, params).await
}

async fn complete_callback(
    state: &ChatState,
    headers: &HeaderMap,
    params: CallbackParams,
) -> Response {
    let sid = resolve_session(state, headers).await;
    match state.service.complete_login(sid, params).await {
        Ok(_) => with_cookie(sid, Redirect::to("/")),
        Err(e) => {
            tracing::warn!(session = %sid, error = %e, "Sign-in failed");
            flash_and_return(state, sid, e).await
        }
    }
}

async fn send_handler(
    State(state): State<Arc<ChatState>>,
    headers: HeaderMap,
    form: Result<Form<SendForm>, FormRejection>,
) -> Response {
    let sid = resolve_session(&state, &headers).await;
    let text = match form {
        Ok(Form(form)) => form.text,
        Err(rejection) => {
            let e = AgentverseError::Validation(rejection.body_text());
            return flash_and_return(&state, sid, e).await;
        }
    };

    match state.service.send_message(sid, &text).await {
        Ok(_) => with_cookie(sid, Redirect::to("/")),
        Err(e) => flash_and_return(&state, sid, e).await,
    }
}

async fn logout_handler(State(state): State<Arc<ChatState>>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_id_from(&headers) {
        state.service.logout(sid).await;
    }
    Redirect::to("/").into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
