//! In-memory coin shop API used as a load test target.
//!
//! Mirrors the endpoints of the real merch shop service: `POST /api/auth`, `GET /api/info`,
//! `POST /api/sendCoin` and `GET /api/buy/:item`. Every request is journaled so tests can assert
//! on exactly what a scenario sent.
mod shop;
mod types;

pub use shop::{AppState, RecordedRequest, ShopError, MERCH, STARTING_COINS};
pub use types::*;

use axum::{
    body::{to_bytes, Body},
    debug_handler,
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
#[allow(unused)]
use metrics::counter;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info, warn};

pub mod prelude {
    pub use crate::shop::{AppState, RecordedRequest};
    pub use crate::types::{AuthRequest, AuthResponse, InfoResponse, SendCoinRequest};
}

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth", post(auth))
        .route("/api/info", get(info))
        .route("/api/sendCoin", post(send_coin))
        .route("/api/buy/:item", get(buy))
        .layer(middleware::from_fn_with_state(state.clone(), journal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the shop on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!("Mock shop listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

pub async fn run(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

async fn journal(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
    };

    counter!("mock-shop.requests", "path" => parts.uri.path().to_string()).increment(1);
    state.record(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        authorization: parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    });

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[debug_handler]
async fn auth(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return error(StatusCode::BAD_REQUEST, "Invalid JSON format");
    };

    match state.auth(&req.username, &req.password) {
        Ok(token) => Json(AuthResponse { token }).into_response(),
        Err(err) => shop_error(err),
    }
}

#[debug_handler]
async fn info(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let username = match authorize(&state, &headers) {
        Ok(username) => username,
        Err(res) => return res,
    };

    match state.info(&username) {
        Ok(info) => Json(info).into_response(),
        Err(err) => shop_error(err),
    }
}

#[debug_handler]
async fn send_coin(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<SendCoinRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return error(StatusCode::BAD_REQUEST, "Invalid JSON format");
    };
    let username = match authorize(&state, &headers) {
        Ok(username) => username,
        Err(res) => return res,
    };

    match state.send_coin(&username, &req.to_user, req.amount) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => shop_error(err),
    }
}

#[debug_handler]
async fn buy(
    State(state): State<AppState>,
    Path(item): Path<String>,
    headers: HeaderMap,
) -> Response {
    let username = match authorize(&state, &headers) {
        Ok(username) => username,
        Err(res) => return res,
    };

    match state.buy(&username, &item) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => shop_error(err),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unauthorized"))?;

    state.username_for(token).ok_or_else(|| {
        debug!("Rejected unknown token {token:?}");
        error(StatusCode::UNAUTHORIZED, "Invalid token")
    })
}

/// Token of a `Bearer <token>` header. A bare `Bearer` carries the empty token.
fn bearer_token(header: &str) -> Option<&str> {
    match header.strip_prefix("Bearer")? {
        "" => Some(""),
        rest => rest.strip_prefix(' ').map(str::trim),
    }
}

fn shop_error(err: ShopError) -> Response {
    let status = match err {
        ShopError::WrongPassword => StatusCode::UNAUTHORIZED,
        ShopError::InvalidInput(_) | ShopError::UnknownUser | ShopError::InsufficientFunds => {
            StatusCode::BAD_REQUEST
        }
    };
    error(status, &err.to_string())
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            errors: message.to_string(),
        }),
    )
        .into_response()
}
