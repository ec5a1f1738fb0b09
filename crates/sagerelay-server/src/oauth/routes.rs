//! OAuth HTTP surface
//!
//! Three small endpoints: mint a login URL, receive the provider redirect,
//! and probe whether a stored token is still live.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::oauth::exchange::CredentialExchange;

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

pub fn oauth_routes() -> Router<Arc<CredentialExchange>> {
    Router::new()
        .route("/url", get(oauth_url))
        .route("/redirect", get(oauth_redirect))
        .route("/check", get(oauth_check))
}

#[derive(Debug, Deserialize)]
struct UrlQuery {
    state_url: String,
    redirect_uri: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn oauth_url(
    State(exchange): State<Arc<CredentialExchange>>,
    Query(query): Query<UrlQuery>,
) -> AppResult<Json<Value>> {
    let blob = exchange
        .mint_state(&query.state_url)
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    let redirect_uri = query
        .redirect_uri
        .as_deref()
        .unwrap_or_else(|| exchange.redirect_uri());
    let url = exchange.login_url(redirect_uri, &blob)?;

    Ok(Json(json!({ "url": url })))
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    code: String,
    state: String,
}

#[tracing::instrument(skip_all)]
async fn oauth_redirect(
    State(exchange): State<Arc<CredentialExchange>>,
    Query(query): Query<RedirectQuery>,
) -> AppResult<Json<Value>> {
    exchange
        .redeem(&query.code, &query.state, exchange.redirect_uri())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Authorization complete"
    })))
}

#[tracing::instrument(skip_all)]
async fn oauth_check(
    State(exchange): State<Arc<CredentialExchange>>,
    headers: HeaderMap,
) -> Json<Value> {
    let authenticated = match headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    {
        Some(token) => exchange.check_token(token).await,
        None => false,
    };

    Json(json!({ "authenticated": authenticated }))
}
