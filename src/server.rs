//! HTTP surface for verification callbacks.
//!
//! Exposes `GET|POST <prefix>/callback/{token}`. Hubs may send the `hub.*`
//! parameters in the query string or as a form body; both are read, query
//! first.

use crate::config::SubscriberConfig;
use crate::error::Result;
use crate::token::CallbackToken;
use crate::verification::{VerificationHandler, VerificationParams, VerificationResponse};
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use percent_encoding::percent_decode;
use std::net::SocketAddr;
use tracing::{info, instrument};
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Build the callback router, mounted under the path of `callback_base`.
pub fn router(handler: VerificationHandler, callback_base: &Url) -> Router {
    let routes = Router::new()
        .route("/callback/{token}", get(handle_callback).post(handle_callback))
        .with_state(handler);

    let prefix = callback_base.path().trim_end_matches('/');
    if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    }
}

/// Bind `bind_address:port` and serve callbacks until the future is dropped.
pub async fn serve(config: &SubscriberConfig, handler: VerificationHandler) -> Result<()> {
    let app = router(handler, &config.callback_base);

    let addr = SocketAddr::new(config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, callback_base = %config.callback_base, "Callback server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[instrument(
    name = "websub.callback",
    skip_all,
    fields(token = tracing::field::Empty, status = tracing::field::Empty)
)]
async fn handle_callback(
    State(handler): State<VerificationHandler>,
    Path(token): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = CallbackToken::from_path_segment(&token);
    let params = collect_params(query.as_deref(), &headers, &body);

    let response = handler.handle(&token, &params);

    let span = tracing::Span::current();
    span.record("token", token.short());
    span.record("status", response.status);

    into_http(response)
}

fn collect_params(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> VerificationParams {
    let from_query = query.map(|q| parse_form(q.as_bytes())).unwrap_or_default();

    let from_body = if body_is_form(headers, body) {
        parse_form(body)
    } else {
        Vec::new()
    };

    VerificationParams::from_pairs(from_query.into_iter().chain(from_body))
}

/// Split `application/x-www-form-urlencoded` input into pairs. Values are
/// percent-decoded to raw bytes and never forced through UTF-8.
fn parse_form(input: &[u8]) -> Vec<(String, Vec<u8>)> {
    input
        .split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, |&b| b == b'=');
            let key = decode_component(parts.next().unwrap_or_default());
            let value = decode_component(parts.next().unwrap_or_default());
            (String::from_utf8_lossy(&key).into_owned(), value)
        })
        .collect()
}

fn decode_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

/// Form bodies are read when declared as such, or when undeclared.
fn body_is_form(headers: &HeaderMap, body: &[u8]) -> bool {
    if body.is_empty() {
        return false;
    }
    match headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        Some(content_type) => content_type
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE)),
        None => true,
    }
}

fn into_http(response: VerificationResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, VerificationResponse::CONTENT_TYPE)],
        response.body,
    )
        .into_response()
}
