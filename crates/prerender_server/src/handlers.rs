//! HTTP handlers.
//!
//! - `/livez` - Basic liveness probe (immediate 200, no checks)
//! - everything else - Server-rendered page

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use prerender::{sanitize_error, Headers, RenderRequest, RenderResult};
use prerender_core::markup::escape_html;

use crate::state::AppState;

/// GET /livez - Basic liveness probe.
pub async fn livez() -> StatusCode {
    StatusCode::OK
}

/// Render the requested path.
///
/// Render issues are logged by the renderer and never change the status.
/// Plugin or manifest failures become a 500 with a sanitized message.
pub async fn render_page(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = to_render_request(&method, &uri, &headers, &body);

    match state.renderer.render(request).await {
        Ok(result) => into_response(result),
        Err(e) => {
            tracing::error!(error = %e, path = %uri.path(), "Render failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_html(&sanitize_error(&e))),
            )
                .into_response()
        }
    }
}

fn to_render_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> RenderRequest {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    // Non-UTF-8 header values are dropped.
    let headers: Headers = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
        .collect();

    RenderRequest::new(method.as_str(), path)
        .with_headers(headers)
        .with_body(body.to_vec())
}

fn into_response(result: RenderResult) -> Response {
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::OK);
    let mut response = (status, result.body).into_response();

    let response_headers = response.headers_mut();
    for (name, value) in result.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response_headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Skipping invalid response header"),
        }
    }
    response_headers.insert(
        HeaderName::from_static("x-render-passes"),
        HeaderValue::from(result.stats.render_count),
    );

    response
}

fn error_html(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Error</title></head>\
         <body><h1>Something went wrong</h1><p>{}</p></body></html>",
        escape_html(message)
    )
}
