//! Local HTTP server with controllable latency, used to exercise the
//! multiplexed client end to end.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    extract::{Path, RawQuery},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Body returned by `/json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: u32,
    pub name: String,
    pub tags: Vec<String>,
}

pub fn app() -> Router {
    Router::new()
        .route("/delay/{ms}", get(delay))
        .route("/echo", get(echo_query).post(echo_body))
        .route("/cookies", get(cookies))
        .route("/status/{code}", get(status))
        .route("/headers", get(headers))
        .route("/json", get(json))
        .route("/redirect/{hops}", get(redirect))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn delay(Path(ms): Path<u64>) -> String {
    tracing::debug!(ms, "delaying response");
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("slept {ms}ms")
}

async fn echo_query(RawQuery(query): RawQuery) -> String {
    query.unwrap_or_default()
}

async fn echo_body(headers: HeaderMap, body: String) -> (StatusCode, String) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/x-www-form-urlencoded") {
        (StatusCode::OK, body)
    } else {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, content_type.to_string())
    }
}

async fn cookies() -> (AppendHeaders<[(header::HeaderName, &'static str); 2]>, &'static str) {
    (
        AppendHeaders([
            (header::SET_COOKIE, "session=abc"),
            (header::SET_COOKIE, "theme=dark"),
        ]),
        "cookies set",
    )
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let map = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(map)
}

async fn json() -> Json<Sample> {
    Json(Sample {
        id: 7,
        name: "sample".to_string(),
        tags: vec!["a".to_string(), "b".to_string()],
    })
}

/// `303 See Other` to `/redirect/{hops - 1}`, down to a plain `200` at zero.
async fn redirect(Path(hops): Path<u32>) -> Response {
    match hops.checked_sub(1) {
        Some(next) => Redirect::to(&format!("/redirect/{next}")).into_response(),
        None => "arrived".into_response(),
    }
}
