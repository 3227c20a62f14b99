// src/server/cors.rs

use warp::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS,
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, VARY,
};
use warp::reply::{Reply, Response};

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS";
const MAX_AGE_SECS: &str = "600";

/// Answer a preflight: any origin, any method, and exactly the headers the
/// browser asked for.
pub fn preflight(origin: Option<String>, request_headers: Option<String>) -> Response {
    let mut res = warp::reply().into_response();
    let headers = res.headers_mut();

    allow_origin(headers, origin.as_deref());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    let requested = request_headers
        .as_deref()
        .and_then(|h| HeaderValue::from_str(h).ok())
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested);
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    headers.append(
        VARY,
        HeaderValue::from_static("origin, access-control-request-headers"),
    );
    res
}

/// Add the origin headers to a regular response.
pub fn decorate<R: Reply>(origin: Option<String>, reply: R) -> Response {
    let mut res = reply.into_response();
    let headers = res.headers_mut();
    allow_origin(headers, origin.as_deref());
    headers.append(VARY, HeaderValue::from_static("origin"));
    res
}

/// Credentials cannot be combined with `*`, so a known origin is echoed back.
fn allow_origin(headers: &mut HeaderMap, origin: Option<&str>) {
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        None => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
}
