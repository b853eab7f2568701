//! Shared response-header helpers for SockJS endpoints.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, CACHE_CONTROL, COOKIE, EXPIRES,
    ORIGIN, SET_COOKIE,
};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{Duration, Utc};

pub const CACHE_CONTROL_NO_CACHE: &str =
    "no-store, no-cache, no-transform, must-revalidate, max-age=0";

const YEAR_SECONDS: &str = "31536000";

/// CORS headers mirroring the request `Origin` (credentials allowed for any
/// concrete origin) and any requested headers.
pub fn cors_headers(request_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let origin = request_headers
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());

    if let Some(requested) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    if origin != "*" {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    headers
}

/// `Set-Cookie: sessionID=...; Path=/`, echoing the client's cookie or
/// falling back to `dummy`.
pub fn session_cookie(request_headers: &HeaderMap) -> HeaderMap {
    let sid = request_headers
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(cookie_value)
        .unwrap_or("dummy");

    let mut headers = HeaderMap::new();
    let cookie = format!("sessionID={sid}; Path=/");
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            headers.insert(SET_COOKIE, value);
        }
        Err(_) => {
            headers.insert(
                SET_COOKIE,
                HeaderValue::from_static("sessionID=dummy; Path=/"),
            );
        }
    }
    headers
}

fn cookie_value(cookies: &str) -> Option<&str> {
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "sessionID").then_some(value)
    })
}

/// Year-long cache block for the iframe page and CORS preflights.
pub fn cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(YEAR_SECONDS));
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("max-age=31536000, public"),
    );
    let expires = (Utc::now() + Duration::days(365))
        .format("%a, %d %b %Y %H:%M:%S")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&expires) {
        headers.insert(EXPIRES, value);
    }
    headers
}

/// First value of a query parameter, percent-decoded.
pub fn query_param(query: &str, name: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// SockJS callback parameters admit only `[A-Za-z0-9_.]+`.
pub fn valid_callback(callback: &str) -> bool {
    !callback.is_empty()
        && callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}
