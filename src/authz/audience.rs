use axum::http::{header, HeaderMap};

use crate::authz::types::Audience;

/// The declared origin is the audience, verbatim. No normalisation and no
/// fallback: an absent header yields the empty audience, which no policy
/// set can claim, so the request is denied downstream.
pub fn resolve(origin: &str) -> Audience {
    origin.to_string()
}

/// Read the audience from the `Origin` header.
pub fn from_headers(headers: &HeaderMap) -> Audience {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    resolve(origin)
}
