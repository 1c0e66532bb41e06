//! Bearer token authentication.
//!
//! Tokens are RS256 JWTs verified against the issuer's JWKS. The key set is
//! fetched lazily and refetched when a token names an unknown `kid`, at most
//! once per refresh interval.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use josekit::jwk::{Jwk, JwkSet};
use josekit::jws::RS256;
use josekit::jwt::{self, JwtPayload, JwtPayloadValidator};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::authz::audience;
use crate::authz::errors::AuthzError;
use crate::authz::types::{Identity, Principal};

const TOKEN_NOT_FOUND: &str = "Token not found";

/// Minimum time between two JWKS fetches triggered by unknown key ids.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Turns a bearer credential into the caller's principals.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str, audience: &str)
        -> Result<Vec<Principal>, AuthzError>;
}

/// RS256 JWT validator bound to one issuer.
pub struct JwtValidator {
    issuer: String,
    jwks_uri: String,
    keys: RwLock<Option<Arc<JwkSet>>>,
    /// Last fetch attempt, successful or not
    last_fetch: Mutex<Option<Instant>>,
    refresh_interval: Duration,
    client: reqwest::Client,
}

impl JwtValidator {
    /// Validator fetching keys from `jwks_uri`, or from the issuer's
    /// `/.well-known/jwks.json` when not given.
    pub fn new(issuer: &str, jwks_uri: Option<&str>) -> Result<Self, AuthzError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthzError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            issuer: issuer.to_string(),
            jwks_uri: jwks_uri
                .map(str::to_string)
                .unwrap_or_else(|| default_jwks_uri(issuer)),
            keys: RwLock::new(None),
            last_fetch: Mutex::new(None),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            client,
        })
    }

    /// Validator with a fixed key set. Nothing is fetched unless a token names
    /// a key that is missing from it.
    pub fn with_jwks(issuer: &str, jwks: JwkSet) -> Self {
        Self {
            issuer: issuer.to_string(),
            jwks_uri: default_jwks_uri(issuer),
            keys: RwLock::new(Some(Arc::new(jwks))),
            last_fetch: Mutex::new(None),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            client: reqwest::Client::new(),
        }
    }

    /// Override the minimum time between fetches caused by unknown key ids.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    async fn refresh(&self) -> Result<Arc<JwkSet>, AuthzError> {
        debug!(jwks_uri = %self.jwks_uri, "Fetching JWKS");
        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
                AuthzError::Unauthorized(format!("unable to fetch signing keys: {e}"))
            })?;
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthzError::Unauthorized(format!("unable to fetch signing keys: {e}")))?;
        let jwks = JwkSet::from_bytes(&body)
            .map_err(|e| AuthzError::Unauthorized(format!("invalid JWKS: {e}")))?;

        info!(jwks_uri = %self.jwks_uri, keys = jwks.keys().len(), "JWKS fetched");
        let jwks = Arc::new(jwks);
        *self.keys.write() = Some(jwks.clone());
        Ok(jwks)
    }

    async fn signing_key(&self, kid: Option<&str>) -> Result<Jwk, AuthzError> {
        let cached = self.keys.read().clone();
        if let Some(jwks) = &cached {
            if let Some(key) = find_key(jwks, kid) {
                return Ok(key);
            }
        }

        let missing = || {
            AuthzError::Unauthorized(format!(
                "no signing key found for kid `{}`",
                kid.unwrap_or_default()
            ))
        };

        if !self.claim_refresh() {
            debug!(kid = kid.unwrap_or_default(), "unknown kid, JWKS refresh throttled");
            return Err(missing());
        }

        let jwks = self.refresh().await?;
        find_key(&jwks, kid).ok_or_else(missing)
    }

    /// Reserve the next fetch slot. Only one fetch is allowed per refresh
    /// interval, failed attempts included.
    fn claim_refresh(&self) -> bool {
        let mut last = self.last_fetch.lock();
        if let Some(at) = *last {
            if at.elapsed() < self.refresh_interval {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }
}

#[async_trait]
impl Authenticator for JwtValidator {
    async fn authenticate(
        &self,
        token: &str,
        audience: &str,
    ) -> Result<Vec<Principal>, AuthzError> {
        let kid = jwt::decode_header(token)
            .map_err(|e| AuthzError::Unauthorized(format!("invalid token: {e}")))?
            .claim("kid")
            .and_then(Value::as_str)
            .map(str::to_string);

        let key = self.signing_key(kid.as_deref()).await?;
        let verifier = RS256
            .verifier_from_jwk(&key)
            .map_err(|e| AuthzError::Unauthorized(format!("unusable signing key: {e}")))?;
        let (payload, _) = jwt::decode_with_verifier(token, &verifier)
            .map_err(|e| AuthzError::Unauthorized(format!("invalid token: {e}")))?;

        let mut validator = JwtPayloadValidator::new();
        validator.set_issuer(&self.issuer);
        validator.set_base_time(SystemTime::now());
        if !audience.is_empty() {
            validator.set_audience(audience);
        }
        validator
            .validate(&payload)
            .map_err(|e| AuthzError::Unauthorized(format!("invalid token: {e}")))?;

        principals_from_payload(&payload)
    }
}

fn default_jwks_uri(issuer: &str) -> String {
    format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'))
}

fn find_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => jwks.get(kid).first().map(|k| (*k).clone()),
        None => jwks.keys().first().map(|k| (*k).clone()),
    }
}

/// `userid:<sub>`, then `email:<email>`, then one `group:<name>` per group.
pub fn principals_from_payload(payload: &JwtPayload) -> Result<Vec<Principal>, AuthzError> {
    let subject = payload
        .subject()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthzError::Unauthorized("token has no subject".into()))?;

    let mut principals = vec![format!("userid:{subject}")];

    if let Some(email) = payload.claim("email").and_then(Value::as_str) {
        principals.push(format!("email:{email}"));
    }

    if let Some(Value::Array(groups)) = payload.claim("groups") {
        principals.extend(
            groups
                .iter()
                .filter_map(Value::as_str)
                .map(|g| format!("group:{g}")),
        );
    }

    Ok(principals)
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(request: &Request) -> Option<String> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Middleware rejecting requests without a valid token and attaching the
/// authenticated identity otherwise.
pub async fn verify_jwt(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        debug!("request without bearer token");
        return AuthzError::Unauthorized(TOKEN_NOT_FOUND.into()).into_response();
    };

    let audience = audience::from_headers(request.headers());
    match authenticator.authenticate(&token, &audience).await {
        Ok(principals) => {
            request
                .extensions_mut()
                .insert(Identity::Authenticated(principals));
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "token rejected");
            e.into_response()
        }
    }
}
