use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Missing body")]
    #[diagnostic(code(warden::authz::missing_body))]
    MissingBody,

    #[error("{0}")]
    #[diagnostic(code(warden::authz::malformed_payload))]
    MalformedPayload(String),

    #[error("missing principals")]
    #[diagnostic(
        code(warden::authz::missing_principals),
        help("Declare `principals` in the request body or enable JWT authentication")
    )]
    MissingPrincipals,

    #[error("cannot submit principals with JWT enabled")]
    #[diagnostic(code(warden::authz::conflicting_identity))]
    ConflictingIdentity,

    #[error("{0}")]
    #[diagnostic(code(warden::authz::unauthorized))]
    Unauthorized(String),

    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(warden::authz::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_policy),
        help("Each policy file must contain `audience` nodes holding `principal`, `role` or `rule` children")
    )]
    InvalidPolicy(String),

    #[error("Audience `{0}` is defined more than once")]
    #[diagnostic(
        code(warden::authz::duplicate_audience),
        help("Merge the definitions into a single `audience` node")
    )]
    DuplicateAudience(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(warden::authz::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(warden::authz::config))]
    Config(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(warden::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthzError::MissingBody
            | AuthzError::MalformedPayload(_)
            | AuthzError::MissingPrincipals
            | AuthzError::ConflictingIdentity => StatusCode::BAD_REQUEST,
            AuthzError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let body = json!({ "message": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
