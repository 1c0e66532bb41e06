use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A principal tag such as "userid:maria", "tag:admins" or "role:editor".
/// Compared by exact string equality.
pub type Principal = String;

/// Audience key, taken verbatim from the request `Origin`.
pub type Audience = String;

/// Wildcard marker accepted in any rule field.
pub const WILDCARD: &str = "*";

/// Field matcher in a rule: either `*` or a literal compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    Any,
    Exact(String),
}

impl Matcher {
    pub fn parse(s: &str) -> Self {
        if s == WILDCARD {
            Matcher::Any
        } else {
            Matcher::Exact(s.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(literal) => literal == value,
        }
    }
}

impl std::fmt::Display for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Any => f.write_str(WILDCARD),
            Matcher::Exact(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Effect::Allow),
            "deny" => Some(Effect::Deny),
            _ => None,
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => f.write_str("allow"),
            Effect::Deny => f.write_str("deny"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Label used in logs and error messages
    pub name: String,
    pub effect: Effect,
    pub principals: Vec<Matcher>,
    pub actions: Vec<Matcher>,
    /// Empty means the rule only applies to requests without a resource.
    pub resources: Vec<Matcher>,
}

/// All policies governing one audience. Immutable once published to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    pub rules: Vec<Rule>,
    /// principal -> extra principals granted when it is present
    pub local_principals: HashMap<Principal, Vec<Principal>>,
    /// role name -> principal
    pub roles: HashMap<String, Principal>,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub audiences: Vec<(Audience, PolicySet)>,
}

/// Identity established by the authentication layer for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    /// Authentication disabled, principals must be declared in the request.
    #[default]
    Anonymous,
    /// Principals extracted from a verified token.
    Authenticated(Vec<Principal>),
}

// ---------- API request/response types ----------

/// Request context. `audience` and `remoteIP` are always overwritten by the
/// server; `roles` must be a list of strings. Other keys pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, rename = "remoteIP", skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AuthorizationRequest {
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub principals: Vec<Principal>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub resource: String,
    /// `null` is accepted and treated as an empty context
    #[serde(default, deserialize_with = "null_as_default")]
    pub context: Context,
}

/// `null` reads as the type's default, like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecisionResponse {
    pub allowed: bool,
    pub principals: Vec<Principal>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub message: String,
}
