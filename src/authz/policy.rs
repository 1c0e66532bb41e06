use crate::authz::errors::AuthzError;
use crate::authz::types::*;
use kdl::{KdlDocument, KdlNode};

/// Parse a KDL document string into typed policy structs.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "audience" => {
                let audience = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidPolicy(
                        "audience node requires a string argument (e.g. audience \"https://app.example.com\")"
                            .into(),
                    )
                })?;
                let set = parse_audience(&audience, node)?;
                policy.audiences.push((audience, set));
            }
            other => {
                // Ignore comments and unknown top-level nodes with a warning
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

fn parse_audience(audience: &str, node: &KdlNode) -> Result<PolicySet, AuthzError> {
    let mut set = PolicySet::default();

    let Some(children) = node.children() else {
        return Ok(set);
    };

    for child in children.nodes() {
        match child.name().value() {
            "principal" => {
                let principal = first_string_arg(child).ok_or_else(|| {
                    AuthzError::InvalidPolicy(format!(
                        "principal node in audience `{audience}` requires a string argument (e.g. principal \"userid:maria\")"
                    ))
                })?;
                set.local_principals
                    .entry(principal)
                    .or_default()
                    .extend(dash_list(child));
            }
            "role" => {
                let args = string_args(child);
                let [name, principal] = args.as_slice() else {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "role node in audience `{audience}` requires a name and a principal (e.g. role \"editor\" \"role:editor\")"
                    )));
                };
                if set.roles.insert(name.clone(), principal.clone()).is_some() {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "role `{name}` is mapped twice in audience `{audience}`"
                    )));
                }
            }
            "rule" => {
                set.rules.push(parse_rule(audience, child)?);
            }
            other => {
                return Err(AuthzError::InvalidPolicy(format!(
                    "unexpected child `{other}` in audience `{audience}` (expected `principal`, `role` or `rule`)"
                )));
            }
        }
    }

    Ok(set)
}

fn parse_rule(audience: &str, node: &KdlNode) -> Result<Rule, AuthzError> {
    let name = first_string_arg(node).ok_or_else(|| {
        AuthzError::InvalidPolicy(format!(
            "rule node in audience `{audience}` requires a string argument (e.g. rule \"MyRule\" effect=\"allow\")"
        ))
    })?;

    let effect_str = match node.get("effect") {
        None => "allow",
        Some(value) => value.as_string().ok_or_else(|| {
            AuthzError::InvalidPolicy(format!(
                "rule `{name}` effect must be a string (\"allow\" or \"deny\"), got `{value}`"
            ))
        })?,
    };
    let effect = Effect::parse(effect_str).ok_or_else(|| {
        AuthzError::InvalidPolicy(format!(
            "rule `{name}` has unknown effect `{effect_str}` (expected \"allow\" or \"deny\")"
        ))
    })?;

    let mut principals = None;
    let mut actions = None;
    let mut resources = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let field = child.name().value();
            let slot = match field {
                "principals" => &mut principals,
                "actions" => &mut actions,
                "resources" => &mut resources,
                other => {
                    return Err(AuthzError::InvalidPolicy(format!(
                        "unexpected child `{other}` in rule `{name}`"
                    )));
                }
            };
            if slot.replace(matchers(child)).is_some() {
                return Err(AuthzError::InvalidPolicy(format!(
                    "rule `{name}` declares `{field}` more than once"
                )));
            }
        }
    }

    let principals = principals.unwrap_or_default();
    let actions = actions.unwrap_or_default();
    let resources = resources.unwrap_or_default();

    Ok(Rule {
        name,
        effect,
        principals,
        actions,
        resources,
    })
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// All positional string arguments of a KDL node.
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// actions {
///     - "read"
///     - "update"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}

fn matchers(node: &KdlNode) -> Vec<Matcher> {
    dash_list(node).iter().map(|s| Matcher::parse(s)).collect()
}
