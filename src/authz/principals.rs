//! Resolution of the effective principal set for a request.

use crate::authz::errors::AuthzError;
use crate::authz::types::{Identity, PolicySet, Principal};

/// Merge the request's identity sources into one principal list.
///
/// An authenticated identity always wins, and declaring principals next to it
/// is rejected outright. The base set is then expanded once through the
/// audience's local principals and once through its role mapping. Additions
/// are never re-expanded. Unknown role names are ignored.
///
/// Output order is `base ++ local expansion ++ role expansion`.
pub fn resolve(
    declared: &[Principal],
    identity: &Identity,
    context_roles: &[String],
    policy: Option<&PolicySet>,
) -> Result<Vec<Principal>, AuthzError> {
    let base: &[Principal] = match identity {
        Identity::Authenticated(_) if !declared.is_empty() => {
            return Err(AuthzError::ConflictingIdentity);
        }
        Identity::Authenticated(authenticated) => authenticated,
        Identity::Anonymous => declared,
    };

    if base.is_empty() {
        return Err(AuthzError::MissingPrincipals);
    }

    let mut principals = base.to_vec();

    // Unknown audience: nothing to expand with, the engine will deny anyway.
    let Some(policy) = policy else {
        return Ok(principals);
    };

    for principal in base {
        if let Some(extra) = policy.local_principals.get(principal) {
            principals.extend(extra.iter().cloned());
        }
    }

    for role in context_roles {
        match policy.roles.get(role) {
            Some(principal) => principals.push(principal.clone()),
            None => tracing::debug!(role = %role, "ignoring unknown role"),
        }
    }

    Ok(principals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(values: &[&str]) -> Vec<Principal> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn sample_policy() -> PolicySet {
        let mut policy = PolicySet::default();
        policy
            .local_principals
            .insert("userid:maria".into(), p(&["tag:admins"]));
        policy.roles.insert("editor".into(), "role:editor".into());
        policy
    }

    #[test]
    fn test_conflicting_identity() {
        let identity = Identity::Authenticated(p(&["userid:maria"]));
        let err = resolve(&p(&["userid:superuser"]), &identity, &[], Some(&sample_policy()))
            .unwrap_err();
        assert!(matches!(err, AuthzError::ConflictingIdentity));
    }

    #[test]
    fn test_conflict_checked_before_audience() {
        let identity = Identity::Authenticated(p(&["userid:maria"]));
        let err = resolve(&p(&["userid:superuser"]), &identity, &[], None).unwrap_err();
        assert!(matches!(err, AuthzError::ConflictingIdentity));
    }

    #[test]
    fn test_missing_principals() {
        let err = resolve(&[], &Identity::Anonymous, &[], Some(&sample_policy())).unwrap_err();
        assert!(matches!(err, AuthzError::MissingPrincipals));

        let err = resolve(&[], &Identity::Authenticated(vec![]), &[], None).unwrap_err();
        assert!(matches!(err, AuthzError::MissingPrincipals));
    }

    #[test]
    fn test_authenticated_principals_used() {
        let identity = Identity::Authenticated(p(&["userid:maria"]));
        let resolved = resolve(&[], &identity, &[], Some(&sample_policy())).unwrap();
        assert_eq!(resolved, p(&["userid:maria", "tag:admins"]));
    }

    #[test]
    fn test_declared_principals_and_roles() {
        let resolved = resolve(
            &p(&["userid:bob"]),
            &Identity::Anonymous,
            &p(&["editor"]),
            Some(&sample_policy()),
        )
        .unwrap();
        assert_eq!(resolved, p(&["userid:bob", "role:editor"]));
    }

    #[test]
    fn test_unknown_roles_are_ignored() {
        let resolved = resolve(
            &p(&["userid:bob"]),
            &Identity::Anonymous,
            &p(&["astronaut", "editor"]),
            Some(&sample_policy()),
        )
        .unwrap();
        assert_eq!(resolved, p(&["userid:bob", "role:editor"]));
    }

    #[test]
    fn test_local_expansion_is_not_recursive() {
        let mut policy = PolicySet::default();
        policy.local_principals.insert("a".into(), p(&["b"]));
        policy.local_principals.insert("b".into(), p(&["c"]));

        let resolved = resolve(&p(&["a"]), &Identity::Anonymous, &[], Some(&policy)).unwrap();
        assert_eq!(resolved, p(&["a", "b"]));
    }

    #[test]
    fn test_expansion_order() {
        let mut policy = sample_policy();
        policy
            .local_principals
            .insert("userid:bob".into(), p(&["tag:staff", "tag:pto"]));

        let resolved = resolve(
            &p(&["userid:maria", "userid:bob"]),
            &Identity::Anonymous,
            &p(&["editor"]),
            Some(&policy),
        )
        .unwrap();
        assert_eq!(
            resolved,
            p(&[
                "userid:maria",
                "userid:bob",
                "tag:admins",
                "tag:staff",
                "tag:pto",
                "role:editor"
            ])
        );
    }

    #[test]
    fn test_unknown_audience_returns_base() {
        let resolved =
            resolve(&p(&["userid:bob"]), &Identity::Anonymous, &p(&["editor"]), None).unwrap();
        assert_eq!(resolved, p(&["userid:bob"]));
    }
}
