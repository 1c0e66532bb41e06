use crate::authz::types::{Effect, Matcher, PolicySet, Principal, Rule};

/// Decide whether `principals` may perform `action` on `resource`.
///
/// Default deny: an absent policy set (unknown audience) or no matching rule
/// yields `false`, and a matching deny rule beats every matching allow.
pub fn evaluate(
    policy: Option<&PolicySet>,
    principals: &[Principal],
    action: &str,
    resource: &str,
) -> bool {
    let Some(policy) = policy else {
        return false;
    };

    let mut allowed = false;
    for rule in &policy.rules {
        if !rule_matches(rule, principals, action, resource) {
            continue;
        }
        match rule.effect {
            Effect::Deny => {
                tracing::debug!(rule = %rule.name, action, resource, "denied by rule");
                return false;
            }
            Effect::Allow => allowed = true,
        }
    }

    allowed
}

/// A rule matches when each of its fields accepts the request.
pub fn rule_matches(rule: &Rule, principals: &[Principal], action: &str, resource: &str) -> bool {
    let principal_match = rule
        .principals
        .iter()
        .any(|m| matches!(m, Matcher::Any) || principals.iter().any(|p| m.matches(p)));
    if !principal_match {
        return false;
    }

    if !rule.actions.iter().any(|m| m.matches(action)) {
        return false;
    }

    if rule.resources.is_empty() {
        return resource.is_empty();
    }
    rule.resources.iter().any(|m| m.matches(resource))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matchers(values: &[&str]) -> Vec<Matcher> {
        values.iter().map(|s| Matcher::parse(s)).collect()
    }

    fn rule(effect: Effect, principals: &[&str], actions: &[&str], resources: &[&str]) -> Rule {
        Rule {
            name: "test".into(),
            effect,
            principals: matchers(principals),
            actions: matchers(actions),
            resources: matchers(resources),
        }
    }

    fn policy(rules: Vec<Rule>) -> PolicySet {
        PolicySet {
            rules,
            ..Default::default()
        }
    }

    fn p(values: &[&str]) -> Vec<Principal> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_audience_denies() {
        assert!(!evaluate(None, &p(&["userid:foo"]), "delete", "anything"));
    }

    #[test]
    fn test_no_rules_denies() {
        let policy = policy(vec![]);
        assert!(!evaluate(Some(&policy), &p(&["userid:foo"]), "read", ""));
    }

    #[test]
    fn test_wildcard_principal_allows() {
        let policy = policy(vec![rule(
            Effect::Allow,
            &["*"],
            &["delete"],
            &["server.org/blocklist:onecrl"],
        )]);
        assert!(evaluate(
            Some(&policy),
            &p(&["userid:foo"]),
            "delete",
            "server.org/blocklist:onecrl"
        ));
        assert!(!evaluate(
            Some(&policy),
            &p(&["userid:foo"]),
            "create",
            "server.org/blocklist:onecrl"
        ));
        assert!(!evaluate(
            Some(&policy),
            &p(&["userid:foo"]),
            "delete",
            "server.org/blocklist:other"
        ));
    }

    #[test]
    fn test_principal_intersection() {
        let policy = policy(vec![rule(Effect::Allow, &["tag:admins"], &["update"], &["*"])]);
        assert!(evaluate(
            Some(&policy),
            &p(&["userid:maria", "tag:admins"]),
            "update",
            ""
        ));
        assert!(!evaluate(Some(&policy), &p(&["userid:maria"]), "update", ""));
    }

    #[test]
    fn test_wildcard_matches_empty_resource() {
        let policy = policy(vec![rule(Effect::Allow, &["*"], &["*"], &["*"])]);
        assert!(evaluate(Some(&policy), &p(&["userid:x"]), "", ""));
        assert!(evaluate(Some(&policy), &p(&["userid:x"]), "anything", "anywhere"));
    }

    #[test]
    fn test_rule_without_resources_needs_empty_resource() {
        let policy = policy(vec![rule(Effect::Allow, &["userid:x"], &["read"], &[])]);
        assert!(evaluate(Some(&policy), &p(&["userid:x"]), "read", ""));
        assert!(!evaluate(Some(&policy), &p(&["userid:x"]), "read", "pto"));
    }

    #[test]
    fn test_no_prefix_or_pattern_matching() {
        let policy = policy(vec![rule(
            Effect::Allow,
            &["userid:x"],
            &["read"],
            &["server.org/*"],
        )]);
        assert!(!evaluate(
            Some(&policy),
            &p(&["userid:x"]),
            "read",
            "server.org/blocklist"
        ));
        assert!(evaluate(Some(&policy), &p(&["userid:x"]), "read", "server.org/*"));
    }

    #[test]
    fn test_deny_overrides_allow() {
        let allow = rule(Effect::Allow, &["*"], &["update"], &["pto"]);
        let deny = rule(Effect::Deny, &["userid:intern"], &["update"], &["pto"]);

        let allow_first = policy(vec![allow.clone(), deny.clone()]);
        let deny_first = policy(vec![deny, allow]);
        for policy in [&allow_first, &deny_first] {
            assert!(!evaluate(Some(policy), &p(&["userid:intern"]), "update", "pto"));
            assert!(evaluate(Some(policy), &p(&["userid:bob"]), "update", "pto"));
        }
    }

    #[test]
    fn test_non_matching_deny_is_ignored() {
        let policy = policy(vec![
            rule(Effect::Deny, &["*"], &["delete"], &["*"]),
            rule(Effect::Allow, &["*"], &["read"], &["*"]),
        ]);
        assert!(evaluate(Some(&policy), &p(&["userid:x"]), "read", "pto"));
        assert!(!evaluate(Some(&policy), &p(&["userid:x"]), "delete", "pto"));
    }
}
