//! Audience-keyed policy storage with atomic, all-or-nothing reload.
//!
//! The whole store is one immutable snapshot behind an `Arc`. Readers clone the
//! `Arc` under a read lock held only for that clone, so an evaluation keeps
//! whichever snapshot it started with. A reload validates the candidate
//! snapshot completely before taking the write lock, and the write lock only
//! covers the pointer swap.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::authz::errors::AuthzError;
use crate::authz::types::{Audience, Matcher, PolicySet};

/// One published generation of policies for every audience.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    audiences: HashMap<Audience, Arc<PolicySet>>,
}

impl PolicySnapshot {
    pub fn get(&self, audience: &str) -> Option<Arc<PolicySet>> {
        self.audiences.get(audience).cloned()
    }

    pub fn audiences(&self) -> impl Iterator<Item = &str> {
        self.audiences.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.audiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audiences.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.audiences.values().map(|p| p.rules.len()).sum()
    }
}

/// Policy store. `None` until the first successful `replace_all`; there is
/// no way back to the empty state.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Option<Arc<PolicySnapshot>>>,
    /// Serializes reloads so validate-then-swap runs one at a time
    reload: Mutex<()>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current policy set for `audience`, if any.
    pub fn get(&self, audience: &str) -> Option<Arc<PolicySet>> {
        self.snapshot()?.get(audience)
    }

    /// Current snapshot, or `None` before the first successful load.
    pub fn snapshot(&self) -> Option<Arc<PolicySnapshot>> {
        self.current.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Validate `policies` and publish them as the new snapshot.
    ///
    /// On error nothing is published and the previous snapshot stays current.
    pub fn replace_all(&self, policies: HashMap<Audience, PolicySet>) -> Result<(), AuthzError> {
        let _guard = self.reload.lock();

        validate_snapshot(&policies)?;

        let snapshot = Arc::new(PolicySnapshot {
            audiences: policies
                .into_iter()
                .map(|(audience, policy)| (audience, Arc::new(policy)))
                .collect(),
        });
        let audiences = snapshot.len();
        let rules = snapshot.rule_count();

        *self.current.write() = Some(snapshot);

        info!(audiences, rules, "Policy snapshot published");
        Ok(())
    }
}

/// Check every policy set of a candidate snapshot.
pub fn validate_snapshot(policies: &HashMap<Audience, PolicySet>) -> Result<(), AuthzError> {
    for (audience, policy) in policies {
        if audience.is_empty() {
            return Err(AuthzError::InvalidPolicy(
                "audience name must not be empty".into(),
            ));
        }
        validate_policy_set(audience, policy)?;
    }
    Ok(())
}

fn validate_policy_set(audience: &str, policy: &PolicySet) -> Result<(), AuthzError> {
    for rule in &policy.rules {
        let at = || format!("rule `{}` of audience `{audience}`", rule.name);

        if rule.principals.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "{} has no principals",
                at()
            )));
        }
        if rule.actions.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!("{} has no actions", at())));
        }

        let all = rule
            .principals
            .iter()
            .chain(&rule.actions)
            .chain(&rule.resources);
        for matcher in all {
            if matches!(matcher, Matcher::Exact(s) if s.is_empty()) {
                return Err(AuthzError::InvalidPolicy(format!(
                    "{} contains an empty matcher",
                    at()
                )));
            }
        }
    }

    for (principal, extra) in &policy.local_principals {
        if principal.is_empty() || extra.iter().any(String::is_empty) {
            return Err(AuthzError::InvalidPolicy(format!(
                "empty principal in local principals of audience `{audience}`"
            )));
        }
    }

    for (role, principal) in &policy.roles {
        if role.is_empty() || principal.is_empty() {
            return Err(AuthzError::InvalidPolicy(format!(
                "empty role mapping in audience `{audience}`"
            )));
        }
    }

    Ok(())
}
