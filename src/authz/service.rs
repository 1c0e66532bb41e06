//! Request-to-decision pipeline.

use std::sync::Arc;

use tracing::{info, warn};

use crate::authz::errors::AuthzError;
use crate::authz::loader::PolicyLoader;
use crate::authz::store::PolicyStore;
use crate::authz::types::{AuthorizationRequest, Identity, Principal};
use crate::authz::{audience, engine, principals};

/// Outcome of one authorization request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Effective principals the decision was computed for
    pub principals: Vec<Principal>,
    /// The request as evaluated, with server-injected context
    pub request: AuthorizationRequest,
}

/// Composes audience resolution, principal resolution and evaluation over the
/// current policy snapshot, and reloads that snapshot on demand.
pub struct DecisionService {
    store: Arc<PolicyStore>,
    loader: Arc<dyn PolicyLoader>,
}

impl DecisionService {
    pub fn new(store: Arc<PolicyStore>, loader: Arc<dyn PolicyLoader>) -> Self {
        Self { store, loader }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn decide(
        &self,
        origin: &str,
        remote_addr: &str,
        mut request: AuthorizationRequest,
        identity: &Identity,
    ) -> Result<Decision, AuthzError> {
        let audience = audience::resolve(origin);

        // Pin the snapshot for the whole evaluation.
        let policy = self.store.get(&audience);

        let effective = principals::resolve(
            &request.principals,
            identity,
            &request.context.roles,
            policy.as_deref(),
        )?;

        request.context.audience = Some(audience.clone());
        request.context.remote_ip = Some(remote_addr.to_string());

        let allowed = engine::evaluate(
            policy.as_deref(),
            &effective,
            &request.action,
            &request.resource,
        );

        info!(
            audience = %audience,
            remote_ip = %remote_addr,
            action = %request.action,
            resource = %request.resource,
            principals = ?effective,
            known_audience = policy.is_some(),
            allowed,
            "authorization decision"
        );

        request.principals = effective.clone();
        Ok(Decision {
            allowed,
            principals: effective,
            request,
        })
    }

    /// Re-read the policy sources and publish them. On any error the current
    /// snapshot is left untouched.
    pub fn reload(&self) -> Result<(), AuthzError> {
        let result = self
            .loader
            .load()
            .and_then(|policies| self.store.replace_all(policies));
        match &result {
            Ok(()) => info!("Policies reloaded"),
            Err(e) => warn!(error = %e, "Policy reload failed, keeping previous policies"),
        }
        result
    }
}
