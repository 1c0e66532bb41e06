//! Server assembly: policies, authentication and the HTTP listener.
use crate::authz::jwt::{Authenticator, JwtValidator};
use crate::authz::loader::FileLoader;
use crate::authz::service::DecisionService;
use crate::authz::store::PolicyStore;
use crate::authz::web::router;
use crate::settings::Settings;
use miette::IntoDiagnostic;
use std::net::SocketAddr;
use std::sync::Arc;

/// Build the decision service and load the initial policies. Startup fails
/// when the policies cannot be loaded.
pub fn build_service(settings: &Settings) -> miette::Result<Arc<DecisionService>> {
    let loader = Arc::new(FileLoader::new(&settings.policies.path));
    let service = DecisionService::new(Arc::new(PolicyStore::new()), loader);
    service.reload().map_err(|e| {
        miette::miette!(
            "failed to load policies from `{}`: {e}",
            settings.policies.path.display()
        )
    })?;
    Ok(Arc::new(service))
}

pub fn build_authenticator(
    settings: &Settings,
) -> miette::Result<Option<Arc<dyn Authenticator>>> {
    let Some(issuer) = settings.jwt_issuer() else {
        return Ok(None);
    };
    let validator = JwtValidator::new(issuer, settings.auth.jwks_uri.as_deref())?;
    tracing::info!(issuer, jwks_uri = validator.jwks_uri(), "JWT authentication enabled");
    Ok(Some(Arc::new(validator)))
}

pub async fn serve(settings: Settings) -> miette::Result<()> {
    let service = build_service(&settings)?;
    let authenticator = build_authenticator(&settings)?;
    let app = router(service, authenticator);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;

    tracing::info!(%addr, "Authorization API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .into_diagnostic()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_service_requires_valid_policies() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.policies.path = dir.path().join("missing");
        assert!(build_service(&settings).is_err());

        std::fs::write(dir.path().join("bad.kdl"), "audience {").unwrap();
        settings.policies.path = dir.path().to_path_buf();
        assert!(build_service(&settings).is_err());

        std::fs::write(dir.path().join("bad.kdl"), "audience \"https://a\"").unwrap();
        let service = build_service(&settings).unwrap();
        assert!(service.store().get("https://a").is_some());
    }

    #[test]
    fn test_authenticator_disabled_without_issuer() {
        let settings = Settings::default();
        assert!(build_authenticator(&settings).unwrap().is_none());

        let mut settings = Settings::default();
        settings.auth.issuer = Some("https://auth.example.com/".into());
        assert!(build_authenticator(&settings).unwrap().is_some());
    }
}
