use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub policies: Policies,
    #[serde(default)]
    pub auth: Auth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policies {
    /// A `.kdl` file or a directory of them. Default: policies
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Auth {
    /// JWT issuer URL, e.g. https://auth.example.auth0.com/
    /// When unset, requests must declare their principals.
    pub issuer: Option<String>,
    /// JWKS location. Defaults to `<issuer>/.well-known/jwks.json`
    pub jwks_uri: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            path: PathBuf::from("policies"),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default(
                "policies.path",
                Policies::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: WARDEN__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("WARDEN").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.policies.path.is_relative() {
            s.policies.path = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.policies.path);
        }

        // An empty issuer disables authentication like an absent one.
        if s.auth.issuer.as_deref().is_some_and(|i| i.trim().is_empty()) {
            s.auth.issuer = None;
        }

        Ok(s)
    }

    /// Configured JWT issuer, if authentication is enabled.
    pub fn jwt_issuer(&self) -> Option<&str> {
        self.auth.issuer.as_deref()
    }
}
