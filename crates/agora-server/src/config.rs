use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    /// Per-connection outbound queue length.
    pub connection_buffer: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; it must match the issuer's secret");
        }

        let db_path: PathBuf = var("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into()).into();
        let host = var("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("AGORA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let connection_buffer: usize = var("AGORA_CONNECTION_BUFFER")
            .unwrap_or_else(|| "256".into())
            .parse()
            .context("AGORA_CONNECTION_BUFFER must be a positive integer")?;
        if connection_buffer == 0 {
            bail!("AGORA_CONNECTION_BUFFER must be at least 1");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            connection_buffer,
        })
    }
}
