//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default interval between training job status queries.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default SMTP port (submission with STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default identity provider endpoints (Facebook Graph).
pub const DEFAULT_OAUTH_AUTHORIZE_URL: &str = "https://www.facebook.com/v11.0/dialog/oauth";
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://graph.facebook.com/v11.0/oauth/access_token";
pub const DEFAULT_OAUTH_PROFILE_URL: &str = "https://graph.facebook.com/v11.0/me";
pub const DEFAULT_OAUTH_SCOPE: &str = "ads_management,business_management";

/// Development-only state key (base64 of 32 zero bytes). Set OAUTH_STATE_KEY
/// in any real deployment.
pub const DEV_STATE_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub poll: PollConfig,
    pub smtp: SmtpConfig,
    pub oauth: OAuthConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    /// Optional S3 endpoint override (MinIO-style deployments and tests).
    pub s3_endpoint: Option<String>,
}

impl ServerConfig {
    /// How long in-flight connections get to drain on shutdown.
    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Poller cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
}

/// SMTP transport settings for job notifications. The recipient arrives with
/// each request; only the transport is server-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub username: String,
    pub password: String,
}

/// Identity-provider settings for the credential exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scope: String,
    /// Registered redirect URI for this deployment, used when redeeming the
    /// authorization code.
    pub redirect_uri: String,
    /// Base64-encoded 32-byte key sealing the redirect state blob.
    pub state_key: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("SAGERELAY_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("SAGERELAY_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("SAGERELAY_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
            },
            poll: PollConfig {
                interval_secs: std::env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            },
            smtp: SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT),
                from: std::env::var("SMTP_FROM")
                    .unwrap_or_else(|_| "sagerelay@localhost".to_string()),
                username: std::env::var("SMTP_USER").unwrap_or_default(),
                password: std::env::var("SMTP_PASS").unwrap_or_default(),
            },
            oauth: OAuthConfig {
                client_id: std::env::var("OAUTH_CLIENT_ID").unwrap_or_default(),
                client_secret: std::env::var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
                authorize_url: std::env::var("OAUTH_AUTHORIZE_URL")
                    .unwrap_or_else(|_| DEFAULT_OAUTH_AUTHORIZE_URL.to_string()),
                token_url: std::env::var("OAUTH_TOKEN_URL")
                    .unwrap_or_else(|_| DEFAULT_OAUTH_TOKEN_URL.to_string()),
                profile_url: std::env::var("OAUTH_PROFILE_URL")
                    .unwrap_or_else(|_| DEFAULT_OAUTH_PROFILE_URL.to_string()),
                scope: std::env::var("OAUTH_SCOPE")
                    .unwrap_or_else(|_| DEFAULT_OAUTH_SCOPE.to_string()),
                redirect_uri: std::env::var("OAUTH_REDIRECT_URI").unwrap_or_default(),
                state_key: std::env::var("OAUTH_STATE_KEY")
                    .unwrap_or_else(|_| DEV_STATE_KEY.to_string()),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.poll.interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.smtp.host.is_empty() {
            anyhow::bail!("SMTP host cannot be empty");
        }

        if self.oauth.client_id.is_empty() {
            tracing::warn!(
                "OAUTH_CLIENT_ID is not set - credential exchange requests will be rejected by the provider"
            );
        }

        if self.oauth.state_key == DEV_STATE_KEY {
            tracing::warn!("OAUTH_STATE_KEY is not set - using the development state key");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                s3_endpoint: None,
            },
            poll: PollConfig {
                interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: DEFAULT_SMTP_PORT,
                from: "sagerelay@localhost".to_string(),
                username: String::new(),
                password: String::new(),
            },
            oauth: OAuthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                authorize_url: DEFAULT_OAUTH_AUTHORIZE_URL.to_string(),
                token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
                profile_url: DEFAULT_OAUTH_PROFILE_URL.to_string(),
                scope: DEFAULT_OAUTH_SCOPE.to_string(),
                redirect_uri: String::new(),
                state_key: DEV_STATE_KEY.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shutdown_grace_honors_configured_value() {
        let mut config = Config::default();
        config.server.shutdown_timeout_secs = 120;
        assert_eq!(
            config.server.shutdown_grace(),
            std::time::Duration::from_secs(120)
        );
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.poll.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
