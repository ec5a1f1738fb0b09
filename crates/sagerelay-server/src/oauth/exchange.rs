//! Authorization code redemption
//!
//! Implements the credential exchange against the provider's Graph-style
//! OAuth endpoints: mint a sealed state, send the user off to authorize,
//! then redeem the code they come back with for a long-lived token and hand
//! that token to the caller's state URL.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::OAuthConfig;
use crate::oauth::state::{CredentialState, StateCipher, StateError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure taxonomy for the redemption flow, in pipeline order.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("state decryption failed: {0}")]
    Decryption(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("token persistence failed: {0}")]
    Persist(String),
}

/// Outcome of classifying a persist-callback status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistVerdict {
    Persisted,
    Rejected,
}

/// Classify the status returned by the state-URL POST.
///
/// Success statuses persist. So does anything strictly below 100: the
/// upstream is known to update state correctly and then answer with a
/// nonsense status in that range, and treating it as a failure would force
/// users to re-authorize for no reason.
pub fn classify_persist_status(status: u16) -> PersistVerdict {
    if status < 100 || (200..300).contains(&status) {
        PersistVerdict::Persisted
    } else {
        PersistVerdict::Rejected
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct PersistedTokens {
    #[serde(rename = "longLivedToken")]
    long_lived_token: String,
}

#[derive(Debug, Serialize)]
struct PersistedState {
    tokens: PersistedTokens,
    redirect: String,
}

pub struct CredentialExchange {
    http: reqwest::Client,
    cipher: StateCipher,
    config: OAuthConfig,
}

impl CredentialExchange {
    pub fn new(config: &OAuthConfig) -> anyhow::Result<Self> {
        let cipher = StateCipher::from_base64_key(&config.state_key)
            .map_err(|e| anyhow::anyhow!("OAUTH_STATE_KEY is unusable: {e}"))?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            http,
            cipher,
            config: config.clone(),
        })
    }

    /// Redirect URI registered with the provider for this deployment.
    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }

    /// Seal a fresh state blob for one authorization round trip.
    pub fn mint_state(&self, state_url: &str) -> Result<String, StateError> {
        self.cipher.seal(&CredentialState {
            state_url: state_url.to_string(),
            payload: None,
        })
    }

    /// Provider authorize URL carrying the sealed state.
    pub fn login_url(&self, redirect_uri: &str, state_blob: &str) -> Result<String, OAuthError> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| OAuthError::Exchange(format!("bad authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state_blob)
            .append_pair("scope", &self.config.scope);
        Ok(url.to_string())
    }

    /// Run the full redemption: open the state, exchange the code, persist
    /// the token at the caller's state URL.
    ///
    /// An unopenable state never reaches the token endpoint.
    #[instrument(skip_all)]
    pub async fn redeem(
        &self,
        code: &str,
        state_blob: &str,
        redirect_uri: &str,
    ) -> Result<(), OAuthError> {
        let state = self
            .cipher
            .open(state_blob)
            .map_err(|e| OAuthError::Decryption(e.to_string()))?;

        let token = self.exchange_code(code, redirect_uri).await?;
        debug!("Authorization code exchanged for a long-lived token");

        self.persist(&state.state_url, token, redirect_uri).await
    }

    /// Exchange the authorization code for a long-lived token.
    ///
    /// Sending the client secret with the code skips the short-lived hop and
    /// yields the ~60 day token directly.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .get(&self.config.token_url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Exchange(format!(
                "token endpoint answered {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(format!("unreadable token response: {e}")))?;

        Ok(token.access_token)
    }

    /// POST the redeemed token to the caller's state URL.
    async fn persist(
        &self,
        state_url: &str,
        long_lived_token: String,
        redirect_uri: &str,
    ) -> Result<(), OAuthError> {
        let body = PersistedState {
            tokens: PersistedTokens { long_lived_token },
            redirect: redirect_uri.to_string(),
        };

        let response = self
            .http
            .post(state_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OAuthError::Persist(e.to_string()))?;

        let status = response.status().as_u16();
        match classify_persist_status(status) {
            PersistVerdict::Persisted => {
                if !(200..300).contains(&status) {
                    debug!(status, "Tolerating sub-100 status from state update");
                }
                Ok(())
            },
            PersistVerdict::Rejected => {
                error!(status, "State URL rejected the token update");
                Err(OAuthError::Persist(format!(
                    "state URL answered {status}"
                )))
            },
        }
    }

    /// Liveness probe for a previously issued token.
    ///
    /// Expired and revoked tokens come back as 200 with an error-shaped body,
    /// so both the status and the body are inspected. Every failure mode
    /// collapses to `false`; a probe can never take the caller down.
    #[instrument(skip_all)]
    pub async fn check_token(&self, token: &str) -> bool {
        let response = match self
            .http
            .get(&self.config.profile_url)
            .query(&[("access_token", token)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Token check failed to reach the profile endpoint");
                return false;
            },
        };

        if !response.status().is_success() {
            debug!(status = response.status().as_u16(), "Token check rejected");
            return false;
        }

        match response.json::<serde_json::Value>().await {
            Ok(body) => {
                if let Some(error) = body.get("error") {
                    debug!(%error, "Token expired or revoked");
                    false
                } else {
                    true
                }
            },
            Err(e) => {
                warn!(error = %e, "Unreadable profile response during token check");
                false
            },
        }
    }
}
