//! The external identity provider (OAuth2 authorization-code flow).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    config::OAuthConfig,
    error::{AppError, Result},
    models::user::LoginProfile,
};

const AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_ME: &str = "https://graph.microsoft.com/v1.0/me";

/// Tokens returned by a successful code exchange.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// The subset of the provider's user document the application reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
    pub display_name: Option<String>,
}

impl ProviderProfile {
    /// Normalises the profile: lower-cased email from `mail` or the UPN,
    /// display name falling back to the email.
    pub fn into_login_profile(self) -> Result<LoginProfile> {
        let email = self
            .mail
            .filter(|m| !m.trim().is_empty())
            .or(self.user_principal_name)
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                AppError::IdentityProvider("Profile has no email address".to_string())
            })?;

        if self.id.trim().is_empty() {
            return Err(AppError::IdentityProvider(
                "Profile has no subject identifier".to_string(),
            ));
        }

        let display_name = self
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.clone());

        Ok(LoginProfile {
            external_id: self.id,
            email,
            display_name,
        })
    }
}

/// What the browser needs to start a sign-in on its own.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAuthConfig {
    pub client_id: String,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The URL the browser is sent to, carrying `state` back to the callback.
    fn authorize_url(&self, state: &str) -> Result<String>;

    fn public_config(&self) -> PublicAuthConfig;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens>;

    /// Reads the signed-in user's profile with a delegated access token.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

/// Microsoft identity platform v2 plus Microsoft Graph.
#[derive(Clone)]
pub struct AzureIdentityProvider {
    client: Client,
    config: OAuthConfig,
}

impl AzureIdentityProvider {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", AUTHORITY, self.config.tenant_id, name)
    }

    fn scope(&self) -> String {
        self.config.scopes.join(" ")
    }
}

#[async_trait]
impl IdentityProvider for AzureIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", self.scope().as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    fn public_config(&self) -> PublicAuthConfig {
        PublicAuthConfig {
            client_id: self.config.client_id.clone(),
            tenant_id: self.config.tenant_id.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            scopes: self.config.scopes.clone(),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens> {
        let scope = self.scope();
        let response = self
            .client
            .post(self.endpoint("token"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Token exchange rejected ({}): {}", status, body);
            return Err(AppError::IdentityProvider(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let tokens: TokenResponse = response.json().await?;
        Ok(ProviderTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let response = self
            .client
            .get(GRAPH_ME)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::IdentityProvider(format!(
                "Profile request failed with status {}",
                status
            )));
        }

        Ok(response.json().await?)
    }
}
