use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::error::Error;
use crate::types::{Credentials, TokenPair, UserProfile};

/// SportGo identity endpoints, relative to the API base URL.
///
/// The base URL is the only required field:
///
/// ```rust,ignore
/// use sportgo_session::ApiConfig;
///
/// let config = ApiConfig::new("https://api.sportgo.vn/api/".parse()?)
///     .with_user_info_path("Auth/profile");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiConfig {
    pub(crate) base_url: Url,
    pub(crate) login_path: String,
    pub(crate) refresh_path: String,
    pub(crate) user_info_path: String,
    pub(crate) logout_path: String,
}

impl ApiConfig {
    /// Create a configuration with the default `Auth/*` endpoint paths.
    ///
    /// A trailing `/` is added to the base path so relative endpoints resolve
    /// below it rather than replacing its last segment.
    #[must_use]
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            login_path: "Auth/login".into(),
            refresh_path: "Auth/refresh-token".into(),
            user_info_path: "Auth/me".into(),
            logout_path: "Auth/logout".into(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_user_info_path(mut self, path: impl Into<String>) -> Self {
        self.user_info_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    #[must_use]
    pub fn user_info_path(&self) -> &str {
        &self.user_info_path
    }

    #[must_use]
    pub fn logout_path(&self) -> &str {
        &self.logout_path
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }
}

/// The identity operations the session manager depends on.
///
/// [`IdentityClient`] is the HTTP implementation; tests and embedders can
/// provide their own.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Exchange credentials for a profile carrying a fresh token pair.
    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send;

    /// Exchange a refresh token for a new token pair.
    fn refresh_tokens(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send;

    /// Fetch the full profile of the token's owner.
    fn user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send;

    /// Invalidate a refresh token server-side.
    fn logout(&self, refresh_token: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

impl<T: IdentityProvider> IdentityProvider for Arc<T> {
    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send {
        (**self).sign_in(credentials)
    }

    fn refresh_tokens(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenPair, Error>> + Send {
        (**self).refresh_tokens(refresh_token)
    }

    fn user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserProfile, Error>> + Send {
        (**self).user_info(access_token)
    }

    fn logout(&self, refresh_token: &str) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).logout(refresh_token)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenBody<'a> {
    refresh_token: &'a str,
}

/// HTTP client for the SportGo identity endpoints.
pub struct IdentityClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl IdentityClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Returns the response on success, or an [`Error::Api`] carrying the
    /// status and body.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl IdentityProvider for IdentityClient {
    async fn sign_in(&self, credentials: &Credentials) -> Result<UserProfile, Error> {
        let response = self
            .http
            .post(self.config.endpoint(&self.config.login_path)?)
            .json(credentials)
            .send()
            .await?;

        let response = Self::ensure_success(response, "login").await?;
        let mut profile = response.json::<UserProfile>().await?;
        profile.derive_fields();
        Ok(profile)
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let response = self
            .http
            .post(self.config.endpoint(&self.config.refresh_path)?)
            .json(&RefreshTokenBody { refresh_token })
            .send()
            .await?;

        let response = Self::ensure_success(response, "token refresh").await?;
        response.json::<TokenPair>().await.map_err(Into::into)
    }

    async fn user_info(&self, access_token: &str) -> Result<UserProfile, Error> {
        let response = self
            .http
            .get(self.config.endpoint(&self.config.user_info_path)?)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "user info request").await?;
        let mut profile = response.json::<UserProfile>().await?;
        profile.derive_fields();
        Ok(profile)
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), Error> {
        let response = self
            .http
            .post(self.config.endpoint(&self.config.logout_path)?)
            .json(&RefreshTokenBody { refresh_token })
            .send()
            .await?;

        // The body is either `{}` or empty; nothing to decode.
        Self::ensure_success(response, "logout").await.map(drop)
    }
}
