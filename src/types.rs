use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use url::Url;

const AVATAR_SERVICE_URL: &str = "https://ui-avatars.com/api/";

/// SportGo account identifier as issued by the backend.
///
/// The backend sends either a number or a string; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(Number),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(s) => Self(s),
            Repr::Number(n) => Self(n.to_string()),
        })
    }
}

/// Account role.
///
/// Unknown roles are kept verbatim so a stored profile survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Provider,
    Admin,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "User",
            Self::Provider => "Provider",
            Self::Admin => "Admin",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "User" => Self::User,
            "Provider" => Self::Provider,
            "Admin" => Self::Admin,
            _ => Self::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        match r {
            Role::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

/// Summary of the provider's active subscription package.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CurrentPackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Access/refresh token pair returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Email/password pair for the credential exchange.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Profile snapshot of the logged-in account.
///
/// This is also the persisted `user` record, so it carries the current tokens.
/// Fields the backend sends that are not modelled here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_package: Option<CurrentPackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_business_info: Option<bool>,
    /// Derived from `role`.
    #[serde(default)]
    pub is_provider: bool,
    /// Derived from the display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl UserProfile {
    /// Create an empty profile holding only a token pair.
    #[must_use]
    pub fn from_tokens(tokens: TokenPair) -> Self {
        let mut profile = Self::default();
        profile.apply_tokens(tokens);
        profile
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.derive_fields();
        self
    }

    #[must_use]
    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self.derive_fields();
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self.derive_fields();
        self
    }

    /// Token pair carried by this profile, if both halves are present.
    #[must_use]
    pub fn tokens(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access_token: self.access_token.clone()?,
            refresh_token: self.refresh_token.clone()?,
        })
    }

    /// Replace the tokens, leaving every profile field untouched.
    pub fn apply_tokens(&mut self, tokens: TokenPair) {
        self.access_token = Some(tokens.access_token);
        self.refresh_token = Some(tokens.refresh_token);
    }

    /// Overlay `fresh` on top of `self`: every field `fresh` carries wins,
    /// everything else (tokens included) is kept.
    ///
    /// A field the server sends as `null` counts as absent and keeps the
    /// current value. Only the unmodelled `extra` entries take `null` over.
    pub fn merge(&mut self, fresh: UserProfile) {
        let UserProfile {
            user_id,
            full_name,
            email,
            phone_number,
            role,
            created_at,
            current_package,
            has_business_info,
            is_provider: _,
            avatar: _,
            access_token,
            refresh_token,
            extra,
        } = fresh;

        overlay(&mut self.user_id, user_id);
        overlay(&mut self.full_name, full_name);
        overlay(&mut self.email, email);
        overlay(&mut self.phone_number, phone_number);
        overlay(&mut self.role, role);
        overlay(&mut self.created_at, created_at);
        overlay(&mut self.current_package, current_package);
        overlay(&mut self.has_business_info, has_business_info);
        overlay(&mut self.access_token, access_token);
        overlay(&mut self.refresh_token, refresh_token);
        self.extra.extend(extra);
        self.derive_fields();
    }

    /// Recompute `is_provider` and `avatar`.
    pub fn derive_fields(&mut self) {
        self.is_provider = self.role == Some(Role::Provider);
        self.avatar = self.display_name().and_then(avatar_url);
    }

    fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .or(self.email.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn overlay<T>(slot: &mut Option<T>, fresh: Option<T>) {
    if fresh.is_some() {
        *slot = fresh;
    }
}

fn avatar_url(name: &str) -> Option<String> {
    let mut url = Url::parse(AVATAR_SERVICE_URL).ok()?;
    url.query_pairs_mut()
        .append_pair("name", name)
        .append_pair("background", "random");
    Some(url.into())
}
