use std::sync::RwLock;

/// Cookie names that may carry the session token, in lookup order.
pub const TOKEN_COOKIE_NAMES: [&str; 3] = ["token", "access_token", "id_token"];

/// Source of the bearer token attached to API requests.
///
/// `clear` is invoked when the API answers 401, so the next request goes out
/// unauthenticated instead of replaying a dead token.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    fn clear(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }

    fn clear(&self) {}
}

/// In-memory token store for one signed-in session.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    token: RwLock<Option<String>>,
}

impl SessionCredentials {
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(token.into());
    }
}

impl CredentialProvider for SessionCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn clear(&self) {
        let mut guard = self.token.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }
}

/// Read one cookie from a `Cookie` header value.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// First non-empty session token among [`TOKEN_COOKIE_NAMES`].
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    TOKEN_COOKIE_NAMES
        .iter()
        .find_map(|name| cookie_value(header, name))
        .map(ToOwned::to_owned)
}
