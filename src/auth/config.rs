//! Runtime configuration for the authentication flow.

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_DEBOUNCE_WINDOW_SECONDS: i64 = 60;
const DEFAULT_SUCCESS_REDIRECT: &str = "/success.html";
const DEFAULT_FAILURE_REDIRECT: &str = "/index.html";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_base_url: String,
    token_ttl_seconds: i64,
    debounce_window_seconds: i64,
    success_redirect: String,
    failure_redirect: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            debounce_window_seconds: DEFAULT_DEBOUNCE_WINDOW_SECONDS,
            success_redirect: DEFAULT_SUCCESS_REDIRECT.to_string(),
            failure_redirect: DEFAULT_FAILURE_REDIRECT.to_string(),
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_debounce_window_seconds(mut self, seconds: i64) -> Self {
        self.debounce_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_success_redirect(mut self, path: String) -> Self {
        self.success_redirect = path;
        self
    }

    #[must_use]
    pub fn with_failure_redirect(mut self, path: String) -> Self {
        self.failure_redirect = path;
        self
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn debounce_window_seconds(&self) -> i64 {
        self.debounce_window_seconds
    }

    #[must_use]
    pub fn success_redirect(&self) -> &str {
        &self.success_redirect
    }

    #[must_use]
    pub fn failure_redirect(&self) -> &str {
        &self.failure_redirect
    }

    /// Only mark cookies secure when the service is reached over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.public_base_url.starts_with("https://")
    }
}
