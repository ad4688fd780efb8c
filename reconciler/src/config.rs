use serde::Deserialize;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://sentry.io/api/";

const TOKEN_VARS: &[&str] = &["SENTRY_AUTH_TOKEN", "SENTRY_TOKEN"];
const BASE_URL_VAR: &str = "SENTRY_BASE_URL";

#[derive(thiserror::Error, Debug)]
pub enum ApiConfigError {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Connection settings for the remote API.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

fn default_user_agent() -> String {
    format!("orgsync/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: default_base_url(),
            token: None,
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiConfigError> {
        let config = ApiConfig {
            base_url: parse_base_url(base_url)?,
            token,
            ..Default::default()
        };
        Ok(config)
    }

    /// Fills values left unset from the process environment.
    pub fn with_env(self) -> Result<Self, ApiConfigError> {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    /// Fills values left unset from `lookup`. Explicitly configured values win.
    pub fn with_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ApiConfigError> {
        if self.token.is_none() {
            self.token = TOKEN_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .find(|token| !token.is_empty());
        }

        if self.base_url.as_str() == DEFAULT_BASE_URL {
            if let Some(url) = lookup(BASE_URL_VAR).filter(|u| !u.is_empty()) {
                self.base_url = parse_base_url(&url)?;
            }
        }

        self.base_url = with_trailing_slash(self.base_url);
        Ok(self)
    }
}

/// Parses a base URL, adding the trailing slash relative API paths need to join beneath it.
pub fn parse_base_url(url: &str) -> Result<Url, ApiConfigError> {
    let parsed = Url::parse(url).map_err(|source| ApiConfigError::InvalidBaseUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(with_trailing_slash(parsed))
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
