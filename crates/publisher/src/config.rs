use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::debug;

use crate::client::DEFAULT_SERVICE_URL;
use crate::compose::DEFAULT_TEMPLATE;
use crate::models::Credentials;

/// Directory name under the user's config and data directories.
pub const APP_DIR: &str = "bsky-autopost";

/// Publishing settings, read once per invocation and passed explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub enabled: bool,
    pub credentials: Credentials,
    pub template: String,
    pub service_url: String,
    pub state_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            credentials: Credentials::default(),
            template: DEFAULT_TEMPLATE.to_string(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            state_path: None,
        }
    }
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            enabled: true,
            credentials,
            ..Default::default()
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn from_env() -> Result<Self> {
        load_dotenv(APP_DIR);

        let enabled = match env::var("BLUESKY_AUTO_POST_ENABLED") {
            Ok(value) => parse_flag(&value).with_context(|| {
                format!(
                    "BLUESKY_AUTO_POST_ENABLED must be true/false (or 1/0), got {:?}",
                    value
                )
            })?,
            Err(_) => false,
        };

        let identifier = env::var("BLUESKY_IDENTIFIER").unwrap_or_default();
        let secret = env::var("BLUESKY_APP_PASSWORD").unwrap_or_default();

        let template = env::var("BLUESKY_POST_FORMAT")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());

        let service_url =
            env::var("BLUESKY_SERVICE_URL").unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string());
        url::Url::parse(&service_url)
            .with_context(|| format!("BLUESKY_SERVICE_URL is not a valid URL: {}", service_url))?;

        let state_path = env::var("BLUESKY_STATE_PATH").ok().map(PathBuf::from);

        Ok(Self {
            enabled,
            credentials: Credentials::new(identifier, secret),
            template,
            service_url,
            state_path,
        })
    }
}

/// `.env` files consulted after the working directory, most specific first.
fn dotenv_fallbacks(app_dir: &str) -> Vec<PathBuf> {
    let config = dirs::config_dir().map(|dir| dir.join(app_dir).join(".env"));
    let home = dirs::home_dir().map(|dir| dir.join(".env"));
    config.into_iter().chain(home).collect()
}

/// Loads the first `.env` found. Variables already in the environment win.
fn load_dotenv(app_dir: &str) {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    for path in dotenv_fallbacks(app_dir) {
        if path.exists() && dotenvy::from_path(&path).is_ok() {
            debug!("Loaded environment from {}", path.display());
            return;
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" ON "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag(""), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_default_config_is_disabled() {
        let config = Config::default();

        assert!(!config.enabled);
        assert!(config.credentials.is_empty());
        assert_eq!(config.template, DEFAULT_TEMPLATE);
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
    }

    #[test]
    fn test_builders() {
        let config = Config::new(Credentials::new("me.bsky.social", "pass"))
            .template("{title}")
            .enabled(false);

        assert!(!config.enabled);
        assert_eq!(config.template, "{title}");
    }

    #[test]
    fn test_dotenv_fallbacks_prefer_app_dir() {
        let paths = dotenv_fallbacks("my-app");

        assert!(paths.iter().all(|p| p.ends_with(".env")));
        if dirs::config_dir().is_some() {
            assert!(paths[0].ends_with("my-app/.env"));
        }
    }
}
