//! Service settings loaded through the config crate

use anyhow::Result;
use serde::Deserialize;

/// Settings for the API service
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Address to bind the HTTP listener on
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the HTTP listener on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bucket holding uploaded avatars
    #[serde(default = "default_avatar_bucket")]
    pub avatar_bucket: String,
    /// Public base URL under which avatar objects are served
    #[serde(default = "default_avatar_public_base")]
    pub avatar_public_base: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_avatar_bucket() -> String {
    "avatars".to_string()
}

fn default_avatar_public_base() -> String {
    "https://avatars.swellpool.app".to_string()
}

impl ApiSettings {
    /// Load settings from `API_*` environment variables
    /// (e.g. `API_PORT`, `API_AVATAR_BUCKET`), falling back to defaults.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// The socket address string to bind on
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ApiSettings::load().expect("settings should load from empty env");
        assert_eq!(settings.port, 3001);
        assert_eq!(settings.avatar_bucket, "avatars");
    }
}
