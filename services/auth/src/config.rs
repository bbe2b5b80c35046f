//! Service settings loaded through the config crate

use anyhow::Result;
use serde::Deserialize;

/// Settings for the authentication service
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Address to bind the HTTP listener on
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the HTTP listener on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl AuthSettings {
    /// Load settings from `AUTH_*` environment variables
    /// (e.g. `AUTH_HOST`, `AUTH_PORT`), falling back to defaults.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("AUTH"))
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
        let settings = AuthSettings::load().expect("settings should load from empty env");
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.bind_addr(), "0.0.0.0:3000");
    }
}
