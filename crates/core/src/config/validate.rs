use reqwest::Url;

use super::{types::Config, ConfigError};

/// Kitsu refuses larger pages.
const MAX_PAGE_LIMIT: u32 = 20;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Catalog base URL is https on the allowed host
/// - Catalog page limit is within 1..=20
/// - Write-behind buffer is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let catalog = &config.catalog;
    let base_url = Url::parse(&catalog.base_url).map_err(|e| {
        ConfigError::ValidationError(format!("catalog.base_url is not a valid URL: {}", e))
    })?;
    if base_url.scheme() != "https" {
        return Err(ConfigError::ValidationError(
            "catalog.base_url must use https".to_string(),
        ));
    }
    let host_allowed = base_url
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(&catalog.allowed_host));
    if !host_allowed {
        return Err(ConfigError::ValidationError(format!(
            "catalog.base_url host must be {}",
            catalog.allowed_host
        )));
    }

    if catalog.page_limit == 0 || catalog.page_limit > MAX_PAGE_LIMIT {
        return Err(ConfigError::ValidationError(format!(
            "catalog.page_limit must be between 1 and {}",
            MAX_PAGE_LIMIT
        )));
    }

    if config.writeback.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "writeback.buffer_size cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::net::IpAddr;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_base_url_host_mismatch() {
        let mut config = Config::default();
        config.catalog.base_url = "https://example.com/api/edge".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.catalog.base_url = "http://kitsu.io/api/edge".to_string();
        assert!(validate_config(&config).is_err());

        config.catalog.base_url = "kitsu".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_page_limit_bounds() {
        let mut config = Config::default();
        config.catalog.page_limit = 0;
        assert!(validate_config(&config).is_err());
        config.catalog.page_limit = 21;
        assert!(validate_config(&config).is_err());
        config.catalog.page_limit = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_buffer_size() {
        let mut config = Config::default();
        config.writeback.buffer_size = 0;
        assert!(validate_config(&config).is_err());
    }
}
