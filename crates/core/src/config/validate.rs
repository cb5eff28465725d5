use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Portal base URL is an absolute http(s) URL
/// - Timeouts and publication limit are positive
/// - Scheduler time and offset are in range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    match url::Url::parse(&config.portal.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "portal.base_url must be an absolute http(s) URL, got '{}'",
                config.portal.base_url
            )))
        }
    }

    if config.portal.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "portal.timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.downloads.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "downloads.timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.extraction.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "extraction.timeout_secs must be greater than 0".to_string(),
        ));
    }

    if config.coordinator.max_publications == 0 {
        return Err(ConfigError::ValidationError(
            "coordinator.max_publications must be at least 1".to_string(),
        ));
    }

    let scheduler = &config.scheduler;
    if scheduler.hour > 23 || scheduler.minute > 59 {
        return Err(ConfigError::ValidationError(format!(
            "scheduler time {:02}:{:02} is out of range",
            scheduler.hour, scheduler.minute
        )));
    }

    // chrono's FixedOffset accepts strictly less than one day
    if scheduler.utc_offset_minutes.abs() >= 24 * 60 {
        return Err(ConfigError::ValidationError(
            "scheduler.utc_offset_minutes must be within +/- 23:59".to_string(),
        ));
    }

    Ok(())
}
