use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Overrides use the `HARVESTER_` prefix with `__` between sections,
/// e.g. `HARVESTER_DOWNLOADS__TIMEOUT_SECS=120`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("HARVESTER_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[portal]
base_url = "https://portal.example/journals"

[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.downloads.timeout_secs, 300);
        assert_eq!(config.extraction.timeout_secs, 600);
        assert_eq!(config.coordinator.max_publications, 1);
    }

    #[test]
    fn test_load_config_from_str_missing_portal() {
        let toml = r#"
[server]
port = 8080
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_scheduler_section() {
        let toml = r#"
[portal]
base_url = "https://portal.example/journals"

[scheduler]
day = "thursday"
hour = 6
minute = 30
utc_offset_minutes = 0
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.scheduler.day, Weekday::Thu);
        assert_eq!(config.scheduler.hour, 6);
        assert_eq!(config.scheduler.minute, 30);
    }

    #[test]
    fn test_invalid_weekday_rejected() {
        let toml = r#"
[portal]
base_url = "https://portal.example/journals"

[scheduler]
day = "someday"
"#;
        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[portal]
base_url = "https://portal.example/journals"

[downloads]
root = "/srv/journals"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.downloads.root.to_str(), Some("/srv/journals"));
    }
}
