use resolver::config::Config as ServiceConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
    #[serde(flatten)]
    pub service: ServiceConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            logging:
                sentry_dsn: https://key@sentry.example/1
            listener:
                host: 0.0.0.0
                port: 8080
            legislative_api:
                api_key: secret
                timeout_ms: 2000
            overrides:
                url: https://raw.example.org/overrides.json
            clients:
                - id: client1
                  token: token-1
                - id: client2
                  token: token-2
                  active: false
        "#;

        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(
            config.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125,
            })
        );
        assert_eq!(
            config.logging,
            Some(LoggingConfig {
                sentry_dsn: "https://key@sentry.example/1".into(),
            })
        );

        let service = &config.service;
        assert_eq!(service.listener.port, 8080);
        assert_eq!(service.admin_listener.port, 3001);
        assert_eq!(service.legislative_api.api_key, "secret");
        assert_eq!(service.overrides.ttl_secs, 600);
        assert_eq!(service.clients.len(), 2);
        assert!(!service.clients[1].active);
        assert!(service.validate().is_ok());
    }

    #[test]
    fn minimal_config_has_no_metrics_or_logging() {
        let yaml = r#"
            legislative_api:
                api_key: secret
            overrides:
                url: https://raw.example.org/overrides.json
        "#;

        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(config.metrics.is_none());
        assert!(config.logging.is_none());
        // Loads fine but refuses to start without callers
        assert!(config.service.validate().is_err());
    }

    #[test]
    fn missing_file() {
        let result = Config::from_file(std::path::Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn malformed_yaml() {
        let tmp = write_tmp_file("listener: [not, a, map");
        let result = Config::from_file(tmp.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
