use std::env;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
}

impl AppConfig {
    /// Reads the environment, loading `.env` first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = parse_connections(env::var("DB_MAX_CONNECTIONS").ok())?;
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            max_connections,
            log_level,
        })
    }
}

fn parse_connections(raw: Option<String>) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(5),
        Some(value) => match value.trim().parse::<u32>() {
            Ok(count) if count > 0 => Ok(count),
            _ => Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_default_to_five() {
        assert_eq!(parse_connections(None).unwrap(), 5);
        assert_eq!(parse_connections(Some(" 12 ".to_string())).unwrap(), 12);
    }

    #[test]
    fn zero_or_garbage_connections_are_rejected() {
        assert!(matches!(
            parse_connections(Some("0".to_string())),
            Err(ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. })
        ));
        assert!(parse_connections(Some("many".to_string())).is_err());
    }
}
