//! Handles settings for the application. Configuration is read from an
//! optional `settings.toml` and overridden by `NOTE__*` environment
//! variables (`NOTE__SERVER__PORT=8080`).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_memoize")]
    pub memoize: bool,
    #[serde(default = "default_sweep")]
    pub cache_sweep_secs: u64,
    pub partner_bank_name: Option<String>,
    pub credit_source: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            memoize: default_memoize(),
            cache_sweep_secs: default_sweep(),
            partner_bank_name: None,
            credit_source: None,
        }
    }
}

fn default_memoize() -> bool {
    true
}

fn default_sweep() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub server: Server,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("NOTE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> Result<Settings, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn engine_section_is_optional() {
        let settings = parse(
            r#"
            [server]
            port = 3000
            database = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(settings.app.level, "info");
        assert!(settings.engine.memoize);
        assert_eq!(settings.engine.cache_sweep_secs, 3600);
        assert!(matches!(settings.server.database, Database::Memory));
    }

    #[test]
    fn sqlite_path_is_read() {
        let settings = parse(
            r#"
            [app]
            level = "debug"

            [server]
            bind = "0.0.0.0"
            port = 8080
            database = { sqlite = "note.db" }

            [engine]
            memoize = false
            partner_bank_name = "Société Générale"
            "#,
        )
        .unwrap();
        assert_eq!(settings.server.bind.as_deref(), Some("0.0.0.0"));
        assert!(matches!(settings.server.database, Database::Sqlite(ref path) if path == "note.db"));
        assert!(!settings.engine.memoize);
        assert_eq!(
            settings.engine.partner_bank_name.as_deref(),
            Some("Société Générale")
        );
    }
}
