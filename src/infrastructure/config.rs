use crate::application::acquisition::DEFAULT_BIN_COUNT;
use crate::application::export_service::DEFAULT_MAX_EXPORT_ROWS;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub acquisition: AcquisitionSettings,
    pub export: ExportLimits,
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSettings {
    pub bin_count: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportLimits {
    pub max_rows: usize,
}

/// One query API endpoint. Without `backends`, the served backends are discovered at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    pub url: String,
    pub token: Option<String>,
    pub backends: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(config::Config::builder()
        .set_default("server.bind", "0.0.0.0:8080")?
        .set_default("acquisition.bin_count", DEFAULT_BIN_COUNT as i64)?
        .set_default("export.max_rows", DEFAULT_MAX_EXPORT_ROWS as i64)?)
}

pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = builder()?
        .add_source(config::File::with_name("config/plotter").required(false))
        .add_source(
            config::Environment::with_prefix("PLOTTER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
fn load_config_from_toml(toml: &str) -> anyhow::Result<AppConfig> {
    let settings = builder()?
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_without_file() {
        let config = load_config_from_toml("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.acquisition.bin_count, 512);
        assert_eq!(config.export.max_rows, 1_000_000);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_providers_parse() {
        let config = load_config_from_toml(
            r#"
            [acquisition]
            bin_count = 256

            [export]
            max_rows = 50000

            [[providers]]
            url = "https://data-api.example.org/api/4"
            backends = ["sf-databuffer", "sf-archiver"]

            [[providers]]
            url = "http://localhost:9000"
            token = "secret"
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.acquisition.bin_count, 256);
        assert_eq!(config.export.max_rows, 50_000);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(
            config.providers[0].backends.as_deref(),
            Some(&["sf-databuffer".to_string(), "sf-archiver".to_string()][..])
        );
        assert_eq!(config.providers[0].timeout_secs, 30);
        assert_eq!(config.providers[1].token.as_deref(), Some("secret"));
        assert_eq!(config.providers[1].backends, None);
    }
}
