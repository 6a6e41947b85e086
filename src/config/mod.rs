mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ConnectionSettings, LoggingSettings, PartialConnectionSettings, PartialLoggingSettings,
    PartialSettings, Settings,
};

/// Prefix of the environment variables read by [`load_config`].
pub const ENV_PREFIX: &str = "POPSTOMP";

/// Loads the configuration from the default file, a `.env` file and
/// environment variables.
/// Merges the configuration with default values.
///
/// Environment variables use `__` between section and key, e.g.
/// `POPSTOMP_CONNECTION__URL`; `POPSTOMP_CONNECTION__TOPICS` is a
/// comma-separated list.
pub fn load_config() -> Result<Settings, ConfigError> {
    // a missing .env is fine
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("connection.topics")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}
