mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, LogSettings, OverflowMode, ServerSettings, Settings,
};

/// Prefix for environment overrides, e.g. `TOPICAST_BROKER__CHANNEL_CAPACITY`.
pub const ENV_PREFIX: &str = "TOPICAST";

/// Loads the configuration from `config/default.*` (optional) and the
/// environment, then merges it onto the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
