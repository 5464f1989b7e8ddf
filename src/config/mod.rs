mod settings;

use config::{Config, Environment, File};

use crate::utils::error::{BusError, Result};

pub use settings::{
    AuthSettings, BusSettings, LogSettings, PartialSettings, ReceiverSettings, RetrySettings,
    Settings,
};

/// Prefix of the environment variables read by [`load_config`], e.g.
/// `BUSREST_AUTH__SAS_KEY`.
pub const ENV_PREFIX: &str = "BUSREST";

/// Loads the configuration from `config/default` and environment variables,
/// merged onto default values.
pub fn load_config() -> Result<Settings> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit file path (extension optional).
/// A missing file is not an error.
pub fn load_config_from(path: &str) -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let settings = partial.merge(Settings::default());
    if settings.bus.namespace.is_empty() && settings.bus.base_url.is_none() {
        return Err(BusError::Config(
            "bus.namespace must be set (or bus.base_url)".to_string(),
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests;
