// Settings loading (optional redq.toml + REDQ_* environment)

use config::{Config, Environment, File};
use redq_core::Settings;

/// Optional settings file, looked up in the working directory
const SETTINGS_FILE: &str = "redq";

/// Load settings, lowest to highest precedence: defaults, `redq.toml`,
/// `REDQ_*` variables. Nested keys use `__`, e.g. `REDQ_POOLS__REPORTS=4`.
pub fn load() -> anyhow::Result<Settings> {
    let source = Config::builder()
        .add_source(File::with_name(SETTINGS_FILE).required(false))
        .add_source(
            Environment::with_prefix("REDQ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = source.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
