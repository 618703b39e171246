//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`<SERVICE>_` prefix, `__` separates nested keys)
//! 2. Explicit config file, or `config/<service>.{toml,yaml,yml,json}`
//! 3. Serialized defaults

use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Env prefix for a service, e.g. `alarmd` -> `ALARMD_`
pub fn env_prefix(service_name: &str) -> String {
    format!("{}_", service_name.to_uppercase().replace('-', "_"))
}

/// Provider for one config file, chosen by extension
fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

/// Build the figment without extracting it
///
/// An explicit `config_file` must exist; the default search files are
/// optional.
pub fn layered_figment<T: Serialize>(
    defaults: &T,
    service_name: &str,
    config_file: Option<&Path>,
    env_prefix: &str,
) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(defaults));

    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading config from {}", path.display());
            figment = file_provider(figment, path)?;
        },
        None => {
            figment = figment
                .merge(Toml::file(format!("config/{}.toml", service_name)))
                .merge(Yaml::file(format!("config/{}.yaml", service_name)))
                .merge(Yaml::file(format!("config/{}.yml", service_name)))
                .merge(Json::file(format!("config/{}.json", service_name)));
        },
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load a service configuration from defaults, file and environment
pub fn load_config<T>(service_name: &str, config_file: Option<&Path>) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    layered_figment(
        &T::default(),
        service_name,
        config_file,
        &env_prefix(service_name),
    )?
    .extract()
    .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}
