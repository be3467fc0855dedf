//! Tool settings
//!
//! Settings are read from a TOML file and can be overridden through
//! environment variables prefixed with `PETAB`, e.g.
//! `PETAB_LOG_LEVEL=debug` or `PETAB_MAPPING__NUM_THREADS=4`.
//!
//! ```toml
//! log_level = "info"
//!
//! [mapping]
//! scaled_parameters = false
//! fill_fixed_parameters = true
//! warn_unmapped = true
//! allow_timepoint_specific_numeric_noise_parameters = false
//! num_threads = 1
//! ```
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::parameter_mapping::MappingOptions;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub mapping: MappingSettings,
}

/// Options of the parameter mapping, see [MappingOptions]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MappingSettings {
    #[serde(default = "default_false")]
    pub scaled_parameters: bool,
    #[serde(default = "default_true")]
    pub fill_fixed_parameters: bool,
    #[serde(default = "default_true")]
    pub warn_unmapped: bool,
    #[serde(default = "default_false")]
    pub allow_timepoint_specific_numeric_noise_parameters: bool,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: default_log_level(),
            mapping: MappingSettings::default(),
        }
    }
}

impl Default for MappingSettings {
    fn default() -> Self {
        MappingSettings {
            scaled_parameters: false,
            fill_fixed_parameters: true,
            warn_unmapped: true,
            allow_timepoint_specific_numeric_noise_parameters: false,
            num_threads: default_num_threads(),
        }
    }
}

impl From<&MappingSettings> for MappingOptions {
    fn from(settings: &MappingSettings) -> Self {
        MappingOptions {
            warn_unmapped: settings.warn_unmapped,
            scaled_parameters: settings.scaled_parameters,
            fill_fixed_parameters: settings.fill_fixed_parameters,
            allow_timepoint_specific_numeric_noise_parameters: settings
                .allow_timepoint_specific_numeric_noise_parameters,
            num_threads: settings.num_threads.max(1),
        }
    }
}

impl Settings {
    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions::from(&self.mapping)
    }
}

/// Read settings from a TOML file, if given, and the environment
pub fn read_settings(path: Option<&Path>) -> Result<Settings, config::ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    let parsed = builder
        .add_source(
            Environment::with_prefix("PETAB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    parsed.try_deserialize()
}

// *********************************
// Default values for deserializing
// *********************************
fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_num_threads() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_mapping_options() {
        assert_eq!(Settings::default().mapping_options(), MappingOptions::default());
    }

    #[test]
    fn test_read_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("petab.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\n[mapping]\nscaled_parameters = true\nnum_threads = 4\n",
        )
        .unwrap();
        let settings = read_settings(Some(path.as_path())).unwrap();
        assert_eq!(settings.log_level, "debug");
        let options = settings.mapping_options();
        assert!(options.scaled_parameters);
        assert!(options.fill_fixed_parameters);
        assert_eq!(options.num_threads, 4);
    }
}
