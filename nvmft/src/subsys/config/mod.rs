//! Configuration of the target. Options come from a YAML file plus
//! environment overrides and are resolved once, before the first session
//! is created. A partial file is fine, serde fills in the defaults
//! declared on the individual option groups.

use std::{fmt::Display, fs, io::ErrorKind, path::Path};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::subsys::config::opts::{GetOpts, NvmfTgtConfig};

pub(crate) mod opts;

pub static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Failed to read configuration file {}: {}", path, source))]
    ReadFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Invalid configuration file {}: {}", path, source))]
    ParseFile {
        source: serde_yaml::Error,
        path: String,
    },
    #[snafu(display("Failed to serialize configuration: {}", source))]
    Export { source: serde_yaml::Error },
    #[snafu(display("Failed to write configuration file {}: {}", path, source))]
    WriteFile {
        source: std::io::Error,
        path: String,
    },
}

/// Main config structure of the target. This structure can be persisted to
/// disk.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// location of the config file that we loaded
    pub source: Option<String>,
    /// options applied on target creation
    pub nvmf_tgt_conf: NvmfTgtConfig,
    /// flag to enable or disable config sync
    pub sync_disable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            nvmf_tgt_conf: Default::default(),
            sync_disable: false,
        }
    }
}

impl Config {
    /// initialize the config by executing F and return a reference to the
    /// initialized data
    pub fn get_or_init<F>(f: F) -> &'static Self
    where
        F: FnOnce() -> Config,
    {
        CONFIG.get_or_init(f)
    }

    /// Load the configuration from a YAML file. A file that is missing or
    /// empty yields the defaults, with the path remembered so that a later
    /// export lands in the same place.
    pub fn read<P>(file: P) -> Result<Config, Error>
    where
        P: AsRef<Path> + Display,
    {
        debug!("loading configuration file from {}", file);

        let mut config = match fs::read_to_string(&file) {
            Ok(contents) if contents.trim().is_empty() => {
                info!("config file {} is empty, using defaults", file);
                Config::default()
            }
            Ok(contents) => serde_yaml::from_str(&contents).context(
                ParseFile {
                    path: file.to_string(),
                },
            )?,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                info!("no config file at {}, using defaults", file);
                Config::default()
            }
            Err(error) => {
                return Err(error).context(ReadFile {
                    path: file.to_string(),
                });
            }
        };

        if !config.sync_disable {
            config.source = Some(file.to_string());
        }
        Ok(config)
    }

    /// collect the applied options into a new Config object that can be
    /// exported
    pub fn refresh(&self) -> Self {
        Self {
            source: self.source.clone(),
            nvmf_tgt_conf: self.nvmf_tgt_conf.get(),
            sync_disable: self.sync_disable,
        }
    }

    /// export the configuration as YAML
    pub fn write<P>(&self, file: P) -> Result<(), Error>
    where
        P: AsRef<Path> + Display,
    {
        let yaml = serde_yaml::to_string(self).context(Export)?;
        fs::write(&file, yaml).context(WriteFile {
            path: file.to_string(),
        })
    }
}
