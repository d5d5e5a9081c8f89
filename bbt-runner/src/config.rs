// Copyright (c) The bbt Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for bbt.
//!
//! Configuration is layered: the defaults embedded in the binary, then `bbt.toml` (or a file
//! passed in explicitly), then command-line options applied by the caller.

use crate::errors::ConfigReadError;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use serde::Deserialize;

/// Overall configuration for bbt.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BbtConfig {
    /// Settings for runs.
    pub run: RunConfig,
}

/// The `[run]` table.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// The number of workers.
    pub parallel: usize,
    /// Whether to keep running after a case fails.
    pub dont_stop: bool,
    /// Whether to stream case output.
    pub verbose: bool,
    /// The tag filter expression.
    pub filter: String,
    /// Flags passed through to case code.
    pub flags: Vec<String>,
    /// The root of per-case working directories.
    pub tmp_dir: Utf8PathBuf,
    /// The extension of case files.
    pub case_extension: String,
}

impl BbtConfig {
    /// The default location of the config file, relative to the directory bbt is run from.
    pub const CONFIG_PATH: &'static str = "bbt.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from `config_file`, or from [`Self::CONFIG_PATH`] under `dir` if it
    /// exists.
    pub fn from_sources(
        dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigReadError> {
        let (path, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let path = dir.join(Self::CONFIG_PATH);
                let source = File::new(path.as_str(), FileFormat::Toml).required(false);
                (path, source)
            }
        };

        let config = Self::make_default_config()
            .add_source(source)
            .build()
            .and_then(|config| config.try_deserialize::<Self>())
            .map_err(|err| ConfigReadError::new(Some(path.clone()), err))?;
        tracing::debug!(%path, ?config, "read config");
        Ok(config)
    }

    /// Returns the embedded default config.
    pub fn default_config() -> Result<Self, ConfigReadError> {
        Self::make_default_config()
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigReadError::new(None, err))
    }

    fn make_default_config() -> config::ConfigBuilder<config::builder::DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }
}
