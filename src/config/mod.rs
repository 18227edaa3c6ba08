use crate::models::BackupConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the backup configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "photocopy.yaml";

/// Prefix of environment variables overriding file values (e.g. `PHOTOCOPY_BATCH_SIZE`)
pub const ENV_PREFIX: &str = "PHOTOCOPY";

/// Configuration manager for loading and saving `photocopy.yaml`.
///
/// Values are layered with the `config` crate: the YAML file first, then
/// `PHOTOCOPY_*` environment variables on top. List values in the
/// environment are comma separated.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `photocopy.yaml`
    ///
    /// # Returns
    /// The manager, or an error if the directory cannot be created
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load, normalize and validate the backup configuration.
    ///
    /// A missing file is replaced by a freshly written default one.
    /// `PHOTOCOPY_*` environment variables override keys from the file.
    ///
    /// # Returns
    /// The validated configuration, or an error naming the file and the broken rule
    pub fn load_config(&self) -> Result<BackupConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, writing defaults",
                self.config_path
            );
            self.save_config(&BackupConfig::default())?;
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::new(
                self.config_path.as_str(),
                ::config::FileFormat::Yaml,
            ))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_extensions")
                    .with_list_parse_key("disallowed_segments"),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config = settings
            .try_deserialize::<BackupConfig>()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?
            .normalize();

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the backup configuration file.
    ///
    /// # Arguments
    /// * `config` - Written as YAML, replacing the current file
    pub fn save_config(&self, config: &BackupConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
