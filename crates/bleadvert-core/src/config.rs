//! Application configuration management.
//!
//! Handles loading, saving and validating the bleadvert configuration:
//! - The advertisement to register (type, UUIDs, data fields, local name)
//! - The object path it is served at
//! - Bus call timeouts
//!
//! Configuration is read from a TOML file and layered with environment
//! overrides of the form `BLEADVERT__ADVERTISEMENT__LOCAL_NAME=beacon`.
//! When the file does not exist the built-in example advertisement is used.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advertisement::{
    Advertisement, AdvertisingType, DEFAULT_PATH_BASE, MAX_SERVICE_UUIDS,
};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BLEADVERT";

/// Default timeout for method calls to bluetoothd, matching libdbus.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 25;

static SHORT_UUID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{4}([0-9a-fA-F]{4})?$").expect("valid regex"));

static OBJECT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z0-9_]+(/[A-Za-z0-9_]+)*)?$").expect("valid regex"));

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single field failed validation.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} validation errors", .0.len())]
    MultipleValidation(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The advertisement to register.
    #[serde(default)]
    pub advertisement: AdvertisementConfig,

    /// System bus settings.
    #[serde(default)]
    pub bus: BusConfig,
}

/// Advertisement section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementConfig {
    /// Suffix appended to `path_base` to form the object path.
    #[serde(default)]
    pub index: u32,

    /// Prefix of the object path the advertisement is served at.
    #[serde(default = "default_path_base")]
    pub path_base: String,

    /// `broadcast` or `peripheral`.
    #[serde(default)]
    pub advertising_type: AdvertisingType,

    /// Up to two advertised service UUIDs.
    #[serde(default)]
    pub service_uuids: Vec<String>,

    /// Solicited service UUIDs.
    #[serde(default)]
    pub solicit_uuids: Vec<String>,

    /// Local name to advertise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,

    /// Whether to include the TX power level.
    #[serde(default)]
    pub include_tx_power: bool,

    /// Manufacturer specific data entries.
    #[serde(default)]
    pub manufacturer_data: Vec<ManufacturerDataEntry>,

    /// Service data entries.
    #[serde(default)]
    pub service_data: Vec<ServiceDataEntry>,

    /// Raw advertising data entries.
    #[serde(default)]
    pub data: Vec<TaggedDataEntry>,
}

/// `[[advertisement.manufacturer_data]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerDataEntry {
    /// Bluetooth SIG company identifier.
    pub code: u16,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// `[[advertisement.service_data]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDataEntry {
    /// Service UUID the data belongs to.
    pub uuid: String,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// `[[advertisement.data]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedDataEntry {
    /// AD type tag from the Bluetooth assigned numbers.
    pub ad_type: u8,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Bus section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Timeout for method calls to bluetoothd, in seconds.
    ///
    /// Also bounds `UnregisterAdvertisement` during teardown, so a stuck
    /// bluetoothd cannot hold up shutdown.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_path_base() -> String {
    DEFAULT_PATH_BASE.to_owned()
}

const fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

impl Default for AdvertisementConfig {
    fn default() -> Self {
        Self {
            index: 0,
            path_base: default_path_base(),
            advertising_type: AdvertisingType::default(),
            service_uuids: Vec::new(),
            solicit_uuids: Vec::new(),
            local_name: None,
            include_tx_power: false,
            manufacturer_data: Vec::new(),
            service_data: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl AdvertisementConfig {
    /// The example peripheral advertisement used when no file is present.
    #[must_use]
    pub fn example() -> Self {
        Self {
            service_uuids: vec!["cafe".to_owned()],
            local_name: Some("test_advertisement0".to_owned()),
            include_tx_power: true,
            manufacturer_data: vec![ManufacturerDataEntry {
                code: 0xffff,
                data: vec![0x00, 0x01, 0x02, 0x03],
            }],
            service_data: vec![ServiceDataEntry {
                uuid: "9999".to_owned(),
                data: vec![0x00, 0x01, 0x02, 0x03, 0x04],
            }],
            data: vec![TaggedDataEntry {
                ad_type: 0x26,
                data: vec![0x01, 0x01, 0x00],
            }],
            ..Self::default()
        }
    }

    /// Full object path of the advertisement.
    #[must_use]
    pub fn object_path(&self) -> String {
        format!("{}{}", self.path_base, self.index)
    }

    /// Builds the advertisement described by this section.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertError::TooManyServiceUuids`](crate::AdvertError::TooManyServiceUuids)
    /// if more than two service UUIDs are configured.
    pub fn to_advertisement(&self) -> crate::Result<Advertisement> {
        let mut ad = Advertisement::with_path(self.object_path(), self.advertising_type);
        ad.set_service_uuids(self.service_uuids.iter().cloned())?;
        for uuid in &self.solicit_uuids {
            ad.add_solicit_uuid(uuid.clone());
        }
        for entry in &self.manufacturer_data {
            ad.add_manufacturer_data(entry.code, entry.data.clone());
        }
        for entry in &self.service_data {
            ad.add_service_data(entry.uuid.clone(), entry.data.clone());
        }
        for entry in &self.data {
            ad.add_data(entry.ad_type, entry.data.clone());
        }
        if let Some(name) = &self.local_name {
            ad.set_local_name(name.clone());
        }
        ad.set_include_tx_power(self.include_tx_power);
        Ok(ad)
    }

    fn validate_into(&self, errors: &mut Vec<ConfigError>) {
        if self.service_uuids.len() > MAX_SERVICE_UUIDS {
            errors.push(invalid(
                "advertisement.service_uuids",
                format!(
                    "at most {MAX_SERVICE_UUIDS} service UUIDs can be advertised (got {})",
                    self.service_uuids.len()
                ),
            ));
        }

        let uuid_fields = self
            .service_uuids
            .iter()
            .map(|uuid| ("advertisement.service_uuids", uuid))
            .chain(
                self.solicit_uuids
                    .iter()
                    .map(|uuid| ("advertisement.solicit_uuids", uuid)),
            )
            .chain(
                self.service_data
                    .iter()
                    .map(|entry| ("advertisement.service_data.uuid", &entry.uuid)),
            );
        for (field, uuid) in uuid_fields {
            if !is_valid_uuid(uuid) {
                errors.push(invalid(
                    field,
                    format!("'{uuid}' is not a 16-bit, 32-bit or 128-bit UUID"),
                ));
            }
        }

        let path = self.object_path();
        if !is_valid_object_path(&path) {
            errors.push(invalid(
                "advertisement.path_base",
                format!("'{path}' is not a valid D-Bus object path"),
            ));
        }

        if let Some(code) = first_duplicate(self.manufacturer_data.iter().map(|e| e.code)) {
            errors.push(invalid(
                "advertisement.manufacturer_data",
                format!("duplicate company code {code:#06x}"),
            ));
        }
        if let Some(uuid) = first_duplicate(
            self.service_data
                .iter()
                .map(|e| e.uuid.to_ascii_lowercase()),
        ) {
            errors.push(invalid(
                "advertisement.service_data",
                format!("duplicate service UUID '{uuid}'"),
            ));
        }
        if let Some(tag) = first_duplicate(self.data.iter().map(|e| e.ad_type)) {
            errors.push(invalid(
                "advertisement.data",
                format!("duplicate AD type {tag:#04x}"),
            ));
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl BusConfig {
    /// Method call timeout as a [`Duration`].
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            advertisement: AdvertisementConfig::example(),
            bus: BusConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to [`Config::default`]
    /// when the file does not exist. Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let base = if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration file");
            config::Config::builder()
                .add_source(config::File::new(
                    &path.to_string_lossy(),
                    config::FileFormat::Toml,
                ))
                .build()?
        } else {
            tracing::debug!(
                path = %path.display(),
                "Configuration file not found, using built-in defaults"
            );
            config::Config::try_from(&Self::default())?
        };

        let config: Self = config::Config::builder()
            .add_source(base)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or the result is invalid.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a single problem and
    /// [`ConfigError::MultipleValidation`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        self.advertisement.validate_into(&mut errors);
        if self.bus.call_timeout_secs == 0 {
            errors.push(invalid("bus.call_timeout_secs", "must be greater than zero"));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidation(errors)),
        }
    }
}

/// Default configuration file location.
///
/// On Linux: `/etc/bleadvert/config.toml`.
/// Elsewhere: the platform config directory, e.g. `~/.config/bleadvert/config.toml`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/bleadvert/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "bleadvert").map_or_else(
            || PathBuf::from("bleadvert.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Returns `true` for 16-bit (`180d`), 32-bit (`0000180d`) or 128-bit UUID strings.
#[must_use]
pub fn is_valid_uuid(uuid: &str) -> bool {
    SHORT_UUID_RE.is_match(uuid) || uuid::Uuid::parse_str(uuid).is_ok()
}

/// Returns `true` if `path` is a syntactically valid D-Bus object path.
#[must_use]
pub fn is_valid_object_path(path: &str) -> bool {
    OBJECT_PATH_RE.is_match(path)
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn first_duplicate<T, I>(items: I) -> Option<T>
where
    T: Eq + std::hash::Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(item.clone()))
}
