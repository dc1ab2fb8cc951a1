//! # bleadvert-core
//!
//! Core logic for registering a Bluetooth Low Energy advertisement with BlueZ.
//!
//! This crate provides:
//! - The advertisement record and its builder-style mutators
//! - Property export for `org.bluez.LEAdvertisement1`
//! - The registration handshake with `org.bluez.LEAdvertisingManager1`
//! - Configuration loading, saving, and validation
//!
//! ## Architecture
//!
//! - [`advertisement`] - The advertisement record
//! - [`properties`] - Populated-only property export
//! - [`registration`] - Adapter discovery, registration, and teardown
//! - [`bluez`] - D-Bus backend for the registration handshake (feature `bluez`)
//! - [`config`] - Configuration file and environment overrides
//! - [`names`] - Well-known D-Bus interface and error names
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod advertisement;
#[cfg(feature = "bluez")]
pub mod bluez;
pub mod config;
pub mod error;
pub mod names;
pub mod properties;
pub mod registration;

// Re-export primary types for convenience
pub use advertisement::{Advertisement, AdvertisingType, MAX_SERVICE_UUIDS};
#[cfg(feature = "bluez")]
pub use bluez::BluezManager;
pub use config::{
    default_config_path, is_valid_object_path, is_valid_uuid, AdvertisementConfig, BusConfig,
    Config, ConfigError, ConfigResult,
};
pub use error::{AdvertError, Result};
pub use names::{BusError, BusInterface};
pub use properties::{AdvertisementProperty, PropertyBag};
pub use registration::{Advertiser, AdvertiserState, AdvertisingManager};
