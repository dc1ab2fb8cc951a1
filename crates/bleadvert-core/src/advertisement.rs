//! The advertisement record handed to BlueZ.
//!
//! An [`Advertisement`] mirrors the advertising-data fields of the Bluetooth
//! Core Specification that `org.bluez.LEAdvertisement1` exposes. It is built up
//! in memory and has no side effects until it is exported on the bus.
//!
//! Once registration takes ownership of the record it is shared read-only, so
//! the mutators below are only reachable before registration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AdvertError, Result};

/// Maximum number of service UUIDs that can be advertised at once.
///
/// See the "Supplement to the Bluetooth Core Specification", part A, section 1.1.
pub const MAX_SERVICE_UUIDS: usize = 2;

/// Default prefix for advertisement object paths.
pub const DEFAULT_PATH_BASE: &str = "/org/bluez/example/advertisement";

/// GAP role announced by the advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvertisingType {
    /// Non-connectable broadcaster.
    Broadcast,
    /// Connectable peripheral.
    #[default]
    Peripheral,
}

impl AdvertisingType {
    /// The value BlueZ expects in the `Type` property.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Peripheral => "peripheral",
        }
    }
}

impl fmt::Display for AdvertisingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvertisingType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Self::Broadcast),
            "peripheral" => Ok(Self::Peripheral),
            other => Err(format!(
                "unknown advertising type '{other}' (expected 'broadcast' or 'peripheral')"
            )),
        }
    }
}

/// A BLE advertisement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    path: String,
    ad_type: AdvertisingType,
    service_uuids: Vec<String>,
    solicit_uuids: Vec<String>,
    manufacturer_data: BTreeMap<u16, Vec<u8>>,
    service_data: BTreeMap<String, Vec<u8>>,
    local_name: Option<String>,
    include_tx_power: bool,
    data: BTreeMap<u8, Vec<u8>>,
}

impl Advertisement {
    /// Creates an empty advertisement at `/org/bluez/example/advertisement<index>`.
    #[must_use]
    pub fn new(index: u32, ad_type: AdvertisingType) -> Self {
        Self::with_path(format!("{DEFAULT_PATH_BASE}{index}"), ad_type)
    }

    /// Creates an empty advertisement served at an explicit object path.
    ///
    /// The path is checked when the advertisement is exported on the bus.
    #[must_use]
    pub fn with_path(path: impl Into<String>, ad_type: AdvertisingType) -> Self {
        Self {
            path: path.into(),
            ad_type,
            service_uuids: Vec::new(),
            solicit_uuids: Vec::new(),
            manufacturer_data: BTreeMap::new(),
            service_data: BTreeMap::new(),
            local_name: None,
            include_tx_power: false,
            data: BTreeMap::new(),
        }
    }

    /// Object path the advertisement is served at.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Advertising type chosen at creation.
    #[must_use]
    pub const fn ad_type(&self) -> AdvertisingType {
        self.ad_type
    }

    /// Advertised service UUIDs.
    #[must_use]
    pub fn service_uuids(&self) -> &[String] {
        &self.service_uuids
    }

    /// Solicited service UUIDs.
    #[must_use]
    pub fn solicit_uuids(&self) -> &[String] {
        &self.solicit_uuids
    }

    /// Manufacturer specific data, keyed by company identifier.
    #[must_use]
    pub const fn manufacturer_data(&self) -> &BTreeMap<u16, Vec<u8>> {
        &self.manufacturer_data
    }

    /// Service data, keyed by service UUID.
    #[must_use]
    pub const fn service_data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.service_data
    }

    /// Local name, if set and non-empty.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Whether the TX power level is included.
    #[must_use]
    pub const fn include_tx_power(&self) -> bool {
        self.include_tx_power
    }

    /// Raw advertising data, keyed by AD type.
    #[must_use]
    pub const fn data(&self) -> &BTreeMap<u8, Vec<u8>> {
        &self.data
    }

    /// Replaces the service UUIDs with a single UUID.
    pub fn set_service_uuid(&mut self, uuid: impl Into<String>) -> &mut Self {
        self.service_uuids = vec![uuid.into()];
        self
    }

    /// Replaces the service UUIDs.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertError::TooManyServiceUuids`] if more than
    /// [`MAX_SERVICE_UUIDS`] are given. The stored list is left untouched.
    pub fn set_service_uuids<I, S>(&mut self, uuids: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let uuids: Vec<String> = uuids.into_iter().map(Into::into).collect();
        if uuids.len() > MAX_SERVICE_UUIDS {
            return Err(AdvertError::TooManyServiceUuids {
                max: MAX_SERVICE_UUIDS,
                actual: uuids.len(),
            });
        }
        self.service_uuids = uuids;
        Ok(self)
    }

    /// Appends a solicited service UUID.
    pub fn add_solicit_uuid(&mut self, uuid: impl Into<String>) -> &mut Self {
        self.solicit_uuids.push(uuid.into());
        self
    }

    /// Sets manufacturer data for `code`, overwriting any previous entry.
    pub fn add_manufacturer_data(&mut self, code: u16, data: impl Into<Vec<u8>>) -> &mut Self {
        self.manufacturer_data.insert(code, data.into());
        self
    }

    /// Sets service data for `uuid`, overwriting any previous entry.
    pub fn add_service_data(&mut self, uuid: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.service_data.insert(uuid.into(), data.into());
        self
    }

    /// Sets raw advertising data for AD type `ad_type`, overwriting any previous entry.
    pub fn add_data(&mut self, ad_type: u8, data: impl Into<Vec<u8>>) -> &mut Self {
        self.data.insert(ad_type, data.into());
        self
    }

    /// Sets the local name, replacing any earlier one.
    ///
    /// An empty name counts as unset.
    pub fn set_local_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.local_name = Some(name.into());
        self
    }

    /// Toggles inclusion of the TX power level.
    pub fn set_include_tx_power(&mut self, include: bool) -> &mut Self {
        self.include_tx_power = include;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_uses_index() {
        let ad = Advertisement::new(3, AdvertisingType::Broadcast);
        assert_eq!(ad.path(), "/org/bluez/example/advertisement3");
        assert_eq!(ad.ad_type(), AdvertisingType::Broadcast);
    }

    #[test]
    fn test_two_service_uuids_accepted() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.set_service_uuids(["180d", "180f"]).unwrap();
        assert_eq!(ad.service_uuids(), ["180d", "180f"]);
    }

    #[test]
    fn test_third_service_uuid_rejected_without_mutation() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.set_service_uuids(["cafe"]).unwrap();

        let err = ad.set_service_uuids(["180d", "180f", "1812"]).unwrap_err();
        assert!(matches!(
            err,
            AdvertError::TooManyServiceUuids { max: 2, actual: 3 }
        ));
        assert_eq!(ad.service_uuids(), ["cafe"]);
    }

    #[test]
    fn test_never_more_than_two_service_uuids() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        let attempts: [&[&str]; 5] = [
            &["a"],
            &["a", "b", "c"],
            &[],
            &["a", "b"],
            &["a", "b", "c", "d"],
        ];
        for uuids in attempts {
            let _ = ad.set_service_uuids(uuids.iter().copied());
            assert!(ad.service_uuids().len() <= MAX_SERVICE_UUIDS);
        }
        assert_eq!(ad.service_uuids(), ["a", "b"]);
    }

    #[test]
    fn test_single_service_uuid_replaces_list() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.set_service_uuids(["180d", "180f"]).unwrap();
        ad.set_service_uuid("cafe");
        assert_eq!(ad.service_uuids(), ["cafe"]);
    }

    #[test]
    fn test_solicit_uuids_append() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.add_solicit_uuid("1800").add_solicit_uuid("1801").add_solicit_uuid("1800");
        assert_eq!(ad.solicit_uuids(), ["1800", "1801", "1800"]);
    }

    #[test]
    fn test_manufacturer_data_overwrites() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.add_manufacturer_data(0xffff, [0x00, 0x01]);
        ad.add_manufacturer_data(0xffff, [0x02]);
        assert_eq!(ad.manufacturer_data().len(), 1);
        assert_eq!(ad.manufacturer_data()[&0xffff], vec![0x02]);
    }

    #[test]
    fn test_service_and_tagged_data_overwrite() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.add_service_data("9999", [1]).add_service_data("9999", [2, 3]);
        ad.add_data(0x26, [1]).add_data(0x26, [1, 1, 0]);
        assert_eq!(ad.service_data()["9999"], vec![2, 3]);
        assert_eq!(ad.data()[&0x26], vec![1, 1, 0]);
    }

    #[test]
    fn test_empty_local_name_is_unset() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        assert_eq!(ad.local_name(), None);
        ad.set_local_name("");
        assert_eq!(ad.local_name(), None);
        ad.set_local_name("beacon");
        assert_eq!(ad.local_name(), Some("beacon"));
    }

    #[test]
    fn test_local_name_last_set_wins() {
        let mut ad = Advertisement::new(0, AdvertisingType::Peripheral);
        ad.set_local_name("first").set_local_name("second");
        assert_eq!(ad.local_name(), Some("second"));
        assert_eq!(ad.properties().names().filter(|n| *n == "LocalName").count(), 1);
    }

    #[test]
    fn test_advertising_type_parse() {
        assert_eq!("broadcast".parse::<AdvertisingType>(), Ok(AdvertisingType::Broadcast));
        assert_eq!("peripheral".parse::<AdvertisingType>(), Ok(AdvertisingType::Peripheral));
        assert!("central".parse::<AdvertisingType>().is_err());
        assert_eq!(AdvertisingType::Peripheral.to_string(), "peripheral");
    }
}
