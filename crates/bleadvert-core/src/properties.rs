//! Property export for `org.bluez.LEAdvertisement1`.
//!
//! bluetoothd reads an advertisement through `Properties.GetAll`. Only the
//! populated fields may appear in that reply, so the export is an explicit list
//! of [`AdvertisementProperty`] variants rather than a map of every field.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::advertisement::{Advertisement, AdvertisingType};
use crate::error::{AdvertError, Result};
use crate::names::BusInterface;

/// Value of the `Includes` property when the TX power level is requested.
pub const INCLUDE_TX_POWER: &str = "tx-power";

/// One exported property of an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertisementProperty {
    /// `Type` (`s`), always present.
    Type(AdvertisingType),
    /// `ServiceUUIDs` (`as`)
    ServiceUuids(Vec<String>),
    /// `SolicitUUIDs` (`as`)
    SolicitUuids(Vec<String>),
    /// `ManufacturerData` (`a{qv}`)
    ManufacturerData(BTreeMap<u16, Vec<u8>>),
    /// `ServiceData` (`a{sv}`)
    ServiceData(BTreeMap<String, Vec<u8>>),
    /// `LocalName` (`s`)
    LocalName(String),
    /// `Includes` (`as`)
    Includes(Vec<String>),
    /// `Data` (`a{yv}`)
    Data(BTreeMap<u8, Vec<u8>>),
}

impl AdvertisementProperty {
    /// D-Bus property name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Type(_) => "Type",
            Self::ServiceUuids(_) => "ServiceUUIDs",
            Self::SolicitUuids(_) => "SolicitUUIDs",
            Self::ManufacturerData(_) => "ManufacturerData",
            Self::ServiceData(_) => "ServiceData",
            Self::LocalName(_) => "LocalName",
            Self::Includes(_) => "Includes",
            Self::Data(_) => "Data",
        }
    }
}

/// The populated properties of an advertisement, in export order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBag(Vec<AdvertisementProperty>);

impl PropertyBag {
    /// Property names in export order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(AdvertisementProperty::name)
    }

    /// Looks up a property by its D-Bus name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AdvertisementProperty> {
        self.0.iter().find(|prop| prop.name() == name)
    }

    /// Number of exported properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: `Type` is exported unconditionally.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the exported properties.
    pub fn iter(&self) -> std::slice::Iter<'_, AdvertisementProperty> {
        self.0.iter()
    }
}

impl IntoIterator for PropertyBag {
    type Item = AdvertisementProperty;
    type IntoIter = std::vec::IntoIter<AdvertisementProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyBag {
    type Item = &'a AdvertisementProperty;
    type IntoIter = std::slice::Iter<'a, AdvertisementProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PropertyBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for prop in &self.0 {
            match prop {
                AdvertisementProperty::Type(ad_type) => {
                    map.serialize_entry(prop.name(), ad_type.as_str())?;
                }
                AdvertisementProperty::ServiceUuids(uuids)
                | AdvertisementProperty::SolicitUuids(uuids)
                | AdvertisementProperty::Includes(uuids) => {
                    map.serialize_entry(prop.name(), uuids)?;
                }
                AdvertisementProperty::ManufacturerData(data) => {
                    map.serialize_entry(prop.name(), data)?;
                }
                AdvertisementProperty::ServiceData(data) => {
                    map.serialize_entry(prop.name(), data)?;
                }
                AdvertisementProperty::LocalName(name) => {
                    map.serialize_entry(prop.name(), name)?;
                }
                AdvertisementProperty::Data(data) => {
                    map.serialize_entry(prop.name(), data)?;
                }
            }
        }
        map.end()
    }
}

impl Advertisement {
    /// Builds the property bag: `Type` plus every populated optional field.
    #[must_use]
    pub fn properties(&self) -> PropertyBag {
        let mut props = vec![AdvertisementProperty::Type(self.ad_type())];

        if !self.service_uuids().is_empty() {
            props.push(AdvertisementProperty::ServiceUuids(
                self.service_uuids().to_vec(),
            ));
        }
        if !self.solicit_uuids().is_empty() {
            props.push(AdvertisementProperty::SolicitUuids(
                self.solicit_uuids().to_vec(),
            ));
        }
        if !self.manufacturer_data().is_empty() {
            props.push(AdvertisementProperty::ManufacturerData(
                self.manufacturer_data().clone(),
            ));
        }
        if !self.service_data().is_empty() {
            props.push(AdvertisementProperty::ServiceData(
                self.service_data().clone(),
            ));
        }
        if let Some(name) = self.local_name() {
            props.push(AdvertisementProperty::LocalName(name.to_owned()));
        }
        if self.include_tx_power() {
            props.push(AdvertisementProperty::Includes(vec![
                INCLUDE_TX_POWER.to_owned()
            ]));
        }
        if !self.data().is_empty() {
            props.push(AdvertisementProperty::Data(self.data().clone()));
        }

        PropertyBag(props)
    }

    /// Answers `Properties.GetAll(interface)`.
    ///
    /// # Errors
    ///
    /// Returns [`AdvertError::InvalidInterface`] for any interface other than
    /// `org.bluez.LEAdvertisement1`.
    pub fn get_all(&self, interface: &str) -> Result<PropertyBag> {
        if BusInterface::from_name(interface) != Some(BusInterface::LeAdvertisement) {
            return Err(AdvertError::InvalidInterface(interface.to_owned()));
        }
        Ok(self.properties())
    }
}
