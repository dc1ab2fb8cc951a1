//! Well-known D-Bus names used when talking to BlueZ.
//!
//! Interface and error names are closed enums. They only turn into strings at
//! the bus boundary, via [`BusInterface::as_str`] and [`BusError::as_str`].

use std::fmt;

/// Bus name owned by bluetoothd.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Object path of the BlueZ object manager.
pub const BLUEZ_ROOT_PATH: &str = "/";

/// D-Bus interfaces this crate calls or serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusInterface {
    /// `org.freedesktop.DBus.ObjectManager`
    ObjectManager,
    /// `org.freedesktop.DBus.Properties`
    Properties,
    /// `org.bluez.Adapter1`
    Adapter,
    /// `org.bluez.LEAdvertisement1`, the interface the advertisement object implements.
    LeAdvertisement,
    /// `org.bluez.LEAdvertisingManager1`
    LeAdvertisingManager,
}

impl BusInterface {
    /// Returns the fixed interface name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectManager => "org.freedesktop.DBus.ObjectManager",
            Self::Properties => "org.freedesktop.DBus.Properties",
            Self::Adapter => "org.bluez.Adapter1",
            Self::LeAdvertisement => "org.bluez.LEAdvertisement1",
            Self::LeAdvertisingManager => "org.bluez.LEAdvertisingManager1",
        }
    }

    /// Looks up an interface by its bus name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::ObjectManager,
            Self::Properties,
            Self::Adapter,
            Self::LeAdvertisement,
            Self::LeAdvertisingManager,
        ]
        .into_iter()
        .find(|iface| iface.as_str() == name)
    }
}

impl fmt::Display for BusInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error names replied to callers of the advertisement object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusError {
    /// `org.freedesktop.DBus.Error.InvalidArgs`
    InvalidArgs,
    /// `org.freedesktop.DBus.Error.UnknownMethod`
    UnknownMethod,
    /// `org.bluez.Error.Failed`
    Failed,
}

impl BusError {
    /// Returns the fixed error name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgs => "org.freedesktop.DBus.Error.InvalidArgs",
            Self::UnknownMethod => "org.freedesktop.DBus.Error.UnknownMethod",
            Self::Failed => "org.bluez.Error.Failed",
        }
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
