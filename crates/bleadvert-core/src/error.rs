//! Unified error types for the bleadvert core library.
//!
//! [`AdvertError`] covers every failure mode of building, exporting and
//! registering an advertisement. The configuration module has its own
//! [`ConfigError`](crate::config::ConfigError) which converts into it.
//!
//! None of these errors are retried. Each one is terminal for the operation
//! in progress: either advertising starts and runs until torn down, or the
//! process exits.
//!
//! # Example
//!
//! ```rust
//! use bleadvert_core::error::{AdvertError, Result};
//!
//! fn check_uuid_count(count: usize) -> Result<()> {
//!     if count > 2 {
//!         return Err(AdvertError::TooManyServiceUuids { max: 2, actual: count });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::names::BusError;

/// The unified error type for all bleadvert operations.
#[derive(Debug, Error)]
pub enum AdvertError {
    // =========================================================================
    // ADVERTISEMENT MODEL ERRORS
    // =========================================================================
    /// More service UUIDs were assigned than an advertisement can carry.
    #[error("Only {max} service UUIDs can be advertised simultaneously (got {actual})")]
    TooManyServiceUuids {
        /// Maximum allowed count.
        max: usize,
        /// Count that was attempted.
        actual: usize,
    },

    /// Properties were requested for an interface the advertisement does not implement.
    #[error("Advertisement does not implement interface '{0}'")]
    InvalidInterface(String),

    /// The advertisement object path is not a valid D-Bus object path.
    #[error("Invalid object path: '{0}'")]
    InvalidObjectPath(String),

    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No object on the bus exposes the LE advertising manager interface.
    #[error("LEAdvertisingManager1 interface not found. Ensure bluetoothd is running and an LE-capable adapter is present.")]
    AdapterNotFound,

    /// bluetoothd rejected the advertisement.
    #[error("Failed to register advertisement: {0}")]
    RegistrationFailed(String),

    /// A D-Bus connection or method call failed.
    #[error("D-Bus error: {0}")]
    Bus(String),

    // =========================================================================
    // CONFIGURATION & I/O ERRORS
    // =========================================================================
    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for bleadvert operations.
pub type Result<T> = std::result::Result<T, AdvertError>;

impl AdvertError {
    /// The bus-level fault a remote caller sees when this error is replied.
    #[must_use]
    pub const fn bus_error(&self) -> BusError {
        match self {
            Self::InvalidInterface(_)
            | Self::TooManyServiceUuids { .. }
            | Self::InvalidObjectPath(_) => BusError::InvalidArgs,
            _ => BusError::Failed,
        }
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::TooManyServiceUuids { .. } => "TOO_MANY_SERVICE_UUIDS",
            Self::InvalidInterface(_) => "INVALID_INTERFACE",
            Self::InvalidObjectPath(_) => "INVALID_OBJECT_PATH",
            Self::AdapterNotFound => "ADAPTER_NOT_FOUND",
            Self::RegistrationFailed(_) => "REGISTRATION_FAILED",
            Self::Bus(_) => "BUS_ERROR",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for AdvertError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Load(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Write { path, source } => Self::Io(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {source}", path.display()),
            )),
            ConfigError::Validation { field, message } => {
                Self::ConfigValidation(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidation(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidation(messages.join("; "))
            }
        }
    }
}

#[cfg(feature = "bluez")]
impl From<dbus::Error> for AdvertError {
    fn from(err: dbus::Error) -> Self {
        let name = err.name().unwrap_or("unknown");
        let message = err.message().unwrap_or_default();
        Self::Bus(format!("{name}: {message}"))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_invalid_interface_is_invalid_args_on_the_bus() {
        let err = AdvertError::InvalidInterface("org.bluez.GattService1".into());
        assert_eq!(err.bus_error(), BusError::InvalidArgs);
        assert_eq!(AdvertError::AdapterNotFound.bus_error(), BusError::Failed);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AdvertError::AdapterNotFound.error_code(), "ADAPTER_NOT_FOUND");
        assert_eq!(
            AdvertError::TooManyServiceUuids { max: 2, actual: 3 }.error_code(),
            "TOO_MANY_SERVICE_UUIDS"
        );
        assert_eq!(
            AdvertError::RegistrationFailed(String::new()).error_code(),
            "REGISTRATION_FAILED"
        );
    }

    #[test]
    fn test_from_io_error() {
        let err: AdvertError = IoErr::new(ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, AdvertError::Io(_)));
    }

    #[test]
    fn test_error_display_messages() {
        let err = AdvertError::TooManyServiceUuids { max: 2, actual: 3 };
        assert!(err.to_string().contains("Only 2 service UUIDs"));

        let err = AdvertError::RegistrationFailed("Maximum advertisements reached".into());
        assert!(err.to_string().contains("Maximum advertisements reached"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<AdvertError>();
        assert_sync::<AdvertError>();
    }
}
