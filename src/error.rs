//! Custom error types for the relay.
//!
//! This module defines the primary error type, `RelayError`, shared by the device
//! controller and the command session. Using the `thiserror` crate, it provides a
//! single place for every failure that can end a session.
//!
//! ## Error Hierarchy
//!
//! - **Validation errors** (`InvalidInterval`, `InvalidChannelType`, `InvalidChannel`,
//!   `NotOpen`, `AlreadyOpen`, `MalformedCommand`): detected locally before any driver
//!   call is made.
//! - **`NoDeviceAvailable`**: the driver reported that no unit is present. The caller may
//!   retry later; the process keeps running.
//! - **`Driver`**: a driver call returned failure. Carries a [`DriverError`] with the
//!   vendor code resolved through a static description table and the name of the
//!   operation that failed.
//! - **`Transport`** / **`Serialization`**: the duplex channel to the peer failed, or a
//!   reply could not be encoded.
//!
//! Nothing is retried automatically. Inside a session every variant is terminal: the
//! connection ends and the instrument handle is released.

use std::fmt;

use thiserror::Error;

/// Convenience alias for results using the relay error type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Every failure that can end a session.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The driver found no unit left to open.
    #[error("No more USB TC-08 units are available to open")]
    NoDeviceAvailable,

    /// Requested streaming interval is below the instrument minimum, or does not
    /// fit the driver's interval type.
    #[error(
        "Sampling interval {requested} ms is not supported: the device accepts {minimum} ms up to {limit} ms",
        limit = i32::MAX
    )]
    InvalidInterval {
        /// Interval asked for, in milliseconds.
        requested: u32,
        /// Minimum reported by the driver at open.
        minimum: u32,
    },

    /// Type code is unknown, or the target is the cold-junction channel.
    #[error("Invalid thermocouple type '{requested}' for channel {channel}")]
    InvalidChannelType {
        /// Channel the peer tried to configure.
        channel: u8,
        /// Code as received.
        requested: String,
    },

    /// Channel index outside `0..=max`.
    #[error("Invalid channel {channel}: the instrument has channels 0-{max}")]
    InvalidChannel {
        /// Channel index as received.
        channel: u8,
        /// Highest valid index.
        max: u8,
    },

    /// The operation needs an open handle.
    #[error("Instrument is not open")]
    NotOpen,

    /// `open` was called while a handle is held.
    #[error("Instrument is already open")]
    AlreadyOpen,

    /// A driver call reported failure.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Inbound frame is not a valid command envelope.
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// Reading from or writing to the peer connection failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A reply could not be encoded.
    #[error("Failed to encode reply: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    /// True for failures detected before the driver was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInterval { .. }
                | Self::InvalidChannelType { .. }
                | Self::InvalidChannel { .. }
                | Self::NotOpen
                | Self::AlreadyOpen
                | Self::MalformedCommand(_)
        )
    }
}

/// Vendor error codes reported by `usb_tc08_get_last_error`.
///
/// Unmapped values are kept in [`DriverErrorCode::Unknown`] rather than dropped, so the
/// raw code still reaches the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorCode {
    /// No error.
    Ok,
    /// Operating system not supported.
    OsNotSupported,
    /// No channel has been configured.
    NoChannelsSet,
    /// An argument was invalid.
    InvalidParameter,
    /// Hardware variant not supported.
    VariantNotSupported,
    /// Call not valid in the current mode.
    IncorrectMode,
    /// Background enumeration still running.
    EnumerationIncomplete,
    /// Unit does not reply.
    NotResponding,
    /// Firmware download failed.
    FirmwareFail,
    /// EEPROM missing or corrupt.
    ConfigFail,
    /// Enumerated unit not found.
    NotFound,
    /// Threading failure inside the driver.
    ThreadFail,
    /// USB pipe information unavailable.
    PipeInfoFail,
    /// No calibration date.
    NotCalibrated,
    /// Outdated picopp.sys driver.
    PicoppTooOld,
    /// Communication with the unit was lost.
    Communication,
    /// A code outside the vendor table.
    Unknown(i16),
}

impl DriverErrorCode {
    /// Convert from the raw value returned by the driver.
    pub fn from_raw(raw: i16) -> Self {
        use usbtc08_sys::*;

        match raw {
            USBTC08_ERROR_OK => Self::Ok,
            USBTC08_ERROR_OS_NOT_SUPPORTED => Self::OsNotSupported,
            USBTC08_ERROR_NO_CHANNELS_SET => Self::NoChannelsSet,
            USBTC08_ERROR_INVALID_PARAMETER => Self::InvalidParameter,
            USBTC08_ERROR_VARIANT_NOT_SUPPORTED => Self::VariantNotSupported,
            USBTC08_ERROR_INCORRECT_MODE => Self::IncorrectMode,
            USBTC08_ERROR_ENUMERATION_INCOMPLETE => Self::EnumerationIncomplete,
            USBTC08_ERROR_NOT_RESPONDING => Self::NotResponding,
            USBTC08_ERROR_FW_FAIL => Self::FirmwareFail,
            USBTC08_ERROR_CONFIG_FAIL => Self::ConfigFail,
            USBTC08_ERROR_NOT_FOUND => Self::NotFound,
            USBTC08_ERROR_THREAD_FAIL => Self::ThreadFail,
            USBTC08_ERROR_PIPE_INFO_FAIL => Self::PipeInfoFail,
            USBTC08_ERROR_NOT_CALIBRATED => Self::NotCalibrated,
            USBTC08_ERROR_PICOPP_TOO_OLD => Self::PicoppTooOld,
            USBTC08_ERROR_COMMUNICATION => Self::Communication,
            other => Self::Unknown(other),
        }
    }

    /// The raw vendor value.
    pub fn raw(self) -> i16 {
        use usbtc08_sys::*;

        match self {
            Self::Ok => USBTC08_ERROR_OK,
            Self::OsNotSupported => USBTC08_ERROR_OS_NOT_SUPPORTED,
            Self::NoChannelsSet => USBTC08_ERROR_NO_CHANNELS_SET,
            Self::InvalidParameter => USBTC08_ERROR_INVALID_PARAMETER,
            Self::VariantNotSupported => USBTC08_ERROR_VARIANT_NOT_SUPPORTED,
            Self::IncorrectMode => USBTC08_ERROR_INCORRECT_MODE,
            Self::EnumerationIncomplete => USBTC08_ERROR_ENUMERATION_INCOMPLETE,
            Self::NotResponding => USBTC08_ERROR_NOT_RESPONDING,
            Self::FirmwareFail => USBTC08_ERROR_FW_FAIL,
            Self::ConfigFail => USBTC08_ERROR_CONFIG_FAIL,
            Self::NotFound => USBTC08_ERROR_NOT_FOUND,
            Self::ThreadFail => USBTC08_ERROR_THREAD_FAIL,
            Self::PipeInfoFail => USBTC08_ERROR_PIPE_INFO_FAIL,
            Self::NotCalibrated => USBTC08_ERROR_NOT_CALIBRATED,
            Self::PicoppTooOld => USBTC08_ERROR_PICOPP_TOO_OLD,
            Self::Communication => USBTC08_ERROR_COMMUNICATION,
            Self::Unknown(raw) => raw,
        }
    }

    /// Human-readable description from the vendor documentation.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "No error occurred.",
            Self::OsNotSupported => "The driver does not support the current operating system.",
            Self::NoChannelsSet => "A call to usb_tc08_set_channel() is required.",
            Self::InvalidParameter => "One or more of the function arguments were invalid.",
            Self::VariantNotSupported => {
                "The hardware version is not supported. Download the latest driver."
            }
            Self::IncorrectMode => {
                "An incompatible mix of legacy and non-legacy functions was called \
                 (or usb_tc08_get_single() was called while in streaming mode.)"
            }
            Self::EnumerationIncomplete => {
                "Function usb_tc08_open_unit_async() was called again while a background \
                 enumeration was already in progress."
            }
            Self::NotResponding => "Cannot get a reply from a USB TC-08.",
            Self::FirmwareFail => "Unable to download firmware.",
            Self::ConfigFail => "Missing or corrupted EEPROM.",
            Self::NotFound => "Cannot find enumerated device.",
            Self::ThreadFail => "A threading function failed.",
            Self::PipeInfoFail => "Can not get USB pipe information.",
            Self::NotCalibrated => "No calibration date was found.",
            Self::PicoppTooOld => "An old picopp.sys driver was found on the system.",
            Self::Communication => "The PC has lost communication with the device.",
            Self::Unknown(_) => "Unknown error",
        }
    }
}

impl fmt::Display for DriverErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.raw(), self.description())
    }
}

/// A failed driver call: the resolved vendor code plus the operation that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code} [error when calling: {operation}]")]
pub struct DriverError {
    /// Vendor code from `get_last_error`.
    pub code: DriverErrorCode,
    /// Controller operation that made the failing call.
    pub operation: &'static str,
}

impl DriverError {
    /// Pair a resolved code with the failing operation.
    pub fn new(code: DriverErrorCode, operation: &'static str) -> Self {
        Self { code, operation }
    }

    /// Build from a raw vendor code.
    pub fn from_raw(raw: i16, operation: &'static str) -> Self {
        Self::new(DriverErrorCode::from_raw(raw), operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_code_display() {
        let err = DriverError::from_raw(7, "measure_all");
        assert_eq!(
            err.to_string(),
            "7: Cannot get a reply from a USB TC-08. [error when calling: measure_all]"
        );
    }

    #[test]
    fn test_unknown_code_falls_back() {
        let code = DriverErrorCode::from_raw(99);
        assert_eq!(code, DriverErrorCode::Unknown(99));
        assert_eq!(code.description(), "Unknown error");
        assert_eq!(code.raw(), 99);

        let err = RelayError::from(DriverError::new(code, "open"));
        assert!(err.to_string().starts_with("99: Unknown error"));
        assert!(err.to_string().contains("open"));
    }

    #[test]
    fn test_raw_values_map_back() {
        for raw in 0..=15 {
            let code = DriverErrorCode::from_raw(raw);
            assert!(!matches!(code, DriverErrorCode::Unknown(_)), "code {raw}");
            assert_eq!(code.raw(), raw);
        }
    }

    #[test]
    fn test_validation_classification() {
        assert!(RelayError::NotOpen.is_validation());
        assert!(RelayError::MalformedCommand("x".into()).is_validation());
        assert!(!RelayError::NoDeviceAvailable.is_validation());
        assert!(!RelayError::Driver(DriverError::from_raw(15, "stop")).is_validation());
    }
}
