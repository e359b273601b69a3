//! Low-level FFI declarations for the Pico Technology USB TC-08 driver.
//!
//! This crate exposes the raw, unsafe `usb_tc08_*` entry points of the vendor
//! `libusbtc08` library together with the constants from `usbtc08.h`. For a
//! safe wrapper, use the `hardware` feature of the `tc08_relay` crate.
//!
//! # Features
//!
//! - `tc08-sdk`: Declare and link the vendor functions. Without this feature
//!   only the constants are available, which keeps the crate buildable on
//!   machines without the Pico SDK.
//!
//! # Return Convention
//!
//! Every function except `usb_tc08_open_unit` returns `0` on failure. The
//! failure reason is then read with `usb_tc08_get_last_error`.

use std::os::raw::{c_char, c_short};

/// Number of thermocouple channels, excluding the cold-junction channel.
pub const USBTC08_MAX_CHANNELS: usize = 8;

/// Channel index of the cold-junction compensation sensor.
pub const USBTC08_CHANNEL_CJC: c_short = 0;

// Temperature units accepted by `usb_tc08_get_single`

/// Degrees Celsius.
pub const USBTC08_UNITS_CENTIGRADE: c_short = 0;
/// Degrees Fahrenheit.
pub const USBTC08_UNITS_FAHRENHEIT: c_short = 1;
/// Kelvin.
pub const USBTC08_UNITS_KELVIN: c_short = 2;
/// Raw ADC counts.
pub const USBTC08_UNITS_RAW: c_short = 3;

// Error codes reported by `usb_tc08_get_last_error`

/// No error occurred.
pub const USBTC08_ERROR_OK: c_short = 0;
/// The operating system is not supported.
pub const USBTC08_ERROR_OS_NOT_SUPPORTED: c_short = 1;
/// A call to `usb_tc08_set_channel` is required.
pub const USBTC08_ERROR_NO_CHANNELS_SET: c_short = 2;
/// An incorrect parameter was passed to a function.
pub const USBTC08_ERROR_INVALID_PARAMETER: c_short = 3;
/// The connected hardware variant is not supported.
pub const USBTC08_ERROR_VARIANT_NOT_SUPPORTED: c_short = 4;
/// The call is not valid in the unit's current mode.
pub const USBTC08_ERROR_INCORRECT_MODE: c_short = 5;
/// `usb_tc08_open_unit_async` was called again before enumeration finished.
pub const USBTC08_ERROR_ENUMERATION_INCOMPLETE: c_short = 6;
/// The unit does not reply.
pub const USBTC08_ERROR_NOT_RESPONDING: c_short = 7;
/// The firmware could not be downloaded.
pub const USBTC08_ERROR_FW_FAIL: c_short = 8;
/// The unit's configuration information is missing or corrupt.
pub const USBTC08_ERROR_CONFIG_FAIL: c_short = 9;
/// No unit could be found.
pub const USBTC08_ERROR_NOT_FOUND: c_short = 10;
/// A driver thread could not be created.
pub const USBTC08_ERROR_THREAD_FAIL: c_short = 11;
/// The USB pipe information could not be read.
pub const USBTC08_ERROR_PIPE_INFO_FAIL: c_short = 12;
/// No calibration date was found.
pub const USBTC08_ERROR_NOT_CALIBRATED: c_short = 13;
/// The installed picopp.sys driver is too old.
pub const USBTC08_ERROR_PICOPP_TOO_OLD: c_short = 14;
/// Communication with the unit was lost.
pub const USBTC08_ERROR_COMMUNICATION: c_short = 15;

/// Thermocouple type code that disables a channel.
pub const USBTC08_DISABLE_CHANNEL: c_char = b' ' as c_char;

/// Type code reserved for the cold-junction channel.
pub const USBTC08_CJC_TYPE: c_char = b'C' as c_char;

#[cfg(feature = "tc08-sdk")]
extern "C" {
    /// Opens the next available unit. Returns a positive handle, `0` when no
    /// more units are available, or `-1` on error.
    pub fn usb_tc08_open_unit() -> c_short;

    /// Closes the unit and releases its handle.
    pub fn usb_tc08_close_unit(handle: c_short) -> c_short;

    /// Returns the shortest sampling interval (ms) for the enabled channels.
    pub fn usb_tc08_get_minimum_interval_ms(handle: c_short) -> i32;

    /// Starts streaming. Returns the interval actually applied, or `0`.
    pub fn usb_tc08_run(handle: c_short, interval_ms: i32) -> i32;

    /// Stops streaming.
    pub fn usb_tc08_stop(handle: c_short) -> c_short;

    /// Sets the thermocouple type of a channel; `b' '` disables it.
    pub fn usb_tc08_set_channel(handle: c_short, channel: c_short, tc_type: c_char) -> c_short;

    /// Reads one value per channel into `temp`, which must hold
    /// `USBTC08_MAX_CHANNELS + 1` floats.
    pub fn usb_tc08_get_single(
        handle: c_short,
        temp: *mut f32,
        overflow_flags: *mut c_short,
        units: c_short,
    ) -> c_short;

    /// Returns the error code of the last failed call on `handle` (`0` for
    /// enumeration errors).
    pub fn usb_tc08_get_last_error(handle: c_short) -> c_short;
}
