//! Driver boundary for the USB TC-08.
//!
//! [`Tc08Driver`] mirrors the vendor C API one call at a time, including its status
//! convention: every call except [`Tc08Driver::open_unit`] returns `0` on failure,
//! after which [`Tc08Driver::get_last_error`] reports the reason. Interpreting those
//! returns is the job of [`DeviceController`](crate::device::DeviceController); the
//! implementations here stay thin.
//!
//! # Implementations
//!
//! - [`MockDriver`] - scriptable in-memory driver with a shared call log
//! - `Usbtc08Driver` - FFI calls into `libusbtc08` (requires the `hardware` feature)

pub mod mock;
#[cfg(feature = "hardware")]
pub mod usbtc08;

pub use mock::{DriverCall, DriverOp, MockDriver};
#[cfg(feature = "hardware")]
pub use usbtc08::Usbtc08Driver;

/// Raw unit handle as returned by `open_unit`.
pub type RawHandle = i16;

/// Number of values returned by one `get_single` call: the cold-junction channel
/// followed by the eight thermocouple inputs.
pub const CHANNEL_COUNT: usize = usbtc08_sys::USBTC08_MAX_CHANNELS + 1;

/// Capability set of the closed-source instrument driver.
///
/// Methods take `&self`; implementations that track state use interior mutability.
pub trait Tc08Driver: Send + Sync {
    /// Open the next available unit: a positive handle, `0` if none is present,
    /// or a negative value on error.
    fn open_unit(&self) -> RawHandle;

    /// Release a handle obtained from `open_unit`.
    fn close_unit(&self, handle: RawHandle) -> i16;

    /// Shortest sampling interval in milliseconds, or `0` on failure.
    fn get_minimum_interval_ms(&self, handle: RawHandle) -> i32;

    /// Start streaming. Returns the interval actually applied, or `0` on failure.
    fn run(&self, handle: RawHandle, interval_ms: i32) -> i32;

    /// Stop streaming.
    fn stop(&self, handle: RawHandle) -> i16;

    /// Assign an ASCII thermocouple type code to a channel (`b' '` disables it).
    fn set_channel(&self, handle: RawHandle, channel: i16, tc_type: u8) -> i16;

    /// Read one value per channel into `temp`. Bit `n` of `overflow_flags` is set
    /// when channel `n` is out of range.
    fn get_single(
        &self,
        handle: RawHandle,
        temp: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16;

    /// Vendor code explaining the last failure on `handle`. Use handle `0` after a
    /// failed `open_unit`.
    fn get_last_error(&self, handle: RawHandle) -> i16;
}

impl<D: Tc08Driver + ?Sized> Tc08Driver for Box<D> {
    fn open_unit(&self) -> RawHandle {
        (**self).open_unit()
    }

    fn close_unit(&self, handle: RawHandle) -> i16 {
        (**self).close_unit(handle)
    }

    fn get_minimum_interval_ms(&self, handle: RawHandle) -> i32 {
        (**self).get_minimum_interval_ms(handle)
    }

    fn run(&self, handle: RawHandle, interval_ms: i32) -> i32 {
        (**self).run(handle, interval_ms)
    }

    fn stop(&self, handle: RawHandle) -> i16 {
        (**self).stop(handle)
    }

    fn set_channel(&self, handle: RawHandle, channel: i16, tc_type: u8) -> i16 {
        (**self).set_channel(handle, channel, tc_type)
    }

    fn get_single(
        &self,
        handle: RawHandle,
        temp: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16 {
        (**self).get_single(handle, temp, overflow_flags, units)
    }

    fn get_last_error(&self, handle: RawHandle) -> i16 {
        (**self).get_last_error(handle)
    }
}
