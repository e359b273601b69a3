//! FFI-backed driver for a physical USB TC-08.

#![allow(unsafe_code)]

use usbtc08_sys as sys;

use super::{RawHandle, Tc08Driver, CHANNEL_COUNT};

/// Calls straight into the vendor `libusbtc08`.
///
/// The library keeps all unit state internally, so this type carries none. Calls on
/// one handle must not overlap; the session loop guarantees that by issuing one
/// driver call at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Usbtc08Driver;

// SAFETY (all methods): the vendor functions take plain integers plus, for
// get_single, pointers to buffers we own for the duration of the call. The temp
// buffer is sized USBTC08_MAX_CHANNELS + 1 as the library requires.
impl Tc08Driver for Usbtc08Driver {
    fn open_unit(&self) -> RawHandle {
        unsafe { sys::usb_tc08_open_unit() }
    }

    fn close_unit(&self, handle: RawHandle) -> i16 {
        unsafe { sys::usb_tc08_close_unit(handle) }
    }

    fn get_minimum_interval_ms(&self, handle: RawHandle) -> i32 {
        unsafe { sys::usb_tc08_get_minimum_interval_ms(handle) }
    }

    fn run(&self, handle: RawHandle, interval_ms: i32) -> i32 {
        unsafe { sys::usb_tc08_run(handle, interval_ms) }
    }

    fn stop(&self, handle: RawHandle) -> i16 {
        unsafe { sys::usb_tc08_stop(handle) }
    }

    fn set_channel(&self, handle: RawHandle, channel: i16, tc_type: u8) -> i16 {
        unsafe { sys::usb_tc08_set_channel(handle, channel, tc_type as std::os::raw::c_char) }
    }

    fn get_single(
        &self,
        handle: RawHandle,
        temp: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16 {
        unsafe { sys::usb_tc08_get_single(handle, temp.as_mut_ptr(), overflow_flags, units) }
    }

    fn get_last_error(&self, handle: RawHandle) -> i16 {
        unsafe { sys::usb_tc08_get_last_error(handle) }
    }
}
