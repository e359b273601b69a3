//! Scriptable mock of the USB TC-08 driver.
//!
//! Follows the vendor status convention exactly (zero on failure, reason via
//! `get_last_error`) so the controller's error handling is exercised for real.
//!
//! Clones share state: keep one clone in a test, hand the other to the code under
//! test, then inspect the call log.
//!
//! # Example
//!
//! ```
//! use tc08_relay::driver::{DriverOp, MockDriver, Tc08Driver};
//!
//! let driver = MockDriver::new().with_minimum_interval(100);
//! let shared = driver.clone();
//!
//! let handle = driver.open_unit();
//! assert!(handle > 0);
//!
//! shared.fail_on(DriverOp::Run, 5);
//! assert_eq!(driver.run(handle, 250), 0);
//! assert_eq!(driver.get_last_error(handle), 5);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use usbtc08_sys::{USBTC08_ERROR_INVALID_PARAMETER, USBTC08_ERROR_OK};

use super::{RawHandle, Tc08Driver, CHANNEL_COUNT};

/// Handle returned by a successful open unless overridden.
const DEFAULT_HANDLE: RawHandle = 1;

/// Minimum interval reported by a TC-08 with all channels enabled.
const DEFAULT_MINIMUM_INTERVAL_MS: i32 = 100;

/// Driver operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    /// `open_unit`
    Open,
    /// `close_unit`
    Close,
    /// `get_minimum_interval_ms`
    MinimumInterval,
    /// `run`
    Run,
    /// `stop`
    Stop,
    /// `set_channel`
    SetChannel,
    /// `get_single`
    GetSingle,
}

/// One recorded driver invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    /// `open_unit()`
    OpenUnit,
    /// `close_unit(handle)`
    CloseUnit {
        /// Handle passed in.
        handle: RawHandle,
    },
    /// `get_minimum_interval_ms(handle)`
    GetMinimumInterval {
        /// Handle passed in.
        handle: RawHandle,
    },
    /// `run(handle, interval_ms)`
    Run {
        /// Handle passed in.
        handle: RawHandle,
        /// Requested interval.
        interval_ms: i32,
    },
    /// `stop(handle)`
    Stop {
        /// Handle passed in.
        handle: RawHandle,
    },
    /// `set_channel(handle, channel, tc_type)`
    SetChannel {
        /// Handle passed in.
        handle: RawHandle,
        /// Channel index.
        channel: i16,
        /// ASCII type code.
        tc_type: u8,
    },
    /// `get_single(handle, .., units)`
    GetSingle {
        /// Handle passed in.
        handle: RawHandle,
        /// Unit constant.
        units: i16,
    },
    /// `get_last_error(handle)`
    GetLastError {
        /// Handle passed in.
        handle: RawHandle,
    },
}

#[derive(Debug, Clone, Copy)]
enum OpenBehavior {
    Handle(RawHandle),
    NoneAvailable,
    Error(i16),
}

#[derive(Debug)]
struct MockState {
    open_behavior: OpenBehavior,
    open_handle: Option<RawHandle>,
    minimum_interval_ms: i32,
    readings: [f32; CHANNEL_COUNT],
    overflow_flags: i16,
    failures: HashMap<DriverOp, i16>,
    last_error: i16,
    calls: Vec<DriverCall>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open_behavior: OpenBehavior::Handle(DEFAULT_HANDLE),
            open_handle: None,
            minimum_interval_ms: DEFAULT_MINIMUM_INTERVAL_MS,
            readings: [0.0; CHANNEL_COUNT],
            overflow_flags: 0,
            failures: HashMap::new(),
            last_error: USBTC08_ERROR_OK,
            calls: Vec::new(),
        }
    }
}

impl MockState {
    /// Record a failure for `op` if one is injected or the handle is stale.
    /// Returns true when the call must report failure.
    fn fails(&mut self, op: DriverOp, handle: RawHandle) -> bool {
        if let Some(code) = self.failures.get(&op).copied() {
            self.last_error = code;
            return true;
        }
        if self.open_handle != Some(handle) {
            self.last_error = USBTC08_ERROR_INVALID_PARAMETER;
            return true;
        }
        false
    }
}

/// In-memory stand-in for the vendor driver.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// A driver with one unit attached, a 100 ms minimum interval and all-zero readings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `ms` from `get_minimum_interval_ms`.
    pub fn with_minimum_interval(self, ms: i32) -> Self {
        self.state.lock().minimum_interval_ms = ms;
        self
    }

    /// Values returned by `get_single`, cold-junction channel first.
    pub fn with_readings(self, readings: [f32; CHANNEL_COUNT]) -> Self {
        self.set_readings(readings);
        self
    }

    /// Overflow bitmask returned by `get_single`.
    pub fn with_overflow_flags(self, flags: i16) -> Self {
        self.state.lock().overflow_flags = flags;
        self
    }

    /// Make `open_unit` hand out `handle`.
    pub fn with_handle(self, handle: RawHandle) -> Self {
        self.state.lock().open_behavior = OpenBehavior::Handle(handle);
        self
    }

    /// Make `open_unit` report that no unit is attached.
    pub fn without_units(self) -> Self {
        self.state.lock().open_behavior = OpenBehavior::NoneAvailable;
        self
    }

    /// Make `open_unit` fail with the vendor error `code`.
    pub fn with_open_error(self, code: i16) -> Self {
        self.state.lock().open_behavior = OpenBehavior::Error(code);
        self
    }

    /// Replace the values returned by subsequent reads.
    pub fn set_readings(&self, readings: [f32; CHANNEL_COUNT]) {
        self.state.lock().readings = readings;
    }

    /// Make every later call of `op` fail with the vendor error `code`.
    pub fn fail_on(&self, op: DriverOp, code: i16) {
        self.state.lock().failures.insert(op, code);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `close_unit` calls made so far.
    pub fn close_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, DriverCall::CloseUnit { .. }))
            .count()
    }

    /// True while a unit handed out by `open_unit` has not been closed.
    pub fn is_unit_open(&self) -> bool {
        self.state.lock().open_handle.is_some()
    }
}

impl Tc08Driver for MockDriver {
    fn open_unit(&self) -> RawHandle {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::OpenUnit);

        if let Some(code) = state.failures.get(&DriverOp::Open).copied() {
            state.last_error = code;
            return -1;
        }

        match state.open_behavior {
            OpenBehavior::Handle(handle) => {
                state.open_handle = Some(handle);
                state.last_error = USBTC08_ERROR_OK;
                handle
            }
            OpenBehavior::NoneAvailable => 0,
            OpenBehavior::Error(code) => {
                state.last_error = code;
                -1
            }
        }
    }

    fn close_unit(&self, handle: RawHandle) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::CloseUnit { handle });
        if state.fails(DriverOp::Close, handle) {
            return 0;
        }
        state.open_handle = None;
        1
    }

    fn get_minimum_interval_ms(&self, handle: RawHandle) -> i32 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::GetMinimumInterval { handle });
        if state.fails(DriverOp::MinimumInterval, handle) {
            return 0;
        }
        state.minimum_interval_ms
    }

    fn run(&self, handle: RawHandle, interval_ms: i32) -> i32 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Run {
            handle,
            interval_ms,
        });
        if state.fails(DriverOp::Run, handle) {
            return 0;
        }
        interval_ms.max(state.minimum_interval_ms)
    }

    fn stop(&self, handle: RawHandle) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Stop { handle });
        if state.fails(DriverOp::Stop, handle) {
            return 0;
        }
        1
    }

    fn set_channel(&self, handle: RawHandle, channel: i16, tc_type: u8) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::SetChannel {
            handle,
            channel,
            tc_type,
        });
        if state.fails(DriverOp::SetChannel, handle) {
            return 0;
        }
        1
    }

    fn get_single(
        &self,
        handle: RawHandle,
        temp: &mut [f32; CHANNEL_COUNT],
        overflow_flags: &mut i16,
        units: i16,
    ) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::GetSingle { handle, units });
        if state.fails(DriverOp::GetSingle, handle) {
            return 0;
        }
        *temp = state.readings;
        *overflow_flags = state.overflow_flags;
        1
    }

    fn get_last_error(&self, handle: RawHandle) -> i16 {
        let mut state = self.state.lock();
        state.calls.push(DriverCall::GetLastError { handle });
        state.last_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close_track_handle() {
        let driver = MockDriver::new().with_handle(7);
        assert_eq!(driver.open_unit(), 7);
        assert!(driver.is_unit_open());
        assert_eq!(driver.close_unit(7), 1);
        assert!(!driver.is_unit_open());
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn test_stale_handle_is_invalid_parameter() {
        let driver = MockDriver::new();
        assert_eq!(driver.stop(3), 0);
        assert_eq!(driver.get_last_error(3), USBTC08_ERROR_INVALID_PARAMETER);
    }

    #[test]
    fn test_open_outcomes() {
        assert_eq!(MockDriver::new().without_units().open_unit(), 0);

        let failing = MockDriver::new().with_open_error(8);
        assert_eq!(failing.open_unit(), -1);
        assert_eq!(failing.get_last_error(0), 8);
    }

    #[test]
    fn test_injected_failure_sets_last_error() {
        let driver = MockDriver::new();
        let handle = driver.open_unit();
        driver.fail_on(DriverOp::GetSingle, 7);

        let mut temp = [0.0; CHANNEL_COUNT];
        let mut overflow = 0;
        assert_eq!(driver.get_single(handle, &mut temp, &mut overflow, 2), 0);
        assert_eq!(driver.get_last_error(handle), 7);

        driver.clear_failures();
        assert_eq!(driver.get_single(handle, &mut temp, &mut overflow, 2), 1);
    }

    #[test]
    fn test_clones_share_call_log() {
        let driver = MockDriver::new();
        let shared = driver.clone();
        let handle = driver.open_unit();
        driver.set_channel(handle, 1, b'J');

        assert_eq!(
            shared.calls(),
            vec![
                DriverCall::OpenUnit,
                DriverCall::SetChannel {
                    handle,
                    channel: 1,
                    tc_type: b'J'
                },
            ]
        );
        shared.clear_calls();
        assert!(driver.calls().is_empty());
    }
}
