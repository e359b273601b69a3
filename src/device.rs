//! Device controller for a single USB TC-08.
//!
//! [`DeviceController`] owns the instrument handle, the per-channel configuration
//! table and the sampling state. Every operation validates its arguments and the
//! handle state locally first, then makes at most the driver calls it needs and
//! translates a zero status into a [`DriverError`] carrying the vendor code.
//!
//! The controller closes its handle on drop, so an instrument is never leaked even
//! if the owner forgets to call [`DeviceController::close`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::driver::{RawHandle, Tc08Driver, CHANNEL_COUNT};
use crate::error::{DriverError, RelayError, Result};

/// Channel index of the cold-junction compensation sensor.
pub const CJC_CHANNEL: u8 = usbtc08_sys::USBTC08_CHANNEL_CJC as u8;

/// Highest valid channel identifier.
pub const MAX_CHANNEL: u8 = (CHANNEL_COUNT - 1) as u8;

/// Thermocouple calibration curves supported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermocoupleType {
    /// Platinum-rhodium, high temperature.
    B,
    /// Chromel-constantan.
    E,
    /// Iron-constantan.
    J,
    /// Chromel-alumel, the general-purpose default.
    K,
    /// Nicrosil-nisil.
    N,
    /// Platinum-rhodium 13%.
    R,
    /// Platinum-rhodium 10%.
    S,
    /// Copper-constantan.
    T,
}

impl ThermocoupleType {
    /// Every supported type, in code order.
    pub const ALL: [ThermocoupleType; 8] = [
        Self::B,
        Self::E,
        Self::J,
        Self::K,
        Self::N,
        Self::R,
        Self::S,
        Self::T,
    ];

    /// ASCII code understood by the driver.
    pub fn code(self) -> u8 {
        match self {
            Self::B => b'B',
            Self::E => b'E',
            Self::J => b'J',
            Self::K => b'K',
            Self::N => b'N',
            Self::R => b'R',
            Self::S => b'S',
            Self::T => b'T',
        }
    }

    /// Inverse of [`code`](Self::code); `None` for any other byte.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

/// What a channel is currently set up to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// Fixed type of the cold-junction channel.
    ColdJunction,
    /// Measuring with the given thermocouple curve.
    Thermocouple(ThermocoupleType),
    /// Not measured; reads as zero.
    Disabled,
}

impl ChannelType {
    /// ASCII code passed to `set_channel`.
    pub fn code(self) -> u8 {
        match self {
            Self::ColdJunction => usbtc08_sys::USBTC08_CJC_TYPE as u8,
            Self::Thermocouple(t) => t.code(),
            Self::Disabled => usbtc08_sys::USBTC08_DISABLE_CHANNEL as u8,
        }
    }

    /// Parse a type code as sent by a remote peer for a measurement channel.
    ///
    /// An empty string (or the driver's space code) disables the channel. The
    /// cold-junction code is not accepted here.
    pub fn parse_measurement(code: &str) -> Option<Self> {
        match code.as_bytes() {
            [] | [b' '] => Some(Self::Disabled),
            [c] => ThermocoupleType::from_code(*c).map(Self::Thermocouple),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            other => write!(f, "{}", other.code() as char),
        }
    }
}

/// Unit the driver reports readings in. Passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
    /// Kelvin.
    #[default]
    Kelvin,
}

impl TemperatureUnit {
    /// Unit constant passed to `get_single`.
    pub fn code(self) -> i16 {
        match self {
            Self::Celsius => usbtc08_sys::USBTC08_UNITS_CENTIGRADE,
            Self::Fahrenheit => usbtc08_sys::USBTC08_UNITS_FAHRENHEIT,
            Self::Kelvin => usbtc08_sys::USBTC08_UNITS_KELVIN,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Celsius => write!(f, "celsius"),
            Self::Fahrenheit => write!(f, "fahrenheit"),
            Self::Kelvin => write!(f, "kelvin"),
        }
    }
}

/// One row of the channel configuration table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    /// Channel index, 0 being the cold junction.
    pub id: u8,
    /// Current type as last accepted by the driver.
    pub channel_type: ChannelType,
    /// Value from the most recent `measure_all`, zero before the first one.
    pub last_measurement: f32,
}

impl ChannelConfig {
    fn initial(id: u8) -> Self {
        let channel_type = if id == CJC_CHANNEL {
            ChannelType::ColdJunction
        } else {
            ChannelType::Thermocouple(ThermocoupleType::K)
        };
        Self {
            id,
            channel_type,
            last_measurement: 0.0,
        }
    }
}

/// Whether the controller holds a driver handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// No handle held.
    Closed,
    /// A handle from `open_unit` is held.
    Open,
}

/// Streaming state of an open instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingState {
    /// Not streaming.
    #[default]
    Disabled,
    /// Streaming at the interval the driver applied.
    Enabled {
        /// Applied interval in milliseconds.
        interval_ms: u32,
    },
}

/// Last measured value of every channel, in channel order.
///
/// Built fresh for each measurement reply and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSnapshot {
    readings: Vec<(u8, f32)>,
}

impl MeasurementSnapshot {
    fn from_channels(channels: &[ChannelConfig]) -> Self {
        Self {
            readings: channels
                .iter()
                .map(|channel| (channel.id, channel.last_measurement))
                .collect(),
        }
    }

    /// `(channel id, value)` pairs in channel-index order.
    pub fn readings(&self) -> &[(u8, f32)] {
        &self.readings
    }

    /// Reading of one channel.
    pub fn get(&self, channel: u8) -> Option<f32> {
        self.readings
            .iter()
            .find(|(id, _)| *id == channel)
            .map(|(_, value)| *value)
    }

    /// Number of channels in the snapshot.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when the snapshot has no channels.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Lifecycle and configuration of one instrument.
pub struct DeviceController<D: Tc08Driver> {
    driver: D,
    handle: Option<RawHandle>,
    minimum_interval_ms: u32,
    sampling: SamplingState,
    channels: [ChannelConfig; CHANNEL_COUNT],
    units: TemperatureUnit,
}

impl<D: Tc08Driver> DeviceController<D> {
    /// Create a closed controller reporting readings in `units`.
    pub fn new(driver: D, units: TemperatureUnit) -> Self {
        Self {
            driver,
            handle: None,
            minimum_interval_ms: 0,
            sampling: SamplingState::Disabled,
            channels: std::array::from_fn(|id| ChannelConfig::initial(id as u8)),
            units,
        }
    }

    /// Acquire a unit from the driver and query its minimum sampling interval.
    ///
    /// If the interval query fails the handle stays open, so a later
    /// [`close`](Self::close) still releases it.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RelayError::AlreadyOpen);
        }

        let raw = self.driver.open_unit();
        if raw == 0 {
            info!("No USB TC-08 available to open");
            return Err(RelayError::NoDeviceAvailable);
        }
        if raw < 0 {
            // Enumeration errors are reported against handle 0
            return Err(self.driver_error(0, "open").into());
        }

        self.handle = Some(raw);
        info!(handle = raw, "Opened USB TC-08");

        let minimum = self.driver.get_minimum_interval_ms(raw);
        if minimum <= 0 {
            return Err(self.driver_error(raw, "open").into());
        }
        self.minimum_interval_ms = minimum as u32;
        debug!(handle = raw, minimum_interval_ms = minimum, "Queried minimum interval");

        Ok(())
    }

    /// Release the handle. A no-op when already closed.
    ///
    /// The controller is closed afterwards even if the driver reports failure.
    pub fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            debug!("Close requested on a closed instrument");
            return Ok(());
        };
        self.sampling = SamplingState::Disabled;

        if self.driver.close_unit(handle) == 0 {
            return Err(self.driver_error(handle, "close").into());
        }
        info!(handle, "Closed USB TC-08");
        Ok(())
    }

    /// Assign a thermocouple type (by its letter code) to a measurement channel.
    ///
    /// An empty code disables the channel. The cold-junction channel cannot be
    /// reassigned. The table entry changes only after the driver accepts it.
    pub fn configure_channel(&mut self, channel: u8, code: &str) -> Result<()> {
        check_channel(channel)?;
        let channel_type = ChannelType::parse_measurement(code)
            .filter(|_| channel != CJC_CHANNEL)
            .ok_or_else(|| RelayError::InvalidChannelType {
                channel,
                requested: code.to_string(),
            })?;

        self.apply_channel_type(channel, channel_type)
    }

    /// Stop measuring on a channel.
    pub fn disable_channel(&mut self, channel: u8) -> Result<()> {
        self.configure_channel(channel, "")
    }

    fn apply_channel_type(&mut self, channel: u8, channel_type: ChannelType) -> Result<()> {
        let handle = self.require_open()?;

        if self
            .driver
            .set_channel(handle, i16::from(channel), channel_type.code())
            == 0
        {
            return Err(self.driver_error(handle, "configure_channel").into());
        }

        self.channels[usize::from(channel)].channel_type = channel_type;
        debug!(channel, channel_type = %channel_type, "Configured channel");
        Ok(())
    }

    /// Start streaming at `interval_ms`, which must lie between the minimum
    /// queried at open and `i32::MAX`.
    pub fn enable_sampling(&mut self, interval_ms: u32) -> Result<()> {
        let handle = self.require_open()?;
        let invalid = || RelayError::InvalidInterval {
            requested: interval_ms,
            minimum: self.minimum_interval_ms,
        };
        if interval_ms < self.minimum_interval_ms {
            return Err(invalid());
        }
        let requested = i32::try_from(interval_ms).map_err(|_| invalid())?;

        let applied = self.driver.run(handle, requested);
        if applied <= 0 {
            return Err(self.driver_error(handle, "enable_sampling").into());
        }

        self.sampling = SamplingState::Enabled {
            interval_ms: applied as u32,
        };
        info!(requested = interval_ms, applied, "Sampling enabled");
        Ok(())
    }

    /// Stop streaming.
    pub fn disable_sampling(&mut self) -> Result<()> {
        let handle = self.require_open()?;
        if self.driver.stop(handle) == 0 {
            return Err(self.driver_error(handle, "disable_sampling").into());
        }
        self.sampling = SamplingState::Disabled;
        info!("Sampling disabled");
        Ok(())
    }

    /// Take one reading of every channel and return the updated snapshot.
    pub fn measure_all(&mut self) -> Result<MeasurementSnapshot> {
        let handle = self.require_open()?;

        let mut buffer = [0.0f32; CHANNEL_COUNT];
        let mut overflow_flags = 0i16;
        if self
            .driver
            .get_single(handle, &mut buffer, &mut overflow_flags, self.units.code())
            == 0
        {
            return Err(self.driver_error(handle, "measure_all").into());
        }

        for (channel, value) in self.channels.iter_mut().zip(buffer) {
            channel.last_measurement = value;
            if overflow_flags & (1 << channel.id) != 0 {
                warn!(channel = channel.id, value, "Channel reading overflowed");
            }
        }

        Ok(self.snapshot())
    }

    /// Snapshot of the last measured values without touching the driver.
    pub fn snapshot(&self) -> MeasurementSnapshot {
        MeasurementSnapshot::from_channels(&self.channels)
    }

    /// Whether a handle is currently held.
    pub fn handle_state(&self) -> HandleState {
        if self.handle.is_some() {
            HandleState::Open
        } else {
            HandleState::Closed
        }
    }

    /// Shorthand for `handle_state() == HandleState::Open`.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// One row of the channel table.
    pub fn channel(&self, channel: u8) -> Option<&ChannelConfig> {
        self.channels.get(usize::from(channel))
    }

    /// The whole channel table, in channel order.
    pub fn channels(&self) -> &[ChannelConfig] {
        &self.channels
    }

    /// Current streaming state.
    pub fn sampling(&self) -> SamplingState {
        self.sampling
    }

    /// Minimum interval queried at open; zero before the first open.
    pub fn minimum_interval_ms(&self) -> u32 {
        self.minimum_interval_ms
    }

    /// Unit readings are requested in.
    pub fn units(&self) -> TemperatureUnit {
        self.units
    }

    fn require_open(&self) -> Result<RawHandle> {
        self.handle.ok_or(RelayError::NotOpen)
    }

    fn driver_error(&self, handle: RawHandle, operation: &'static str) -> DriverError {
        let err = DriverError::from_raw(self.driver.get_last_error(handle), operation);
        warn!(handle, operation, code = err.code.raw(), "Driver call failed");
        err
    }
}

impl<D: Tc08Driver> Drop for DeviceController<D> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Error closing USB TC-08 on drop");
            }
        }
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if channel > MAX_CHANNEL {
        return Err(RelayError::InvalidChannel {
            channel,
            max: MAX_CHANNEL,
        });
    }
    Ok(())
}
