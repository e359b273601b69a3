//! Wire format between the relay and a remote controller.
//!
//! Each inbound text frame is one JSON command envelope whose `command` field names
//! the operation:
//!
//! ```json
//! {"command": "configure_channel", "channel": 1, "type": "K"}
//! ```
//!
//! Only `measure_all_channels` is answered, with one object mapping `ch_<id>` to the
//! channel's last reading:
//!
//! ```json
//! {"ch_0": 21.3, "ch_1": 294.5, "ch_2": 0.0}
//! ```
//!
//! There is no error reply; a command that cannot be parsed ends the session.
//!
//! JSON has no literal for NaN or infinity, so a non-finite reading (e.g. an
//! open-circuit thermocouple) is sent as `null`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::device::MeasurementSnapshot;
use crate::error::{RelayError, Result};

/// One parsed command envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Acquire the next available unit.
    OpenInstrument,
    /// Start streaming.
    EnableSampling {
        /// Milliseconds between streamed samples.
        sampling_interval: u32,
    },
    /// Stop streaming.
    DisableSampling,
    /// Assign a thermocouple type to a channel.
    ConfigureChannel {
        /// Channel index, 1-8 for thermocouples.
        channel: u8,
        /// Single-letter thermocouple code; empty disables the channel.
        #[serde(rename = "type")]
        channel_type: String,
    },
    /// Stop measuring on a channel.
    DisableChannel {
        /// Channel index.
        channel: u8,
    },
    /// Read every channel and reply with a snapshot.
    MeasureAllChannels,
}

impl Command {
    /// Parse a JSON envelope. Unknown extra fields are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedCommand(e.to_string()))
    }

    /// Name as it appears in the `command` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenInstrument => "open_instrument",
            Self::EnableSampling { .. } => "enable_sampling",
            Self::DisableSampling => "disable_sampling",
            Self::ConfigureChannel { .. } => "configure_channel",
            Self::DisableChannel { .. } => "disable_channel",
            Self::MeasureAllChannels => "measure_all_channels",
        }
    }
}

impl Serialize for MeasurementSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (channel, value) in self.readings() {
            map.serialize_entry(&format!("ch_{channel}"), value)?;
        }
        map.end()
    }
}

/// Encode a snapshot as a reply frame.
pub fn encode_snapshot(snapshot: &MeasurementSnapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceController, TemperatureUnit};
    use crate::driver::MockDriver;

    #[test]
    fn test_parse_every_command() {
        let cases = [
            (r#"{"command":"open_instrument"}"#, Command::OpenInstrument),
            (
                r#"{"command":"enable_sampling","sampling_interval":500}"#,
                Command::EnableSampling {
                    sampling_interval: 500,
                },
            ),
            (r#"{"command":"disable_sampling"}"#, Command::DisableSampling),
            (
                r#"{"command":"configure_channel","channel":1,"type":"K"}"#,
                Command::ConfigureChannel {
                    channel: 1,
                    channel_type: "K".to_string(),
                },
            ),
            (
                r#"{"command":"disable_channel","channel":8}"#,
                Command::DisableChannel { channel: 8 },
            ),
            (
                r#"{"command":"measure_all_channels"}"#,
                Command::MeasureAllChannels,
            ),
        ];

        for (text, expected) in cases {
            let command = Command::parse(text).unwrap();
            assert_eq!(command, expected);
            assert!(text.contains(command.name()));
        }
    }

    #[test]
    fn test_extra_fields_ignored() {
        let command = Command::parse(r#"{"command":"open_instrument","id":42}"#).unwrap();
        assert_eq!(command, Command::OpenInstrument);
    }

    #[test]
    fn test_malformed_envelopes() {
        let bad = [
            "not json",
            "{}",
            r#"{"command":"self_destruct"}"#,
            r#"{"command":"enable_sampling"}"#,
            r#"{"command":"enable_sampling","sampling_interval":-5}"#,
            r#"{"command":"configure_channel","channel":1}"#,
            r#"{"command":"configure_channel","type":"K"}"#,
            r#"{"command":"disable_channel","channel":"one"}"#,
            r#""open_instrument""#,
        ];

        for text in bad {
            let err = Command::parse(text).unwrap_err();
            assert!(
                matches!(err, RelayError::MalformedCommand(_)),
                "{text} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_reading_encodes_as_null() {
        let mut readings = [0.0; 9];
        readings[2] = f32::NAN;
        readings[3] = f32::INFINITY;
        let driver = MockDriver::new().with_readings(readings);
        let mut controller = DeviceController::new(driver, TemperatureUnit::Kelvin);
        controller.open().unwrap();

        let encoded = encode_snapshot(&controller.measure_all().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert!(value["ch_2"].is_null());
        assert!(value["ch_3"].is_null());
        assert_eq!(value["ch_1"], 0.0);
    }

    #[test]
    fn test_snapshot_encoding() {
        let mut readings = [0.0; 9];
        readings[1] = 21.5;
        let driver = MockDriver::new().with_readings(readings);
        let mut controller = DeviceController::new(driver, TemperatureUnit::Celsius);
        controller.open().unwrap();

        let encoded = encode_snapshot(&controller.measure_all().unwrap()).unwrap();
        assert_eq!(
            encoded,
            r#"{"ch_0":0.0,"ch_1":21.5,"ch_2":0.0,"ch_3":0.0,"ch_4":0.0,"ch_5":0.0,"ch_6":0.0,"ch_7":0.0,"ch_8":0.0}"#
        );
    }
}
