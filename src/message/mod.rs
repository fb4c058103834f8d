//! Application-layer telemetry message decoding.
//!
//! First byte of a datagram selects a [`MsgType`]; the remainder is
//! handed to that type's decoder. Mirrors `sn2daemon/protocol.py`'s
//! `decode_message` dispatch, with each Python message class becoming
//! its own module here.

pub mod bme280;
pub mod ds18b20;
pub mod light;
pub mod noise;
mod reader;
pub mod status;
pub mod stream_sample;

use crate::codec::bme280::Bme280Compensator;
use crate::error::DecodeError;
use crate::sensor_path::{SensorPath, Timestamp};

/// Tag byte identifying a telemetry message's decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Status,
    SensorDs18b20,
    SensorLight,
    SensorNoise,
    SensorBme280,
    SensorStreamAccelX,
    SensorStreamAccelY,
    SensorStreamAccelZ,
    SensorStreamCompassX,
    SensorStreamCompassY,
    SensorStreamCompassZ,
}

impl MsgType {
    fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => Self::Status,
            0x02 => Self::SensorDs18b20,
            0x03 => Self::SensorLight,
            0x04 => Self::SensorNoise,
            0x05 => Self::SensorBme280,
            0x10 => Self::SensorStreamAccelX,
            0x11 => Self::SensorStreamAccelY,
            0x12 => Self::SensorStreamAccelZ,
            0x13 => Self::SensorStreamCompassX,
            0x14 => Self::SensorStreamCompassY,
            0x15 => Self::SensorStreamCompassZ,
            _ => return None,
        })
    }
}

/// A decoded telemetry message, tagged by its [`MsgType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Status(status::StatusMessage),
    Ds18b20(ds18b20::Ds18b20Message),
    Noise(noise::NoiseMessage),
    Light(light::LightMessage),
    Bme280(bme280::Bme280Message),
    Stream(stream_sample::StreamSampleMessage),
}

impl Message {
    /// Samples this message carries directly, in raw device-tick form.
    /// Stream messages carry none here; see [`Message::as_stream`].
    pub fn get_samples(&self) -> Vec<(Timestamp, SensorPath, f64)> {
        match self {
            Message::Status(_) => Vec::new(),
            Message::Ds18b20(m) => m.samples(),
            Message::Noise(m) => m.samples(),
            Message::Light(m) => m.samples(),
            Message::Bme280(m) => m.samples(),
            Message::Stream(_) => Vec::new(),
        }
    }

    pub fn as_status(&self) -> Option<&status::StatusMessage> {
        match self {
            Message::Status(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&stream_sample::StreamSampleMessage> {
        match self {
            Message::Stream(m) => Some(m),
            _ => None,
        }
    }
}

/// Decode one datagram. `compensator` is only consulted for
/// `SENSOR_BME280` frames.
pub fn decode_message(
    buf: &[u8],
    compensator: &dyn Bme280Compensator,
) -> Result<Message, DecodeError> {
    let tag = *buf.first().ok_or(DecodeError::Truncated { need: 1, have: 0 })?;
    let body = &buf[1..];
    let msg_type = MsgType::from_tag(tag).ok_or(DecodeError::UnknownMsgType { tag })?;

    use stream_sample::{StreamAxis, StreamSampleMessage};

    Ok(match msg_type {
        MsgType::Status => Message::Status(status::StatusMessage::decode(body)?),
        MsgType::SensorDs18b20 => Message::Ds18b20(ds18b20::Ds18b20Message::decode(body)?),
        MsgType::SensorLight => Message::Light(light::LightMessage::decode(body)?),
        MsgType::SensorNoise => Message::Noise(noise::NoiseMessage::decode(body)?),
        MsgType::SensorBme280 => {
            Message::Bme280(bme280::Bme280Message::decode(body, compensator)?)
        }
        MsgType::SensorStreamAccelX => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::AccelX, body)?)
        }
        MsgType::SensorStreamAccelY => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::AccelY, body)?)
        }
        MsgType::SensorStreamAccelZ => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::AccelZ, body)?)
        }
        MsgType::SensorStreamCompassX => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::CompassX, body)?)
        }
        MsgType::SensorStreamCompassY => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::CompassY, body)?)
        }
        MsgType::SensorStreamCompassZ => {
            Message::Stream(StreamSampleMessage::decode(StreamAxis::CompassZ, body)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bme280::BoschCompensator;

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode_message(&[0xEE], &BoschCompensator).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownMsgType { tag: 0xEE }));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let err = decode_message(&[], &BoschCompensator).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn dispatches_ds18b20() {
        let mut buf = vec![0x02u8];
        buf.extend_from_slice(&0u16.to_le_bytes());
        let msg = decode_message(&buf, &BoschCompensator).unwrap();
        assert!(matches!(msg, Message::Ds18b20(_)));
    }
}
