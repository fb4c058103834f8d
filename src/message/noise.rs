//! SENSOR_NOISE: microphone RMS/min/max envelope samples.

use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::{Instance, NoiseSubpart, Part, SensorPath, Subpart, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseReading {
    pub ts: u16,
    pub sqavg: u32,
    pub min: i16,
    pub max: i16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoiseMessage {
    pub factor: u8,
    pub readings: Vec<NoiseReading>,
}

impl NoiseMessage {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let factor = r.u8()?;

        let mut readings = Vec::new();
        while !r.is_empty() {
            readings.push(NoiseReading {
                ts: r.u16()?,
                sqavg: r.u32()?,
                min: r.i16()?,
                max: r.i16()?,
            });
        }

        Ok(Self { factor, readings })
    }

    pub fn samples(&self) -> Vec<(Timestamp, SensorPath, f64)> {
        let mut out = Vec::with_capacity(self.readings.len() * 3);
        for reading in &self.readings {
            let ts = Timestamp::RawTick(reading.ts);
            out.push((ts, path(NoiseSubpart::Rms), rms(reading.sqavg, self.factor)));
            out.push((ts, path(NoiseSubpart::Min), reading.min as f64 / (i16::MAX as f64)));
            out.push((ts, path(NoiseSubpart::Max), reading.max as f64 / (i16::MAX as f64)));
        }
        out
    }
}

fn path(subpart: NoiseSubpart) -> SensorPath {
    SensorPath::new(Part::CustomNoise, Instance::Index(0), Some(Subpart::Noise(subpart)))
}

/// `20 * log10(sqrt(sqavg / (2^24 - 1) / factor))` dB, or `-96` when the
/// argument to `log10` is non-positive (silence, or a zero `factor`).
fn rms(sqavg: u32, factor: u8) -> f64 {
    let normalized = sqavg as f64 / (((1u32 << 24) - 1) as f64) / factor as f64;
    let amplitude = normalized.sqrt();
    let db = 20.0 * amplitude.log10();
    if db.is_finite() {
        db
    } else {
        -96.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_one_reading_into_three_samples() {
        let mut buf = vec![4u8]; // factor
        buf.extend_from_slice(&10u16.to_le_bytes());
        buf.extend_from_slice(&1_000_000u32.to_le_bytes());
        buf.extend_from_slice(&(-100i16).to_le_bytes());
        buf.extend_from_slice(&200i16.to_le_bytes());

        let msg = NoiseMessage::decode(&buf).unwrap();
        let samples = msg.samples();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].1.to_string(), "custom-noise/0/rms");
        assert_eq!(samples[1].1.to_string(), "custom-noise/0/min");
        assert_eq!(samples[2].1.to_string(), "custom-noise/0/max");
    }

    #[test]
    fn silence_clamps_to_floor() {
        assert_eq!(rms(0, 4), -96.0);
    }

    #[test]
    fn zero_factor_clamps_to_floor() {
        assert_eq!(rms(1000, 0), -96.0);
    }
}
