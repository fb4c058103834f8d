//! SENSOR_LIGHT: TCS3200 colour sensor readings.

use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::{Instance, Part, SensorPath, Subpart, Tcs3200Subpart, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightReading {
    pub ts: u16,
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub clear: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightMessage {
    pub readings: Vec<LightReading>,
}

impl LightMessage {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let mut readings = Vec::new();
        while !r.is_empty() {
            readings.push(LightReading {
                ts: r.u16()?,
                r: r.u16()?,
                g: r.u16()?,
                b: r.u16()?,
                clear: r.u16()?,
            });
        }
        Ok(Self { readings })
    }

    pub fn samples(&self) -> Vec<(Timestamp, SensorPath, f64)> {
        let mut out = Vec::with_capacity(self.readings.len() * 4);
        for reading in &self.readings {
            let ts = Timestamp::RawTick(reading.ts);
            out.push((ts, path(Tcs3200Subpart::R), reading.r as f64));
            out.push((ts, path(Tcs3200Subpart::G), reading.g as f64));
            out.push((ts, path(Tcs3200Subpart::B), reading.b as f64));
            out.push((ts, path(Tcs3200Subpart::C), reading.clear as f64));
        }
        out
    }
}

fn path(subpart: Tcs3200Subpart) -> SensorPath {
    SensorPath::new(Part::Tcs3200, Instance::Index(0), Some(Subpart::Tcs3200(subpart)))
}
