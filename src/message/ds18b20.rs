//! DS18B20 one-wire temperature probe readings.

use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::{Instance, Part, SensorPath, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Ds18b20Reading {
    pub id: [u8; 8],
    /// Degrees Celsius; the wire value is fixed-point, 16 units per degree.
    pub temp_c: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ds18b20Message {
    pub timestamp: u16,
    pub readings: Vec<Ds18b20Reading>,
}

impl Ds18b20Message {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let timestamp = r.u16()?;

        let mut readings = Vec::new();
        while !r.is_empty() {
            let id = r.array8()?;
            let raw = r.i16()?;
            readings.push(Ds18b20Reading { id, temp_c: raw as f64 / 16.0 });
        }

        Ok(Self { timestamp, readings })
    }

    pub fn samples(&self) -> Vec<(Timestamp, SensorPath, f64)> {
        self.readings
            .iter()
            .map(|reading| {
                let path = SensorPath::new(Part::Ds18b20, Instance::Hex(hex_id(&reading.id)), None);
                (Timestamp::RawTick(self.timestamp), path, reading.temp_c)
            })
            .collect()
    }
}

fn hex_id(id: &[u8; 8]) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}
