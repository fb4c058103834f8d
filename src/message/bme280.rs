//! SENSOR_BME280: one compensated temperature/pressure/humidity readout.

use crate::codec::bme280::{Bme280Compensator, Calibration, RawReadout};
use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::{Bme280Subpart, Instance, Part, SensorPath, Subpart, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Bme280Message {
    pub ts: u16,
    pub instance: u8,
    pub temp_c: f64,
    pub pressure_pa: f64,
    pub humidity_pct: f64,
}

impl Bme280Message {
    pub fn decode(buf: &[u8], compensator: &dyn Bme280Compensator) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let ts = r.u16()?;
        let instance = r.u8()?;

        let dig88: [u8; 26] = r.bytes(26)?.try_into().expect("bounds checked above");
        let dige1: [u8; 7] = r.bytes(7)?.try_into().expect("bounds checked above");
        let readout: [u8; 8] = r.bytes(8)?.try_into().expect("bounds checked above");
        r.expect_exhausted()?;

        let calibration = Calibration::parse(&dig88, &dige1);
        let raw = RawReadout::parse(&readout);
        let (temp_c, pressure_pa, humidity_pct) = compensator.compensate(&calibration, &raw);

        Ok(Self { ts, instance, temp_c, pressure_pa, humidity_pct })
    }

    pub fn samples(&self) -> Vec<(Timestamp, SensorPath, f64)> {
        let ts = Timestamp::RawTick(self.ts);
        let instance = Instance::Index(self.instance as u32);
        vec![
            (ts, self.path(instance.clone(), Bme280Subpart::Temp), self.temp_c),
            (ts, self.path(instance.clone(), Bme280Subpart::Pres), self.pressure_pa),
            (ts, self.path(instance, Bme280Subpart::Hum), self.humidity_pct),
        ]
    }

    fn path(&self, instance: Instance, subpart: Bme280Subpart) -> SensorPath {
        SensorPath::new(Part::Bme280, instance, Some(Subpart::Bme280(subpart)))
    }
}
