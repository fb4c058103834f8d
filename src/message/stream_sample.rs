//! SENSOR_STREAM_*: the six LSM303D axis streams (accelerometer and
//! compass, x/y/z each), delta+bitmap compressed per
//! [`crate::codec::stream_codec`].

use crate::codec::stream_codec;
use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::{Instance, Lsm303dSubpart, Part, SensorPath, Subpart};

/// Which of the six LSM303D channels a stream message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAxis {
    AccelX,
    AccelY,
    AccelZ,
    CompassX,
    CompassY,
    CompassZ,
}

impl StreamAxis {
    pub fn subpart(self) -> Lsm303dSubpart {
        match self {
            StreamAxis::AccelX => Lsm303dSubpart::AccelX,
            StreamAxis::AccelY => Lsm303dSubpart::AccelY,
            StreamAxis::AccelZ => Lsm303dSubpart::AccelZ,
            StreamAxis::CompassX => Lsm303dSubpart::CompassX,
            StreamAxis::CompassY => Lsm303dSubpart::CompassY,
            StreamAxis::CompassZ => Lsm303dSubpart::CompassZ,
        }
    }

    pub fn path(self) -> SensorPath {
        SensorPath::new(Part::Lsm303d, Instance::Index(0), Some(Subpart::Lsm303d(self.subpart())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSampleMessage {
    pub axis: StreamAxis,
    pub seq: u16,
    pub values: Vec<i16>,
}

impl StreamSampleMessage {
    pub fn decode(axis: StreamAxis, buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let seq = r.u16()?;
        let reference = r.i16()?;
        let values = stream_codec::decode(reference, r.remaining())?;
        Ok(Self { axis, seq, values })
    }

    pub fn path(&self) -> SensorPath {
        self.axis.path()
    }
}
