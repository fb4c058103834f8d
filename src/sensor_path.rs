//! Sensor addressing and sample data model.
//!
//! Mirrors the tagged-variant style the message codec uses: `Part` and
//! `Subpart` are closed enums rather than open strings so that a typo
//! in a path component is a compile error, not a runtime surprise.

use std::fmt;

/// The closed set of sensor part types the device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Ds18b20,
    Bme280,
    Tcs3200,
    Lsm303d,
    CustomNoise,
}

impl Part {
    fn as_str(self) -> &'static str {
        match self {
            Part::Ds18b20 => "ds18b20",
            Part::Bme280 => "bme280",
            Part::Tcs3200 => "tcs3200",
            Part::Lsm303d => "lsm303d",
            Part::CustomNoise => "custom-noise",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A part-specific instance identifier. DS18B20 uses its 64-bit one-wire
/// id rendered as hex; every other part uses a small integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instance {
    Index(u32),
    Hex(String),
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Index(i) => write!(f, "{i}"),
            Instance::Hex(h) => f.write_str(h),
        }
    }
}

/// Part-specific subpart discriminators. One variant per part that has
/// more than one value per sample; parts with a single quantity (DS18B20)
/// have no subpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subpart {
    Bme280(Bme280Subpart),
    Tcs3200(Tcs3200Subpart),
    Lsm303d(Lsm303dSubpart),
    Noise(NoiseSubpart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bme280Subpart {
    Temp,
    Pres,
    Hum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tcs3200Subpart {
    R,
    G,
    B,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lsm303dSubpart {
    AccelX,
    AccelY,
    AccelZ,
    CompassX,
    CompassY,
    CompassZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseSubpart {
    Rms,
    Min,
    Max,
}

impl Subpart {
    fn as_str(self) -> &'static str {
        match self {
            Subpart::Bme280(Bme280Subpart::Temp) => "temp",
            Subpart::Bme280(Bme280Subpart::Pres) => "pres",
            Subpart::Bme280(Bme280Subpart::Hum) => "hum",
            Subpart::Tcs3200(Tcs3200Subpart::R) => "r",
            Subpart::Tcs3200(Tcs3200Subpart::G) => "g",
            Subpart::Tcs3200(Tcs3200Subpart::B) => "b",
            Subpart::Tcs3200(Tcs3200Subpart::C) => "c",
            Subpart::Lsm303d(Lsm303dSubpart::AccelX) => "accel-x",
            Subpart::Lsm303d(Lsm303dSubpart::AccelY) => "accel-y",
            Subpart::Lsm303d(Lsm303dSubpart::AccelZ) => "accel-z",
            Subpart::Lsm303d(Lsm303dSubpart::CompassX) => "compass-x",
            Subpart::Lsm303d(Lsm303dSubpart::CompassY) => "compass-y",
            Subpart::Lsm303d(Lsm303dSubpart::CompassZ) => "compass-z",
            Subpart::Noise(NoiseSubpart::Rms) => "rms",
            Subpart::Noise(NoiseSubpart::Min) => "min",
            Subpart::Noise(NoiseSubpart::Max) => "max",
        }
    }
}

impl fmt::Display for Subpart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(part, instance, subpart?)`. Canonical string form is
/// `part/instance[/subpart]`; two paths are equal iff all three fields
/// match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorPath {
    pub part: Part,
    pub instance: Instance,
    pub subpart: Option<Subpart>,
}

impl SensorPath {
    pub fn new(part: Part, instance: Instance, subpart: Option<Subpart>) -> Self {
        Self { part, instance, subpart }
    }

    /// The path with `subpart` removed, used as a batching key.
    pub fn bare(&self) -> BarePath {
        BarePath { part: self.part, instance: self.instance.clone() }
    }

    /// Filesystem-safe directory component for this path, used by
    /// [`crate::buffer::StreamBuffer`]. Percent-encodes everything but
    /// ASCII alphanumerics, `-`, `_`, and `.`.
    pub fn escaped(&self) -> String {
        percent_encode(&self.to_string())
    }
}

impl fmt::Display for SensorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.part, self.instance)?;
        if let Some(subpart) = self.subpart {
            write!(f, "/{subpart}")?;
        }
        Ok(())
    }
}

/// [`SensorPath`] with the subpart removed; the batching key for
/// [`SampleBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarePath {
    pub part: Part,
    pub instance: Instance,
}

impl fmt::Display for BarePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.part, self.instance)
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Microsecond-resolution UTC instant. A plain integer offset from the
/// Unix epoch is used rather than pulling in a calendar library, since
/// every computation downstream of the RTCifier is pure arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtcInstant {
    micros_since_epoch: i64,
}

impl RtcInstant {
    pub fn from_epoch_seconds(seconds: u32) -> Self {
        Self { micros_since_epoch: seconds as i64 * 1_000_000 }
    }

    pub fn from_micros(micros_since_epoch: i64) -> Self {
        Self { micros_since_epoch }
    }

    pub fn micros_since_epoch(self) -> i64 {
        self.micros_since_epoch
    }

    pub fn add_millis(self, millis: i64) -> Self {
        Self { micros_since_epoch: self.micros_since_epoch + millis * 1_000 }
    }

    pub fn add_micros(self, micros: i64) -> Self {
        Self { micros_since_epoch: self.micros_since_epoch + micros }
    }

    /// Wall-clock seconds elapsed between `self` and `other`, signed.
    pub fn diff_seconds(self, other: RtcInstant) -> f64 {
        (self.micros_since_epoch - other.micros_since_epoch) as f64 / 1_000_000.0
    }
}

/// Either a raw device tick (before timeline absolutisation and RTC
/// mapping) or a wall-clock instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    RawTick(u16),
    Rtc(RtcInstant),
}

/// `(timestamp, path, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub path: SensorPath,
    pub value: f64,
}

/// A group of samples sharing `(timestamp, bare_path)`. Every subpart
/// key differs; the timestamp is identical across all contained samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub timestamp: RtcInstant,
    pub bare_path: BarePath,
    pub samples: Vec<(Option<Subpart>, f64)>,
}

impl SampleBatch {
    pub fn value_of(&self, subpart: Option<Subpart>) -> Option<f64> {
        self.samples.iter().find(|(s, _)| *s == subpart).map(|(_, v)| *v)
    }
}

/// Groups RTC-mapped samples into [`SampleBatch`]es keyed by
/// `(timestamp, bare_path)`, preserving first-seen order.
pub fn batch_samples(samples: Vec<(RtcInstant, SensorPath, f64)>) -> Vec<SampleBatch> {
    let mut order: Vec<(RtcInstant, BarePath)> = Vec::new();
    let mut batches: std::collections::HashMap<(RtcInstant, BarePath), Vec<(Option<Subpart>, f64)>> =
        std::collections::HashMap::new();

    for (timestamp, path, value) in samples {
        let bare = path.bare();
        let key = (timestamp, bare.clone());
        if !batches.contains_key(&key) {
            order.push(key.clone());
        }
        batches.entry(key).or_default().push((path.subpart, value));
    }

    order
        .into_iter()
        .map(|(timestamp, bare_path)| SampleBatch {
            timestamp,
            samples: batches.remove(&(timestamp, bare_path.clone())).unwrap_or_default(),
            bare_path,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_subpart() {
        let path = SensorPath::new(
            Part::Bme280,
            Instance::Index(1),
            Some(Subpart::Bme280(Bme280Subpart::Temp)),
        );
        assert_eq!(path.to_string(), "bme280/1/temp");
    }

    #[test]
    fn display_without_subpart() {
        let path = SensorPath::new(Part::Ds18b20, Instance::Hex("28ff641".into()), None);
        assert_eq!(path.to_string(), "ds18b20/28ff641");
    }

    #[test]
    fn bare_drops_subpart() {
        let path = SensorPath::new(
            Part::Lsm303d,
            Instance::Index(0),
            Some(Subpart::Lsm303d(Lsm303dSubpart::AccelX)),
        );
        assert_eq!(path.bare().to_string(), "lsm303d/0");
    }

    #[test]
    fn escaped_path_is_filesystem_safe() {
        let path = SensorPath::new(Part::Ds18b20, Instance::Hex("28/ff".into()), None);
        assert!(!path.escaped().contains('/'));
    }

    #[test]
    fn batch_groups_by_timestamp_and_bare_path() {
        let t0 = RtcInstant::from_epoch_seconds(1000);
        let samples = vec![
            (
                t0,
                SensorPath::new(Part::Bme280, Instance::Index(0), Some(Subpart::Bme280(Bme280Subpart::Temp))),
                21.5,
            ),
            (
                t0,
                SensorPath::new(Part::Bme280, Instance::Index(0), Some(Subpart::Bme280(Bme280Subpart::Hum))),
                55.0,
            ),
        ];
        let batches = batch_samples(samples);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].samples.len(), 2);
    }
}
