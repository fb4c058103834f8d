//! Wire-level codecs: the delta+bitmap stream compressor and the
//! BME280 compensation formulas, both lifted from the device firmware's
//! companion host-side implementations.

pub mod bme280;
pub mod stream_codec;
