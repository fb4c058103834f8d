//! Ingest and time-alignment core for a wireless sensor node telemetry
//! daemon: message decoding, RTC alignment, stream buffering, and
//! sink dispatch. `main.rs` wires these modules around a UDP socket;
//! everything here is runtime-agnostic aside from `control` and
//! `sink`'s `async fn` boundaries.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod ingestor;
pub mod message;
pub mod rewrite;
pub mod rtcifier;
pub mod sensor_path;
pub mod sink;
pub mod timeline;
