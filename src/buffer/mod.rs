//! Restart-safe on-disk batching of stream samples into fixed-size blocks.

pub mod stream_buffer;

pub use stream_buffer::{BlockHandle, StreamBlock, StreamBuffer};
