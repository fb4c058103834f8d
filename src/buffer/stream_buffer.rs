//! Per-path on-disk ring buffer that accumulates stream samples into
//! fixed-size blocks and survives a process restart mid-batch.
//!
//! Modelled on `bass-aes67`'s socket/receive-loop style of owning a
//! single resource (there: a UDP socket; here: one file) and reacting
//! to its state synchronously within the caller's turn.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::StreamIoError;
use crate::sensor_path::{RtcInstant, SensorPath};
use crate::timeline::Timeline;

const HEADER_VERSION: u8 = 0x00;
const SAMPLE_TYPE_I16: u8 = 0x01;
const HEADER_LEN: usize = 1 + 8 + 4 + 8 + 1;
const SEQ_WRAPAROUND: u32 = 1 << 16;

/// One durably-accepted-or-not emission from a [`StreamBuffer`]. The
/// backing file has already been removed by the time this is produced;
/// `close()` exists so `StreamBuffer` satisfies the same handle
/// convention as [`crate::sink::StreamSink`] — calling it is optional.
pub struct BlockHandle;

impl BlockHandle {
    pub fn close(self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamBlock {
    pub path: SensorPath,
    pub t0: RtcInstant,
    pub seq0: i64,
    pub period_micros: u64,
    pub samples: Vec<i16>,
}

struct Anchor {
    seq_abs: i64,
    rtc: RtcInstant,
}

pub struct StreamBuffer {
    path: SensorPath,
    file_path: PathBuf,
    batch_size: usize,
    timeline: Timeline,
    period_micros: Option<u64>,
    alignment_t0: Option<RtcInstant>,
    anchors: VecDeque<Anchor>,
    batch_seq_abs0: Option<i64>,
    batch_data: Vec<i16>,
    on_emit: Box<dyn FnMut(StreamBlock, BlockHandle) + Send>,
}

impl StreamBuffer {
    /// `datadir` is the shared root; this path's own directory is
    /// created under it if absent. Any pre-existing `current` file is
    /// replayed through `on_emit` once and then removed.
    pub fn new(
        datadir: &Path,
        path: SensorPath,
        batch_size: usize,
        slack: u32,
        mut on_emit: Box<dyn FnMut(StreamBlock, BlockHandle) + Send>,
    ) -> Result<Self, StreamIoError> {
        let dir = datadir.join(path.escaped());
        fs::create_dir_all(&dir).map_err(|source| StreamIoError {
            path: dir.display().to_string(),
            source,
        })?;
        let file_path = dir.join("current");

        if let Ok(bytes) = fs::read(&file_path) {
            if let Some((header, samples)) = parse_file(&bytes) {
                on_emit(
                    StreamBlock {
                        path: path.clone(),
                        t0: header.t0,
                        seq0: 0,
                        period_micros: header.period_micros,
                        samples,
                    },
                    BlockHandle,
                );
            }
            let _ = fs::remove_file(&file_path);
        }

        Ok(Self {
            path,
            file_path,
            batch_size,
            timeline: Timeline::new(SEQ_WRAPAROUND, slack),
            period_micros: None,
            alignment_t0: None,
            anchors: VecDeque::new(),
            batch_seq_abs0: None,
            batch_data: Vec::new(),
            on_emit,
        })
    }

    /// Reconfigure the raw-sequence-to-RTC mapping from a fresh STATUS
    /// anchor point.
    pub fn align(&mut self, seq_rel: u16, rtc: RtcInstant, period_micros: u64) -> Result<(), StreamIoError> {
        if self.period_micros != Some(period_micros) {
            if self.batch_seq_abs0.is_some() {
                self.emit_full_batch()?;
            }
            self.anchors.clear();
            self.period_micros = Some(period_micros);
        }

        let offset = self.timeline.feed_and_transform(seq_rel as u32);
        self.timeline.reset(seq_rel as u32);

        for anchor in self.anchors.iter_mut() {
            anchor.seq_abs -= offset;
        }
        self.anchors.push_back(Anchor { seq_abs: 0, rtc });
        while self.anchors.len() > 3 {
            self.anchors.pop_front();
        }

        let period = self.period_micros.unwrap_or(0) as i64;
        let sum: i64 = self
            .anchors
            .iter()
            .map(|a| a.rtc.micros_since_epoch() - a.seq_abs * period - rtc.micros_since_epoch())
            .sum();
        let mean_offset = sum / self.anchors.len() as i64;
        self.alignment_t0 = Some(rtc.add_micros(mean_offset));

        if let Some(abs0) = self.batch_seq_abs0.as_mut() {
            *abs0 -= offset;
        }

        self.persist()
    }

    /// Feed a run of decoded samples starting at raw sequence
    /// `first_seq_rel`. Emits as many full blocks as the resulting
    /// buffer contents allow.
    pub fn submit(&mut self, first_seq_rel: u16, samples: &[i16]) -> Result<(), StreamIoError> {
        let first_seq_abs = self.timeline.feed_and_transform(first_seq_rel as u32);

        match self.batch_seq_abs0 {
            None => self.batch_seq_abs0 = Some(first_seq_abs),
            Some(abs0) if first_seq_abs != abs0 + self.batch_data.len() as i64 => {
                self.emit_full_batch()?;
                self.batch_seq_abs0 = Some(first_seq_abs);
            }
            _ => {}
        }

        self.batch_data.extend_from_slice(samples);
        self.persist()?;

        while self.batch_data.len() >= self.batch_size {
            self.emit_one_block()?;
        }

        Ok(())
    }

    fn emit_one_block(&mut self) -> Result<(), StreamIoError> {
        let seq0 = self.batch_seq_abs0.expect("block emission requires an open batch");
        let block_samples: Vec<i16> = self.batch_data.drain(..self.batch_size).collect();
        let t0 = self.block_t0(seq0);
        let period_micros = self.period_micros.unwrap_or(0);

        let _ = fs::remove_file(&self.file_path);
        self.batch_seq_abs0 = Some(seq0 + self.batch_size as i64);

        (self.on_emit)(
            StreamBlock { path: self.path.clone(), t0, seq0, period_micros, samples: block_samples },
            BlockHandle,
        );

        if self.batch_data.is_empty() {
            Ok(())
        } else {
            self.persist()
        }
    }

    /// Flush whatever partial batch is open as a short block, used when
    /// realignment invalidates the current sequence mapping.
    fn emit_full_batch(&mut self) -> Result<(), StreamIoError> {
        if self.batch_data.is_empty() {
            self.batch_seq_abs0 = None;
            return Ok(());
        }
        let seq0 = self.batch_seq_abs0.expect("non-empty batch implies an open seq0");
        let t0 = self.block_t0(seq0);
        let period_micros = self.period_micros.unwrap_or(0);
        let samples = std::mem::take(&mut self.batch_data);

        let _ = fs::remove_file(&self.file_path);
        self.batch_seq_abs0 = None;

        (self.on_emit)(
            StreamBlock { path: self.path.clone(), t0, seq0, period_micros, samples },
            BlockHandle,
        );

        Ok(())
    }

    fn block_t0(&self, seq_abs0: i64) -> RtcInstant {
        let base = self.alignment_t0.unwrap_or(RtcInstant::from_epoch_seconds(0));
        base.add_micros(seq_abs0 * self.period_micros.unwrap_or(0) as i64)
    }

    fn persist(&self) -> Result<(), StreamIoError> {
        if self.batch_data.is_empty() {
            return Ok(());
        }
        let seq0 = self.batch_seq_abs0.unwrap_or(0);
        let t0 = self.block_t0(seq0);
        let bytes = serialize_file(t0, self.period_micros.unwrap_or(0), &self.batch_data);
        write_atomic(&self.file_path, &bytes)
            .map_err(|source| StreamIoError { path: self.file_path.display().to_string(), source })
    }
}

struct Header {
    t0: RtcInstant,
    period_micros: u64,
}

fn parse_file(bytes: &[u8]) -> Option<(Header, Vec<i16>)> {
    if bytes.len() < HEADER_LEN || bytes[0] != HEADER_VERSION {
        return None;
    }
    let sample_type = bytes[HEADER_LEN - 1];
    if sample_type != SAMPLE_TYPE_I16 {
        return None;
    }

    let t0_seconds = u64::from_le_bytes(bytes[1..9].try_into().ok()?);
    let t0_micros = u32::from_le_bytes(bytes[9..13].try_into().ok()?);
    let period_micros = u64::from_le_bytes(bytes[13..21].try_into().ok()?);

    let payload = &bytes[HEADER_LEN..];
    if payload.len() % 2 != 0 {
        return None;
    }
    let samples = payload
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();

    let t0 = RtcInstant::from_epoch_seconds(t0_seconds as u32).add_micros(t0_micros as i64);
    Some((Header { t0, period_micros }, samples))
}

fn serialize_file(t0: RtcInstant, period_micros: u64, samples: &[i16]) -> Vec<u8> {
    let micros = t0.micros_since_epoch();
    let t0_seconds = (micros.div_euclid(1_000_000)) as u64;
    let t0_micros = (micros.rem_euclid(1_000_000)) as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * 2);
    out.push(HEADER_VERSION);
    out.extend_from_slice(&t0_seconds.to_le_bytes());
    out.extend_from_slice(&t0_micros.to_le_bytes());
    out.extend_from_slice(&period_micros.to_le_bytes());
    out.push(SAMPLE_TYPE_I16);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_path::{Instance, Lsm303dSubpart, Part, Subpart};
    use std::sync::{Arc, Mutex};

    fn test_path() -> SensorPath {
        SensorPath::new(Part::Lsm303d, Instance::Index(0), Some(Subpart::Lsm303d(Lsm303dSubpart::AccelX)))
    }

    #[test]
    fn submit_emits_exact_size_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let emitted_clone = emitted.clone();

        let mut buf = StreamBuffer::new(
            dir.path(),
            test_path(),
            4,
            1000,
            Box::new(move |block, handle| {
                emitted_clone.lock().unwrap().push(block);
                handle.close();
            }),
        )
        .unwrap();

        buf.align(0, RtcInstant::from_epoch_seconds(1_700_000_000), 10_000).unwrap();
        buf.submit(0, &[1, 2, 3]).unwrap();
        assert!(emitted.lock().unwrap().is_empty());
        buf.submit(3, &[4, 5]).unwrap();

        let blocks = emitted.lock().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples, vec![1, 2, 3, 4]);
        assert_eq!(blocks[0].seq0, 0);
    }

    #[test]
    fn gap_in_sequence_flushes_short_batch() {
        let dir = tempfile::tempdir().unwrap();
        let emitted = Arc::new(Mutex::new(Vec::new()));
        let emitted_clone = emitted.clone();

        let mut buf = StreamBuffer::new(
            dir.path(),
            test_path(),
            10,
            1000,
            Box::new(move |block, _| emitted_clone.lock().unwrap().push(block)),
        )
        .unwrap();

        buf.align(0, RtcInstant::from_epoch_seconds(0), 1_000).unwrap();
        buf.submit(0, &[1, 2]).unwrap();
        buf.submit(10, &[9, 9]).unwrap(); // gap: first_seq_abs != 0 + 2

        let blocks = emitted.lock().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples, vec![1, 2]);
    }

    #[test]
    fn restart_replays_and_removes_current_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut buf = StreamBuffer::new(dir.path(), test_path(), 100, 1000, Box::new(|_, _| {})).unwrap();
            buf.align(0, RtcInstant::from_epoch_seconds(1_700_000_000), 1_000).unwrap();
            buf.submit(0, &[1, 2, 3]).unwrap();
        }

        let file_path = dir.path().join(test_path().escaped()).join("current");
        assert!(file_path.exists());

        let emitted = Arc::new(Mutex::new(Vec::new()));
        let emitted_clone = emitted.clone();
        let _buf = StreamBuffer::new(
            dir.path(),
            test_path(),
            100,
            1000,
            Box::new(move |block, _| emitted_clone.lock().unwrap().push(block)),
        )
        .unwrap();

        assert_eq!(emitted.lock().unwrap().len(), 1);
        assert_eq!(emitted.lock().unwrap()[0].samples, vec![1, 2, 3]);
        assert!(!file_path.exists());
    }

    #[test]
    fn corrupt_file_is_discarded_without_emitting() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_path();
        let stream_dir = dir.path().join(path.escaped());
        fs::create_dir_all(&stream_dir).unwrap();
        fs::write(stream_dir.join("current"), [0xFF, 0x01, 0x02]).unwrap();

        let emitted = Arc::new(Mutex::new(Vec::new()));
        let emitted_clone = emitted.clone();
        let _buf =
            StreamBuffer::new(dir.path(), path, 100, 1000, Box::new(move |b, _| emitted_clone.lock().unwrap().push(b)))
                .unwrap();

        assert!(emitted.lock().unwrap().is_empty());
        assert!(!stream_dir.join("current").exists());
    }
}
