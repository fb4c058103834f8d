//! Orchestrates decoded messages: RTC/stream alignment on STATUS,
//! sample flattening and dispatch for sample-bearing messages, and
//! StreamBuffer submission for stream messages.
//!
//! `PRE_STATUS`/`STEADY` gating and the replay-on-first-good-STATUS
//! behaviour are this module's own state machine; everything it calls
//! into (Timeline, RTCifier, StreamBuffer, Sink) is single-owned, so no
//! locking is needed here either — consistent with the single-threaded
//! reactor the rest of the crate assumes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::buffer::StreamBuffer;
use crate::codec::bme280::Bme280Compensator;
use crate::error::IngestError;
use crate::message::stream_sample::StreamAxis;
use crate::message::status::StatusMessage;
use crate::message::{decode_message, Message};
use crate::rewrite::{BatchRewriter, SampleRewriter};
use crate::rtcifier::RTCifier;
use crate::sensor_path::{batch_samples, RtcInstant, Sample, SampleBatch, SensorPath, Timestamp};
use crate::sink::Sink;

/// Messages whose RTC is further than this from wall clock at the time
/// of the first STATUS are discarded rather than used to leave
/// `PRE_STATUS`.
const STATUS_WINDOW_SECS: f64 = 60.0;

const ALL_STREAM_AXES: [StreamAxis; 6] = [
    StreamAxis::AccelX,
    StreamAxis::AccelY,
    StreamAxis::AccelZ,
    StreamAxis::CompassX,
    StreamAxis::CompassY,
    StreamAxis::CompassZ,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestorState {
    PreStatus,
    Steady,
}

pub struct Ingestor {
    rtcifier: RTCifier,
    stream_buffers: HashMap<SensorPath, StreamBuffer>,
    sample_rewriter: Box<dyn SampleRewriter>,
    batch_rewriter: Box<dyn BatchRewriter>,
    sinks: Vec<Arc<dyn Sink>>,
    compensator: Box<dyn Bme280Compensator + Send + Sync>,
    state: IngestorState,
    pending: Vec<Message>,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rtcifier: RTCifier,
        datadir: &Path,
        batch_size: usize,
        seq_slack: u32,
        sample_rewriter: Box<dyn SampleRewriter>,
        batch_rewriter: Box<dyn BatchRewriter>,
        sinks: Vec<Arc<dyn Sink>>,
        compensator: Box<dyn Bme280Compensator + Send + Sync>,
        stream_emit: impl Fn(crate::buffer::StreamBlock, crate::buffer::BlockHandle) + Send + Clone + 'static,
    ) -> Result<Self, IngestError> {
        let mut stream_buffers = HashMap::new();
        for axis in ALL_STREAM_AXES {
            let path = axis.path();
            let emit = stream_emit.clone();
            let buffer = StreamBuffer::new(
                datadir,
                path.clone(),
                batch_size,
                seq_slack,
                Box::new(move |block, handle| emit(block, handle)),
            )?;
            stream_buffers.insert(path, buffer);
        }

        Ok(Self {
            rtcifier,
            stream_buffers,
            sample_rewriter,
            batch_rewriter,
            sinks,
            compensator,
            state: IngestorState::PreStatus,
            pending: Vec::new(),
        })
    }

    /// Decode and process one datagram.
    pub fn handle_datagram(&mut self, buf: &[u8]) -> Result<(), IngestError> {
        match decode_message(buf, self.compensator.as_ref()) {
            Ok(message) => self.handle_message(message),
            Err(err) => {
                log::warn!("dropping undecodable datagram: {err}");
                Ok(())
            }
        }
    }

    pub fn handle_message(&mut self, message: Message) -> Result<(), IngestError> {
        match self.state {
            IngestorState::PreStatus => self.handle_pre_status(message),
            IngestorState::Steady => self.process(message),
        }
    }

    fn handle_pre_status(&mut self, message: Message) -> Result<(), IngestError> {
        let Some(status) = message.as_status() else {
            self.pending.push(message);
            return Ok(());
        };

        if !within_status_window(status.rtc) {
            log::debug!("discarding STATUS outside the {STATUS_WINDOW_SECS}s gating window");
            return Ok(());
        }

        self.apply_status(status)?;
        self.state = IngestorState::Steady;
        log::debug!("ingestor left PRE_STATUS, replaying {} buffered messages", self.pending.len());

        for buffered in std::mem::take(&mut self.pending) {
            self.process(buffered)?;
        }

        Ok(())
    }

    fn process(&mut self, message: Message) -> Result<(), IngestError> {
        if let Some(status) = message.as_status() {
            return self.apply_status(status);
        }

        if let Some(stream) = message.as_stream() {
            let path = stream.path();
            let buffer = self
                .stream_buffers
                .get_mut(&path)
                .ok_or_else(|| IngestError::UnknownStreamPath(path.to_string()))?;
            buffer.submit(stream.seq, &stream.values)?;
            return Ok(());
        }

        self.dispatch_samples(message)
    }

    fn dispatch_samples(&mut self, message: Message) -> Result<(), IngestError> {
        let raw_samples = message.get_samples();
        if raw_samples.is_empty() {
            return Ok(());
        }

        let mut rtc_samples = Vec::with_capacity(raw_samples.len());
        for (timestamp, path, value) in raw_samples {
            let sample = self.sample_rewriter.rewrite(Sample { timestamp, path, value });
            let rtc = match sample.timestamp {
                Timestamp::RawTick(tick) => self.rtcifier.map_to_rtc(tick as u32),
                Timestamp::Rtc(instant) => instant,
            };
            rtc_samples.push((rtc, sample.path, sample.value));
        }

        let batches: Vec<SampleBatch> =
            batch_samples(rtc_samples).into_iter().map(|batch| self.batch_rewriter.rewrite(batch)).collect();

        for sink in &self.sinks {
            sink.submit_batches(batches.clone());
        }

        Ok(())
    }

    fn apply_status(&mut self, status: &StatusMessage) -> Result<(), IngestError> {
        self.rtcifier.align(status.rtc, status.uptime as u32);

        let accel_ts = self.rtcifier.map_to_rtc(status.accel_stream.ts as u32);
        let accel_period_micros = status.accel_stream.period_ms as u64 * 1000;
        for axis in [StreamAxis::AccelX, StreamAxis::AccelY, StreamAxis::AccelZ] {
            if let Some(buffer) = self.stream_buffers.get_mut(&axis.path()) {
                buffer.align(status.accel_stream.seq, accel_ts, accel_period_micros)?;
            }
        }

        let compass_ts = self.rtcifier.map_to_rtc(status.compass_stream.ts as u32);
        let compass_period_micros = status.compass_stream.period_ms as u64 * 1000;
        for axis in [StreamAxis::CompassX, StreamAxis::CompassY, StreamAxis::CompassZ] {
            if let Some(buffer) = self.stream_buffers.get_mut(&axis.path()) {
                buffer.align(status.compass_stream.seq, compass_ts, compass_period_micros)?;
            }
        }

        Ok(())
    }
}

fn within_status_window(rtc: RtcInstant) -> bool {
    wall_clock_now().diff_seconds(rtc).abs() <= STATUS_WINDOW_SECS
}

fn wall_clock_now() -> RtcInstant {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    RtcInstant::from_micros(since_epoch.as_micros() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bme280::BoschCompensator;
    use crate::rewrite::IdentityRewriter;
    use crate::sensor_path::{Instance, Part};
    use crate::sink::Sink;
    use crate::timeline::Timeline;
    use std::sync::Mutex;

    struct RecordingSink {
        batches: Mutex<Vec<SampleBatch>>,
    }

    impl Sink for RecordingSink {
        fn submit_batch(&self, batch: SampleBatch) {
            self.batches.lock().unwrap().push(batch);
        }
    }

    fn new_ingestor(sink: Arc<RecordingSink>, dir: &Path) -> Ingestor {
        Ingestor::new(
            RTCifier::new(Timeline::new(1 << 16, 1000)),
            dir,
            1024,
            1000,
            Box::new(IdentityRewriter),
            Box::new(IdentityRewriter),
            vec![sink],
            Box::new(BoschCompensator),
            |_block, handle| handle.close(),
        )
        .unwrap()
    }

    fn status_bytes(rtc: u32, status_version: u8) -> Vec<u8> {
        let mut buf = vec![0x01u8]; // MsgType::Status tag
        buf.extend_from_slice(&rtc.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // uptime
        buf.push(1); // protocol_version
        buf.push(status_version);
        buf.extend_from_slice(&[0u8; 6]); // accel imu state
        buf.extend_from_slice(&[0u8; 6]); // compass imu state
        buf
    }

    fn ds18b20_bytes(timestamp: u16) -> Vec<u8> {
        let mut buf = vec![0x02u8];
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(&[0x28, 0xff, 1, 2, 3, 4, 5, 6]);
        buf.extend_from_slice(&(16i16 * 20).to_le_bytes());
        buf
    }

    #[test]
    fn buffers_until_first_in_window_status() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink { batches: Mutex::new(Vec::new()) });
        let mut ingestor = new_ingestor(sink.clone(), dir.path());

        ingestor.handle_datagram(&ds18b20_bytes(0)).unwrap();
        assert!(sink.batches.lock().unwrap().is_empty());

        let now = wall_clock_now().micros_since_epoch() / 1_000_000;
        ingestor.handle_datagram(&status_bytes(now as u32, 1)).unwrap();

        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn stale_status_does_not_open_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink { batches: Mutex::new(Vec::new()) });
        let mut ingestor = new_ingestor(sink.clone(), dir.path());

        ingestor.handle_datagram(&status_bytes(0, 1)).unwrap();
        ingestor.handle_datagram(&ds18b20_bytes(0)).unwrap();

        assert!(sink.batches.lock().unwrap().is_empty());
        assert_eq!(ingestor.state, IngestorState::PreStatus);
    }

    #[test]
    fn unknown_message_type_is_logged_and_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink { batches: Mutex::new(Vec::new()) });
        let mut ingestor = new_ingestor(sink, dir.path());
        ingestor.handle_datagram(&[0xEE]).unwrap();
    }

    #[test]
    fn sample_path_uses_hex_instance() {
        let raw = Message::Ds18b20(
            crate::message::ds18b20::Ds18b20Message::decode(&ds18b20_bytes(0)[1..]).unwrap(),
        );
        let samples = raw.get_samples();
        assert_eq!(samples[0].1.part, Part::Ds18b20);
        assert!(matches!(samples[0].1.instance, Instance::Hex(_)));
    }
}
