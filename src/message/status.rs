//! STATUS message: the device's periodic heartbeat, carrying the RTC
//! anchor plus an escalating set of diagnostic counters depending on
//! `status_version`.

use crate::error::DecodeError;
use crate::message::reader::Reader;
use crate::sensor_path::RtcInstant;

const MAX_STATUS_VERSION: u8 = 6;

/// `seq`/`ts`/`period_ms` for one of the two IMU streams (accel or
/// compass) reported since `status_version` 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuStreamState {
    pub seq: u16,
    pub ts: u16,
    pub period_ms: u16,
}

impl ImuStreamState {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self { seq: r.u16()?, ts: r.u16()?, period_ms: r.u16()? })
    }
}

/// I2C bus transaction overrun counter, reported per bus since
/// `status_version` 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cMetrics {
    pub transaction_overruns: u16,
}

impl I2cMetrics {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self { transaction_overruns: r.u16()? })
    }
}

/// Per-BME280-instance health counters. Versions below 4 only ever
/// report one physical instance; the second slot is filled with the
/// documented defaults (`timeouts = 0`, `configure_status = 0xFF`) so
/// callers can treat both instances uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bme280Metrics {
    pub configure_status: u8,
    pub timeouts: u16,
}

impl Bme280Metrics {
    const SYNTHETIC: Self = Self { configure_status: 0xFF, timeouts: 0 };

    fn decode_v2(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self { configure_status: 0x00, timeouts: r.u16()? })
    }

    fn decode_v3(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self { configure_status: r.u8()?, timeouts: r.u16()? })
    }
}

/// Network transmit buffer pool occupancy, reported since
/// `status_version` 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetrics {
    pub most_allocated: u16,
    pub allocated: u16,
    pub ready: u16,
    pub total: u16,
}

impl TxMetrics {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        Ok(Self {
            most_allocated: r.u16()?,
            allocated: r.u16()?,
            ready: r.u16()?,
            total: r.u16()?,
        })
    }
}

/// Per-task CPU tick counters, reported for `5 <= status_version < 6`
/// and superseded by [`CpuMetrics`] from version 6 onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasksMetrics {
    pub idle_ticks: u16,
    pub task_cpu_ticks: Vec<u16>,
}

impl TasksMetrics {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let count = r.u8()? as usize;
        let idle_ticks = r.u16()?;
        let mut task_cpu_ticks = Vec::with_capacity(count);
        for _ in 0..count {
            task_cpu_ticks.push(r.u16()?);
        }
        Ok(Self { idle_ticks, task_cpu_ticks })
    }
}

/// Index of the first task-specific counter in [`CpuMetrics::counters`];
/// everything before it is either a fixed counter or a named interrupt.
pub const TASK_BASE: usize = 10;

/// Names of the interrupt sources occupying indices `2..TASK_BASE`.
pub const INTERRUPT_NAMES: [&str; TASK_BASE - 2] =
    ["usart", "spi", "i2c", "tim", "exti", "dma", "adc", "rtc"];

/// Full 32-slot CPU counter array introduced at `status_version` 6,
/// replacing [`TasksMetrics`]. Slot 0 is the idle counter, slot 1 the
/// scheduler counter, slots `2..TASK_BASE` the named interrupt sources
/// in [`INTERRUPT_NAMES`] order, and the remainder per-task CPU ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuMetrics {
    pub counters: [u16; 32],
}

impl CpuMetrics {
    fn decode(r: &mut Reader) -> Result<Self, DecodeError> {
        let mut counters = [0u16; 32];
        for slot in counters.iter_mut() {
            *slot = r.u16()?;
        }
        Ok(Self { counters })
    }

    pub fn idle(&self) -> u16 {
        self.counters[0]
    }

    pub fn sched(&self) -> u16 {
        self.counters[1]
    }

    pub fn interrupt(&self, name: &str) -> Option<u16> {
        INTERRUPT_NAMES.iter().position(|n| *n == name).map(|i| self.counters[2 + i])
    }

    pub fn task_counters(&self) -> &[u16] {
        &self.counters[TASK_BASE..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub rtc: RtcInstant,
    pub uptime: u16,
    pub status_version: u8,
    pub accel_stream: ImuStreamState,
    pub compass_stream: ImuStreamState,
    pub i2c: Option<[I2cMetrics; 2]>,
    pub bme280: Option<[Bme280Metrics; 2]>,
    pub tx: Option<TxMetrics>,
    pub tasks: Option<TasksMetrics>,
    pub cpu: Option<CpuMetrics>,
}

impl StatusMessage {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);

        let rtc_epoch_s = r.u32()?;
        let uptime = r.u16()?;
        let protocol_version = r.u8()?;
        let status_version = r.u8()?;

        if protocol_version != 1 {
            return Err(DecodeError::UnsupportedProtocolVersion(protocol_version));
        }
        if status_version > MAX_STATUS_VERSION {
            return Err(DecodeError::UnsupportedStatusVersion(status_version));
        }

        let accel_stream = ImuStreamState::decode(&mut r)?;
        let compass_stream = ImuStreamState::decode(&mut r)?;

        let i2c = if status_version >= 2 {
            Some([I2cMetrics::decode(&mut r)?, I2cMetrics::decode(&mut r)?])
        } else {
            None
        };

        let bme280 = if status_version >= 4 {
            Some([Bme280Metrics::decode_v3(&mut r)?, Bme280Metrics::decode_v3(&mut r)?])
        } else if status_version == 3 {
            Some([Bme280Metrics::decode_v3(&mut r)?, Bme280Metrics::SYNTHETIC])
        } else if status_version == 2 {
            Some([Bme280Metrics::decode_v2(&mut r)?, Bme280Metrics::SYNTHETIC])
        } else {
            None
        };

        let tx = if status_version >= 5 { Some(TxMetrics::decode(&mut r)?) } else { None };

        let tasks =
            if (5..6).contains(&status_version) { Some(TasksMetrics::decode(&mut r)?) } else { None };

        let cpu = if status_version >= 6 { Some(CpuMetrics::decode(&mut r)?) } else { None };

        r.expect_exhausted()?;

        Ok(Self {
            rtc: RtcInstant::from_epoch_seconds(rtc_epoch_s),
            uptime,
            status_version,
            accel_stream,
            compass_stream,
            i2c,
            bme280,
            tx,
            tasks,
            cpu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_header(rtc: u32, uptime: u16, status_version: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&rtc.to_le_bytes());
        buf.extend_from_slice(&uptime.to_le_bytes());
        buf.push(1); // protocol_version
        buf.push(status_version);
        buf
    }

    fn imu_state(seq: u16, ts: u16, period: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&seq.to_le_bytes());
        buf.extend_from_slice(&ts.to_le_bytes());
        buf.extend_from_slice(&period.to_le_bytes());
        buf
    }

    #[test]
    fn v1_decodes_imu_states_only() {
        let mut buf = base_header(1_700_000_000, 42, 1);
        buf.extend(imu_state(1, 2, 10));
        buf.extend(imu_state(3, 4, 20));

        let msg = StatusMessage::decode(&buf).unwrap();
        assert_eq!(msg.accel_stream, ImuStreamState { seq: 1, ts: 2, period_ms: 10 });
        assert_eq!(msg.compass_stream, ImuStreamState { seq: 3, ts: 4, period_ms: 20 });
        assert!(msg.i2c.is_none());
        assert!(msg.bme280.is_none());
    }

    #[test]
    fn v2_synthesizes_second_bme280_instance() {
        let mut buf = base_header(0, 0, 2);
        buf.extend(imu_state(0, 0, 0));
        buf.extend(imu_state(0, 0, 0));
        buf.extend_from_slice(&7u16.to_le_bytes()); // i2c #0
        buf.extend_from_slice(&9u16.to_le_bytes()); // i2c #1
        buf.extend_from_slice(&3u16.to_le_bytes()); // bme280 timeouts

        let msg = StatusMessage::decode(&buf).unwrap();
        let bme = msg.bme280.unwrap();
        assert_eq!(bme[0], Bme280Metrics { configure_status: 0x00, timeouts: 3 });
        assert_eq!(bme[1], Bme280Metrics::SYNTHETIC);
    }

    #[test]
    fn v6_decodes_full_cpu_counter_array() {
        let mut buf = base_header(0, 0, 6);
        buf.extend(imu_state(0, 0, 0));
        buf.extend(imu_state(0, 0, 0));
        buf.extend_from_slice(&0u16.to_le_bytes()); // i2c #0
        buf.extend_from_slice(&0u16.to_le_bytes()); // i2c #1
        buf.extend_from_slice(&[0u8, 0, 0]); // bme280 #0 (status, timeouts LE)
        buf.extend_from_slice(&[0u8, 0, 0]); // bme280 #1
        buf.extend_from_slice(&0u16.to_le_bytes()); // tx most_allocated
        buf.extend_from_slice(&0u16.to_le_bytes()); // tx allocated
        buf.extend_from_slice(&0u16.to_le_bytes()); // tx ready
        buf.extend_from_slice(&0u16.to_le_bytes()); // tx total
        for i in 0..32u16 {
            buf.extend_from_slice(&i.to_le_bytes());
        }

        let msg = StatusMessage::decode(&buf).unwrap();
        let cpu = msg.cpu.unwrap();
        assert_eq!(cpu.idle(), 0);
        assert_eq!(cpu.sched(), 1);
        assert_eq!(cpu.interrupt("i2c"), Some(4));
        assert_eq!(cpu.task_counters().len(), 32 - TASK_BASE);
        assert!(msg.tasks.is_none());
    }

    #[test]
    fn rejects_status_version_above_max() {
        let buf = base_header(0, 0, 7);
        let err = StatusMessage::decode(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedStatusVersion(7)));
    }

    #[test]
    fn rejects_wrong_protocol_version() {
        let mut buf = base_header(0, 0, 1);
        buf[6] = 2; // protocol_version
        let err = StatusMessage::decode(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedProtocolVersion(2)));
    }
}
