//! Combines a [`Timeline`] with an RTC anchor to map device uptime
//! ticks onto wall-clock instants. One tick is one millisecond in the
//! device protocol.

use crate::sensor_path::RtcInstant;
use crate::timeline::Timeline;

pub struct RTCifier {
    timeline: Timeline,
    rtcbase: RtcInstant,
}

impl RTCifier {
    pub fn new(timeline: Timeline) -> Self {
        Self { timeline, rtcbase: RtcInstant::from_epoch_seconds(0) }
    }

    /// Anchor the timeline: `t` becomes the new epoch origin and `rtc`
    /// is recorded as the wall-clock time at that origin.
    pub fn align(&mut self, rtc: RtcInstant, t: u32) {
        self.timeline.reset(t);
        self.rtcbase = rtc;
    }

    /// Map a raw device tick to a wall-clock instant.
    pub fn map_to_rtc(&mut self, t: u32) -> RtcInstant {
        let ticks = self.timeline.feed_and_transform(t);
        self.rtcbase.add_millis(ticks)
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }
}
