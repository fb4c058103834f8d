//! Pluggable rewrite seams between decode and sink dispatch.
//!
//! The original rewrite-rule DSL is explicitly out of scope; these
//! traits are the boundary a future rule engine would implement,
//! consistent with the abstract `Sink`/`PubSubPublisher` boundaries in
//! [`crate::sink`].

use crate::sensor_path::{Sample, SampleBatch};

/// Rewrites one sample immediately after decode, before timestamp
/// mapping and batching.
pub trait SampleRewriter: Send + Sync {
    fn rewrite(&self, sample: Sample) -> Sample;
}

/// Rewrites a batch after grouping, before sink dispatch.
pub trait BatchRewriter: Send + Sync {
    fn rewrite(&self, batch: SampleBatch) -> SampleBatch;
}

/// Pass-through implementation of both rewriter traits.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRewriter;

impl SampleRewriter for IdentityRewriter {
    fn rewrite(&self, sample: Sample) -> Sample {
        sample
    }
}

impl BatchRewriter for IdentityRewriter {
    fn rewrite(&self, batch: SampleBatch) -> SampleBatch {
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_path::{Instance, Part, RtcInstant, Timestamp};

    #[test]
    fn identity_rewriter_returns_input_unchanged() {
        let sample = Sample {
            timestamp: Timestamp::Rtc(RtcInstant::from_epoch_seconds(0)),
            path: crate::sensor_path::SensorPath::new(Part::Ds18b20, Instance::Index(0), None),
            value: 1.0,
        };
        let rewritten = SampleRewriter::rewrite(&IdentityRewriter, sample.clone());
        assert_eq!(rewritten, sample);
    }
}
