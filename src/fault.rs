use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_FAULT_LOG: usize = 32;

/// Classification of the most recent sampling attempt. Exactly one variant
/// is current after each call to `sample()`; this is not accumulated
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    Normal,
    CommunicationError,
    RangeError,
    JumpError,
}

impl SampleStatus {
    pub fn is_fault(self) -> bool {
        !matches!(self, SampleStatus::Normal)
    }
}

/// One rejected sampling attempt, kept for diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Sequence number of the `sample()` call that was rejected.
    pub sample_seq: u32,
    pub status: SampleStatus,
}

/// Bounded history of rejected samples; the oldest record is evicted when
/// the log is full. Diagnostic only, never consulted by the pipeline.
#[derive(Debug, Default)]
pub struct FaultLog {
    events: Vec<FaultEvent, MAX_FAULT_LOG>,
}

impl FaultLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, sample_seq: u32, status: SampleStatus) {
        debug_assert!(status.is_fault(), "only rejections are logged");

        if self.events.is_full() {
            self.events.remove(0);
        }
        let _ = self.events.push(FaultEvent { sample_seq, status });
    }

    pub fn events(&self) -> &[FaultEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Cumulative sampling counters for telemetry and test assertions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SamplerStats {
    pub total_samples: u32,
    pub accepted: u32,
    pub comm_errors: u32,
    pub range_errors: u32,
    pub jump_errors: u32,
    pub retries_performed: u32,
}
