//! Lock-free latest-pose slot
//!
//! A fixed ring of pose samples plus an atomic index of the most recent
//! publish. Exactly one writer (the data receive thread) and one reader (the
//! control loop). There is no notion of "consumed": the reader always takes
//! the most recent published value, and may observe the same sample twice or
//! skip intermediate ones.
//!
//! # Protocol
//!
//! - Producer: write the sample into slot `(latest + 1) % N`, then store
//!   `latest` with release ordering.
//! - Consumer: load `latest` with acquire ordering, copy that slot, reload
//!   `latest`; if the index moved the copy may be torn, so retry.
//!
//! With N >= 3 slots the producer must lap the whole ring within one copy to
//! corrupt the slot being read, and the index re-check catches that case, so
//! the consumer is wait-free in practice and never yields a field-level mix.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ring capacity; three is the minimum for torn-read safety, four gives slack
const SLOT_COUNT: usize = 4;

/// One rigid-body pose sample as decoded off the wire
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Frame number; -1 marks an invalid sample
    pub frame_number: i32,
    /// Rigid-body ID; -1 marks an invalid sample
    pub body_id: i32,
    /// Position in meters, mocap frame
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Orientation quaternion
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    /// Mean marker error in meters
    pub mean_error: f32,
    /// Whether the body was successfully tracked this frame
    pub tracking_valid: bool,
    /// Server high-resolution clock at camera mid-exposure, 100 ns ticks
    pub mid_exposure_timestamp: u64,
}

impl Default for PoseSample {
    fn default() -> Self {
        Self {
            frame_number: -1,
            body_id: -1,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            qw: 1.0,
            mean_error: 0.0,
            tracking_valid: false,
            mid_exposure_timestamp: 0,
        }
    }
}

impl PoseSample {
    /// Publication gate: only samples passing this are ever observable by
    /// the control loop.
    pub fn is_valid(&self) -> bool {
        self.frame_number != -1
            && self.mid_exposure_timestamp != 0
            && self.tracking_valid
            && self.body_id != -1
    }
}

/// Single-producer single-consumer latest-value slot
pub struct PoseSlot {
    slots: [UnsafeCell<PoseSample>; SLOT_COUNT],
    latest: AtomicUsize,
}

// Safety: access follows the SPSC protocol above. The producer only writes
// the slot after the published index, the consumer re-checks the index after
// copying and discards any copy that raced a publish.
unsafe impl Sync for PoseSlot {}

impl PoseSlot {
    pub fn new() -> Self {
        Self {
            slots: [
                UnsafeCell::new(PoseSample::default()),
                UnsafeCell::new(PoseSample::default()),
                UnsafeCell::new(PoseSample::default()),
                UnsafeCell::new(PoseSample::default()),
            ],
            latest: AtomicUsize::new(0),
        }
    }

    /// Publish a sample. Producer side; exactly one thread may call this.
    pub fn publish(&self, sample: PoseSample) {
        let next = (self.latest.load(Ordering::Relaxed) + 1) % SLOT_COUNT;
        unsafe { std::ptr::write_volatile(self.slots[next].get(), sample) };
        self.latest.store(next, Ordering::Release);
    }

    /// Copy out the most recent published sample. Consumer side.
    pub fn latest(&self) -> PoseSample {
        loop {
            let index = self.latest.load(Ordering::Acquire);
            let sample = unsafe { std::ptr::read_volatile(self.slots[index].get()) };
            if self.latest.load(Ordering::Acquire) == index {
                return sample;
            }
        }
    }
}

impl Default for PoseSlot {
    fn default() -> Self {
        Self::new()
    }
}
