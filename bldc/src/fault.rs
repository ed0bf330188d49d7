//! Timing faults and the channel they travel through.
//!
//! Faults are never propagated up the call stack. Whoever detects one disarms both axes
//! through [`FaultSink`] and moves on.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use ringbuffer::{ConstGenericRingBuffer, RingBuffer};
use thiserror::Error;

use crate::timestamp::Timestamp;
use crate::util::spin_lock::SpinLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u32)]
pub enum Fault {
    /// Counter B reported the same direction on two consecutive update events.
    #[error("timer update event missed")]
    TimerUpdateMissed = 1 << 0,
    /// A conversion batch was not complete when it was fetched.
    #[error("conversions were not ready when fetched")]
    BadTiming = 1 << 1,
    /// The dispatcher overlapped more than one update event, or none.
    #[error("control deadline missed")]
    ControlDeadlineMissed = 1 << 2,
}

impl Fault {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Interrupt-safe disarm channel of one axis.
pub trait FaultSink {
    fn disarm_with_error(&self, fault: Fault);
}

/// Error bits plus an armed flag. Faults are sticky until cleared.
pub struct AxisFaultState {
    errors: AtomicU32,
    armed: AtomicBool,
}

impl AxisFaultState {
    pub const fn new() -> Self {
        AxisFaultState {
            errors: AtomicU32::new(0),
            armed: AtomicBool::new(false),
        }
    }

    /// Arms the axis unless an error is still latched.
    pub fn arm(&self) -> bool {
        if self.errors.load(Ordering::Acquire) != 0 {
            return false;
        }
        self.armed.store(true, Ordering::Release);
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn has(&self, fault: Fault) -> bool {
        self.errors() & fault.code() != 0
    }

    pub fn clear_errors(&self) {
        self.errors.store(0, Ordering::Release);
    }
}

impl Default for AxisFaultState {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSink for AxisFaultState {
    fn disarm_with_error(&self, fault: Fault) {
        self.armed.store(false, Ordering::Release);
        self.errors.fetch_or(fault.code(), Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    pub timestamp: Timestamp,
    pub fault: Fault,
}

/// The most recent `N` faults. Oldest records are overwritten when full.
pub struct FaultLog<const N: usize> {
    records: SpinLock<Option<ConstGenericRingBuffer<FaultRecord, N>>>,
    dropped: AtomicU32,
}

impl<const N: usize> FaultLog<N> {
    pub const fn new() -> Self {
        FaultLog {
            records: SpinLock::new(None),
            dropped: AtomicU32::new(0),
        }
    }

    /// Never blocks. If thread mode is holding the log, the record is counted as dropped.
    pub fn record(&self, timestamp: Timestamp, fault: Fault) {
        match self.records.try_lock() {
            Ok(mut records) => records
                .get_or_insert_with(ConstGenericRingBuffer::default)
                .push(FaultRecord { timestamp, fault }),
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Removes the oldest record. Thread mode only; the lock is held only for the dequeue.
    pub fn pop(&self) -> Option<FaultRecord> {
        self.records.lock().as_mut()?.dequeue()
    }

    /// Removes records oldest first. Thread mode only.
    pub fn drain(&self, mut f: impl FnMut(FaultRecord)) {
        while let Some(record) = self.pop() {
            f(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().as_ref().map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the drop count and restarts it from zero.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl<const N: usize> Default for FaultLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_bits() {
        let all = Fault::TimerUpdateMissed.code()
            | Fault::BadTiming.code()
            | Fault::ControlDeadlineMissed.code();
        assert_eq!(all.count_ones(), 3);
    }

    #[test]
    fn disarm_latches_error() {
        let axis = AxisFaultState::new();
        assert!(axis.arm());
        axis.disarm_with_error(Fault::BadTiming);
        assert!(!axis.is_armed());
        assert!(axis.has(Fault::BadTiming));
        assert!(!axis.arm());
        axis.clear_errors();
        assert!(axis.arm());
    }

    #[test]
    fn log_overwrites_oldest() {
        let log: FaultLog<2> = FaultLog::new();
        log.record(Timestamp(1), Fault::BadTiming);
        log.record(Timestamp(2), Fault::TimerUpdateMissed);
        log.record(Timestamp(3), Fault::ControlDeadlineMissed);
        let mut seen = [None; 3];
        let mut i = 0;
        log.drain(|record| {
            seen[i] = Some(record.timestamp);
            i += 1;
        });
        assert_eq!(seen, [Some(Timestamp(2)), Some(Timestamp(3)), None]);
        assert!(log.is_empty());
    }

    #[test]
    fn contended_log_counts_drops() {
        let log: FaultLog<4> = FaultLog::new();
        let held = log.records.lock();
        log.record(Timestamp(1), Fault::BadTiming);
        drop(held);
        assert_eq!(log.dropped(), 1);
        assert_eq!(log.len(), 0);
        assert_eq!(log.take_dropped(), 1);
        assert_eq!(log.dropped(), 0);

        log.record(Timestamp(2), Fault::BadTiming);
        assert_eq!(log.pop().map(|record| record.timestamp), Some(Timestamp(2)));
        assert_eq!(log.pop(), None);
    }
}
