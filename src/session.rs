use crate::machine::{DigitalInput, Machine};
use crate::scheduler::{CycleScheduler, RefreshEvent};
use crate::screen::FrameSink;
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, TryLockError};

/// One running machine, guarded so the two entry points into it — running
/// cycles and drawing frames — can be driven from independent notification
/// sources without overlapping themselves.
///
/// Each operation has its own gate, holding exactly the state that operation
/// needs (the run gate holds the scheduler, the draw gate holds the frame
/// sink). Gates are acquired non-blocking: an invocation arriving while the
/// previous invocation of the *same* operation is still in flight is dropped
/// outright, never queued. Dropping is the point — queueing would let a slow
/// machine accumulate an unbounded backlog of stale work. A dropped refresh
/// is remembered and folded into the next event's `did_skip_previous` flag so
/// the scheduler can count the run of misses.
///
/// [`close`](Session::close) is the one place both gates are taken blocking,
/// so teardown cannot race an in-flight operation.
pub struct Session<M: Machine> {
    run_gate: Mutex<CycleScheduler>,
    draw_gate: Mutex<FrameSink>,
    machine: Mutex<M>,
    dropped_refresh: AtomicBool,
    closed: AtomicBool,
}

impl<M: Machine> Session<M> {
    pub fn new(machine: M, scheduler: CycleScheduler, sink: FrameSink) -> Self {
        Self {
            run_gate: Mutex::new(scheduler),
            draw_gate: Mutex::new(sink),
            machine: Mutex::new(machine),
            dropped_refresh: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Feed one refresh notification, running the machine for however many
    /// cycles the scheduler derives from it.
    ///
    /// Returns the cycle count that was run, or `None` when the event only
    /// established a timing baseline, arrived after [`close`](Session::close),
    /// or was dropped because the previous update is still in flight.
    pub fn update(&self, mut event: RefreshEvent) -> Option<i32> {
        let mut scheduler = match self.run_gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                self.dropped_refresh.store(true, Ordering::Relaxed);
                trace!("refresh dropped; previous update still in flight");
                return None;
            }
            Err(TryLockError::Poisoned(_)) => panic!("run gate poisoned"),
        };
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        event.did_skip_previous |= self.dropped_refresh.swap(false, Ordering::Relaxed);
        let cycles = scheduler.on_refresh(event)?;
        if cycles > 0 {
            self.machine.lock().expect("machine lock poisoned").run(cycles);
        }
        Some(cycles)
    }

    /// Ask the machine to draw a frame. Returns whether it was asked: a draw
    /// arriving while the previous one is still in flight is dropped, like a
    /// contended update.
    pub fn draw(&self, only_if_dirty: bool) -> bool {
        let mut sink = match self.draw_gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                trace!("draw dropped; previous draw still in flight");
                return false;
            }
            Err(TryLockError::Poisoned(_)) => panic!("draw gate poisoned"),
        };
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        self.machine
            .lock()
            .expect("machine lock poisoned")
            .draw(&mut sink, only_if_dirty);
        true
    }

    /// Forward one digital input change to the machine. Serialized behind the
    /// run gate, like the update path, so input lands between cycle batches
    /// rather than during one.
    pub fn set_input(&self, input: DigitalInput, pressed: bool) {
        let _scheduler = self.run_gate.lock().expect("run gate poisoned");
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.machine
            .lock()
            .expect("machine lock poisoned")
            .set_input(input, pressed);
    }

    /// Install a ROM image in the machine.
    pub fn set_rom(&self, bytes: &[u8]) {
        let _scheduler = self.run_gate.lock().expect("run gate poisoned");
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.machine
            .lock()
            .expect("machine lock poisoned")
            .set_rom(bytes);
    }

    /// Restart the timing baseline, e.g. after the host unpauses. The next
    /// refresh event only re-establishes the baseline rather than being
    /// mistaken for an enormous elapsed interval.
    pub fn rebase(&self) {
        self.run_gate
            .lock()
            .expect("run gate poisoned")
            .rebase();
    }

    /// Tear the session down. Blocks until any in-flight update or draw has
    /// finished; afterwards no call reaches the machine and the display
    /// surface is released. Idempotent.
    pub fn close(&self) {
        let _scheduler = self.run_gate.lock().expect("run gate poisoned");
        let mut sink = self.draw_gate.lock().expect("draw gate poisoned");
        self.closed.store(true, Ordering::Release);
        *sink = FrameSink::Dummy;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
