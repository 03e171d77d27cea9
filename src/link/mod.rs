//! The link: one physical serial channel to the peripheral, shared by the
//! periodic task, the channel's completion handlers and the host's request
//! handlers.
//!
//! See [`crate`] for how the pieces fit together.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod complete;
mod service;

pub use service::{Direction, IoRequest, RequestQueue, Unit};

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::buffers::LinkBuffers;
use crate::io::SerialPort;
use crate::lock::{LinkGuard, LinkLocks};
use crate::sched::{Action, LinkView, Schedule, next_action};
use crate::{Error, Result};

/// Link configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Ticks between runs of the periodic task while idle
    pub poll_interval: u16,
    /// Source unit stamped on outgoing frames
    pub source: u8,
    /// Whether [`Link::bytes_available()`] includes bytes the peripheral has
    /// reported but which have not been fetched yet
    pub report_unfetched: bool,
    /// Number of consecutive unusable replies after which the link is failed
    /// with [`Error::Io`].  0 keeps polling forever.
    pub wrong_tag_limit: u8,
}

impl LinkConfig {
    pub const DEFAULT: Self = Self {
        poll_interval: 30,
        source: 0,
        report_unfetched: true,
        wrong_tag_limit: 0,
    };
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Byte counters, totalled across open/close cycles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Bytes delivered to host read requests
    pub bytes_read: u32,
    /// Bytes accepted from host write requests
    pub bytes_written: u32,
}

/// Point in time snapshot of a link, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    /// Result of the last channel operation
    pub result: Result<()>,
    /// Bytes staged and waiting to be flushed
    pub write_pending: usize,
    /// As [`Link::bytes_available()`]
    pub available: usize,
    pub stats: LinkStats,
    pub poll_interval: u16,
    pub input_open: bool,
    pub output_open: bool,
    /// A channel operation is outstanding
    pub in_flight: bool,
    /// The link lock is held
    pub busy: bool,
}

// Who holds the link lock on behalf of a channel operation.  A completion
// handler can only take the lock once the issuing context has let go of it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpState {
    Idle = 0,
    IssuingWrite = 1,
    IssuingRead = 2,
    Writing = 3,
    Reading = 4,
    // A write completed before its issue returned.  Outcome in `early_write`.
    WriteDone = 5,
}

const fn result_code(result: Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => err.code(),
    }
}

const fn code_result(code: u8) -> Result<()> {
    match Error::from_code(code) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// Everything guarded by the link lock
struct LinkState<P> {
    port: Option<P>,
    buffers: LinkBuffers,
    wake_scheduled: bool,
}

impl<P: SerialPort> LinkState<P> {
    fn issue_flush(&mut self, source: u8) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConfigured)?;
        let len = self.buffers.write_pos();
        port.issue_write(self.buffers.encode_pending(source)?);
        Ok(len)
    }

    fn issue_poll(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConfigured)?;
        port.issue_read();
        Ok(())
    }
}

// Copies of buffer state, readable without the link lock.  Updated whenever
// the link lock is given up.
struct Published {
    write_pending: AtomicUsize,
    available: AtomicUsize,
    bytes_read: AtomicU32,
    bytes_written: AtomicU32,
}

/// A link to the peripheral.
///
/// All methods take `&self`, so a link can live in a `static` and be used
/// from both interrupt and call level code.  Nothing blocks: where the link
/// lock is unavailable, the call returns having done nothing, or leaves the
/// host request pending.
pub struct Link<P> {
    config: LinkConfig,
    locks: LinkLocks,
    schedule: Schedule,
    // Error code of the last channel operation, 0 for success
    result: AtomicU8,
    // OpState of the outstanding channel operation
    op: AtomicU8,
    early_write: AtomicU8,
    configured: AtomicBool,
    open_units: AtomicU8,
    wrong_tags: AtomicU8,
    published: Published,
    inner: UnsafeCell<LinkState<P>>,
}

// SAFETY: The state in `inner` is only reached through `Link::state()`, which
// requires the guard of the link lock, and at most one guard exists at a time.
// A completion handler only recreates the guard after moving `op` out of an
// in-flight state, which happens strictly after the issuing context has given
// its guard up.
unsafe impl<P: Send> Sync for Link<P> {}

impl<P> Link<P> {
    /// Create a link with no channel attached.
    pub const fn new(config: LinkConfig) -> Self {
        Self {
            config,
            locks: LinkLocks::new(),
            schedule: Schedule::new(),
            result: AtomicU8::new(0),
            op: AtomicU8::new(OpState::Idle as u8),
            early_write: AtomicU8::new(0),
            configured: AtomicBool::new(false),
            open_units: AtomicU8::new(0),
            wrong_tags: AtomicU8::new(0),
            published: Published {
                write_pending: AtomicUsize::new(0),
                available: AtomicUsize::new(0),
                bytes_read: AtomicU32::new(0),
                bytes_written: AtomicU32::new(0),
            },
            inner: UnsafeCell::new(LinkState {
                port: None,
                buffers: LinkBuffers::new(),
                wake_scheduled: false,
            }),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

impl<P: SerialPort> Link<P> {
    /// Hand the link an already opened channel to the peripheral.
    ///
    /// Fails with [`Error::Busy`] if the link is in use.
    pub fn attach(&self, port: P) -> Result<()> {
        let Some(mut guard) = self.locks.try_link() else {
            return Err(Error::Busy);
        };
        self.state(&mut guard).port = Some(port);
        self.configured.store(true, Ordering::Release);
        self.unlock(guard);
        debug!("Channel attached");
        Ok(())
    }

    /// Open a unit, starting the periodic task if it is not yet running.
    ///
    /// Reopening clears a transport error stuck on the link.  Opening an
    /// already open unit is harmless.
    pub fn open(&self, unit: Unit) -> Result<()> {
        if !self.configured.load(Ordering::Acquire) {
            warn!("Can't open {unit:?}, no channel attached");
            return Err(Error::NotConfigured);
        }

        self.record(Ok(()));
        self.wrong_tags.store(0, Ordering::Relaxed);

        if self.schedule.interval() == 0 {
            self.schedule.set_interval(self.config.poll_interval);
        }
        if self.schedule.install() {
            debug!(
                "Periodic task started, every {} ticks",
                self.schedule.interval()
            );
        }

        let was_open = self.open_units.fetch_or(unit.bit(), Ordering::AcqRel);
        if was_open & unit.bit() == 0 {
            debug!("Opened {unit:?}");
        }
        Ok(())
    }

    /// Close a unit.
    ///
    /// Buffered data is neither flushed nor discarded, and counters are kept,
    /// so a later open carries on where this one left off.
    pub fn close(&self, unit: Unit) -> Result<()> {
        self.open_units.fetch_and(!unit.bit(), Ordering::AcqRel);
        debug!("Closed {unit:?}");
        Ok(())
    }

    pub fn is_open(&self, unit: Unit) -> bool {
        self.open_units.load(Ordering::Acquire) & unit.bit() != 0
    }

    /// Change how often the periodic task runs while idle.
    pub fn set_poll_interval(&self, ticks: u16) {
        self.schedule.set_interval(ticks);
    }

    /// Result of the last channel operation.
    pub fn link_result(&self) -> Result<()> {
        code_result(self.result.load(Ordering::Acquire))
    }

    /// Bytes a host read could currently receive.
    ///
    /// Unless [`LinkConfig::report_unfetched`] is cleared, this includes bytes
    /// the peripheral has reported but which are still to be polled for.
    pub fn bytes_available(&self) -> usize {
        self.published.available.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            bytes_read: self.published.bytes_read.load(Ordering::Acquire),
            bytes_written: self.published.bytes_written.load(Ordering::Acquire),
        }
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            result: self.link_result(),
            write_pending: self.published.write_pending.load(Ordering::Acquire),
            available: self.bytes_available(),
            stats: self.stats(),
            poll_interval: self.schedule.interval(),
            input_open: self.is_open(Unit::Input),
            output_open: self.is_open(Unit::Output),
            in_flight: self.op.load(Ordering::Acquire) != OpState::Idle as u8,
            busy: self.locks.link_locked(),
        }
    }

    /// Call on every system tick.  Runs the periodic task when it is due.
    pub fn on_timer<Q: RequestQueue>(&self, queue: &mut Q) {
        if self.schedule.tick() {
            self.run_task(queue);
        }
    }

    /// The periodic task.  Performs at most one of: flush pending writes,
    /// poll for a reply, or wake pending host requests.
    ///
    /// Does nothing if the link lock is unavailable.
    pub fn run_task<Q: RequestQueue>(&self, queue: &mut Q) {
        let Some(mut guard) = self.locks.try_link() else {
            trace!("Link busy, skipping periodic task");
            return;
        };

        let action = next_action(&self.view(self.state(&mut guard)));
        trace!("Periodic task: {action:?}");
        match action {
            Action::Flush => self.flush(guard),
            Action::Poll => self.poll(guard),
            Action::Wake => self.wake(guard, queue),
        }
    }
}

// Internal functions
impl<P: SerialPort> Link<P> {
    #[allow(clippy::mut_from_ref)]
    fn state<'g>(&'g self, guard: &'g mut LinkGuard<'_>) -> &'g mut LinkState<P> {
        debug_assert!(guard.guards(&self.locks));
        // SAFETY: The guard proves we hold the link lock, and it stays
        // mutably borrowed for as long as the returned reference lives.
        unsafe { &mut *self.inner.get() }
    }

    fn view(&self, state: &LinkState<P>) -> LinkView {
        LinkView {
            failed: self.failure().is_some(),
            write_pos: state.buffers.write_pos(),
            read_left: state.buffers.read_left(),
            wake_scheduled: state.wake_scheduled,
        }
    }

    // Transport error stuck on the link, if any
    fn failure(&self) -> Option<Error> {
        self.link_result().err().filter(|err| !err.is_transient())
    }

    fn record(&self, result: Result<()>) {
        self.result.store(result_code(result), Ordering::Release);
    }

    fn op_transition(&self, from: OpState, to: OpState) -> core::result::Result<(), u8> {
        self.op
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    fn publish(&self, state: &LinkState<P>) {
        let buffers = &state.buffers;
        let available = if self.config.report_unfetched {
            buffers.read_left() + buffers.read_avail()
        } else {
            buffers.read_left()
        };
        let published = &self.published;
        published.write_pending.store(buffers.write_pos(), Ordering::Release);
        published.available.store(available, Ordering::Release);
        published.bytes_read.store(buffers.bytes_read(), Ordering::Release);
        published.bytes_written.store(buffers.bytes_written(), Ordering::Release);
    }

    // Release the link lock, leaving the state consistent for the next holder
    fn unlock(&self, mut guard: LinkGuard<'_>) {
        self.publish(self.state(&mut guard));
        guard.release();
    }

    // Leave the link lock held by the operation just issued.  Only once the
    // guard is gone may a completion handler take the lock back.
    fn hand_off(&self, mut guard: LinkGuard<'_>, issuing: OpState, in_flight: OpState) {
        self.publish(self.state(&mut guard));
        guard.hand_off();
        match self.op_transition(issuing, in_flight) {
            Ok(()) => (),
            Err(state) if state == OpState::WriteDone as u8 => self.finish_early_write(),
            Err(state) => error!("Unexpected operation state {state} after issue"),
        }
    }

    // Take the link lock back from a completed operation
    fn reclaim(&self, in_flight: OpState) -> core::result::Result<LinkGuard<'_>, u8> {
        self.op_transition(in_flight, OpState::Idle)
            .map(|()| self.locks.reclaim_link())
    }

    fn finish_early_write(&self) {
        let result = code_result(self.early_write.load(Ordering::Acquire));
        self.op.store(OpState::Idle as u8, Ordering::Release);
        trace!("Handling write completed during issue: {result:?}");
        self.write_completed(self.locks.reclaim_link(), result);
    }

    fn flush(&self, mut guard: LinkGuard<'_>) {
        let source = self.config.source;
        self.op.store(OpState::IssuingWrite as u8, Ordering::Release);
        match self.state(&mut guard).issue_flush(source) {
            Ok(len) => {
                debug!("Flushing {len} bytes");
                self.hand_off(guard, OpState::IssuingWrite, OpState::Writing);
            }
            Err(err) => self.abandon(guard, err),
        }
    }

    fn poll(&self, mut guard: LinkGuard<'_>) {
        self.op.store(OpState::IssuingRead as u8, Ordering::Release);
        match self.state(&mut guard).issue_poll() {
            Ok(()) => {
                trace!("Polling for reply");
                self.hand_off(guard, OpState::IssuingRead, OpState::Reading);
            }
            Err(err) => self.abandon(guard, err),
        }
    }

    // An operation could not be issued
    fn abandon(&self, guard: LinkGuard<'_>, err: Error) {
        self.op.store(OpState::Idle as u8, Ordering::Release);
        warn!("Unable to start link operation: {err:?}");
        self.record(Err(err));
        self.unlock(guard);
    }

    // Wake pass.  The wake lock is taken before the link lock is released, so
    // that servicing, which takes the link lock per request, can proceed.
    fn wake<Q: RequestQueue>(&self, mut guard: LinkGuard<'_>, queue: &mut Q) {
        if self.failure().is_none() {
            self.state(&mut guard).wake_scheduled = false;
        }

        let Some(wake) = self.locks.try_wake() else {
            trace!("Wake pass already running");
            self.unlock(guard);
            return;
        };
        self.unlock(guard);

        for unit in Unit::ALL {
            self.wake_unit(unit, queue);
        }
        wake.release();
    }
}
