//! Channel completion handlers.
//!
//! Each takes back the link lock from the operation that completed, updates
//! the link, and releases the lock (or hands it straight to a chained
//! operation).  Both ask for the periodic task to run on the next tick.
//!
//! A completion may arrive before the call which issued the operation has
//! returned.  The lock is still held by the issuing context then, so a write
//! outcome is left for it to handle once it lets go, and a read is refused
//! with [`Error::Busy`] for the port to deliver again.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::sync::atomic::Ordering;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::{Link, OpState, result_code};
use crate::frame;
use crate::io::SerialPort;
use crate::lock::LinkGuard;
use crate::sched::{Action, next_action};
use crate::{Error, Result};

impl<P: SerialPort> Link<P> {
    /// Call when a write issued to the channel has finished.
    ///
    /// On success the pending write frame is emptied, and if there is nothing
    /// left to read, a poll is issued straight away.
    pub fn on_write_complete(&self, result: Result<()>) {
        let state = match self.reclaim(OpState::Writing) {
            Ok(guard) => return self.write_completed(guard, result),
            Err(state) => state,
        };
        if state != OpState::IssuingWrite as u8 {
            warn!("Write completion with no write in flight");
            return;
        }

        self.early_write.store(result_code(result), Ordering::Relaxed);
        match self.op_transition(OpState::IssuingWrite, OpState::WriteDone) {
            Ok(()) => trace!("Write completed during issue, deferred"),
            // Issue returned in the meantime
            Err(_) => self.on_write_complete(result),
        }
    }

    pub(super) fn write_completed(&self, mut guard: LinkGuard<'_>, result: Result<()>) {
        match result {
            Ok(()) => {
                self.record(Ok(()));
                let state = self.state(&mut guard);
                state.buffers.reset_after_flush();
                if next_action(&self.view(state)) == Action::Poll {
                    trace!("Flush done, chaining poll");
                    self.poll(guard);
                    return;
                }
            }
            Err(err) => {
                warn!("Write failed: {err:?}");
                self.record(Err(err));
            }
        }

        self.unlock(guard);
        self.schedule.asap();
    }

    /// Call when a read issued to the channel has finished, with the bytes
    /// received.
    ///
    /// A good Reply replaces the read buffer and schedules a wake.  A frame
    /// that cannot be used is discarded, leaving the buffers as they were, and
    /// its error is returned.  Polling carries on regardless, unless
    /// [`crate::link::LinkConfig::wrong_tag_limit`] consecutive frames have
    /// been discarded.
    ///
    /// Returns [`Error::Busy`], without looking at `result`, if the read is
    /// still being issued.  The completion must then be delivered again.
    pub fn on_read_complete(&self, result: Result<&[u8]>) -> Result<()> {
        let mut guard = match self.reclaim(OpState::Reading) {
            Ok(guard) => guard,
            Err(state) if state == OpState::IssuingRead as u8 => {
                debug!("Read completed during issue, refused");
                return Err(Error::Busy);
            }
            Err(_) => {
                warn!("Read completion with no read in flight");
                return Ok(());
            }
        };

        let outcome = result.and_then(|bytes| self.accept_reply(&mut guard, bytes));
        match outcome {
            Ok(()) => {
                self.wrong_tags.store(0, Ordering::Relaxed);
                self.record(Ok(()));
            }
            Err(err) if err.is_transient() => self.discarded(err),
            Err(err) => {
                warn!("Read failed: {err:?}");
                self.record(Err(err));
            }
        }

        self.unlock(guard);
        self.schedule.asap();
        outcome
    }

    fn accept_reply(&self, guard: &mut LinkGuard<'_>, bytes: &[u8]) -> Result<()> {
        let reply = frame::decode_reply(bytes)?;
        trace!(
            "Reply from unit {}: {} bytes, {} more to fetch",
            reply.source,
            reply.buffered(),
            reply.overflow()
        );
        let state = self.state(guard);
        state.buffers.load_reply(&reply);
        state.wake_scheduled = true;
        Ok(())
    }

    fn discarded(&self, err: Error) {
        let count = self
            .wrong_tags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            })
            .map_or(u8::MAX, |n| n.saturating_add(1));
        warn!("Discarded reply: {err:?} ({count} in a row)");

        let limit = self.config.wrong_tag_limit;
        if limit > 0 && count >= limit {
            error!("Too many bad replies, failing link");
            self.record(Err(Error::Io));
        } else {
            self.record(Err(err));
        }
    }
}
