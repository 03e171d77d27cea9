//! Host request servicing.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::task::Poll;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::Link;
use crate::io::SerialPort;
use crate::Result;

/// Direction of a host request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// A logical unit of the link.  Each has its own queue of host requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Input,
    Output,
}

impl Unit {
    /// Units in the order wake passes service them.
    pub const ALL: [Unit; 2] = [Unit::Input, Unit::Output];

    pub(crate) const fn bit(self) -> u8 {
        match self {
            Unit::Input => 0x01,
            Unit::Output => 0x02,
        }
    }
}

/// A host read or write request.
///
/// The link only ever updates the processed count and the status.  The
/// request is complete once its status is [`Poll::Ready`].
#[derive(Debug)]
pub struct IoRequest<B> {
    direction: Direction,
    buffer: B,
    processed: usize,
    status: Poll<Result<()>>,
}

impl<B: AsRef<[u8]>> IoRequest<B> {
    /// Request to fill `buffer` with bytes from the peripheral.
    pub fn read(buffer: B) -> Self {
        Self::new(Direction::Read, buffer)
    }

    /// Request to send the contents of `buffer` to the peripheral.
    pub fn write(buffer: B) -> Self {
        Self::new(Direction::Write, buffer)
    }

    fn new(direction: Direction, buffer: B) -> Self {
        Self {
            direction,
            buffer,
            processed: 0,
            status: Poll::Pending,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn requested(&self) -> usize {
        self.buffer.as_ref().len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn status(&self) -> Poll<Result<()>> {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn into_buffer(self) -> B {
        self.buffer
    }
}

/// Per unit queues of pending host requests, owned by the host.
///
/// Wake passes look at the head of each unit's queue, and report requests
/// that have finished through [`RequestQueue::complete()`].  The host is
/// expected to remove the head request once it has been completed.
pub trait RequestQueue {
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;

    /// The oldest pending request for `unit`, if any.
    fn head(&mut self, unit: Unit) -> Option<&mut IoRequest<Self::Buffer>>;

    /// The head request for `unit` has finished with `result`.
    fn complete(&mut self, unit: Unit, result: Result<()>);
}

impl<P: SerialPort> Link<P> {
    /// Move as many bytes as possible between `request` and the link buffers.
    ///
    /// Returns [`Poll::Pending`] if the request could not be finished now, in
    /// which case a later wake pass will service it again.  If the link is
    /// busy, the request is left untouched.
    pub fn service<B>(&self, request: &mut IoRequest<B>) -> Poll<Result<()>>
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
    {
        let Some(mut guard) = self.locks.try_link() else {
            trace!("Link busy, {:?} request left pending", request.direction);
            return Poll::Pending;
        };

        if let Some(err) = self.failure() {
            debug!("Failing {:?} request: {err:?}", request.direction);
            request.status = Poll::Ready(Err(err));
            self.unlock(guard);
            return request.status;
        }

        let start = request.processed;
        let end = request.requested();
        let buffers = &mut self.state(&mut guard).buffers;
        let moved = match request.direction {
            Direction::Write => buffers.stage_write(&request.buffer.as_ref()[start..end]),
            Direction::Read => buffers.drain_read(&mut request.buffer.as_mut()[start..end]),
        };
        request.processed += moved;
        trace!(
            "{:?} moved {moved} bytes, {}/{end} done",
            request.direction, request.processed
        );

        request.status = if request.processed == end {
            Poll::Ready(Ok(()))
        } else {
            self.schedule.asap();
            Poll::Pending
        };
        self.unlock(guard);
        request.status
    }

    // Service the head request of one unit, completing it if finished
    pub(super) fn wake_unit<Q: RequestQueue>(&self, unit: Unit, queue: &mut Q) {
        let status = match queue.head(unit) {
            Some(request) if request.is_pending() => self.service(request),
            _ => return,
        };
        if let Poll::Ready(result) = status {
            debug!("{unit:?} request complete: {result:?}");
            queue.complete(unit, result);
        }
    }
}
