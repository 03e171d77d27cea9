//! Asynchronous transport core for a framed, polled serial peripheral.
//!
//! This crate bridges a host's queued character-I/O subsystem (requests to read
//! or write an arbitrary number of bytes) to a peripheral that only accepts
//! whole framed messages over a serial link, and only answers when polled.
//!
//! `no_std`.  The `async` feature (default) adds glue for driving a link from
//! an async transport, and requires `alloc` for async traits.
//!
//! ## Architecture
//!
//! Two execution contexts share a single [`link::Link`]:
//!
//! - **Interrupt level**: a periodic task ([`link::Link::on_timer()`] /
//!   [`link::Link::run_task()`]) and the completion handlers
//!   ([`link::Link::on_write_complete()`], [`link::Link::on_read_complete()`])
//!   which the underlying channel invokes when an issued operation finishes.
//!   These all run at the same priority and never preempt each other.
//! - **Call level**: [`link::Link::open()`], [`link::Link::service()`],
//!   [`link::Link::close()`] and the status queries, invoked by the host in
//!   response to its own requests.  These can be interrupted at any point.
//!
//! Neither context ever blocks.  The shared buffers are guarded by a try-only
//! lock: whoever fails to take it simply does nothing productive and tries
//! again at the next opportunity.  A host request that cannot be satisfied
//! immediately stays pending, and is re-serviced by a later wake pass of the
//! periodic task once data or buffer space arrives.
//!
//! On each run, the periodic task does exactly one of the following:
//! 1. flushes pending write bytes as a Request frame,
//! 2. polls the peripheral for a Reply frame, once the read buffer is empty,
//! 3. wakes pending host requests so they can make progress.
//!
//! ## Wire format
//!
//! Every frame is a fixed 8 byte header followed by a fixed size payload area
//! of [`frame::PAYLOAD_CAPACITY`] bytes:
//!
//! | Offset | Size | Field                                        |
//! |--------|------|----------------------------------------------|
//! | 0      | 4    | tag (`"FREQ"` request, `"FRPY"` reply)       |
//! | 4      | 1    | source unit                                  |
//! | 5      | 1    | reserved, zero                               |
//! | 6      | 2    | length, big-endian                           |
//! | 8      | 500  | payload                                      |
//!
//! In a Reply, the length is the _total_ number of bytes the peripheral has
//! available, which may exceed what a single frame carries.
//!
//! ## Modules
//!
//! - [`frame`] - Frame header layout and codec
//! - [`buffers`] - Write accumulation and read delivery buffers
//! - [`lock`] - Try-only locks shared by interrupt and call level code
//! - [`sched`] - Next action decision table and periodic countdown
//! - [`link`] - The link itself: periodic task, completion handlers and
//!   host request servicing
//! - [`io`] - Traits for the underlying serial channel
//! - [`futures`] - Drives a link from an async transport (feature `async`)
//!
//! ## Getting Started
//!
//! 1. Create a [`link::Link`], typically in a `static`, with a
//!    [`link::LinkConfig`]
//! 2. Attach an already opened channel implementing [`io::SerialPort`] with
//!    [`link::Link::attach()`]
//! 3. [`link::Link::open()`] each unit the host exposes
//! 4. Call [`link::Link::on_timer()`] from the host's periodic tick, passing
//!    the host's request queues as a [`link::RequestQueue`]
//! 5. Route channel completions to [`link::Link::on_write_complete()`] and
//!    [`link::Link::on_read_complete()`]
//! 6. Service each newly queued host request with [`link::Link::service()`]
//!
//! With an async transport instead, use [`futures::AsyncLinkRunner`], which
//! performs steps 4 and 5.
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the async transport glue in [`futures`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "async")]
extern crate alloc;

pub mod buffers;
pub mod frame;
#[cfg(feature = "async")]
pub mod futures;
pub mod io;
pub mod link;
pub mod lock;
pub mod sched;

/// Link errors
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No channel has been attached to the link
    NotConfigured = 1,
    /// The underlying channel reported a failure
    Io = 2,
    /// The peripheral replied with an unexpected frame tag
    WrongTag = 3,
    /// Reply frame shorter than its header claims
    ShortFrame = 4,
    /// Link is busy
    Busy = 5,
    /// Payload too large for a frame
    PayloadTooLarge = 6,
    /// Buffer too small for operation
    BufferTooSmall = 7,
}

impl Error {
    /// Framing errors are recovered by polling again, whereas transport
    /// errors stick to the link until it is reopened.
    pub const fn is_transient(self) -> bool {
        matches!(self, Error::WrongTag | Error::ShortFrame)
    }

    pub(crate) const fn code(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Error::NotConfigured),
            2 => Some(Error::Io),
            3 => Some(Error::WrongTag),
            4 => Some(Error::ShortFrame),
            5 => Some(Error::Busy),
            6 => Some(Error::PayloadTooLarge),
            7 => Some(Error::BufferTooSmall),
            _ => None,
        }
    }
}

/// Type to represent the result of a link operation
pub type Result<T> = core::result::Result<T, Error>;
