//! Driving a link over an async transport.
//!
//! The link itself only knows issue-and-complete channels.  This module
//! bridges it to an async transport: [`DeferredPort`] records the operation
//! the link asks for, and [`AsyncLinkRunner`] performs it with an
//! [`AsyncLinkIo`] and feeds the outcome back to the link's completion
//! handlers.
//!
//! Example:
//!
//! ```rust,ignore
//! use fuji_link::futures::{AsyncDelay, AsyncLinkRunner, DeferredPort, SerialLinkIo};
//! use fuji_link::link::{Link, LinkConfig, Unit};
//!
//! let link = Link::new(LinkConfig::DEFAULT);
//! let port = DeferredPort::new();
//! let mut serial = ...; // implement AsyncSerial
//! let mut runner =
//!     AsyncLinkRunner::<_, Delay>::new(&link, &port, SerialLinkIo::new(&mut serial))?;
//! link.open(Unit::Input)?;
//! runner.run_until(&mut queue, |queue| queue.is_empty()).await;
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use async_trait::async_trait;
use core::cell::{Cell, RefCell};
use core::marker::PhantomData;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::frame::FRAME_LEN;
use crate::io::{AsyncSerial, SerialPort};
use crate::link::{Link, RequestQueue};
use crate::{Error, Result};

/// Frame level access to the peripheral, async version.
#[async_trait(?Send)]
pub trait AsyncLinkIo {
    /// Send one complete frame
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Receive one frame into `buf`, returning its length
    async fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// [`AsyncLinkIo`] over any [`AsyncSerial`] transport.
pub struct SerialLinkIo<'a, S: AsyncSerial> {
    serial: &'a mut S,
}

impl<'a, S: AsyncSerial> SerialLinkIo<'a, S> {
    pub fn new(serial: &'a mut S) -> Self {
        Self { serial }
    }
}

#[async_trait(?Send)]
impl<'a, S: AsyncSerial> AsyncLinkIo for SerialLinkIo<'a, S> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.serial.write(frame).await.map_err(|e| {
            warn!("Serial write failed: {e:?}");
            Error::Io
        })
    }

    async fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.serial.read(buf).await.map_err(|e| {
            warn!("Serial read failed: {e:?}");
            Error::Io
        })
    }
}

/// Yield delay between runner steps.
///
/// Application must provide an implementation of this trait, typically
/// delaying for one system tick.  This keeps `fuji-link` free of any specific
/// async runtime.
///
/// Example:
///
/// ```rust,ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay() {
///         Timer::after(Duration::from_millis(1)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay() -> impl Future<Output = ()>;
}

/// An operation the link has asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOp {
    /// Send the first `len` bytes of the recorded frame
    Write(usize),
    Read,
}

/// A [`SerialPort`] which records operations instead of performing them.
pub struct DeferredPort {
    op: Cell<Option<PortOp>>,
    tx: RefCell<[u8; FRAME_LEN]>,
}

impl DeferredPort {
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            op: Cell::new(None),
            tx: RefCell::new([0; FRAME_LEN]),
        }
    }

    /// Take the recorded operation, if any.  For a write, the frame is
    /// copied into `frame`.
    pub fn take(&self, frame: &mut [u8; FRAME_LEN]) -> Option<PortOp> {
        let op = self.op.take();
        if let Some(PortOp::Write(len)) = op {
            frame[..len].copy_from_slice(&self.tx.borrow()[..len]);
        }
        op
    }
}

impl SerialPort for &DeferredPort {
    fn issue_write(&mut self, frame: &[u8]) {
        let len = frame.len().min(FRAME_LEN);
        self.tx.borrow_mut()[..len].copy_from_slice(&frame[..len]);
        self.op.set(Some(PortOp::Write(len)));
    }

    fn issue_read(&mut self) {
        self.op.set(Some(PortOp::Read));
    }
}

/// Runs a link's periodic task and channel operations over an
/// [`AsyncLinkIo`].
///
/// See [`AsyncDelay`] for required delay trait.
pub struct AsyncLinkRunner<'l, 'p, I: AsyncLinkIo, D: AsyncDelay> {
    link: &'l Link<&'p DeferredPort>,
    port: &'p DeferredPort,
    io: I,
    frame: [u8; FRAME_LEN],
    _delay: PhantomData<D>,
}

impl<'l, 'p, I: AsyncLinkIo, D: AsyncDelay> AsyncLinkRunner<'l, 'p, I, D> {
    /// Create a runner, attaching `port` to `link`.
    ///
    /// Arguments:
    /// - `link` - The link to drive
    /// - `port` - Records the operations `link` asks for
    /// - `io` - Performs those operations
    pub fn new(link: &'l Link<&'p DeferredPort>, port: &'p DeferredPort, io: I) -> Result<Self> {
        link.attach(port)?;
        Ok(Self {
            link,
            port,
            io,
            frame: [0; FRAME_LEN],
            _delay: PhantomData,
        })
    }

    /// One system tick: run the periodic task if due, then perform whatever
    /// channel operations it started, including any chained by completions.
    ///
    /// Returns the first failed operation's error.  The link has recorded it
    /// already, so it is informational.
    pub async fn step<Q: RequestQueue>(&mut self, queue: &mut Q) -> Result<()> {
        self.link.on_timer(queue);

        let mut outcome = Ok(());
        while let Some(op) = self.port.take(&mut self.frame) {
            let result = match op {
                PortOp::Write(len) => {
                    trace!("Writing {len} byte frame");
                    let result = self.io.write_frame(&self.frame[..len]).await;
                    self.link.on_write_complete(result);
                    result
                }
                PortOp::Read => {
                    let result = self.io.read_frame(&mut self.frame).await;
                    let received = result.and_then(|len| self.frame.get(..len).ok_or(Error::Io));
                    self.link.on_read_complete(received)
                }
            };
            outcome = outcome.and(result);
        }
        outcome
    }

    /// Step the link, delaying between steps, until `done` returns true.
    pub async fn run_until<Q, F>(&mut self, queue: &mut Q, mut done: F)
    where
        Q: RequestQueue,
        F: FnMut(&mut Q) -> bool,
    {
        loop {
            if let Err(e) = self.step(queue).await {
                debug!("Link step failed: {e:?}");
            }
            if done(queue) {
                break;
            }
            D::delay().await;
        }
    }

    pub fn link(&self) -> &'l Link<&'p DeferredPort> {
        self.link
    }
}
