//! Traits for the serial channel underneath a link.
//!
//! A link never performs I/O itself.  It asks the channel to start an
//! operation, and the channel later reports the outcome, one completion per
//! operation.  Two shapes of channel are supported:
//!
//! - [`SerialPort`] - issue-and-complete, as found with interrupt or DMA driven
//!   UARTs.  The channel calls [`crate::link::Link::on_write_complete()`] or
//!   [`crate::link::Link::on_read_complete()`] when the operation finishes.
//! - [`AsyncSerial`] - a plain async byte transport, such as a USB CDC or host
//!   serial port.  Wrap it in [`crate::futures::SerialLinkIo`] and drive the
//!   link with [`crate::futures::AsyncLinkRunner`].
//!
//! The peripheral and the serial link are assumed to already be configured
//! (baud rate, handshaking, etc.) by the time the channel is handed to the
//! link.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Issue-and-complete serial channel.
///
/// At most one operation is ever outstanding on a link, so an implementation
/// only needs to track a single operation.
///
/// Completion is normally delivered later, from the channel's interrupt or
/// from whatever drives the channel.  It may also arrive, from another
/// context, while these calls are still running.  The link keeps its lock
/// until the call returns, so a write completion is held over and handled
/// then, while [`crate::link::Link::on_read_complete()`] returns
/// [`crate::Error::Busy`] and must be delivered again.
pub trait SerialPort {
    /// Start sending `frame`, a complete wire frame.
    ///
    /// `frame` is only borrowed for the duration of this call, so the
    /// implementation must copy it if the transmission outlives the call.
    fn issue_write(&mut self, frame: &[u8]);

    /// Start receiving one frame from the peripheral.  The received bytes are
    /// passed to [`crate::link::Link::on_read_complete()`].
    fn issue_read(&mut self);
}

/// Async serial byte transport.
pub trait AsyncSerial {
    /// The error type returned by the transport.
    ///
    /// This allows implementations to use their own error types (e.g.
    /// `std::io::Error` for a host serial port).  The link only distinguishes
    /// success from failure.
    type Error: core::fmt::Debug;

    /// Write all of `data` to the peripheral.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport fails, or the peripheral
    /// stops accepting data.
    fn write(
        &mut self,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + Send;

    /// Read one frame's worth of data into `buf`, returning the number of
    /// bytes received.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport fails, or times out
    /// waiting for the peripheral.
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<usize, Self::Error>> + Send;
}
