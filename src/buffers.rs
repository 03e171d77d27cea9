//! Write accumulation and read delivery buffers.
//!
//! Host bytes are staged directly into the payload area of the outgoing frame,
//! so flushing only needs the header stamped.  Received payload is copied out
//! of the incoming frame and delivered to the host from a cursor.
//!
//! These are plain data with no locking of their own.  Within a
//! [`crate::link::Link`] they can only be reached through a
//! [`crate::lock::LinkGuard`], i.e. while holding the link lock.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use crate::frame::{self, FRAME_LEN, PAYLOAD_CAPACITY, PAYLOAD_OFFSET, Reply};
use crate::Result;

/// Buffers and cursors for one link.
pub struct LinkBuffers {
    // Outgoing frame, header stamped on flush
    tx: [u8; FRAME_LEN],
    write_pos: usize,

    rx: [u8; PAYLOAD_CAPACITY],
    read_pos: usize,
    read_left: usize,
    read_avail: usize,

    bytes_read: u32,
    bytes_written: u32,
}

impl LinkBuffers {
    pub const fn new() -> Self {
        Self {
            tx: [0; FRAME_LEN],
            write_pos: 0,
            rx: [0; PAYLOAD_CAPACITY],
            read_pos: 0,
            read_left: 0,
            read_avail: 0,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Copy as many of `bytes` as fit into the pending write frame.
    ///
    /// Returns the number of bytes accepted, which may be fewer than offered.
    /// The caller must offer the rest again once the frame has been flushed.
    pub fn stage_write(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.write_space());
        if accepted > 0 {
            let start = PAYLOAD_OFFSET + self.write_pos;
            self.tx[start..start + accepted].copy_from_slice(&bytes[..accepted]);
            self.write_pos += accepted;
            self.bytes_written = self.bytes_written.wrapping_add(accepted as u32);
        }
        accepted
    }

    /// Copy up to `out.len()` received bytes into `out`.
    ///
    /// Returns the number of bytes delivered, never more than
    /// [`Self::read_left()`].
    pub fn drain_read(&mut self, out: &mut [u8]) -> usize {
        let delivered = out.len().min(self.read_left);
        if delivered > 0 {
            out[..delivered].copy_from_slice(&self.rx[self.read_pos..self.read_pos + delivered]);
            self.read_pos += delivered;
            self.read_left -= delivered;
            self.bytes_read = self.bytes_read.wrapping_add(delivered as u32);
        }
        delivered
    }

    /// The pending write frame has been sent.
    pub fn reset_after_flush(&mut self) {
        self.write_pos = 0;
    }

    /// Replace the read buffer with a freshly received reply.
    ///
    /// Bytes the peripheral reported beyond the frame's capacity are recorded
    /// as available but not yet fetched.
    pub fn load_reply(&mut self, reply: &Reply<'_>) {
        let buffered = reply.buffered().min(reply.payload.len());
        self.rx[..buffered].copy_from_slice(&reply.payload[..buffered]);
        self.read_pos = 0;
        self.read_left = buffered;
        self.read_avail = reply.total as usize - buffered;
    }

    /// Stamp the Request header onto the pending write frame and return the
    /// complete frame for transmission.
    pub fn encode_pending(&mut self, source: u8) -> Result<&[u8]> {
        frame::encode_request(&mut self.tx, source, self.write_pos)?;
        Ok(&self.tx[..])
    }

    /// Bytes staged and waiting to be flushed.
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Room left in the pending write frame.
    pub fn write_space(&self) -> usize {
        PAYLOAD_CAPACITY - self.write_pos
    }

    /// Offset of the next undelivered byte in the read buffer.
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Received bytes not yet delivered to the host.
    pub fn read_left(&self) -> usize {
        self.read_left
    }

    /// Bytes the peripheral holds beyond those in the read buffer.
    pub fn read_avail(&self) -> usize {
        self.read_avail
    }

    /// Total bytes delivered to the host.
    pub fn bytes_read(&self) -> u32 {
        self.bytes_read
    }

    /// Total bytes accepted from the host.
    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }
}

impl Default for LinkBuffers {
    fn default() -> Self {
        Self::new()
    }
}
