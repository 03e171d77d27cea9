//! Frame header layout and codec.
//!
//! Host to peripheral frames carry a Request tag and the number of payload
//! bytes being sent.  Peripheral to host frames carry a Reply tag and the
//! total number of bytes the peripheral has available, which may be more than
//! fits in the frame's payload area.  The surplus is fetched by later polls.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{Error, Result};

/// Size of the payload area of every frame
pub const PAYLOAD_CAPACITY: usize = 500;

/// Size of the frame header
pub const HEADER_LEN: usize = 8;

/// Total size of a frame on the wire
pub const FRAME_LEN: usize = HEADER_LEN + PAYLOAD_CAPACITY;

const TAG_OFFSET: usize = 0;
const SOURCE_OFFSET: usize = 4;
const RESERVED_OFFSET: usize = 5;
const LENGTH_OFFSET: usize = 6;

/// Offset of the payload within a frame
pub const PAYLOAD_OFFSET: usize = HEADER_LEN;

/// Frame tag, identifying the direction of the frame
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Host to peripheral
    Request = u32::from_be_bytes(*b"FREQ"),
    /// Peripheral to host
    Reply = u32::from_be_bytes(*b"FRPY"),
}

impl TryFrom<u32> for Tag {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            v if v == Tag::Request as u32 => Ok(Tag::Request),
            v if v == Tag::Reply as u32 => Ok(Tag::Reply),
            _ => Err(Error::WrongTag),
        }
    }
}

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: Tag,
    /// Logical unit that produced the frame
    pub source: u8,
    /// Request: payload bytes used.  Reply: total bytes available.
    pub length: u16,
}

impl Header {
    pub const fn request(source: u8, length: u16) -> Self {
        Self {
            tag: Tag::Request,
            source,
            length,
        }
    }

    pub const fn reply(source: u8, length: u16) -> Self {
        Self {
            tag: Tag::Reply,
            source,
            length,
        }
    }

    /// Serialize the header into the start of `out`.  The reserved byte is
    /// always written as zero.
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < HEADER_LEN {
            return Err(Error::BufferTooSmall);
        }
        out[TAG_OFFSET..SOURCE_OFFSET].copy_from_slice(&(self.tag as u32).to_be_bytes());
        out[SOURCE_OFFSET] = self.source;
        out[RESERVED_OFFSET] = 0;
        out[LENGTH_OFFSET..HEADER_LEN].copy_from_slice(&self.length.to_be_bytes());
        Ok(())
    }

    /// Parse a header from the start of `bytes`.
    ///
    /// Fails with [`Error::ShortFrame`] if there is not a whole header, and
    /// [`Error::WrongTag`] if the tag is not one we know.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::ShortFrame);
        }
        let tag = u32::from_be_bytes([
            bytes[TAG_OFFSET],
            bytes[TAG_OFFSET + 1],
            bytes[TAG_OFFSET + 2],
            bytes[TAG_OFFSET + 3],
        ]);
        let length = u16::from_be_bytes([bytes[LENGTH_OFFSET], bytes[LENGTH_OFFSET + 1]]);
        Ok(Self {
            tag: Tag::try_from(tag)?,
            source: bytes[SOURCE_OFFSET],
            length,
        })
    }
}

/// A decoded Reply frame, borrowing its payload from the received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    pub source: u8,
    /// Total bytes the peripheral reported as available
    pub total: u16,
    /// Payload bytes carried by this frame, `buffered()` long
    pub payload: &'a [u8],
}

impl Reply<'_> {
    /// Bytes carried by this frame.
    pub fn buffered(&self) -> usize {
        (self.total as usize).min(PAYLOAD_CAPACITY)
    }

    /// Bytes available on the peripheral beyond this frame.
    pub fn overflow(&self) -> usize {
        self.total as usize - self.buffered()
    }
}

/// Stamp a Request header onto `frame`, whose payload area already holds
/// `length` bytes to send.
pub fn encode_request(frame: &mut [u8; FRAME_LEN], source: u8, length: usize) -> Result<()> {
    if length > PAYLOAD_CAPACITY {
        return Err(Error::PayloadTooLarge);
    }
    Header::request(source, length as u16).write_to(frame)
}

/// Decode a frame received from the peripheral.
///
/// A frame with any tag but Reply is rejected with [`Error::WrongTag`] and must
/// be discarded.  `bytes` may be longer than the frame's meaningful content
/// (a fixed size payload area is normally received in full).
pub fn decode_reply(bytes: &[u8]) -> Result<Reply<'_>> {
    let header = Header::parse(bytes)?;
    if header.tag != Tag::Reply {
        return Err(Error::WrongTag);
    }

    let buffered = (header.length as usize).min(PAYLOAD_CAPACITY);
    let end = PAYLOAD_OFFSET + buffered;
    if bytes.len() < end {
        debug!(
            "Reply claims {} bytes, frame only has {}",
            buffered,
            bytes.len() - PAYLOAD_OFFSET
        );
        return Err(Error::ShortFrame);
    }

    Ok(Reply {
        source: header.source,
        total: header.length,
        payload: &bytes[PAYLOAD_OFFSET..end],
    })
}

/// Build a Reply frame, as the peripheral would.  Used by simulators and
/// tests.
///
/// `payload` is the part of `total` carried in this frame, so must be exactly
/// `min(total, PAYLOAD_CAPACITY)` bytes.  A larger `total` reports more data
/// is available.  Returns the number of meaningful bytes in `frame`.
///
/// # Errors
///
/// [`Error::PayloadTooLarge`] if `payload` is longer than that, and
/// [`Error::ShortFrame`] if it is shorter, as the frame would then fail to
/// decode.
pub fn encode_reply(
    frame: &mut [u8; FRAME_LEN],
    source: u8,
    total: u16,
    payload: &[u8],
) -> Result<usize> {
    let carried = (total as usize).min(PAYLOAD_CAPACITY);
    if payload.len() > carried {
        return Err(Error::PayloadTooLarge);
    }
    if payload.len() < carried {
        return Err(Error::ShortFrame);
    }
    Header::reply(source, total).write_to(frame)?;
    frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    Ok(PAYLOAD_OFFSET + payload.len())
}
