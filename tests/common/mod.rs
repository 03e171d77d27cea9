// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Shared test doubles: a recording serial port, a simulated peripheral and
//! host request queues.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::task::Poll;

use fuji_link::Result;
use fuji_link::frame::{FRAME_LEN, Header, PAYLOAD_CAPACITY, PAYLOAD_OFFSET, encode_reply};
use fuji_link::io::SerialPort;
use fuji_link::link::{IoRequest, Link, LinkConfig, RequestQueue, Unit};

/// An operation issued to the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Write(Vec<u8>),
    Read,
}

/// Records issued operations.  Completions are delivered by the test.
#[derive(Default)]
pub struct Wire {
    ops: RefCell<Vec<Op>>,
}

impl Wire {
    pub fn take(&self) -> Vec<Op> {
        self.ops.take()
    }

    pub fn is_idle(&self) -> bool {
        self.ops.borrow().is_empty()
    }
}

impl SerialPort for &Wire {
    fn issue_write(&mut self, frame: &[u8]) {
        self.ops.borrow_mut().push(Op::Write(frame.to_vec()));
    }

    fn issue_read(&mut self) {
        self.ops.borrow_mut().push(Op::Read);
    }
}

pub fn reply_frame(total: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = [0u8; FRAME_LEN];
    encode_reply(&mut frame, 0, total, payload).unwrap();
    frame.to_vec()
}

/// Payload carried by a Request frame.
pub fn request_payload(frame: &[u8]) -> &[u8] {
    let header = Header::parse(frame).unwrap();
    &frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + header.length as usize]
}

pub fn open_link(wire: &Wire, config: LinkConfig) -> Link<&Wire> {
    let link = Link::new(config);
    link.attach(wire).unwrap();
    link.open(Unit::Input).unwrap();
    link.open(Unit::Output).unwrap();
    link
}

/// Simulated peripheral.  Keeps everything the host sent, and replies with
/// whatever is in its outbox.
#[derive(Default)]
pub struct Peer {
    pub received: Vec<u8>,
    pub outbox: VecDeque<u8>,
    pub writes: usize,
    pub reads: usize,
}

impl Peer {
    pub fn reply(&mut self) -> Vec<u8> {
        let total = self.outbox.len().min(u16::MAX as usize);
        let sent = total.min(PAYLOAD_CAPACITY);
        let payload: Vec<u8> = self.outbox.drain(..sent).collect();
        reply_frame(total as u16, &payload)
    }

    /// Complete every operation the link issues, including chained ones.
    pub fn serve(&mut self, link: &Link<&Wire>, wire: &Wire) {
        loop {
            let ops = wire.take();
            if ops.is_empty() {
                break;
            }
            for op in ops {
                match op {
                    Op::Write(frame) => {
                        self.writes += 1;
                        self.received.extend_from_slice(request_payload(&frame));
                        link.on_write_complete(Ok(()));
                    }
                    Op::Read => {
                        self.reads += 1;
                        let reply = self.reply();
                        link.on_read_complete(Ok(&reply)).unwrap();
                    }
                }
            }
        }
    }
}

/// Host side per unit request queues.
#[derive(Default)]
pub struct Queues {
    input: VecDeque<IoRequest<Vec<u8>>>,
    output: VecDeque<IoRequest<Vec<u8>>>,
    pub done: Vec<(Unit, IoRequest<Vec<u8>>)>,
}

impl Queues {
    fn queue(&mut self, unit: Unit) -> &mut VecDeque<IoRequest<Vec<u8>>> {
        match unit {
            Unit::Input => &mut self.input,
            Unit::Output => &mut self.output,
        }
    }

    /// Queue a request, servicing it straight away if it is first in line.
    pub fn submit<P: SerialPort>(
        &mut self,
        link: &Link<P>,
        unit: Unit,
        mut request: IoRequest<Vec<u8>>,
    ) -> Poll<Result<()>> {
        if !self.queue(unit).is_empty() {
            self.queue(unit).push_back(request);
            return Poll::Pending;
        }
        let status = link.service(&mut request);
        if status.is_ready() {
            self.done.push((unit, request));
        } else {
            self.queue(unit).push_back(request);
        }
        status
    }

    pub fn pending(&self, unit: Unit) -> usize {
        match unit {
            Unit::Input => self.input.len(),
            Unit::Output => self.output.len(),
        }
    }

    pub fn peek(&self, unit: Unit) -> Option<&IoRequest<Vec<u8>>> {
        match unit {
            Unit::Input => self.input.front(),
            Unit::Output => self.output.front(),
        }
    }

    pub fn completed(&self, unit: Unit) -> Vec<&IoRequest<Vec<u8>>> {
        self.done
            .iter()
            .filter(|(u, _)| *u == unit)
            .map(|(_, request)| request)
            .collect()
    }
}

impl RequestQueue for Queues {
    type Buffer = Vec<u8>;

    fn head(&mut self, unit: Unit) -> Option<&mut IoRequest<Vec<u8>>> {
        self.queue(unit).front_mut()
    }

    fn complete(&mut self, unit: Unit, result: Result<()>) {
        if let Some(request) = self.queue(unit).pop_front() {
            assert_eq!(request.status(), Poll::Ready(result));
            self.done.push((unit, request));
        }
    }
}
