// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Completions delivered from another thread while the link is still issuing
//! the operation they complete.

mod common;

use std::sync::Mutex;
use std::task::Poll;
use std::thread;

use common::{Queues, reply_frame};
use fuji_link::io::SerialPort;
use fuji_link::link::{IoRequest, Link, LinkConfig, Unit};
use fuji_link::{Error, Result};

#[derive(Debug, PartialEq, Eq)]
enum Event {
    Serviced(Poll<Result<()>>, usize),
    ReadDelivered(Result<()>),
}

static EVENTS: Mutex<Vec<Event>> = Mutex::new(Vec::new());

static LINK: Link<Hasty> = Link::new(LinkConfig::DEFAULT);

/// Port whose operations complete on another thread before `issue_*`
/// returns.  The first write fails, later ones succeed.
#[derive(Default)]
struct Hasty {
    writes: usize,
}

impl SerialPort for Hasty {
    fn issue_write(&mut self, _frame: &[u8]) {
        self.writes += 1;
        let result = if self.writes == 1 { Err(Error::Io) } else { Ok(()) };
        thread::scope(|s| {
            s.spawn(|| {
                LINK.on_write_complete(result);
                if result.is_err() {
                    LINK.open(Unit::Output).unwrap();
                    let mut request = IoRequest::write(b"intruder".to_vec());
                    let status = LINK.service(&mut request);
                    EVENTS
                        .lock()
                        .unwrap()
                        .push(Event::Serviced(status, request.processed()));
                }
            });
        });
    }

    fn issue_read(&mut self) {
        thread::scope(|s| {
            s.spawn(|| {
                let reply = reply_frame(3, b"abc");
                let outcome = LINK.on_read_complete(Ok(&reply));
                EVENTS.lock().unwrap().push(Event::ReadDelivered(outcome));
            });
        });
    }
}

#[test]
fn completion_during_issue_waits_for_the_issuer() {
    LINK.attach(Hasty::default()).unwrap();
    LINK.open(Unit::Input).unwrap();
    LINK.open(Unit::Output).unwrap();
    let mut queues = Queues::default();

    let mut hello = IoRequest::write(b"hello".to_vec());
    assert_eq!(LINK.service(&mut hello), Poll::Ready(Ok(())));

    // The failed write is held over, and the link lock stays with the issuer
    LINK.run_task(&mut queues);
    assert_eq!(
        EVENTS.lock().unwrap().as_slice(),
        [Event::Serviced(Poll::Pending, 0)]
    );
    let status = LINK.status();
    assert_eq!(status.result, Err(Error::Io));
    assert!(!status.in_flight);
    assert!(!status.busy);
    assert_eq!(status.write_pending, 5);

    // A held over success still chains the poll, whose early completion is
    // refused
    LINK.open(Unit::Output).unwrap();
    LINK.run_task(&mut queues);
    assert_eq!(
        EVENTS.lock().unwrap().last(),
        Some(&Event::ReadDelivered(Err(Error::Busy)))
    );
    let status = LINK.status();
    assert_eq!(status.result, Ok(()));
    assert!(status.in_flight);
    assert!(status.busy);
    assert_eq!(status.write_pending, 0);

    // Delivered again once the issue has returned
    let reply = reply_frame(3, b"abc");
    assert_eq!(LINK.on_read_complete(Ok(&reply)), Ok(()));
    assert_eq!(LINK.bytes_available(), 3);
    assert!(!LINK.status().busy);
}
