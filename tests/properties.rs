// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Property tests for buffer accounting, locking and byte ordering.

mod common;

use common::{Peer, Queues, Wire, open_link, reply_frame};
use fuji_link::buffers::LinkBuffers;
use fuji_link::frame::{PAYLOAD_CAPACITY, PAYLOAD_OFFSET, decode_reply};
use fuji_link::link::{IoRequest, Link, LinkConfig, Unit};
use fuji_link::lock::TryLock;
use proptest::prelude::*;

fn arb_chunks(max_len: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..max_len), 0..10)
}

// Run the link until `finished`, with the peer completing every operation
fn pump(
    link: &Link<&Wire>,
    wire: &Wire,
    peer: &mut Peer,
    queues: &mut Queues,
    finished: impl Fn(&Queues) -> bool,
) {
    for _ in 0..1000 {
        if finished(queues) {
            return;
        }
        link.run_task(queues);
        peer.serve(link, wire);
    }
    panic!("link made no progress");
}

proptest! {
    #[test]
    fn staged_writes_keep_order(chunks in arb_chunks(120)) {
        let mut buffers = LinkBuffers::new();
        let mut expected = Vec::new();
        for chunk in &chunks {
            let accepted = buffers.stage_write(chunk);
            prop_assert!(accepted <= chunk.len());
            expected.extend_from_slice(&chunk[..accepted]);
        }

        let all: Vec<u8> = chunks.concat();
        let staged = all.len().min(PAYLOAD_CAPACITY);
        prop_assert_eq!(&expected[..], &all[..staged]);
        prop_assert_eq!(buffers.write_pos(), staged);

        let frame = buffers.encode_pending(0).unwrap();
        prop_assert_eq!(&frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + staged], &all[..staged]);
    }

    #[test]
    fn reply_total_is_split_exactly(total in any::<u16>()) {
        let payload = vec![0x5A; (total as usize).min(PAYLOAD_CAPACITY)];
        let frame = reply_frame(total, &payload);
        let mut buffers = LinkBuffers::new();
        buffers.load_reply(&decode_reply(&frame).unwrap());

        prop_assert_eq!(buffers.read_left() + buffers.read_avail(), total as usize);
        prop_assert!(buffers.read_left() <= PAYLOAD_CAPACITY);
    }

    #[test]
    fn drain_never_overreads(total in any::<u16>(), reads in prop::collection::vec(0usize..200, 0..20)) {
        let payload = vec![0xA5; (total as usize).min(PAYLOAD_CAPACITY)];
        let frame = reply_frame(total, &payload);
        let mut buffers = LinkBuffers::new();
        buffers.load_reply(&decode_reply(&frame).unwrap());

        for len in reads {
            let before = buffers.read_left();
            let mut out = vec![0u8; len];
            let delivered = buffers.drain_read(&mut out);
            prop_assert!(delivered <= before);
            prop_assert_eq!(delivered, len.min(before));
            prop_assert!(buffers.read_pos() + buffers.read_left() <= PAYLOAD_CAPACITY);
        }
    }

    #[test]
    fn lock_has_one_owner(ops in prop::collection::vec(any::<bool>(), 0..50)) {
        let lock = TryLock::new();
        let mut held = false;
        for acquire in ops {
            if acquire {
                prop_assert_eq!(lock.try_acquire(), !held);
                held = true;
            } else {
                lock.release();
                held = false;
            }
            prop_assert_eq!(lock.is_locked(), held);
        }
    }

    #[test]
    fn written_bytes_arrive_in_order(chunks in arb_chunks(1200)) {
        let wire = Wire::default();
        let link = open_link(&wire, LinkConfig::DEFAULT);
        let mut peer = Peer::default();
        let mut queues = Queues::default();

        for chunk in &chunks {
            let _ = queues.submit(&link, Unit::Output, IoRequest::write(chunk.clone()));
        }
        pump(&link, &wire, &mut peer, &mut queues, |queues| {
            queues.pending(Unit::Output) == 0 && link.status().write_pending == 0
        });

        prop_assert_eq!(peer.received, chunks.concat());
        prop_assert_eq!(link.stats().bytes_written as usize, chunks.iter().map(Vec::len).sum::<usize>());
    }

    #[test]
    fn read_bytes_arrive_in_order(sizes in prop::collection::vec(0usize..1200, 0..10)) {
        let wire = Wire::default();
        let link = open_link(&wire, LinkConfig::DEFAULT);
        let mut peer = Peer::default();
        let mut queues = Queues::default();

        let total: usize = sizes.iter().sum();
        let data: Vec<u8> = (0..total).map(|i| (i * 7 % 256) as u8).collect();
        peer.outbox.extend(&data);

        for &size in &sizes {
            let _ = queues.submit(&link, Unit::Input, IoRequest::read(vec![0u8; size]));
        }
        pump(&link, &wire, &mut peer, &mut queues, |queues| queues.pending(Unit::Input) == 0);

        let received: Vec<u8> = queues
            .completed(Unit::Input)
            .iter()
            .flat_map(|request| request.buffer().clone())
            .collect();
        prop_assert_eq!(received, data);
    }
}
