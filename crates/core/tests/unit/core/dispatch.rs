//! Dispatch Queue Unit Tests.
//!
//! Verifies the bounded byte ring buffer carrying decoded records from
//! decoder to executor: FIFO ordering, the `can_insert`/`push` contract,
//! the header-peek routing path, and the size-mismatch corruption guard.
//!
//! The ring-buffer invariant — `bytes_used() + bytes_free() == capacity`
//! at every observation point, and pop never returning more bytes than
//! were pushed — is exercised with a property test against a model queue.

use std::collections::VecDeque;

use proptest::prelude::*;

use m64k_core::core::dispatch::{DispatchQueue, HEADER_LEN};

// ──────────────────────────────────────────────────────────
// Basic contract
// ──────────────────────────────────────────────────────────

#[test]
fn push_peek_pop_round_trip() {
    let q = DispatchQueue::new(64);
    q.push(0, &[1, 2, 3, 4]).unwrap();

    let header = q.peek().expect("entry queued");
    assert_eq!(header.len, 4);
    assert_eq!(header.tag, 0);

    // Peek does not consume.
    assert_eq!(q.bytes_used(), HEADER_LEN + 4);

    let (header, payload) = q.pop(4).unwrap();
    assert_eq!(header.tag, 0);
    assert_eq!(payload, vec![1, 2, 3, 4]);
    assert_eq!(q.bytes_used(), 0);
}

#[test]
fn fifo_ordering_is_program_order() {
    let q = DispatchQueue::new(64);
    q.push(0, &[0xAA]).unwrap();
    q.push(0xF1, &[0xBB, 0xCC]).unwrap();

    let (h, p) = q.pop(1).unwrap();
    assert_eq!((h.tag, p), (0, vec![0xAA]));
    let (h, p) = q.pop(2).unwrap();
    assert_eq!((h.tag, p), (0xF1, vec![0xBB, 0xCC]));
}

#[test]
fn push_fails_when_full_and_queue_is_untouched() {
    let q = DispatchQueue::new(16);
    q.push(0, &[0; 8]).unwrap(); // 11 bytes used
    assert!(!q.can_insert(8));
    assert!(q.push(0, &[0; 8]).is_err());

    // The failed push changed nothing.
    assert_eq!(q.bytes_used(), HEADER_LEN + 8);
    let (_, payload) = q.pop(8).unwrap();
    assert_eq!(payload, vec![0; 8]);
}

#[test]
fn pop_with_wrong_size_is_rejected_and_entry_survives() {
    let q = DispatchQueue::new(64);
    q.push(0, &[9, 9, 9]).unwrap();

    assert!(q.pop(5).is_err(), "size mismatch must be rejected");

    // The corruption guard leaves the entry intact for diagnosis.
    let (header, payload) = q.pop(3).unwrap();
    assert_eq!(header.len, 3);
    assert_eq!(payload, vec![9, 9, 9]);
}

#[test]
fn pop_on_empty_queue_fails() {
    let q = DispatchQueue::new(16);
    assert!(q.peek().is_none());
    assert!(q.pop(0).is_err());
}

#[test]
fn clear_discards_everything() {
    let q = DispatchQueue::new(64);
    q.push(0, &[1]).unwrap();
    q.push(0, &[2]).unwrap();
    q.clear();
    assert_eq!(q.bytes_used(), 0);
    assert!(q.peek().is_none());
}

#[test]
fn wrap_around_preserves_payloads() {
    let q = DispatchQueue::new(16);
    // Cycle enough entries that head wraps the 16-byte buffer repeatedly.
    for i in 0..32u8 {
        q.push(0, &[i, i ^ 0xFF]).unwrap();
        let (_, payload) = q.pop(2).unwrap();
        assert_eq!(payload, vec![i, i ^ 0xFF]);
    }
}

// ──────────────────────────────────────────────────────────
// Ring-buffer invariant (property)
// ──────────────────────────────────────────────────────────

proptest! {
    /// For all push/pop sequences respecting `can_insert`:
    /// used + free == capacity at every observation point, and every pop
    /// returns exactly the bytes that were pushed.
    #[test]
    fn used_plus_free_is_capacity(ops in proptest::collection::vec(0usize..24, 1..80)) {
        let q = DispatchQueue::new(96);
        let mut model: VecDeque<(u8, Vec<u8>)> = VecDeque::new();

        for (i, &len) in ops.iter().enumerate() {
            let tag = (i % 7) as u8;
            let payload: Vec<u8> = (0..len).map(|b| (b as u8).wrapping_mul(31).wrapping_add(i as u8)).collect();

            if q.can_insert(len) {
                q.push(tag, &payload).unwrap();
                model.push_back((tag, payload));
            } else {
                prop_assert!(q.push(tag, &payload).is_err());
                // Drain one entry to make progress.
                if let Some((expect_tag, expect_payload)) = model.pop_front() {
                    let (header, got) = q.pop(expect_payload.len()).unwrap();
                    prop_assert_eq!(header.tag, expect_tag);
                    prop_assert_eq!(got, expect_payload);
                }
            }
            prop_assert_eq!(q.bytes_used() + q.bytes_free(), q.capacity());
        }

        // Drain the remainder in FIFO order.
        while let Some((expect_tag, expect_payload)) = model.pop_front() {
            let (header, got) = q.pop(expect_payload.len()).unwrap();
            prop_assert_eq!(header.tag, expect_tag);
            prop_assert_eq!(got, expect_payload);
            prop_assert_eq!(q.bytes_used() + q.bytes_free(), q.capacity());
        }
        prop_assert!(q.peek().is_none());
    }
}
