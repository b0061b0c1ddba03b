//! Dispatch queue between decoder and executor.
//!
//! A bounded byte ring buffer guarded by a mutual-exclusion lock; with the
//! coherent bus's subscriber list, this is the only state shared between
//! concurrent actors. Entries are a 3-byte header (payload length, then an
//! instruction-set tag) followed by the payload. The queue provides FIFO
//! ordering — program order of decoded instructions — and finite capacity,
//! so decode stalls while it is full.
//!
//! Contract: check `can_insert` (or tolerate a `Full` failure) before
//! `push`; `peek` reads the header without consuming so the consumer can
//! route the entry to the right execution unit; `pop` fails when the
//! declared size does not match what the consumer requested, guarding
//! against corruption.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::common::error::QueueError;

/// Size of an entry header: payload length (u16, little-endian) + tag (u8).
pub const HEADER_LEN: usize = 3;

/// Entry header as read by `peek`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueHeader {
    /// Payload length in bytes.
    pub len: usize,
    /// Instruction-set tag: [`crate::isa::operand::TAG_ROOT`] for the root
    /// set, otherwise the extension opcode byte.
    pub tag: u8,
}

#[derive(Debug)]
struct Ring {
    buf: Vec<u8>,
    head: usize,
    used: usize,
}

impl Ring {
    fn byte(&self, logical: usize) -> u8 {
        self.buf[(self.head + logical) % self.buf.len()]
    }

    fn push_byte(&mut self, b: u8) {
        let tail = (self.head + self.used) % self.buf.len();
        self.buf[tail] = b;
        self.used += 1;
    }

    fn pop_byte(&mut self) -> u8 {
        let b = self.buf[self.head];
        self.head = (self.head + 1) % self.buf.len();
        self.used -= 1;
        b
    }
}

/// The bounded, mutex-guarded dispatch queue.
#[derive(Debug)]
pub struct DispatchQueue {
    inner: Mutex<Ring>,
}

fn lock(inner: &Mutex<Ring>) -> MutexGuard<'_, Ring> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DispatchQueue {
    /// Creates a queue with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Ring {
                buf: vec![0; capacity],
                head: 0,
                used: 0,
            }),
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        lock(&self.inner).buf.len()
    }

    /// Bytes currently queued (headers included).
    pub fn bytes_used(&self) -> usize {
        lock(&self.inner).used
    }

    /// Bytes currently free.
    pub fn bytes_free(&self) -> usize {
        let ring = lock(&self.inner);
        ring.buf.len() - ring.used
    }

    /// Returns whether an entry with `payload_len` bytes would fit.
    pub fn can_insert(&self, payload_len: usize) -> bool {
        self.bytes_free() >= HEADER_LEN + payload_len
    }

    /// Appends an entry (header then payload).
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] if the entry does not fit; the queue is left
    /// untouched.
    pub fn push(&self, tag: u8, payload: &[u8]) -> Result<(), QueueError> {
        let mut ring = lock(&self.inner);
        let need = HEADER_LEN + payload.len();
        let free = ring.buf.len() - ring.used;
        if need > free {
            return Err(QueueError::Full { need, free });
        }
        let len = payload.len() as u16;
        ring.push_byte(len as u8);
        ring.push_byte((len >> 8) as u8);
        ring.push_byte(tag);
        for &b in payload {
            ring.push_byte(b);
        }
        Ok(())
    }

    /// Reads the header of the oldest entry without consuming it.
    pub fn peek(&self) -> Option<QueueHeader> {
        let ring = lock(&self.inner);
        if ring.used < HEADER_LEN {
            return None;
        }
        Some(QueueHeader {
            len: usize::from(ring.byte(0)) | (usize::from(ring.byte(1)) << 8),
            tag: ring.byte(2),
        })
    }

    /// Consumes the oldest entry, returning its header and payload.
    ///
    /// # Errors
    ///
    /// [`QueueError::Empty`] when no entry is queued;
    /// [`QueueError::SizeMismatch`] when the declared payload size differs
    /// from `expected_len` (the entry is left queued).
    pub fn pop(&self, expected_len: usize) -> Result<(QueueHeader, Vec<u8>), QueueError> {
        let mut ring = lock(&self.inner);
        if ring.used < HEADER_LEN {
            return Err(QueueError::Empty);
        }
        let declared = usize::from(ring.byte(0)) | (usize::from(ring.byte(1)) << 8);
        if declared != expected_len {
            return Err(QueueError::SizeMismatch {
                declared,
                requested: expected_len,
            });
        }
        let _ = ring.pop_byte();
        let _ = ring.pop_byte();
        let tag = ring.pop_byte();
        let payload: Vec<u8> = (0..declared).map(|_| ring.pop_byte()).collect();
        Ok((
            QueueHeader {
                len: declared,
                tag,
            },
            payload,
        ))
    }

    /// Discards every queued entry (pipeline flush).
    pub fn clear(&self) {
        let mut ring = lock(&self.inner);
        ring.head = 0;
        ring.used = 0;
    }
}
