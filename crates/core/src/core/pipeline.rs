//! Decode pipeline: a ring of decoder slots with in-order retirement.
//!
//! Several slots may be mid-decode simultaneously — each owns private
//! state and its own instruction-pointer snapshot — but only the slot
//! whose sequence id matches the current retirement id may finalize and
//! enter the dispatch queue. This enforces in-order completion even
//! though decode latency varies per instruction.
//!
//! At most one slot begins decoding per tick, and only once the previous
//! instruction's encoded length (hence the next fetch address) is known.
//! Retirement stalls while the dispatch queue is full; the slot simply
//! retries on the next tick — there is no suspension primitive anywhere
//! in the core.

use tracing::trace;

use crate::common::error::Exception;
use crate::core::decode::{DecodeSlot, DecodeState, SlotOutcome};
use crate::core::dispatch::DispatchQueue;
use crate::core::mmu::Mmu;
use crate::core::regs::Registers;
use crate::isa::operand::{TAG_ROOT, WIRE_LEN};
use crate::isa::IsaRegistry;
use crate::soc::region::RegionMap;

/// The decode side of one core's pipeline.
#[derive(Debug)]
pub struct DecodePipeline {
    slots: Vec<DecodeSlot>,
    next_seq: u64,
    retire_seq: u64,
    /// Fetch address of the next instruction to start decoding.
    pub decode_ip: u64,
    awaiting_len: Option<usize>,
}

impl DecodePipeline {
    /// Creates a pipeline with `slot_count` decoder slots (at least one).
    pub fn new(slot_count: usize) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            slots: (0..slot_count).map(|_| DecodeSlot::default()).collect(),
            next_seq: 0,
            retire_seq: 0,
            decode_ip: 0,
            awaiting_len: None,
        }
    }

    /// Discards every in-flight decode and restarts fetching at `ip`.
    ///
    /// Used after any control-flow redirect (branch, call, interrupt or
    /// exception entry, RTI/RTE).
    pub fn redirect(&mut self, ip: u64) {
        for slot in &mut self.slots {
            slot.reset();
        }
        self.decode_ip = ip;
        self.awaiting_len = None;
        self.retire_seq = self.next_seq;
    }

    /// Number of slots currently mid-decode.
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    /// Advances every slot one tick and retires at most one instruction
    /// into the dispatch queue.
    ///
    /// Returns the exception of a faulted decode — and the faulting
    /// instruction's address — once it reaches retirement order; the
    /// caller raises it and redirects the pipeline.
    pub fn tick(
        &mut self,
        regs: &Registers,
        mmu: &mut Mmu,
        soc: &mut RegionMap,
        registry: &mut IsaRegistry,
        queue: &DispatchQueue,
    ) -> Option<(Exception, u64)> {
        // Start one new decode when the next fetch address is known.
        if self.awaiting_len.is_none() {
            if let Some(idx) = self.slots.iter().position(|s| !s.active) {
                self.slots[idx].begin(self.next_seq, self.decode_ip);
                self.next_seq += 1;
                self.awaiting_len = Some(idx);
            }
        }

        // Tick active slots in program order.
        let mut order: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].active)
            .collect();
        order.sort_by_key(|&i| self.slots[i].seq);
        for idx in order {
            self.slots[idx].tick(regs, mmu, soc, registry);
        }

        // Advance the fetch address once the pending slot's length resolves.
        if let Some(idx) = self.awaiting_len {
            if let Some(len) = self.slots[idx].known_len() {
                self.decode_ip = self.slots[idx].ip_start + u64::from(len);
                self.awaiting_len = None;
            }
        }

        self.retire(queue)
    }

    /// Retires the in-order slot if it has finished; stalls on a full queue.
    fn retire(&mut self, queue: &DispatchQueue) -> Option<(Exception, u64)> {
        let idx = (0..self.slots.len()).find(|&i| {
            self.slots[i].active
                && self.slots[i].seq == self.retire_seq
                && self.slots[i].state == DecodeState::Finished
        })?;

        let stalled = match self.slots[idx].outcome()? {
            SlotOutcome::Root(_) => !queue.can_insert(WIRE_LEN),
            SlotOutcome::Extension { payload, .. } => !queue.can_insert(payload.len()),
            SlotOutcome::Fault(_) => false,
        };
        if stalled {
            trace!("dispatch queue full; decode stalled");
            return None;
        }

        match self.slots[idx].take_outcome()? {
            SlotOutcome::Root(rec) => {
                // A Full error here is unreachable: can_insert was checked
                // above and this thread is the only producer.
                let _ = queue.push(TAG_ROOT, &rec.to_bytes());
                self.slots[idx].reset();
                self.retire_seq += 1;
                None
            }
            SlotOutcome::Extension { opcode, payload } => {
                let _ = queue.push(opcode, &payload);
                self.slots[idx].reset();
                self.retire_seq += 1;
                None
            }
            SlotOutcome::Fault(e) => Some((e, self.slots[idx].ip_start)),
        }
    }
}
