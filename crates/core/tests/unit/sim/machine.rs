//! Machine Composition Unit Tests.
//!
//! Covers the vector-table reset path, timer-driven interrupts, the
//! hardware-mapped region hooks, and multi-core stepping.

use std::sync::{Arc, Mutex};

use m64k_core::common::data::{AccessType, OperandSize};
use m64k_core::config::Config;
use m64k_core::core::regs::CTRL_INT_MASK;
use m64k_core::isa::opcodes;
use m64k_core::soc::layout;

use crate::common::harness::TestContext;

// ──────────────────────────────────────────────────────────
// Reset via the memory-mapped control block
// ──────────────────────────────────────────────────────────

#[test]
fn reset_reads_initial_sp_and_pc_from_vector_table() {
    let mut ctx = TestContext::new();
    ctx.write_qword(layout::INIT_SP, 0xF000);
    ctx.write_qword(layout::INIT_PC, 0x2000);
    ctx.load_at(0x2000, &[opcodes::BRK]);

    ctx.machine.reset().unwrap();
    assert_eq!(ctx.core().regs.sp(), 0xF000);
    assert_eq!(ctx.core().regs.ip, 0x2000);

    ctx.run_until_halt(64);
    assert!(ctx.core().is_halted());
}

#[test]
fn reset_installs_timer_from_peripheral_block() {
    let mut ctx = TestContext::new();
    ctx.write_qword(layout::TIMER_PERIOD, 100);
    ctx.write_qword(layout::TIMER_LINE, 3);
    ctx.write_qword(layout::TIMER_ENABLE, 1);
    ctx.write_qword(layout::INIT_PC, 0x2000);
    ctx.write_qword(layout::INIT_SP, 0xF000);

    ctx.machine.reset().unwrap();
    assert_eq!(ctx.machine.timers.len(), 1);
    assert_eq!(ctx.machine.timers[0].line(), 3);
}

// ──────────────────────────────────────────────────────────
// Timer-driven interrupts
// ──────────────────────────────────────────────────────────

/// An expiring timer flags its line on core 0 and the ISR runs.
#[test]
fn timer_expiry_drives_the_isr() {
    let mut ctx = TestContext::new().load_program(&[opcodes::NOP; 8]);
    // Handler at 0x4000: move.b (0x5000), #0x9, then it spins on nops.
    let handler: Vec<u8> = {
        use m64k_core::isa::encode::{encode, Operand};
        encode(
            opcodes::MOVE,
            OperandSize::Byte,
            &[Operand::Abs(0x5000), Operand::Imm(0x9)],
        )
    };
    ctx.load_at(0x4000, &handler);
    ctx.write_qword(layout::interrupt_vector(0, 1), 0x4000);
    ctx.core_mut().regs.set_ctrl(CTRL_INT_MASK, 1 << 1);

    ctx.machine.add_timer(5, 1);
    ctx.run_ticks(64);

    let got = ctx.machine.cores[0]
        .mmu
        .read_value(&mut ctx.machine.soc, 0x5000, OperandSize::Byte, AccessType::Read)
        .unwrap();
    assert_eq!(got, 0x9, "timer interrupt reached the handler");
    assert_eq!(ctx.core().stats.interrupts_taken, 1);
}

// ──────────────────────────────────────────────────────────
// Hardware-mapped regions
// ──────────────────────────────────────────────────────────

/// Reads and writes to a hardware region invoke the host callbacks with
/// region-relative offsets.
#[test]
fn hardware_region_routes_through_callbacks() {
    let mut ctx = TestContext::new();
    let log: Arc<Mutex<Vec<(u64, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let write_log = Arc::clone(&log);

    ctx.machine
        .add_hardware_region(
            "echo",
            0x2000_0000,
            0x100,
            Box::new(|offset, buf| {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = (offset as u8).wrapping_add(i as u8);
                }
            }),
            Box::new(move |offset, data| {
                write_log.lock().unwrap().push((offset, data.to_vec()));
            }),
        )
        .unwrap();

    let core0 = &mut ctx.machine.cores[0];
    let got = core0
        .mmu
        .read_value(&mut ctx.machine.soc, 0x2000_0010, OperandSize::Word, AccessType::Read)
        .unwrap();
    assert_eq!(got, 0x1110, "read hook fabricated offset bytes");

    core0
        .mmu
        .write_value(&mut ctx.machine.soc, 0x2000_0020, OperandSize::Byte, 0xAB)
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec![(0x20, vec![0xAB])]);
}

// ──────────────────────────────────────────────────────────
// Multi-core
// ──────────────────────────────────────────────────────────

/// Two cores run independent programs over the shared coherent bus and
/// both reach their breakpoints.
#[test]
fn two_cores_step_independently() {
    let mut config = Config::default();
    config.machine.cores = 2;
    let mut ctx = TestContext::with_config(config);

    // Core 0 at 0x1000, core 1 at 0x3000; both set a register then halt.
    ctx.load_at(0x1000, &[0x20, 0x00, 0x03, 0x01, 0x11, 0x01]);
    ctx.load_at(0x3000, &[0x20, 0x00, 0x13, 0x01, 0x22, 0x01]);
    ctx.core_mut().set_stack(0x8000);
    ctx.core_mut().set_entry(0x1000);
    ctx.machine.core_mut(1).set_stack(0x9000);
    ctx.machine.core_mut(1).set_entry(0x3000);

    let ticks = ctx.machine.run(4096).unwrap();
    assert!(ticks < 4096, "both cores halted inside the budget");

    assert_eq!(ctx.machine.core(0).regs.data(0).byte(), 0x11);
    assert_eq!(ctx.machine.core(1).regs.data(1).byte(), 0x22);
    assert_eq!(
        ctx.machine.core(0).regs.ctrl(m64k_core::core::regs::CTRL_CPU_ID),
        0
    );
    assert_eq!(
        ctx.machine.core(1).regs.ctrl(m64k_core::core::regs::CTRL_CPU_ID),
        1
    );
}
