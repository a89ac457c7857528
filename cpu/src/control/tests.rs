use std::time::Duration;

use base::prelude::*;

use crate::context::Context;
use crate::control::restrict::TRAP_CHANNEL;
use crate::control::{Cpu, CpuConfiguration, MulDivMode};
use crate::io::{Device, DeviceManager, DevicePoll, IotResult};
use crate::memory::{MemoryConfiguration, MemoryUnit};
use crate::stop::StopCondition;

fn make_ctx() -> Context {
    Context::new(Duration::from_micros(42), Duration::from_micros(42))
}

fn setup_with(config: CpuConfiguration) -> (Cpu, MemoryUnit, DeviceManager) {
    let cpu = Cpu::new(config);
    let mem = MemoryUnit::new(&MemoryConfiguration::default());
    let devices = DeviceManager::new();
    (cpu, mem, devices)
}

fn setup() -> (Cpu, MemoryUnit, DeviceManager) {
    setup_with(CpuConfiguration::default())
}

fn deposit(mem: &mut MemoryUnit, addr: u32, bits: u32) {
    mem.write_raw(
        Address::from_truncated(addr),
        Word::from_truncated(bits),
    );
}

fn step(cpu: &mut Cpu, mem: &mut MemoryUnit, devices: &mut DeviceManager) -> Result<(), StopCondition> {
    cpu.step(&make_ctx(), mem, devices)
}

fn run_one(cpu: &mut Cpu, mem: &mut MemoryUnit, devices: &mut DeviceManager) {
    step(cpu, mem, devices).expect("instruction should execute without stopping");
}

////////////////////////////////////////////////////////////////////////
// One's-complement arithmetic
////////////////////////////////////////////////////////////////////////

#[test]
fn test_add_end_around_carry() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Max positive plus a negative operand: the carry out of the sign
    // comes back in at the bottom and the mathematically-correct +1
    // appears.  Operand signs differ, so overflow stays clear.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o377_777);
    deposit(&mut mem, 0o100, encode(Opcode::Add, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o400_001);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(1));
    assert!(!cpu.regs.ov);
}

#[test]
fn test_add_overflow_detection() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Max positive plus one: same-signed operands, opposite-signed
    // result.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o377_777);
    deposit(&mut mem, 0o100, encode(Opcode::Add, false, 0o200).bits());
    deposit(&mut mem, 0o200, 1);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o400_000));
    assert!(cpu.regs.ov);
}

#[test]
fn test_add_minus_zero_cleanup() {
    let (mut cpu, mut mem, mut devices) = setup();
    // (+3) + (-3) sums to all-ones; ADD cleans it to +0.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(3);
    deposit(&mut mem, 0o100, encode(Opcode::Add, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o777_774);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::ZERO);
    assert!(!cpu.regs.ov);
}

#[test]
fn test_sub_performs_no_minus_zero_cleanup() {
    let (mut cpu, mut mem, mut devices) = setup();
    // (-0) - (+0) leaves minus zero in AC; SUB's asymmetry with ADD
    // is deliberate.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::MINUS_ZERO;
    deposit(&mut mem, 0o100, encode(Opcode::Sub, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::MINUS_ZERO);
}

#[test]
fn test_sub_ordinary_difference() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(5);
    deposit(&mut mem, 0o100, encode(Opcode::Sub, false, 0o200).bits());
    deposit(&mut mem, 0o200, 3);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(2));
}

#[test]
fn test_idx_steps_through_minus_zero() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Incrementing the all-ones pattern must land on +1, not wrap to
    // +0: the increment goes through the same end-around rule as ADD.
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Idx, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o777_777);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::ONE);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o200)),
        Word::ONE
    );
}

#[test]
fn test_isp_skips_on_positive_result() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Isp, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o000_005);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102));

    // A still-negative result does not skip.
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o200, 0o777_770); // -7
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
}

#[test]
fn test_tad_carries_through_link() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o400_000);
    deposit(&mut mem, 0o100, encode(Opcode::Tad, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o400_000);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::ZERO);
    assert!(cpu.regs.link());

    // The next TAD consumes the link as a carry in.
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o200, 0o000_010);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o11));
    assert!(!cpu.regs.link());
}

////////////////////////////////////////////////////////////////////////
// Compare-and-skip, loads and stores
////////////////////////////////////////////////////////////////////////

#[test]
fn test_sad_sas_skip_semantics() {
    let (mut cpu, mut mem, mut devices) = setup();
    deposit(&mut mem, 0o100, encode(Opcode::Sas, false, 0o200).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Sad, false, 0o200).bits());
    deposit(&mut mem, 0o200, 5);

    // Equal: SAS skips, SAD does not.
    cpu.regs.ac = Word::from_truncated(5);
    cpu.regs.pc = Address::from_truncated(0o100);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102));
    cpu.regs.pc = Address::from_truncated(0o101);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102));

    // Different: SAD skips, SAS does not.
    deposit(&mut mem, 0o200, 6);
    cpu.regs.pc = Address::from_truncated(0o100);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o103));
}

#[test]
fn test_dap_dip_store_independent_halves() {
    let (mut cpu, mut mem, mut devices) = setup();
    deposit(&mut mem, 0o200, 0);
    deposit(&mut mem, 0o100, encode(Opcode::Dap, false, 0o200).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Dip, false, 0o200).bits());

    // DAP from one AC, DIP from another: each half must come through
    // without contaminating the other.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o123_456);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o200)),
        Word::from_truncated(0o003_456)
    );
    cpu.regs.ac = Word::from_truncated(0o654_321);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o200)),
        Word::from_truncated(0o653_456)
    );
}

#[test]
fn test_law_loads_literal_or_complement() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Law, false, 0o1234).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Law, true, 0o1234).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o1234));
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o776_543));
}

#[test]
fn test_lch_dch_address_characters() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Byte pointer at 10: position 2, word address 40.
    deposit(&mut mem, 0o10, (2 << 16) | 0o40);
    deposit(&mut mem, 0o40, 0o123_456);
    deposit(&mut mem, 0o100, encode(Opcode::Lch, false, 0o10).bits());
    cpu.regs.pc = Address::from_truncated(0o100);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o34));

    // Deposit through the same pointer, preserving the neighbours.
    deposit(&mut mem, 0o101, encode(Opcode::Dch, false, 0o10).bits());
    cpu.regs.ac = Word::from_truncated(0o77);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o40)),
        Word::from_truncated(0o127_756)
    );
}

#[test]
fn test_lch_auto_increment_advances_pointer() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Position 3: the increment wraps to position 1 of the next word.
    deposit(&mut mem, 0o10, (3 << 16) | 0o40);
    deposit(&mut mem, 0o41, 0o000_066);
    deposit(&mut mem, 0o100, encode(Opcode::Lch, true, 0o10).bits());
    cpu.regs.pc = Address::from_truncated(0o100);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o10)),
        Word::from_truncated((1 << 16) | 0o41)
    );
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o66));
}

////////////////////////////////////////////////////////////////////////
// Effective addressing
////////////////////////////////////////////////////////////////////////

#[test]
fn test_multi_level_indirect_resolves() {
    let (mut cpu, mut mem, mut devices) = setup_with(CpuConfiguration {
        ind_max: 3,
        ..CpuConfiguration::default()
    });
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Lac, true, 0o10).bits());
    deposit(&mut mem, 0o10, INDIRECT_BIT | 0o20);
    deposit(&mut mem, 0o20, INDIRECT_BIT | 0o30);
    deposit(&mut mem, 0o30, 0o40);
    deposit(&mut mem, 0o40, 0o123_456);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o123_456));
}

#[test]
fn test_indirect_chain_bound_stops() {
    let (mut cpu, mut mem, mut devices) = setup_with(CpuConfiguration {
        ind_max: 3,
        ..CpuConfiguration::default()
    });
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Lac, true, 0o10).bits());
    deposit(&mut mem, 0o10, INDIRECT_BIT | 0o20);
    deposit(&mut mem, 0o20, INDIRECT_BIT | 0o30);
    deposit(&mut mem, 0o30, INDIRECT_BIT | 0o10); // loops forever
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::NestedIndirect { .. }) => {}
        other => panic!("expected a nested-indirect stop, got {other:?}"),
    }
}

#[test]
fn test_extend_mode_indirect_is_single_level_and_full_width() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.extend = true;
    deposit(&mut mem, 0o100, encode(Opcode::Lac, true, 0o10).bits());
    // The fetched address reaches outside the current field, and the
    // bit which would mean "indirect again" in multi-level mode
    // (0o050000 has it set) is treated as a plain address bit.
    deposit(&mut mem, 0o10, 0o050_000);
    deposit(&mut mem, 0o050_000, 0o555_555);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o555_555));
}

#[test]
fn test_direct_addressing_stays_in_current_field() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o024_000); // field 2
    deposit(&mut mem, 0o024_000, encode(Opcode::Lac, false, 0o300).bits());
    deposit(&mut mem, 0o020_300, 0o111_111);
    deposit(&mut mem, 0o000_300, 0o222_222); // field 0 decoy
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o111_111));
}

////////////////////////////////////////////////////////////////////////
// XCT
////////////////////////////////////////////////////////////////////////

#[test]
fn test_xct_executes_target_in_place() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Xct, false, 0o200).bits());
    deposit(&mut mem, 0o200, encode(Opcode::Law, false, 0o77).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o77));
    // Only the XCT itself advanced PC.
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
}

#[test]
fn test_xct_nesting_bound_stops() {
    let (mut cpu, mut mem, mut devices) = setup_with(CpuConfiguration {
        xct_max: 4,
        ..CpuConfiguration::default()
    });
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Xct, false, 0o200).bits());
    deposit(&mut mem, 0o200, encode(Opcode::Xct, false, 0o200).bits());
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::NestedXct { .. }) => {}
        other => panic!("expected a nested-XCT stop, got {other:?}"),
    }
}

////////////////////////////////////////////////////////////////////////
// Jumps, calls and the sequence-break system
////////////////////////////////////////////////////////////////////////

#[test]
fn test_jsp_saves_status_and_jumps() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ov = true;
    deposit(&mut mem, 0o100, encode(Opcode::Jsp, false, 0o300).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o300));
    // AC holds overflow, extend mode and the return address.
    assert_eq!(cpu.regs.ac, Word::from_truncated((1 << 17) | 0o101));
}

#[test]
fn test_cal_and_jda_bifurcate_on_the_indirect_bit() {
    let (mut cpu, mut mem, mut devices) = setup();
    // CAL: fixed save location 100.
    cpu.regs.pc = Address::from_truncated(0o200);
    cpu.regs.ac = Word::from_truncated(0o111);
    deposit(&mut mem, 0o200, encode(Opcode::Cal, false, 0o7777).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o100)),
        Word::from_truncated(0o111)
    );
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o201));

    // JDA: the save location is the instruction's own address field.
    cpu.regs.pc = Address::from_truncated(0o200);
    cpu.regs.ac = Word::from_truncated(0o222);
    deposit(&mut mem, 0o200, encode(Opcode::Cal, true, 0o300).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o300)),
        Word::from_truncated(0o222)
    );
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o301));
}

fn break_ready_config() -> CpuConfiguration {
    CpuConfiguration {
        sbs_on_at_reset: true,
        ..CpuConfiguration::default()
    }
}

#[test]
fn test_break_entry_pushes_state_and_vectors() {
    let (mut cpu, mut mem, mut devices) = setup_with(break_ready_config());
    cpu.regs.pc = Address::from_truncated(0o2000);
    cpu.regs.ac = Word::from_truncated(0o111);
    cpu.regs.io = Word::from_truncated(0o222);
    cpu.regs.ov = true;
    cpu.regs.extend = true;
    cpu.sequence_breaks().enable_channel(Channel::new_truncated(3));
    cpu.raise_break(Channel::new_truncated(3));

    run_one(&mut cpu, &mut mem, &mut devices);

    // Status block for channel 3 starts at 14 octal.
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o14)),
        Word::from_truncated(0o111)
    );
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o15)),
        Word::from_truncated((1 << 17) | (1 << 16) | 0o2000)
    );
    assert_eq!(
        mem.read_raw(Address::from_truncated(0o16)),
        Word::from_truncated(0o222)
    );
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o17));
    assert!(!cpu.regs.extend);
    assert!(!cpu.regs.ov);
    assert!(cpu.sequence_breaks().any_active());
}

#[test]
fn test_jmp_dismiss_restores_saved_state() {
    let (mut cpu, mut mem, mut devices) = setup_with(break_ready_config());
    cpu.regs.pc = Address::from_truncated(0o2000);
    cpu.regs.ov = true;
    cpu.regs.extend = true;
    cpu.sequence_breaks().enable_channel(Channel::new_truncated(3));
    cpu.raise_break(Channel::new_truncated(3));
    run_one(&mut cpu, &mut mem, &mut devices); // break entry

    // The handler dismisses immediately: jmp i 15 (channel 3's
    // status-word address).
    deposit(&mut mem, 0o17, encode(Opcode::Jmp, true, 0o15).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o2000));
    assert!(cpu.regs.ov);
    assert!(cpu.regs.extend);
    assert!(!cpu.sequence_breaks().any_active());
}

#[test]
fn test_jmp_dismiss_pattern_is_plain_jump_when_sbs_off() {
    let (mut cpu, mut mem, mut devices) = setup(); // sbs off at reset
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Jmp, true, 0o1).bits());
    deposit(&mut mem, 0o1, 0o300);
    run_one(&mut cpu, &mut mem, &mut devices);
    // An ordinary indirect jump through location 1.
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o300));
}

#[test]
fn test_lower_priority_request_waits_for_dismissal() {
    let (mut cpu, mut mem, mut devices) = setup_with(break_ready_config());
    cpu.regs.pc = Address::from_truncated(0o2000);
    for n in 0..16 {
        cpu.sequence_breaks().enable_channel(Channel::new_truncated(n));
    }
    cpu.raise_break(Channel::new_truncated(2));
    run_one(&mut cpu, &mut mem, &mut devices); // enter channel 2; PC = 13

    // A lower-priority request arrives while channel 2 is active.
    cpu.raise_break(Channel::new_truncated(8));
    deposit(&mut mem, 0o13, encode(Opcode::Law, false, 0o55).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    // The handler kept running; the request is still pending.
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o55));
    assert!(cpu.sequence_breaks().request_pending(Channel::new_truncated(8)));

    // Dismissal lets the pending channel in.
    deposit(&mut mem, 0o14, encode(Opcode::Jmp, true, 0o11).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    run_one(&mut cpu, &mut mem, &mut devices); // entry for channel 8
    assert_eq!(cpu.regs.pc, Address::from_truncated((8 << 2) + 3));
}

////////////////////////////////////////////////////////////////////////
// Restrict mode
////////////////////////////////////////////////////////////////////////

#[test]
fn test_restrict_violation_becomes_trap_request() {
    let (mut cpu, mut mem, mut devices) = setup();
    // Run from bank 1 with bank 0 denied; reach into bank 0 through
    // an extend-mode indirect load.
    cpu.regs.pc = Address::from_truncated(0o010_100);
    cpu.regs.extend = true;
    cpu.restrict_unit().set_mask(Word::from_truncated(0o400_000));
    cpu.restrict_unit().set_enabled(true);
    deposit(&mut mem, 0o010_100, encode(Opcode::Lac, true, 0o200).bits());
    deposit(&mut mem, 0o010_200, 0o000_050);
    deposit(&mut mem, 0o000_050, 0o123_456);

    // The machine does not stop; the violation is redirected.
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(cpu.sequence_breaks().request_pending(TRAP_CHANNEL));
    // AC was never loaded.
    assert_eq!(cpu.regs.ac, Word::ZERO);
    // The trap buffer holds the cause (0 for a plain memory
    // reference) and the low 14 bits of the MB latch at the point of
    // violation (the pointer word just fetched).
    assert_eq!(
        cpu.restrict_unit().trap_buffer(),
        Word::from_truncated(0o000_050)
    );
}

#[test]
fn test_trap_is_delivered_through_the_break_system() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o010_100);
    cpu.regs.extend = true;
    cpu.restrict_unit().set_mask(Word::from_truncated(0o400_000));
    cpu.restrict_unit().set_enabled(true);
    cpu.sequence_breaks().set_on(true);
    deposit(&mut mem, 0o010_100, encode(Opcode::Lac, true, 0o200).bits());
    deposit(&mut mem, 0o010_200, 0o000_050);

    run_one(&mut cpu, &mut mem, &mut devices); // violation -> request
    cpu.regs.ac = Word::from_truncated(0o777);
    run_one(&mut cpu, &mut mem, &mut devices); // break entry on channel 14
    assert_eq!(cpu.regs.pc, Address::from_truncated((14 << 2) + 3));
    // With the break active, protection is suspended, so the entry
    // push into (denied) bank 0 landed anyway.
    assert_eq!(
        mem.read_raw(Address::from_truncated(14 << 2)),
        Word::from_truncated(0o777)
    );
}

#[test]
fn test_halt_while_restricted_traps_instead_of_stopping() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o010_100);
    cpu.restrict_unit().set_mask(Word::from_truncated(0o400_000));
    cpu.restrict_unit().set_enabled(true);
    deposit(&mut mem, 0o010_100, encode(Opcode::Opr, false, 0o400).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(cpu.sequence_breaks().request_pending(TRAP_CHANNEL));
    assert_eq!(
        cpu.restrict_unit().trap_buffer().bits() & 0o740_000,
        0o100_000
    );
}

#[test]
fn test_reserved_instruction_stops_or_traps() {
    // Without restrict mode: a stop.
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, 0o000_123); // opcode 00
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::ReservedInstruction { .. }) => {}
        other => panic!("expected a reserved-instruction stop, got {other:?}"),
    }

    // With restrict mode watching: a trap, and the machine keeps
    // going.
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o010_100);
    cpu.restrict_unit().set_enabled(true);
    deposit(&mut mem, 0o010_100, 0o000_123);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(cpu.sequence_breaks().request_pending(TRAP_CHANNEL));
    assert_eq!(
        cpu.restrict_unit().trap_buffer().bits() & 0o740_000,
        0o200_000
    );
}

////////////////////////////////////////////////////////////////////////
// The skip and shift groups
////////////////////////////////////////////////////////////////////////

#[test]
fn test_skip_conditions_are_ored_not_anded() {
    let (mut cpu, mut mem, mut devices) = setup();
    // sza|spa with AC = +5: zero fails but positive holds, and an OR
    // combination must skip.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(5);
    deposit(&mut mem, 0o100, encode(Opcode::Skp, false, 0o3000).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102));

    // The same conditions inverted: no skip.
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Skp, true, 0o3000).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
}

#[test]
fn test_szo_tests_and_clears_overflow() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.ov = true;
    deposit(&mut mem, 0o100, encode(Opcode::Skp, false, 0o200).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Skp, false, 0o200).bits());
    cpu.regs.pc = Address::from_truncated(0o100);
    // Overflow set: no skip, but the test clears it...
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
    assert!(!cpu.regs.ov);
    // ...so the second szo skips.
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o103));
}

#[test]
fn test_sense_switch_group_skip() {
    let (mut cpu, mut mem, mut devices) = setup();
    // szs 3: skip when sense switch 3 is off.
    cpu.regs.ss = 0o04; // switch 3 on
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Skp, false, 0o030).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));

    cpu.regs.ss = 0;
    cpu.regs.pc = Address::from_truncated(0o100);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102));
}

#[test]
fn test_shift_count_is_ones_count_of_field() {
    let (mut cpu, mut mem, mut devices) = setup();
    // ral with three ones in the count field: rotate left three.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o000_007);
    deposit(&mut mem, 0o100, 0o661_007); // ral, count field 007
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o000_070));
}

#[test]
fn test_rotate_wraps_through_sign() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o400_001);
    deposit(&mut mem, 0o100, 0o661_001); // ral 1
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o000_003));
}

#[test]
fn test_arithmetic_shift_right_preserves_sign() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o600_000); // negative
    deposit(&mut mem, 0o100, 0o675_001); // sar 1
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o700_000));
}

#[test]
fn test_combined_rotate_spans_both_registers() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o400_000);
    cpu.regs.io = Word::ZERO;
    deposit(&mut mem, 0o100, 0o663_001); // rcl 1
    run_one(&mut cpu, &mut mem, &mut devices);
    // The bit rotated out of the pair's top re-enters at IO's bottom.
    assert_eq!(cpu.regs.ac, Word::ZERO);
    assert_eq!(cpu.regs.io, Word::ONE);
}

////////////////////////////////////////////////////////////////////////
// Multiply and divide
////////////////////////////////////////////////////////////////////////

#[test]
fn test_hardware_multiply() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(5);
    deposit(&mut mem, 0o100, encode(Opcode::Mul, false, 0o200).bits());
    deposit(&mut mem, 0o200, 3);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::ZERO);
    assert_eq!(cpu.regs.io, Word::from_truncated(15));
}

#[test]
fn test_hardware_multiply_negative() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = !Word::from_truncated(5); // -5
    deposit(&mut mem, 0o100, encode(Opcode::Mul, false, 0o200).bits());
    deposit(&mut mem, 0o200, 3);
    run_one(&mut cpu, &mut mem, &mut devices);
    // Both halves carry the product's sign.
    assert_eq!(cpu.regs.ac, Word::MINUS_ZERO);
    assert_eq!(cpu.regs.io, !Word::from_truncated(15));
}

#[test]
fn test_hardware_divide_skips_on_success() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::ZERO;
    cpu.regs.io = Word::from_truncated(100);
    deposit(&mut mem, 0o100, encode(Opcode::Div, false, 0o200).bits());
    deposit(&mut mem, 0o200, 7);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(14)); // quotient
    assert_eq!(cpu.regs.io, Word::from_truncated(2)); // remainder
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o102)); // skipped
}

#[test]
fn test_hardware_divide_overflow_does_not_skip() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o200_000); // huge dividend
    cpu.regs.io = Word::ZERO;
    deposit(&mut mem, 0o100, encode(Opcode::Div, false, 0o200).bits());
    deposit(&mut mem, 0o200, 1);
    run_one(&mut cpu, &mut mem, &mut devices);
    // No skip; AC and IO untouched.
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o200_000));
}

#[test]
fn test_step_mode_multiply_leaves_intermediate_state() {
    let (mut cpu, mut mem, mut devices) = setup_with(CpuConfiguration {
        muldiv: MulDivMode::Step,
        ..CpuConfiguration::default()
    });
    // One MUS with IO bit 0 set: AC takes the addend, the pair shifts
    // right one.  This is one step of a software loop, not a product.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::ZERO;
    cpu.regs.io = Word::from_truncated(1);
    deposit(&mut mem, 0o100, encode(Opcode::Mul, false, 0o200).bits());
    deposit(&mut mem, 0o200, 0o000_006);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(3)); // 6 >> 1
    assert_eq!(cpu.regs.io, Word::ZERO);
}

////////////////////////////////////////////////////////////////////////
// The operate groups
////////////////////////////////////////////////////////////////////////

#[test]
fn test_operate_micro_op_ordering() {
    let (mut cpu, mut mem, mut devices) = setup();
    // cla + lat in one instruction: the clear happens first, so AC
    // ends up holding exactly the test word.
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o070_707);
    cpu.regs.tw = Word::from_truncated(0o707_070);
    deposit(&mut mem, 0o100, encode(Opcode::Opr, false, 0o2200).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o707_070));
}

#[test]
fn test_halt_stops_cleanly() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Opr, false, 0o400).bits());
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::Halt { pc }) => {
            assert_eq!(pc, Address::from_truncated(0o101));
        }
        other => panic!("expected a halt, got {other:?}"),
    }
}

#[test]
fn test_program_flag_micro_ops() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Opr, false, 0o013).bits()); // stf 3
    deposit(&mut mem, 0o101, encode(Opcode::Opr, false, 0o007).bits()); // clf 7
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pf & 0o77, 0o04);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pf & 0o77, 0);
}

#[test]
fn test_special_operate_swaps_ac_io() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    cpu.regs.ac = Word::from_truncated(0o123);
    cpu.regs.io = Word::from_truncated(0o456);
    deposit(&mut mem, 0o100, encode(Opcode::Ops, false, 0o200).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o456));
    assert_eq!(cpu.regs.io, Word::from_truncated(0o123));
}

////////////////////////////////////////////////////////////////////////
// IOT and the wait protocol
////////////////////////////////////////////////////////////////////////

struct NullDevice;

impl Device for NullDevice {
    fn name(&self) -> &str {
        "null test device"
    }

    fn iot(&mut self, _ctx: &Context, _inst: Instruction, io: Word) -> IotResult {
        IotResult::unchanged(io)
    }

    fn poll(&mut self, _ctx: &Context) -> DevicePoll {
        DevicePoll::idle()
    }
}

#[test]
fn test_iot_wait_with_no_pulse_pending_stops() {
    let (mut cpu, mut mem, mut devices) = setup();
    devices.attach(
        &make_ctx(),
        DeviceCode::new_truncated(0o47),
        Box::new(NullDevice),
    );
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Iot, true, 0o47).bits());

    // First issuance: the halt latch goes up and PC backs up for the
    // re-fetch.
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o100));

    // The re-fetch finds no completion pulse pending anywhere: that
    // wait would never end.
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::IoWait { device }) => {
            assert_eq!(u8::from(device), 0o47);
        }
        other => panic!("expected an I/O wait stop, got {other:?}"),
    }
}

#[test]
fn test_iot_wait_released_by_synchronizer() {
    let (mut cpu, mut mem, mut devices) = setup();
    devices.attach(
        &make_ctx(),
        DeviceCode::new_truncated(0o47),
        Box::new(NullDevice),
    );
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Iot, true, 0o47).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Law, false, 0o11).bits());

    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o100));

    // A completion pulse arrives (as it would from a device poll).
    cpu.deliver_completion();
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.pc, Address::from_truncated(0o101));
    // Execution proceeds normally afterwards.
    run_one(&mut cpu, &mut mem, &mut devices);
    assert_eq!(cpu.regs.ac, Word::from_truncated(0o11));
}

#[test]
fn test_iot_to_missing_device_is_reserved() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Iot, false, 0o47).bits());
    match step(&mut cpu, &mut mem, &mut devices) {
        Err(StopCondition::ReservedInstruction { .. }) => {}
        other => panic!("expected a reserved-instruction stop, got {other:?}"),
    }
}

#[test]
fn test_extend_mode_pulses() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    deposit(&mut mem, 0o100, encode(Opcode::Iot, false, 0o4074).bits()); // eem
    deposit(&mut mem, 0o101, encode(Opcode::Iot, false, 0o0074).bits()); // lem
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(cpu.regs.extend);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(!cpu.regs.extend);
}

#[test]
fn test_sbs_control_pulses() {
    let (mut cpu, mut mem, mut devices) = setup();
    cpu.regs.pc = Address::from_truncated(0o100);
    // esm; asc channel 6; isb channel 6
    deposit(&mut mem, 0o100, encode(Opcode::Iot, false, 0o55).bits());
    deposit(&mut mem, 0o101, encode(Opcode::Iot, false, (6 << 6) | 0o51).bits());
    deposit(&mut mem, 0o102, encode(Opcode::Iot, false, (6 << 6) | 0o52).bits());
    run_one(&mut cpu, &mut mem, &mut devices);
    run_one(&mut cpu, &mut mem, &mut devices);
    run_one(&mut cpu, &mut mem, &mut devices);
    assert!(cpu.sequence_breaks().request_pending(Channel::new_truncated(6)));
    assert_eq!(cpu.sequence_breaks().eval(), Some(Channel::new_truncated(6)));
}
