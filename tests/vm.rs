mod common;

use avrsim::assembler::Assembler;
use avrsim::spec::types::hw::{Word, RAMEND};
use avrsim::vm::{Flags, Instance, RuntimeError, Snapshot, State};
use common::{program, run, run_src};

#[test]
fn add_two_registers() {
    let vm = run("LDI R16, 5\nLDI R17, 10\nADD R16, R17\nRET");
    assert_eq!(vm.mem().reg(16), 15);
    assert!(!vm.sreg().contains(Flags::Z));
    assert_eq!(vm.stats().steps, 4);
}

#[test]
fn inc_leaves_carry_alone() {
    let incs = "INC R16\n".repeat(16);

    let vm = run(&format!("LDI R16, 0\nSEC\n{}RET", incs));
    assert_eq!(vm.mem().reg(16), 16);
    assert!(vm.sreg().contains(Flags::C));

    let vm = run(&format!("LDI R16, 0\nCLC\n{}RET", incs));
    assert_eq!(vm.mem().reg(16), 16);
    assert!(!vm.sreg().contains(Flags::C));
}

#[test]
fn call_and_return_restore_the_stack() {
    let src = program("", "NOP\nRCALL f\nbrk: NOP\nRET\nf: LDI R16, 1\nRET");
    let mut vm = Instance::new(&common::assemble(&src), String::new());

    vm.step();
    let sp_before = vm.sp();
    vm.step();
    assert_eq!(vm.sp(), sp_before - 2);
    vm.step();
    vm.step();
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.sp(), sp_before);

    assert_eq!(vm.run(), State::Finished);
    assert_eq!(vm.mem().reg(16), 1);
}

#[test]
fn print_trap() {
    let vm = run_src(&program(
        "greeting: .string \"Hello, world!\\n\"",
        "LDI R16, lo8(greeting)\nPUSH R16\nLDI R16, hi8(greeting)\nPUSH R16\n\
         CALL printf\nMOV R2, R24\nIN R3, SPL\nPOP R0\nPOP R0\nRET",
    ));
    assert_eq!(vm.state(), State::Finished);
    assert_eq!(vm.console(), "Hello, world!\n");
    assert_eq!(vm.mem().reg(2), 14);
    assert_eq!(vm.mem().reg(25), 0);
    // SP was still just below the two pushed bytes after the trap.
    assert_eq!(vm.mem().reg(3) as usize, (RAMEND - 2) & 0xFF);
}

#[test]
fn rcall_printf() {
    let vm = run_src(&program(
        "s: .asciz \"ok\"",
        "LDI R16, lo8(s)\nPUSH R16\nLDI R16, hi8(s)\nPUSH R16\nRCALL printf\nPOP R0\nPOP R0\nRET",
    ));
    assert_eq!(vm.console(), "ok");
    assert_eq!(vm.mem().reg(24), 2);
}

#[test]
fn addition_flag_boundaries() {
    let cases: &[(u8, u8, u8, Flags)] = &[
        (0, 0, 0, Flags::Z),
        (0xFF, 1, 0, Flags::C | Flags::Z | Flags::H),
        (0x7F, 1, 0x80, Flags::V | Flags::N | Flags::H),
        (0x80, 0x80, 0, Flags::C | Flags::Z | Flags::V | Flags::S),
    ];
    for (d, r, res, flags) in cases {
        let vm = run(&format!("LDI R16, {}\nLDI R17, {}\nADD R16, R17\nRET", d, r));
        assert_eq!(vm.mem().reg(16), *res, "{} + {}", d, r);
        assert_eq!(vm.sreg(), *flags, "{} + {}", d, r);
    }
}

#[test]
fn subtraction_flag_boundaries() {
    let vm = run("LDI R16, 0\nLDI R17, 1\nSUB R16, R17\nRET");
    assert_eq!(vm.mem().reg(16), 0xFF);
    assert_eq!(vm.sreg(), Flags::C | Flags::N | Flags::S | Flags::H);

    let vm = run("LDI R16, 0x80\nSUBI R16, 1\nRET");
    assert_eq!(vm.mem().reg(16), 0x7F);
    assert_eq!(vm.sreg(), Flags::V | Flags::S | Flags::H);
}

#[test]
fn sixteen_bit_compare() {
    let compare = |a: Word, b: Word| {
        run(&format!(
            "LDI R24, {}\nLDI R25, {}\nLDI R26, {}\nLDI R27, {}\nCP R24, R26\nCPC R25, R27\n\
             BRLO less\nLDI R16, 1\nRET\nless: LDI R16, 2\nRET",
            a & 0xFF,
            a >> 8,
            b & 0xFF,
            b >> 8
        ))
        .mem()
        .reg(16)
    };
    assert_eq!(compare(0x1234, 0x1235), 2);
    assert_eq!(compare(0x1235, 0x1234), 1);
    assert_eq!(compare(0x0100, 0x00FF), 1);
}

#[test]
fn io_sees_live_cpu_state() {
    let vm = run("SEC\nIN R16, SREG\nIN R17, SPL\nIN R18, SPH\nRET");
    assert_eq!(vm.mem().reg(16), Flags::C.bits());
    assert_eq!(vm.mem().reg(17) as usize, RAMEND & 0xFF);
    assert_eq!(vm.mem().reg(18) as usize, RAMEND >> 8);
}

#[test]
fn stack_pointer_can_be_moved() {
    let vm = run_src(&program(
        "",
        "LDI R16, 0x00\nOUT SPL, R16\nLDI R16, 0x01\nOUT SPH, R16\nPUSH R16\nPUSH R16\nRET",
    ));
    assert_eq!(vm.error(), Some(&RuntimeError::StackOverflow(0xFF)));
}

const SP_AT_RAM_START: &str = "LDI R16, 0x00\nOUT SPL, R16\nLDI R16, 0x01\nOUT SPH, R16\n";

#[test]
fn failed_calls_leave_the_stack_alone() {
    for call in &["RCALL f", "CALL f"] {
        let vm = run_src(&program(
            "",
            &format!("{}{}\nRET\nf: RET", SP_AT_RAM_START, call),
        ));
        assert_eq!(vm.error(), Some(&RuntimeError::StackOverflow(0xFF)));
        assert_eq!(vm.pc(), 4);
        assert_eq!(vm.sp(), 0x100);
        assert_eq!(vm.mem().get(0x100), Ok(0));
        assert_eq!(vm.mem().get(0xFF), Ok(0));
    }
}

#[test]
fn failed_returns_leave_the_stack_alone() {
    let vm = run_src(&program("", "LDI R16, 5\nPUSH R16\nRET"));
    assert_eq!(vm.error(), Some(&RuntimeError::StackUnderflow(RAMEND)));
    assert_eq!(vm.sp() as usize, RAMEND - 1);
    assert_eq!(vm.mem().get(RAMEND), Ok(5));

    let vm = run_src(&program("", "LDI R16, 0xFF\nPUSH R16\nPUSH R16\nRET"));
    assert_eq!(vm.error(), Some(&RuntimeError::JumpOutOfRange(0xFFFF)));
    assert_eq!(vm.sp() as usize, RAMEND - 2);

    let vm = run_src(&program("", "LDI R17, 9\nPOP R17\nRET"));
    assert_eq!(vm.error(), Some(&RuntimeError::StackUnderflow(RAMEND)));
    assert_eq!(vm.sp() as usize, RAMEND);
    assert_eq!(vm.mem().reg(17), 9);
}

#[test]
fn failed_pointer_accesses_leave_the_pointer_alone() {
    let vm = run_src(&program("", "LDI R26, 0xFF\nLDI R27, 0xFF\nST X+, R0\nRET"));
    assert_eq!(vm.error(), Some(&RuntimeError::AddressOutOfRange(0xFFFF)));
    assert_eq!(vm.mem().reg_pair(26), 0xFFFF);

    let vm = run_src(&program("", "LDI R16, 7\nLD R16, -X\nRET"));
    assert_eq!(vm.error(), Some(&RuntimeError::AddressOutOfRange(0xFFFF)));
    assert_eq!(vm.mem().reg_pair(26), 0);
    assert_eq!(vm.mem().reg(16), 7);
}

#[test]
fn breakpoints_stop_execution() {
    let src = program("", "LDI R16, 1\nLDI R17, 2\n\n; stop here\nLDI R18, 3\nRET");
    // Line 8 is blank, so the breakpoint moves down to the LDI on line 10.
    let image = Assembler::new(&src).breakpoint(8).run().unwrap();
    let mut vm = Instance::new(&image, String::new());
    assert_eq!(vm.run(), State::Finished);
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.mem().reg(17), 2);
    assert_eq!(vm.mem().reg(18), 0);
    assert_eq!(vm.current_line(), Some(10));
}

#[test]
fn snapshots_track_changes() {
    let mut vm = Instance::new(
        &common::assemble(&program("", "LDI R16, 0x0F\nLDI R16, 0x1E\nRET")),
        String::new(),
    );
    vm.step();
    vm.step();
    let snap = Snapshot::of(&vm);
    assert_eq!(snap.regs[16], 0x1E);
    assert_eq!(snap.reg_changes[16], 0x11);
    assert_eq!(snap.reg_changes[17], 0);
    assert_eq!(snap.state, State::Running);
    assert_eq!(snap.line, Some(8));
    assert!(snap.to_string().contains("R16*0x1E"));
}

#[test]
fn runaway_programs_hit_the_step_limit() {
    let vm = run_src(&program("", "loop: RJMP loop"));
    assert_eq!(vm.error(), Some(&RuntimeError::StepLimit(1_000_000)));
    assert_eq!(vm.state(), State::Errored);
}

#[test]
fn errors_render_a_message() {
    let vm = run_src(&program("", "POP R0"));
    let msg = vm.error().map(ToString::to_string).unwrap_or_default();
    assert!(msg.contains("underflow"), "{}", msg);
}
