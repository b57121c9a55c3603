mod common;

use avrsim::assembler::{
    self, disasm,
    model::{Operand, PtrMode, Slot},
    phases::{
        layout, resolve, tokenize,
        types::{Loc, Located},
    },
    Error,
};
use avrsim::spec::{
    defs::inst::Mnemonic,
    types::hw::{Pointer, FLASH_SIZE, RAM_SIZE, RAM_START},
};
use common::{assemble, program};

const SAMPLE: &str = "\
.section .data
.equ COUNT, 3
.def counter = R20
msg: .string \"done\\n\"
table: .byte 1, 2, COUNT * 2
.section .text
.global main
main:
    LDI counter, COUNT
loop:
    DEC counter
    BRNE loop
    LDI R30, lo8(table)
    LDI R31, hi8(table)
    LD R16, Z+
    LDD R17, Z+1
    ST -Z, R17
    CALL sub
    RET
sub:
    LDI R16, lo8(msg)
    PUSH R16
    LDI R16, hi8(msg)
    PUSH R16
    RCALL printf
    POP R0
    POP R0
    RET
.end
";

#[test]
fn assembling_is_deterministic() {
    let first = assemble(SAMPLE);
    let second = assemble(SAMPLE);
    assert_eq!(first.pmem, second.pmem);
    assert_eq!(first.dmem, second.dmem);
    assert_eq!(first.pmem.len(), FLASH_SIZE);
    assert_eq!(first.dmem.len(), RAM_SIZE);
}

#[test]
fn sample_layout() {
    let image = assemble(SAMPLE);
    assert_eq!(
        &image.dmem[RAM_START..image.data_end],
        b"done\n\0\x01\x02\x06"
    );
    assert_eq!(image.symbols.label("table"), Some(RAM_START + 6));
    assert_eq!(image.symbols.label("loop"), Some(1));

    let inst = |idx: usize| match &image.pmem[idx] {
        Slot::Inst(inst) => inst.clone(),
        Slot::Continuation => panic!("slot {} is a continuation", idx),
    };
    assert_eq!(inst(0).operands, vec![Operand::Reg(20), Operand::Imm(3)]);
    assert_eq!(inst(2).operands, vec![Operand::Imm(-2)]);
    assert_eq!(inst(3).operands, vec![Operand::Reg(30), Operand::Imm(6)]);
    assert_eq!(inst(4).operands, vec![Operand::Reg(31), Operand::Imm(1)]);
    assert_eq!(
        inst(5).operands,
        vec![Operand::Reg(16), Operand::Ptr(Pointer::Z, PtrMode::PostInc)]
    );
    assert_eq!(inst(8).mnemonic, Mnemonic::CALL);
    assert_eq!(image.pmem[9], Slot::Continuation);
    assert_eq!(inst(8).operands, vec![Operand::Imm(11)]);
}

#[test]
fn sample_runs() {
    let vm = common::run_src(SAMPLE);
    assert!(vm.is_finished(), "{:?}", vm.error());
    assert_eq!(vm.console(), "done\n");
    assert_eq!(vm.mem().reg(20), 0);
    // R16 last held the high byte of the string address.
    assert_eq!(vm.mem().reg(16), 1);
    assert_eq!(vm.mem().reg(17), 6);
    assert_eq!(vm.mem().get(RAM_START + 6), Ok(6));
}

#[test]
fn rendered_instructions_reassemble_identically() {
    let image = assemble(SAMPLE);
    let rendered: String = image.pmem[..image.code_len]
        .iter()
        .filter_map(Slot::inst)
        .map(|inst| format!("{}\n", disasm::render(inst)))
        .collect();

    let reassembled = assemble(&program(".string \"done\\n\"", &rendered));
    assert_eq!(reassembled.code_len, image.code_len);
    for (original, copy) in image.pmem.iter().zip(reassembled.pmem.iter()) {
        match (original, copy) {
            (Slot::Inst(a), Slot::Inst(b)) => {
                assert_eq!(a.mnemonic, b.mnemonic);
                assert_eq!(a.operands, b.operands);
                assert_eq!(a.opcode, b.opcode);
            }
            (a, b) => assert_eq!(a, b),
        }
    }
}

#[test]
fn listing_covers_every_instruction() {
    let image = assemble(SAMPLE);
    let listing = disasm::listing(&image);
    let lines: Vec<_> = listing.lines().collect();
    // Every slot but the CALL continuation.
    assert_eq!(lines.len(), image.code_len - 1);
    assert!(lines[0].ends_with("LDI R20, 3"));
    assert!(lines.iter().any(|line| line.ends_with("RCALL printf")));
    assert!(lines.iter().any(|line| line.ends_with("ST -Z, R17")));
}

#[test]
fn flash_boundary() {
    let fits = program("", &"NOP\n".repeat(FLASH_SIZE));
    assert_eq!(assemble(&fits).code_len, FLASH_SIZE);

    let overflows = program("", &"NOP\n".repeat(FLASH_SIZE + 1));
    match assembler::assemble(&overflows, None) {
        Err(Error::Layout(err)) => assert_eq!(err.value(), layout::Error::FlashOverflow),
        other => panic!("expected a flash overflow, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn ram_boundary() {
    let capacity = RAM_SIZE - RAM_START;
    let fits = program(&format!(".space {}", capacity), "RET");
    assert_eq!(assemble(&fits).data_end, RAM_SIZE);

    let overflows = program(&format!(".space {}\n.byte 1", capacity), "RET");
    match assembler::assemble(&overflows, None) {
        Err(Error::Layout(err)) => assert_eq!(err.value(), layout::Error::RamOverflow),
        other => panic!("expected a RAM overflow, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn lexical_errors_carry_a_column() {
    let err = assembler::assemble(&program("", "LDI R32, 1"), None).unwrap_err();
    assert!(err.is_lexical());
    assert_eq!(
        err,
        Error::Tokenize(Located::with_loc(
            Loc::new(6, 5),
            tokenize::Error::RegisterOutOfRange("R32".to_owned())
        ))
    );
    assert!(err.to_string().starts_with("Lexical Error"));
}

#[test]
fn undefined_symbols() {
    let err = assembler::assemble(&program("", "RJMP nowhere"), None).unwrap_err();
    assert_eq!(
        err,
        Error::Resolve(Located::with_loc(
            Loc::new(6, 6),
            resolve::Error::UndefinedSymbol("nowhere".to_owned())
        ))
    );
}

#[test]
fn expression_errors() {
    let err = assembler::assemble(&program("", "LDI R16, 1 / 0"), None).unwrap_err();
    assert!(err.is_expression(), "{}", err);
    assert_eq!(err.loc().map(|loc| loc.line()), Some(6));
}

#[test]
fn errors_name_the_line() {
    let err = assembler::assemble(&program("", "NOP\nLDI R16"), None).unwrap_err();
    assert_eq!(err.loc().map(|loc| loc.line()), Some(7));
    assert!(!err.to_string().is_empty());
}
