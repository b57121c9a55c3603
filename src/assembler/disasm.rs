use super::model::{Image, Instruction, Slot};
use crate::spec::types::hw::RAM_START;
use itertools::Itertools;

/// Renders an instruction as assembly source which encodes back to the same opcode.
pub fn render(inst: &Instruction) -> String {
    if inst.operands.is_empty() {
        inst.mnemonic.to_string()
    } else {
        format!("{} {}", inst.mnemonic, inst.operands.iter().join(", "))
    }
}

fn opcode_hex(inst: &Instruction) -> String {
    inst.words()
        .iter()
        .map(|word| format!("{:04X}", word))
        .join(" ")
}

/// One line per assembled program word: index, opcode in hex, and the rendered instruction.
pub fn listing(image: &Image) -> String {
    let mut out = String::new();

    for (idx, slot) in image.pmem[..image.code_len].iter().enumerate() {
        if let Slot::Inst(inst) = slot {
            out.push_str(&format!(
                "{:#06X}  {:<9}  {}\n",
                idx,
                opcode_hex(inst),
                render(inst)
            ));
        }
    }

    out
}

/// A hex dump of the data memory written by the data section, sixteen bytes per row.
pub fn data_dump(image: &Image) -> String {
    let data = &image.dmem[RAM_START..image.data_end.max(RAM_START)];

    data.chunks(16)
        .enumerate()
        .map(|(row, bytes)| {
            format!(
                "{:#06X}  {}\n",
                RAM_START + row * 16,
                bytes.iter().map(|b| format!("{:02X}", b)).join(" ")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    #[test]
    fn listing_lines() {
        let image = assemble(
            ".section .text\n.global main\nmain: LDI R16, 15\nCALL main\nLD R0, -Y\n.end",
            None,
        )
        .unwrap();

        let lines: Vec<_> = listing(&image).lines().map(str::to_owned).collect();
        assert_eq!(
            lines,
            vec![
                "0x0000  E00F       LDI R16, 15",
                "0x0001  940E 0000  CALL 0",
                "0x0003  900A       LD R0, -Y",
            ]
        );
    }

    #[test]
    fn data_rows() {
        let image = assemble(
            ".section .data\n.byte 1, 2, 3\n.section .text\n.global main\nmain: RET\n.end",
            None,
        )
        .unwrap();
        assert_eq!(data_dump(&image), "0x0100  01 02 03\n");
    }
}
