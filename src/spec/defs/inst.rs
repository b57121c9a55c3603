use crate::spec::types::{
    hw::SRegBit,
    schema::{ArgKind, ArgSpec, Constraint, InstDef},
};
use derive_more::Display;
use enum_map::Enum;
use strum_macros::{EnumIter, EnumString, IntoStaticStr};

#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, IntoStaticStr, Enum,
)]
pub enum Mnemonic {
    ADC,
    ADD,
    ADIW,
    AND,
    ANDI,
    ASR,
    BCLR,
    BLD,
    BRBC,
    BRBS,
    BRCC,
    BRCS,
    BREAK,
    BREQ,
    BRGE,
    BRHC,
    BRHS,
    BRID,
    BRIE,
    BRLO,
    BRLT,
    BRMI,
    BRNE,
    BRPL,
    BRSH,
    BRTC,
    BRTS,
    BRVC,
    BRVS,
    BSET,
    BST,
    CALL,
    CBI,
    CBR,
    CLC,
    CLH,
    CLI,
    CLN,
    CLR,
    CLS,
    CLT,
    CLV,
    CLZ,
    COM,
    CP,
    CPC,
    CPI,
    CPSE,
    DEC,
    EOR,
    FMUL,
    FMULS,
    FMULSU,
    ICALL,
    IJMP,
    IN,
    INC,
    JMP,
    LD,
    LDD,
    LDI,
    LDS,
    LSL,
    LSR,
    MOV,
    MOVW,
    MUL,
    MULS,
    MULSU,
    NEG,
    NOP,
    OR,
    ORI,
    OUT,
    POP,
    PUSH,
    RCALL,
    RET,
    RETI,
    RJMP,
    ROL,
    ROR,
    SBC,
    SBCI,
    SBI,
    SBIC,
    SBIS,
    SBIW,
    SBR,
    SBRC,
    SBRS,
    SEC,
    SEH,
    SEI,
    SEN,
    SER,
    SES,
    SET,
    SEV,
    SEZ,
    SLEEP,
    ST,
    STD,
    STS,
    SUB,
    SUBI,
    SWAP,
    TST,
    WDR,
    XCH,
}

use ArgKind::*;
use Constraint::{Exact, OneOf, Range};

const REG: ArgSpec = ArgSpec::new(&[Reg], Range(0, 31));
const REG_HI: ArgSpec = ArgSpec::new(&[Reg], Range(16, 31));
const REG_MUL: ArgSpec = ArgSpec::new(&[Reg], Range(16, 23));
const REG_EVEN: ArgSpec = ArgSpec::new(
    &[Reg],
    OneOf(&[0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30]),
);
const REG_WORD: ArgSpec = ArgSpec::new(&[Reg], OneOf(&[24, 26, 28, 30]));

const BIT: ArgSpec = ArgSpec::new(&[Int], Range(0, 7));
const IO_LOW: ArgSpec = ArgSpec::new(&[Int], Range(0, 31));
const IO: ArgSpec = ArgSpec::new(&[Int], Range(0, 63));
const IMM6: ArgSpec = ArgSpec::new(&[Int], Range(0, 63));
const IMM8: ArgSpec = ArgSpec::new(&[Int], Range(0, 255));
const DATA_ADDR: ArgSpec = ArgSpec::new(&[Int], Range(256, 65535));

const REL7: ArgSpec = ArgSpec::new(&[Int], Range(-64, 63));
const REL12: ArgSpec = ArgSpec::new(&[Int], Range(-2048, 2047));
const REL12_OR_FUNC: ArgSpec = ArgSpec::new(&[Int, Func], Range(-2048, 2047));
const ADDR22: ArgSpec = ArgSpec::new(&[Int], Range(0, 4_194_303));
const ADDR22_OR_FUNC: ArgSpec = ArgSpec::new(&[Int, Func], Range(0, 4_194_303));

const PTR: ArgSpec = ArgSpec::new(&[Word, MinusWord, WordPlus], Constraint::None);
const PTR_DISP: ArgSpec = ArgSpec::new(&[WordPlusQ], Range(0, 63));
const PTR_Z: ArgSpec = ArgSpec::new(&[Word], Exact("Z"));

const NONE: &[ArgSpec] = &[];
const R: &[ArgSpec] = &[REG];
const RR: &[ArgSpec] = &[REG, REG];
const HK: &[ArgSpec] = &[REG_HI, IMM8];
const WK: &[ArgSpec] = &[REG_WORD, IMM6];
const MM: &[ArgSpec] = &[REG_MUL, REG_MUL];
const B: &[ArgSpec] = &[BIT];
const RB: &[ArgSpec] = &[REG, BIT];
const AB: &[ArgSpec] = &[IO_LOW, BIT];
const BRANCH: &[ArgSpec] = &[REL7];
const BRANCH_BIT: &[ArgSpec] = &[BIT, REL7];

const RD: &[char] = &['d'];
const RR_FIELDS: &[char] = &['d', 'r'];
const DK: &[char] = &['d', 'K'];
const K: &[char] = &['k'];
const S: &[char] = &['s'];
const SK: &[char] = &['s', 'k'];
const DB: &[char] = &['d', 'b'];
const AB_FIELDS: &[char] = &['A', 'b'];
const DK_IO: &[char] = &['d', 'A'];
const AR_IO: &[char] = &['A', 'r'];
const DK_ADDR: &[char] = &['d', 'k'];
const KR_ADDR: &[char] = &['k', 'r'];

impl Mnemonic {
    /// The catalog entry for this mnemonic.
    #[rustfmt::skip]
    pub fn def(self) -> InstDef {
        use Mnemonic::*;

        match self {
            ADC    => InstDef::template(RR, RR_FIELDS, "000111rdddddrrrr"),
            ADD    => InstDef::template(RR, RR_FIELDS, "000011rdddddrrrr"),
            ADIW   => InstDef::irregular(WK).cycles(2),
            AND    => InstDef::template(RR, RR_FIELDS, "001000rdddddrrrr"),
            ANDI   => InstDef::template(HK, DK, "0111KKKKddddKKKK"),
            ASR    => InstDef::template(R, RD, "1001010ddddd0101"),
            BCLR   => InstDef::template(B, S, "100101001sss1000"),
            BLD    => InstDef::template(RB, DB, "1111100ddddd0bbb"),
            BRBC   => InstDef::template(BRANCH_BIT, SK, "111101kkkkkkksss").relative(),
            BRBS   => InstDef::template(BRANCH_BIT, SK, "111100kkkkkkksss").relative(),
            BRCC   => InstDef::template(BRANCH, K, "111101kkkkkkk000").relative(),
            BRCS   => InstDef::template(BRANCH, K, "111100kkkkkkk000").relative(),
            BREAK  => InstDef::template(NONE, &[], "1001010110011000"),
            BREQ   => InstDef::template(BRANCH, K, "111100kkkkkkk001").relative(),
            BRGE   => InstDef::template(BRANCH, K, "111101kkkkkkk100").relative(),
            BRHC   => InstDef::template(BRANCH, K, "111101kkkkkkk101").relative(),
            BRHS   => InstDef::template(BRANCH, K, "111100kkkkkkk101").relative(),
            BRID   => InstDef::template(BRANCH, K, "111101kkkkkkk111").relative(),
            BRIE   => InstDef::template(BRANCH, K, "111100kkkkkkk111").relative(),
            BRLO   => InstDef::template(BRANCH, K, "111100kkkkkkk000").relative(),
            BRLT   => InstDef::template(BRANCH, K, "111100kkkkkkk100").relative(),
            BRMI   => InstDef::template(BRANCH, K, "111100kkkkkkk010").relative(),
            BRNE   => InstDef::template(BRANCH, K, "111101kkkkkkk001").relative(),
            BRPL   => InstDef::template(BRANCH, K, "111101kkkkkkk010").relative(),
            BRSH   => InstDef::template(BRANCH, K, "111101kkkkkkk000").relative(),
            BRTC   => InstDef::template(BRANCH, K, "111101kkkkkkk110").relative(),
            BRTS   => InstDef::template(BRANCH, K, "111100kkkkkkk110").relative(),
            BRVC   => InstDef::template(BRANCH, K, "111101kkkkkkk011").relative(),
            BRVS   => InstDef::template(BRANCH, K, "111100kkkkkkk011").relative(),
            BSET   => InstDef::template(B, S, "100101000sss1000"),
            BST    => InstDef::template(RB, DB, "1111101ddddd0bbb"),
            CALL   => InstDef::template(&[ADDR22_OR_FUNC], K, "1001010kkkkk111kkkkkkkkkkkkkkkkk").absolute().cycles(4),
            CBI    => InstDef::template(AB, AB_FIELDS, "10011000AAAAAbbb").cycles(2),
            CBR    => InstDef::irregular(HK),
            CLC    => InstDef::template(NONE, &[], "1001010010001000"),
            CLH    => InstDef::template(NONE, &[], "1001010011011000"),
            CLI    => InstDef::template(NONE, &[], "1001010011111000"),
            CLN    => InstDef::template(NONE, &[], "1001010010101000"),
            CLR    => InstDef::irregular(R),
            CLS    => InstDef::template(NONE, &[], "1001010011001000"),
            CLT    => InstDef::template(NONE, &[], "1001010011101000"),
            CLV    => InstDef::template(NONE, &[], "1001010010111000"),
            CLZ    => InstDef::template(NONE, &[], "1001010010011000"),
            COM    => InstDef::template(R, RD, "1001010ddddd0000"),
            CP     => InstDef::template(RR, RR_FIELDS, "000101rdddddrrrr"),
            CPC    => InstDef::template(RR, RR_FIELDS, "000001rdddddrrrr"),
            CPI    => InstDef::template(HK, DK, "0011KKKKddddKKKK"),
            CPSE   => InstDef::template(RR, RR_FIELDS, "000100rdddddrrrr"),
            DEC    => InstDef::template(R, RD, "1001010ddddd1010"),
            EOR    => InstDef::template(RR, RR_FIELDS, "001001rdddddrrrr"),
            FMUL   => InstDef::template(MM, RR_FIELDS, "000000110ddd1rrr").cycles(2),
            FMULS  => InstDef::template(MM, RR_FIELDS, "000000111ddd0rrr").cycles(2),
            FMULSU => InstDef::template(MM, RR_FIELDS, "000000111ddd1rrr").cycles(2),
            ICALL  => InstDef::template(NONE, &[], "1001010100001001").cycles(3),
            IJMP   => InstDef::template(NONE, &[], "1001010000001001").cycles(2),
            IN     => InstDef::template(&[REG, IO], DK_IO, "10110AAdddddAAAA"),
            INC    => InstDef::template(R, RD, "1001010ddddd0011"),
            JMP    => InstDef::template(&[ADDR22], K, "1001010kkkkk110kkkkkkkkkkkkkkkkk").absolute().cycles(3),
            LD     => InstDef::irregular(&[REG, PTR]).cycles(2),
            LDD    => InstDef::irregular(&[REG, PTR_DISP]).cycles(2),
            LDI    => InstDef::template(HK, DK, "1110KKKKddddKKKK"),
            LDS    => InstDef::template(&[REG, DATA_ADDR], DK_ADDR, "1001000ddddd0000kkkkkkkkkkkkkkkk").cycles(2),
            LSL    => InstDef::irregular(R),
            LSR    => InstDef::template(R, RD, "1001010ddddd0110"),
            MOV    => InstDef::template(RR, RR_FIELDS, "001011rdddddrrrr"),
            MOVW   => InstDef::irregular(&[REG_EVEN, REG_EVEN]),
            MUL    => InstDef::template(RR, RR_FIELDS, "100111rdddddrrrr").cycles(2),
            MULS   => InstDef::template(&[REG_HI, REG_HI], RR_FIELDS, "00000010ddddrrrr").cycles(2),
            MULSU  => InstDef::template(MM, RR_FIELDS, "000000110ddd0rrr").cycles(2),
            NEG    => InstDef::template(R, RD, "1001010ddddd0001"),
            NOP    => InstDef::template(NONE, &[], "0000000000000000"),
            OR     => InstDef::template(RR, RR_FIELDS, "001010rdddddrrrr"),
            ORI    => InstDef::template(HK, DK, "0110KKKKddddKKKK"),
            OUT    => InstDef::template(&[IO, REG], AR_IO, "10111AArrrrrAAAA"),
            POP    => InstDef::template(R, RD, "1001000ddddd1111").cycles(2),
            PUSH   => InstDef::template(R, &['r'], "1001001rrrrr1111").cycles(2),
            RCALL  => InstDef::template(&[REL12_OR_FUNC], K, "1101kkkkkkkkkkkk").relative().cycles(3),
            RET    => InstDef::template(NONE, &[], "1001010100001000").cycles(4),
            RETI   => InstDef::template(NONE, &[], "1001010100011000").cycles(4),
            RJMP   => InstDef::template(&[REL12], K, "1100kkkkkkkkkkkk").relative().cycles(2),
            ROL    => InstDef::irregular(R),
            ROR    => InstDef::template(R, RD, "1001010ddddd0111"),
            SBC    => InstDef::template(RR, RR_FIELDS, "000010rdddddrrrr"),
            SBCI   => InstDef::template(HK, DK, "0100KKKKddddKKKK"),
            SBI    => InstDef::template(AB, AB_FIELDS, "10011010AAAAAbbb").cycles(2),
            SBIC   => InstDef::template(AB, AB_FIELDS, "10011001AAAAAbbb"),
            SBIS   => InstDef::template(AB, AB_FIELDS, "10011011AAAAAbbb"),
            SBIW   => InstDef::irregular(WK).cycles(2),
            SBR    => InstDef::template(HK, DK, "0110KKKKddddKKKK"),
            SBRC   => InstDef::template(RB, &['r', 'b'], "1111110rrrrr0bbb"),
            SBRS   => InstDef::template(RB, &['r', 'b'], "1111111rrrrr0bbb"),
            SEC    => InstDef::template(NONE, &[], "1001010000001000"),
            SEH    => InstDef::template(NONE, &[], "1001010001011000"),
            SEI    => InstDef::template(NONE, &[], "1001010001111000"),
            SEN    => InstDef::template(NONE, &[], "1001010000101000"),
            SER    => InstDef::template(&[REG_HI], RD, "11101111dddd1111"),
            SES    => InstDef::template(NONE, &[], "1001010001001000"),
            SET    => InstDef::template(NONE, &[], "1001010001101000"),
            SEV    => InstDef::template(NONE, &[], "1001010000111000"),
            SEZ    => InstDef::template(NONE, &[], "1001010000011000"),
            SLEEP  => InstDef::template(NONE, &[], "1001010110001000"),
            ST     => InstDef::irregular(&[PTR, REG]).cycles(2),
            STD    => InstDef::irregular(&[PTR_DISP, REG]).cycles(2),
            STS    => InstDef::template(&[DATA_ADDR, REG], KR_ADDR, "1001001rrrrr0000kkkkkkkkkkkkkkkk").cycles(2),
            SUB    => InstDef::template(RR, RR_FIELDS, "000110rdddddrrrr"),
            SUBI   => InstDef::template(HK, DK, "0101KKKKddddKKKK"),
            SWAP   => InstDef::template(R, RD, "1001010ddddd0010"),
            TST    => InstDef::irregular(R),
            WDR    => InstDef::template(NONE, &[], "1001010110101000"),
            XCH    => InstDef::template(&[PTR_Z, REG], &['_', 'd'], "1001001ddddd0100").cycles(2),
        }
    }

    /// For the named conditional branches, the status bit tested and the value
    /// it must have for the branch to be taken.
    pub fn branch_condition(self) -> Option<(SRegBit, bool)> {
        use Mnemonic::*;

        Some(match self {
            BRCC | BRSH => (SRegBit::C, false),
            BRCS | BRLO => (SRegBit::C, true),
            BRNE => (SRegBit::Z, false),
            BREQ => (SRegBit::Z, true),
            BRPL => (SRegBit::N, false),
            BRMI => (SRegBit::N, true),
            BRVC => (SRegBit::V, false),
            BRVS => (SRegBit::V, true),
            BRGE => (SRegBit::S, false),
            BRLT => (SRegBit::S, true),
            BRHC => (SRegBit::H, false),
            BRHS => (SRegBit::H, true),
            BRTC => (SRegBit::T, false),
            BRTS => (SRegBit::T, true),
            BRID => (SRegBit::I, false),
            BRIE => (SRegBit::I, true),
            _ => return None,
        })
    }

    /// `BSET`/`BCLR` synonyms which set or clear a single fixed status bit.
    pub fn flag_op(self) -> Option<(SRegBit, bool)> {
        use Mnemonic::*;

        Some(match self {
            SEC => (SRegBit::C, true),
            SEZ => (SRegBit::Z, true),
            SEN => (SRegBit::N, true),
            SEV => (SRegBit::V, true),
            SES => (SRegBit::S, true),
            SEH => (SRegBit::H, true),
            SET => (SRegBit::T, true),
            SEI => (SRegBit::I, true),
            CLC => (SRegBit::C, false),
            CLZ => (SRegBit::Z, false),
            CLN => (SRegBit::N, false),
            CLV => (SRegBit::V, false),
            CLS => (SRegBit::S, false),
            CLH => (SRegBit::H, false),
            CLT => (SRegBit::T, false),
            CLI => (SRegBit::I, false),
            _ => return None,
        })
    }

    pub fn is_skip(self) -> bool {
        use Mnemonic::*;

        matches!(self, CPSE | SBRC | SBRS | SBIC | SBIS)
    }

    pub fn is_conditional(self) -> bool {
        use Mnemonic::*;

        self.is_skip() || self.branch_condition().is_some() || matches!(self, BRBC | BRBS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::types::schema::{Encoding, Flow};
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn templates_are_well_formed() {
        for m in Mnemonic::iter() {
            let def = m.def();
            if let Encoding::Template { fields, bits } = def.encoding {
                assert!(bits.len() == 16 || bits.len() == 32, "{}: {}", m, bits);
                assert_eq!(fields.len(), def.arity(), "{}", m);
                for field in fields.iter().filter(|c| **c != '_') {
                    assert!(bits.contains(*field), "{} has no field '{}'", m, field);
                }
                for c in bits.chars() {
                    assert!(c == '0' || c == '1' || fields.contains(&c), "{}: {}", m, c);
                }
            }
        }
    }

    #[test]
    fn double_words() {
        let doubles: Vec<_> = Mnemonic::iter().filter(|m| m.def().is_double_word()).collect();
        assert_eq!(
            doubles,
            vec![Mnemonic::CALL, Mnemonic::JMP, Mnemonic::LDS, Mnemonic::STS]
        );
    }

    #[test]
    fn relative_flow() {
        let relative = Mnemonic::iter()
            .filter(|m| m.def().flow == Flow::Relative)
            .count();
        assert_eq!(relative, 22);
        assert_eq!(Mnemonic::CALL.def().flow, Flow::Absolute);
        assert_eq!(Mnemonic::ADD.def().flow, Flow::Sequential);
    }

    #[test]
    fn catalog_size_and_parsing() {
        assert_eq!(Mnemonic::iter().count(), 110);
        assert_eq!(Mnemonic::from_str("FMULSU"), Ok(Mnemonic::FMULSU));
        assert!(Mnemonic::from_str("MOVE").is_err());
    }

    #[test]
    fn every_named_branch_is_conditional() {
        for m in Mnemonic::iter().filter(|m| m.def().flow == Flow::Relative) {
            match m {
                Mnemonic::RJMP | Mnemonic::RCALL => assert!(!m.is_conditional()),
                _ => assert!(m.is_conditional(), "{}", m),
            }
        }
    }
}
