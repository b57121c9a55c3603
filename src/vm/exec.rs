use super::{
    alu::{self, Flags, OpResult, Signedness},
    instance::Instance,
    interface::Console,
    types::RuntimeError,
};
use crate::assembler::model::{Instruction, Operand, PtrMode, Slot};
use crate::spec::{
    defs::{
        func::{PseudoFunc, PRINTF_CLOBBERS, PRINTF_COUNT_REGS},
        inst::Mnemonic,
    },
    types::hw::{
        hi8, io_to_data_addr, lo8, word_from_bytes, Byte, Pointer, SRegBit, Word, FLASH_SIZE,
        RAMEND, RAM_START,
    },
};
use log::trace;
use num_traits::FromPrimitive;

/// What the program counter does after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Control {
    /// Advance past the instruction.
    Next,
    Jump(usize),
    /// The program returned or hit a `BREAK`.
    Stop,
}

/// Typed access to the operands of an instruction, which the assembler has already checked.
struct Ops<'a> {
    inst: &'a Instruction,
}

impl<'a> Ops<'a> {
    fn malformed(&self) -> RuntimeError {
        RuntimeError::MalformedOperands(self.inst.mnemonic)
    }

    fn get(&self, idx: usize) -> Result<Operand, RuntimeError> {
        self.inst.operands.get(idx).copied().ok_or_else(|| self.malformed())
    }

    fn reg(&self, idx: usize) -> Result<usize, RuntimeError> {
        self.get(idx)?.reg().ok_or_else(|| self.malformed())
    }

    fn imm(&self, idx: usize) -> Result<i64, RuntimeError> {
        self.get(idx)?.imm().ok_or_else(|| self.malformed())
    }

    fn byte(&self, idx: usize) -> Result<Byte, RuntimeError> {
        Ok(self.imm(idx)? as Byte)
    }

    fn bit(&self, idx: usize) -> Result<u8, RuntimeError> {
        Ok((self.imm(idx)? & 0x7) as u8)
    }

    fn ptr(&self, idx: usize) -> Result<(Pointer, PtrMode), RuntimeError> {
        match self.get(idx)? {
            Operand::Ptr(p, mode) => Ok((p, mode)),
            _ => Err(self.malformed()),
        }
    }

    fn func(&self, idx: usize) -> Option<PseudoFunc> {
        match self.inst.operands.get(idx) {
            Some(Operand::Func(func)) => Some(*func),
            _ => None,
        }
    }
}

fn has_bit(v: Byte, n: u8) -> bool {
    v & (1 << n) != 0
}

impl<C: Console> Instance<C> {
    fn flag(&self, bit: SRegBit) -> bool {
        self.sreg().contains(Flags::of_bit(bit))
    }

    fn set_flag(&mut self, bit: SRegBit, val: bool) {
        let mut sreg = self.sreg();
        sreg.set(Flags::of_bit(bit), val);
        self.set_sreg(sreg);
    }

    fn apply_flags<T>(&mut self, res: &OpResult<T>) {
        let sreg = res.apply(self.sreg());
        self.set_sreg(sreg);
    }

    fn write_result(&mut self, rd: usize, res: OpResult<Byte>) {
        self.mem.set_reg(rd, res.val);
        self.apply_flags(&res);
    }

    fn write_product(&mut self, res: OpResult<Word>) {
        self.mem.set_reg_pair(0, res.val);
        self.apply_flags(&res);
    }

    fn push(&mut self, val: Byte) -> Result<(), RuntimeError> {
        let sp = self.sp() as usize;
        if sp < RAM_START {
            return Err(RuntimeError::StackOverflow(sp));
        }
        self.mem.set(sp, val)?;
        self.set_sp((sp - 1) as Word);
        Ok(())
    }

    fn pop(&mut self) -> Result<Byte, RuntimeError> {
        let sp = self.sp() as usize;
        if sp >= RAMEND {
            return Err(RuntimeError::StackUnderflow(sp));
        }
        let val = self.mem.get(sp + 1)?;
        self.set_sp((sp + 1) as Word);
        Ok(val)
    }

    /// Pushes a return address low byte first. Checks room for both bytes before writing either.
    fn push_return(&mut self, ret: usize) -> Result<(), RuntimeError> {
        let sp = self.sp() as usize;
        if sp < RAM_START + 1 {
            return Err(RuntimeError::StackOverflow(sp.min(RAM_START - 1)));
        }
        self.mem.set(sp, lo8(ret as Word))?;
        self.mem.set(sp - 1, hi8(ret as Word))?;
        self.set_sp((sp - 2) as Word);
        Ok(())
    }

    /// Pops a return address, leaving SP alone unless both bytes are there and the target is in
    /// flash.
    fn pop_return(&mut self) -> Result<usize, RuntimeError> {
        let sp = self.sp() as usize;
        if sp + 2 > RAMEND {
            return Err(RuntimeError::StackUnderflow(sp.max(RAMEND)));
        }
        let hi = self.mem.get(sp + 1)?;
        let lo = self.mem.get(sp + 2)?;
        let target = self.absolute(word_from_bytes(lo, hi) as i64)?;
        self.set_sp((sp + 2) as Word);
        Ok(target)
    }

    fn absolute(&self, k: i64) -> Result<usize, RuntimeError> {
        if k < 0 || k >= FLASH_SIZE as i64 {
            return Err(RuntimeError::JumpOutOfRange(k));
        }
        Ok(k as usize)
    }

    fn relative(&self, k: i64) -> Result<usize, RuntimeError> {
        self.absolute(self.pc as i64 + 1 + k)
    }

    fn branch(&mut self, taken: bool, k: i64) -> Result<Control, RuntimeError> {
        if !taken {
            return Ok(Control::Next);
        }
        self.stats.branches_taken += 1;
        self.stats.cycles += 1;
        Ok(Control::Jump(self.relative(k)?))
    }

    /// Skips the following instruction, all of it if it is two words long.
    fn skip(&mut self, taken: bool) -> Control {
        if !taken {
            return Control::Next;
        }
        let next = self
            .pmem
            .get(self.pc + 1)
            .and_then(Slot::inst)
            .map_or(1, Instruction::width);
        self.stats.branches_taken += 1;
        self.stats.cycles += next as u64;
        Control::Jump(self.pc + 1 + next)
    }

    fn pointer(&self, p: Pointer) -> Word {
        self.mem.reg_pair(p.lo_reg())
    }

    /// The data address a pointer operand refers to, and the value the pointer takes once the
    /// access succeeds (for pre-decrement and post-increment).
    fn address(&self, p: Pointer, mode: PtrMode) -> (usize, Option<Word>) {
        let base = self.pointer(p);
        match mode {
            PtrMode::Plain => (base as usize, None),
            PtrMode::Disp(q) => (base as usize + q as usize, None),
            PtrMode::PostInc => (base as usize, Some(base.wrapping_add(1))),
            PtrMode::PreDec => {
                let addr = base.wrapping_sub(1);
                (addr as usize, Some(addr))
            }
        }
    }

    fn update_pointer(&mut self, p: Pointer, update: Option<Word>) {
        if let Some(w) = update {
            self.mem.set_reg_pair(p.lo_reg(), w);
        }
    }

    fn io_bit(&mut self, ops: &Ops, val: bool) -> Result<(), RuntimeError> {
        let addr = io_to_data_addr(ops.imm(0)? as usize);
        let bit = ops.bit(1)?;
        let mut byte = self.mem.get(addr)?;
        if val {
            byte |= 1 << bit;
        } else {
            byte &= !(1 << bit);
        }
        self.mem.set(addr, byte)
    }

    /// The print trap: writes the NUL-terminated string whose address the caller pushed.
    fn printf(&mut self) -> Result<(), RuntimeError> {
        let sp = self.sp() as usize;
        let hi = self.mem.get(sp + 1)?;
        let lo = self.mem.get(sp + 2)?;
        let addr = word_from_bytes(lo, hi) as usize;

        let text = self.mem.c_str(addr)?;
        trace!("printf({:#06X}): {} bytes", addr, text.len());
        self.console.write(&text);

        let count = text.len() as Word;
        self.mem.set_reg(PRINTF_COUNT_REGS.0, lo8(count));
        self.mem.set_reg(PRINTF_COUNT_REGS.1, hi8(count));
        for (r, val) in PRINTF_CLOBBERS.iter() {
            self.mem.set_reg(*r, *val);
        }
        Ok(())
    }

    fn call(&mut self, target: usize, width: usize) -> Result<Control, RuntimeError> {
        let ret = self.pc + width;
        self.push_return(ret)?;
        Ok(Control::Jump(target))
    }

    pub(super) fn execute(&mut self, inst: &Instruction) -> Result<Control, RuntimeError> {
        use Mnemonic::*;

        let ops = Ops { inst };
        let m = inst.mnemonic;

        if let Some((bit, val)) = m.flag_op() {
            self.set_flag(bit, val);
            return Ok(Control::Next);
        }

        if let Some((bit, val)) = m.branch_condition() {
            let taken = self.flag(bit) == val;
            return self.branch(taken, ops.imm(0)?);
        }

        match m {
            ADD | ADC | SUB | SBC | AND | OR | EOR | CP | CPC | MOV | MUL | MULS | MULSU | FMUL
            | FMULS | FMULSU | CPSE => {
                let (rd, rr) = (ops.reg(0)?, ops.reg(1)?);
                let (d, r) = (self.mem.reg(rd), self.mem.reg(rr));
                let c = self.flag(SRegBit::C);
                let z = self.flag(SRegBit::Z);

                match m {
                    ADD => self.write_result(rd, alu::add(d, r, false)),
                    ADC => self.write_result(rd, alu::add(d, r, c)),
                    SUB => self.write_result(rd, alu::sub(d, r, false, None)),
                    SBC => self.write_result(rd, alu::sub(d, r, c, Some(z))),
                    AND => self.write_result(rd, alu::logic(d & r)),
                    OR => self.write_result(rd, alu::logic(d | r)),
                    EOR => self.write_result(rd, alu::logic(d ^ r)),
                    CP => self.apply_flags(&alu::sub(d, r, false, None)),
                    CPC => self.apply_flags(&alu::sub(d, r, c, Some(z))),
                    MOV => self.mem.set_reg(rd, r),
                    MUL => self.write_product(alu::mul(d, r, Signedness::Unsigned)),
                    MULS => self.write_product(alu::mul(d, r, Signedness::Signed)),
                    MULSU => self.write_product(alu::mul(d, r, Signedness::Mixed)),
                    FMUL => self.write_product(alu::fmul(d, r, Signedness::Unsigned)),
                    FMULS => self.write_product(alu::fmul(d, r, Signedness::Signed)),
                    FMULSU => self.write_product(alu::fmul(d, r, Signedness::Mixed)),
                    _ => return Ok(self.skip(d == r)),
                }
            }

            ANDI | ORI | SBR | CBR | SUBI | SBCI | CPI | LDI => {
                let rd = ops.reg(0)?;
                let d = self.mem.reg(rd);
                let k = ops.byte(1)?;
                let c = self.flag(SRegBit::C);
                let z = self.flag(SRegBit::Z);

                match m {
                    ANDI => self.write_result(rd, alu::logic(d & k)),
                    ORI | SBR => self.write_result(rd, alu::logic(d | k)),
                    CBR => self.write_result(rd, alu::logic(d & !k)),
                    SUBI => self.write_result(rd, alu::sub(d, k, false, None)),
                    SBCI => self.write_result(rd, alu::sub(d, k, c, Some(z))),
                    CPI => self.apply_flags(&alu::sub(d, k, false, None)),
                    _ => self.mem.set_reg(rd, k),
                }
            }

            ASR | COM | DEC | INC | LSL | LSR | NEG | ROL | ROR | SWAP | TST | CLR | SER => {
                let rd = ops.reg(0)?;
                let d = self.mem.reg(rd);
                let c = self.flag(SRegBit::C);

                match m {
                    ASR => self.write_result(rd, alu::asr(d)),
                    COM => self.write_result(rd, alu::com(d)),
                    DEC => self.write_result(rd, alu::dec(d)),
                    INC => self.write_result(rd, alu::inc(d)),
                    LSL => self.write_result(rd, alu::add(d, d, false)),
                    LSR => self.write_result(rd, alu::lsr(d)),
                    NEG => self.write_result(rd, alu::neg(d)),
                    ROL => self.write_result(rd, alu::add(d, d, c)),
                    ROR => self.write_result(rd, alu::ror(d, c)),
                    SWAP => self.mem.set_reg(rd, d.rotate_left(4)),
                    TST => self.apply_flags(&alu::logic(d)),
                    CLR => self.write_result(rd, alu::logic(0)),
                    _ => self.mem.set_reg(rd, 0xFF),
                }
            }

            ADIW | SBIW => {
                let rd = ops.reg(0)?;
                let w = self.mem.reg_pair(rd);
                let k = ops.imm(1)? as Word;
                let res = if m == ADIW {
                    alu::add_word(w, k)
                } else {
                    alu::sub_word(w, k)
                };
                self.mem.set_reg_pair(rd, res.val);
                self.apply_flags(&res);
            }

            MOVW => {
                let (rd, rr) = (ops.reg(0)?, ops.reg(1)?);
                let w = self.mem.reg_pair(rr);
                self.mem.set_reg_pair(rd, w);
            }

            BSET | BCLR => {
                let bit = SRegBit::from_u8(ops.bit(0)?).ok_or_else(|| ops.malformed())?;
                self.set_flag(bit, m == BSET);
            }

            BST => {
                let d = self.mem.reg(ops.reg(0)?);
                self.set_flag(SRegBit::T, has_bit(d, ops.bit(1)?));
            }

            BLD => {
                let rd = ops.reg(0)?;
                let bit = ops.bit(1)?;
                let d = self.mem.reg(rd);
                let d = if self.flag(SRegBit::T) {
                    d | (1 << bit)
                } else {
                    d & !(1 << bit)
                };
                self.mem.set_reg(rd, d);
            }

            BRBC | BRBS => {
                let bit = SRegBit::from_u8(ops.bit(0)?).ok_or_else(|| ops.malformed())?;
                let taken = self.flag(bit) == (m == BRBS);
                return self.branch(taken, ops.imm(1)?);
            }

            SBRC | SBRS => {
                let r = self.mem.reg(ops.reg(0)?);
                let set = has_bit(r, ops.bit(1)?);
                return Ok(self.skip(set == (m == SBRS)));
            }

            SBIC | SBIS => {
                let io = self.mem.get(io_to_data_addr(ops.imm(0)? as usize))?;
                let set = has_bit(io, ops.bit(1)?);
                return Ok(self.skip(set == (m == SBIS)));
            }

            CBI => self.io_bit(&ops, false)?,
            SBI => self.io_bit(&ops, true)?,

            IN => {
                let val = self.mem.get(io_to_data_addr(ops.imm(1)? as usize))?;
                self.mem.set_reg(ops.reg(0)?, val);
            }

            OUT => {
                let val = self.mem.reg(ops.reg(1)?);
                self.mem.set(io_to_data_addr(ops.imm(0)? as usize), val)?;
            }

            LD | LDD => {
                let rd = ops.reg(0)?;
                let (p, mode) = ops.ptr(1)?;
                let (addr, update) = self.address(p, mode);
                let val = self.mem.get(addr)?;
                self.update_pointer(p, update);
                self.mem.set_reg(rd, val);
            }

            ST | STD => {
                let (p, mode) = ops.ptr(0)?;
                let val = self.mem.reg(ops.reg(1)?);
                let (addr, update) = self.address(p, mode);
                self.mem.set(addr, val)?;
                self.update_pointer(p, update);
            }

            LDS => {
                let val = self.mem.get(ops.imm(1)? as usize)?;
                self.mem.set_reg(ops.reg(0)?, val);
            }

            STS => {
                let val = self.mem.reg(ops.reg(1)?);
                self.mem.set(ops.imm(0)? as usize, val)?;
            }

            XCH => {
                let rd = ops.reg(1)?;
                let addr = self.pointer(Pointer::Z) as usize;
                let old = self.mem.get(addr)?;
                let val = self.mem.reg(rd);
                self.mem.set(addr, val)?;
                self.mem.set_reg(rd, old);
            }

            PUSH => {
                let val = self.mem.reg(ops.reg(0)?);
                self.push(val)?;
            }

            POP => {
                let val = self.pop()?;
                self.mem.set_reg(ops.reg(0)?, val);
            }

            RJMP => return Ok(Control::Jump(self.relative(ops.imm(0)?)?)),
            JMP => return Ok(Control::Jump(self.absolute(ops.imm(0)?)?)),
            IJMP => return Ok(Control::Jump(self.absolute(self.pointer(Pointer::Z) as i64)?)),

            RCALL | CALL => {
                if let Some(PseudoFunc::Printf) = ops.func(0) {
                    self.printf()?;
                    return Ok(Control::Next);
                }
                let k = ops.imm(0)?;
                let target = if m == RCALL {
                    self.relative(k)?
                } else {
                    self.absolute(k)?
                };
                return self.call(target, inst.width());
            }

            ICALL => {
                let target = self.absolute(self.pointer(Pointer::Z) as i64)?;
                return self.call(target, inst.width());
            }

            RET | RETI => {
                if self.sp() as usize == RAMEND {
                    return Ok(Control::Stop);
                }
                let target = self.pop_return()?;
                if m == RETI {
                    self.set_flag(SRegBit::I, true);
                }
                return Ok(Control::Jump(target));
            }

            BREAK => return Ok(Control::Stop),

            NOP | SLEEP | WDR => {}

            // Flag operations and named branches returned above.
            _ => return Err(ops.malformed()),
        }

        Ok(Control::Next)
    }
}
