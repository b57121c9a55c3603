use super::{
    alu::Flags,
    exec::Control,
    interface::Console,
    mem::Mem,
    types::{LogLevel, RuntimeError, Snapshot, Stats},
};
use crate::assembler::model::{Image, Instruction, Slot};
use crate::spec::{
    defs::inst::Mnemonic,
    types::hw::{
        word_from_bytes, hi8, lo8, Word, FLASHEND, MAX_STEPS, PCH_ADDR, PCL_ADDR, RAMEND,
        SPH_ADDR, SPL_ADDR, SREG_ADDR,
    },
};
use enum_map::EnumMap;
use log::{debug, trace, warn};
use std::fmt::Display;
use std::rc::Rc;
use strum_macros::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Finished,
    Errored,
}

/// The interpreter. Owns the memory images it was built from; `C` receives print trap output.
pub struct Instance<C: Console> {
    pub(super) log_level: LogLevel,
    pub(super) pmem: Rc<[Slot]>,
    image_dmem: Vec<u8>,
    pub(super) mem: Mem,
    pub(super) pc: usize,
    breakpoint: Option<usize>,
    step_limit: Option<u64>,

    state: State,
    error: Option<RuntimeError>,
    pub(super) stats: Stats,
    counts: EnumMap<Mnemonic, u64>,

    pub(super) console: C,
}

impl<C: Console> Display for Instance<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Snapshot::of(self))
    }
}

impl<C: Console> Instance<C> {
    pub fn new(image: &Image, console: C) -> Self {
        let mut vm = Instance {
            log_level: LogLevel::default(),
            pmem: image.pmem.clone().into(),
            image_dmem: image.dmem.clone(),
            mem: Mem::new(&image.dmem),
            pc: 0,
            breakpoint: image.breakpoint,
            step_limit: Some(MAX_STEPS),

            state: State::Running,
            error: None,
            stats: Stats::default(),
            counts: EnumMap::default(),

            console,
        };
        vm.reset();
        vm
    }

    pub fn with_log_level(self, log_level: LogLevel) -> Self {
        Instance { log_level, ..self }
    }

    /// `None` removes the step limit entirely.
    pub fn with_step_limit(self, step_limit: Option<u64>) -> Self {
        Instance { step_limit, ..self }
    }

    /// Restores the initial memory image and all counters, then derives PC and SP.
    pub fn reset(&mut self) {
        self.mem = Mem::new(&self.image_dmem);
        self.state = State::Running;
        self.error = None;
        self.stats = Stats::default();
        self.counts = EnumMap::default();

        self.pc = word_from_bytes(self.mem.reg(PCL_ADDR), self.mem.reg(PCH_ADDR)) as usize;
        self.mem.set_reg(PCL_ADDR, 0);
        self.mem.set_reg(PCH_ADDR, 0);
        self.set_sp(RAMEND as Word);
        self.mem.clear_changes();

        debug!("reset: entry at {:#06X}", self.pc);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn is_errored(&self) -> bool {
        self.state == State::Errored
    }

    pub fn error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// How many times each mnemonic has executed.
    pub fn counts(&self) -> &EnumMap<Mnemonic, u64> {
        &self.counts
    }

    pub fn mem(&self) -> &Mem {
        &self.mem
    }

    /// For hosts editing machine state between steps.
    pub fn mem_mut(&mut self) -> &mut Mem {
        &mut self.mem
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn into_console(self) -> C {
        self.console
    }

    pub fn sp(&self) -> Word {
        word_from_bytes(self.mem.reg(SPL_ADDR), self.mem.reg(SPH_ADDR))
    }

    pub(super) fn set_sp(&mut self, sp: Word) {
        self.mem.set_reg(SPL_ADDR, lo8(sp));
        self.mem.set_reg(SPH_ADDR, hi8(sp));
    }

    pub fn sreg(&self) -> Flags {
        Flags::from_bits_truncate(self.mem.reg(SREG_ADDR))
    }

    pub(super) fn set_sreg(&mut self, flags: Flags) {
        self.mem.set_reg(SREG_ADDR, flags.bits());
    }

    pub fn sreg_changes(&self) -> Flags {
        Flags::from_bits_truncate(self.mem.cells()[SREG_ADDR].changed_bits())
    }

    pub fn current_line(&self) -> Option<usize> {
        self.pmem
            .get(self.pc)
            .and_then(Slot::inst)
            .map(|inst| inst.line)
            .filter(|line| *line != 0)
    }

    fn finish(&mut self) {
        debug!("finished at {:#06X} after {} steps", self.pc, self.stats.steps);
        self.state = State::Finished;
    }

    fn fail(&mut self, err: RuntimeError) {
        warn!("runtime error at {:#06X}: {}", self.pc, err);
        self.error = Some(err);
        self.state = State::Errored;
    }

    /// Executes one instruction. Does nothing once the machine has finished or errored.
    pub fn step(&mut self) -> State {
        if self.state != State::Running {
            return self.state;
        }

        if Some(self.pc) == self.breakpoint {
            self.finish();
            return self.state;
        }

        if self.pc >= FLASHEND {
            self.pc = FLASHEND;
            self.finish();
            return self.state;
        }

        if let Some(limit) = self.step_limit {
            if self.stats.steps >= limit {
                self.fail(RuntimeError::StepLimit(limit));
                return self.state;
            }
        }

        self.mem.clear_changes();

        let pmem = Rc::clone(&self.pmem);
        let inst = match fetch(&pmem, self.pc) {
            Ok(inst) => inst,
            Err(err) => {
                self.fail(err);
                return self.state;
            }
        };

        trace!("{:#06X}: {}", self.pc, crate::assembler::disasm::render(inst));

        self.stats.steps += 1;
        self.stats.cycles += inst.mnemonic.def().cycles;
        self.counts[inst.mnemonic] += 1;
        if inst.mnemonic.is_conditional() {
            self.stats.branches_seen += 1;
        }

        match self.execute(inst) {
            Ok(Control::Next) => self.pc += inst.width(),
            Ok(Control::Jump(target)) => self.pc = target,
            Ok(Control::Stop) => self.finish(),
            Err(err) => self.fail(err),
        }

        if self.log_level.internals {
            println!("{}", Snapshot::of(self));
        }

        self.state
    }

    /// Steps until the machine finishes or errors.
    pub fn run(&mut self) -> State {
        while self.step() == State::Running {}
        self.state
    }
}

fn fetch(pmem: &[Slot], pc: usize) -> Result<&Instruction, RuntimeError> {
    match pmem.get(pc) {
        Some(Slot::Inst(inst)) => Ok(inst),
        Some(Slot::Continuation) => Err(RuntimeError::ContinuationExecuted(pc)),
        None => Err(RuntimeError::JumpOutOfRange(pc as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn vm(body: &str) -> Instance<String> {
        let src = format!(".section .text\n.global main\nmain:\n{}\n.end", body);
        Instance::new(&assemble(&src, None).unwrap(), String::new())
    }

    #[test]
    fn initial_state() {
        let vm = vm("NOP\nRET");
        assert_eq!(vm.state(), State::Running);
        assert_eq!(vm.sp(), RAMEND as Word);
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.sreg(), Flags::empty());
    }

    #[test]
    fn steps_are_no_ops_once_finished() {
        let mut vm = vm("RET");
        assert_eq!(vm.step(), State::Finished);
        assert_eq!(vm.stats().steps, 1);
        assert_eq!(vm.step(), State::Finished);
        assert_eq!(vm.stats().steps, 1);
    }

    #[test]
    fn step_limit() {
        let mut vm = vm("loop: RJMP loop").with_step_limit(Some(10));
        assert_eq!(vm.run(), State::Errored);
        assert_eq!(vm.error(), Some(&RuntimeError::StepLimit(10)));
        assert_eq!(vm.stats().steps, 10);
    }

    #[test]
    fn running_off_the_end_of_flash_finishes() {
        let mut vm = vm("NOP").with_step_limit(None);
        assert_eq!(vm.run(), State::Finished);
        assert_eq!(vm.pc(), FLASHEND);
    }

    #[test]
    fn reset_restores_the_image() {
        let mut vm = vm("LDI R16, 1\nRET");
        vm.run();
        assert_eq!(vm.mem().reg(16), 1);
        vm.reset();
        assert_eq!(vm.mem().reg(16), 0);
        assert_eq!(vm.state(), State::Running);
        assert_eq!(vm.stats(), Stats::default());
    }

    #[test]
    fn histogram() {
        let mut vm = vm("NOP\nNOP\nRET");
        vm.run();
        assert_eq!(vm.counts()[Mnemonic::NOP], 2);
        assert_eq!(vm.counts()[Mnemonic::RET], 1);
    }
}
