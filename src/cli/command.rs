use super::suite;
use crate::assembler::{self, disasm, Image};
use crate::vm::{Instance, LogLevel, Snapshot, State, Stdout};
use ansi_term::Color::{Green, Red, Yellow};
use anyhow::Context;
use std::ffi::OsString;
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};
use structopt::StructOpt;

#[cfg(windows)]
pub fn terminal_init() {
    // Without ANSI support the output is merely uglier.
    let _ = ansi_term::enable_ansi_support();
    let _ = env_logger::try_init();
}

#[cfg(not(windows))]
pub fn terminal_init() {
    let _ = env_logger::try_init();
}

pub fn assemble_path(path: &Path, breakpoint_line: Option<usize>) -> anyhow::Result<Image> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("could not read '{}'", path.display()))?;
    assembler::assemble(&src, breakpoint_line).map_err(|err| report_assembly(path, &src, err))
}

/// Attaches the offending source line to an assembler error.
fn report_assembly(path: &Path, src: &str, err: assembler::Error) -> anyhow::Error {
    let context = err
        .loc()
        .and_then(|loc| src.lines().nth(loc.line().saturating_sub(1)).map(|line| (loc, line)))
        .map(|(loc, line)| format!("{} {}:\n    {}", path.display(), loc, line.trim()))
        .unwrap_or_else(|| path.display().to_string());
    anyhow::Error::new(err).context(context)
}

#[derive(StructOpt, Debug)]
#[structopt(name = "avrsim")]
pub enum CommandRoot {
    Asm(SubcommandAsm),
    Run(SubcommandRun),
    Step(SubcommandStep),
    Suite(SubcommandSuite),
}

/// Assembles a program, printing its listing and initial data memory.
#[derive(StructOpt, Debug)]
#[structopt(name = "avrasm")]
pub struct SubcommandAsm {
    #[structopt(name = "in.s", parse(from_os_str))]
    in_src: PathBuf,

    /// Omit the data memory dump.
    #[structopt(short, long)]
    no_data: bool,
}

#[derive(StructOpt, Debug)]
struct VmOpts {
    #[structopt(short, long, name = "max-steps")]
    max_steps: Option<StepLimit>,

    /// Print the machine state after every step.
    #[structopt(short, long)]
    verbose: bool,
}

#[derive(StructOpt, Debug)]
#[structopt(name = "avrsim-run")]
pub struct SubcommandRun {
    #[structopt(flatten)]
    vm_opts: VmOpts,

    /// Stop at the first instruction on or after this source line.
    #[structopt(short, long)]
    breakpoint: Option<usize>,

    #[structopt(name = "in.s", parse(from_os_str))]
    in_src: PathBuf,
}

/// Executes a fixed number of instructions, printing the machine state after each.
#[derive(StructOpt, Debug)]
pub struct SubcommandStep {
    #[structopt(short, long, default_value = "1")]
    count: u64,

    #[structopt(name = "in.s", parse(from_os_str))]
    in_src: PathBuf,
}

#[derive(StructOpt, Debug)]
pub struct SubcommandSuite {
    #[structopt(name = "suite_name", parse(from_os_str))]
    suite_name: OsString,

    #[structopt(flatten)]
    opts: SuiteOpts,
}

#[derive(StructOpt, Debug)]
pub struct SuiteOpts {
    #[structopt(name = "suite/root/dir", parse(from_os_str))]
    suite_root_dir: Option<PathBuf>,

    #[structopt(short, long, parse(from_os_str))]
    only: Option<OsString>,

    #[structopt(short, long, name = "max-steps")]
    max_steps: Option<StepLimit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimit(Option<u64>);

impl Display for StepLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0.map(|lim| lim.to_string()).as_deref().unwrap_or("∞")
        )
    }
}

impl FromStr for StepLimit {
    type Err = <u64 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unlimited") || s.eq_ignore_ascii_case("infinity") || s.eq("∞")
        {
            Ok(StepLimit(None))
        } else {
            Ok(StepLimit(Some(u64::from_str(s)?)))
        }
    }
}

impl Default for StepLimit {
    fn default() -> Self {
        StepLimit(Some(crate::spec::types::hw::MAX_STEPS))
    }
}

impl StepLimit {
    pub fn into_option(self) -> Option<u64> {
        self.0
    }
}

pub fn root(cmd: CommandRoot) -> ! {
    match cmd {
        CommandRoot::Asm(scmd) => asm(scmd),
        CommandRoot::Run(scmd) => run(scmd),
        CommandRoot::Step(scmd) => step(scmd),
        CommandRoot::Suite(scmd) => suite(scmd),
    };
}

fn exit_with(result: anyhow::Result<bool>) -> ! {
    match result {
        Ok(success) => std::process::exit(if success { 0 } else { 1 }),
        Err(err) => {
            eprintln!("{}: {:#}", Red.bold().paint("error"), err);
            std::process::exit(2);
        }
    }
}

pub fn asm(cmd: SubcommandAsm) -> ! {
    exit_with(assemble_path(&cmd.in_src, None).map(|image| {
        print!("{}", disasm::listing(&image));
        if !cmd.no_data && image.data_end > crate::spec::types::hw::RAM_START {
            println!();
            print!("{}", disasm::data_dump(&image));
        }
        true
    }))
}

pub fn run(cmd: SubcommandRun) -> ! {
    exit_with(assemble_path(&cmd.in_src, cmd.breakpoint).map(|image| {
        let mut vm = Instance::new(&image, Stdout)
            .with_log_level(LogLevel {
                internals: cmd.vm_opts.verbose,
            })
            .with_step_limit(cmd.vm_opts.max_steps.unwrap_or_default().into_option());
        vm.run();
        println!();
        print_summary(&Snapshot::of(&vm));
        vm.state() == State::Finished
    }))
}

pub fn step(cmd: SubcommandStep) -> ! {
    exit_with(assemble_path(&cmd.in_src, None).map(|image| {
        let mut vm = Instance::new(&image, Stdout);
        for _ in 0..cmd.count {
            if vm.step() != State::Running {
                break;
            }
            println!("{}\n", Snapshot::of(&vm));
        }
        print_summary(&Snapshot::of(&vm));
        vm.state() != State::Errored
    }))
}

pub fn suite(cmd: SubcommandSuite) -> ! {
    exit_with(suite::run_suite(
        &cmd.suite_name,
        &cmd.opts
            .suite_root_dir
            .unwrap_or_else(suite::default_suite_dir),
        cmd.opts.only.as_ref(),
        cmd.opts.max_steps.unwrap_or_default().into_option(),
    ))
}

fn print_summary(snap: &Snapshot) {
    let state = match snap.state {
        State::Finished => Green.bold().paint("FINISHED"),
        State::Running => Yellow.bold().paint("RUNNING"),
        State::Errored => Red.bold().paint("ERRORED"),
    };
    println!(
        "{} at PC {:#06X}{} after {} steps (~{} cycles)",
        state,
        snap.pc,
        snap.line
            .map(|line| format!(" (line {})", line))
            .unwrap_or_default(),
        snap.stats.steps,
        snap.stats.cycles
    );
    if let Some(err) = &snap.error {
        println!("{}: {}", Red.bold().paint("runtime error"), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_limits() {
        assert_eq!(StepLimit::from_str("100"), Ok(StepLimit(Some(100))));
        assert_eq!(StepLimit::from_str("Unlimited"), Ok(StepLimit(None)));
        assert_eq!(StepLimit::from_str("∞"), Ok(StepLimit(None)));
        assert!(StepLimit::from_str("lots").is_err());
        assert_eq!(StepLimit(None).to_string(), "∞");
        assert_eq!(StepLimit::default().into_option(), Some(1_000_000));
    }
}
