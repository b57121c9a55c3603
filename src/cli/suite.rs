use super::command;
use crate::vm::{Instance, State};
use ansi_term::Color::{Green, Red};
use anyhow::Context;
use derive_more::Constructor;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const SOURCE_EXT: &str = "s";
pub const EXPECTED_OUTPUT_EXT: &str = "out";

pub fn default_suite_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("asm")
}

/// One program in a suite, with the console output it must produce (if any).
#[derive(Constructor)]
struct UnitSrc {
    name: OsString,
    src: PathBuf,
    expected_output: Option<PathBuf>,
}

pub struct Summary {
    pub state: State,
    pub steps: u64,
    pub cycles: u64,
    pub output: String,
    pub error: Option<String>,
    pub real_ns_elapsed: u128,
}

impl Summary {
    pub fn steps_per_second(&self) -> f64 {
        self.steps as f64 / (self.real_ns_elapsed.max(1) as f64 / 1e9)
    }
}

/// Assembles and runs one program to completion, collecting its console output.
pub fn execute(path: &Path, max_steps: Option<u64>) -> anyhow::Result<Summary> {
    let image = command::assemble_path(path, None)?;
    let mut vm = Instance::new(&image, String::new()).with_step_limit(max_steps);

    let start = Instant::now();
    vm.run();
    let real_ns_elapsed = start.elapsed().as_nanos();

    let stats = vm.stats();
    let state = vm.state();
    let error = vm.error().map(ToString::to_string);
    Ok(Summary {
        state,
        steps: stats.steps,
        cycles: stats.cycles,
        output: vm.into_console(),
        error,
        real_ns_elapsed,
    })
}

impl UnitSrc {
    fn expected_output(&self) -> anyhow::Result<Option<String>> {
        self.expected_output
            .as_deref()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("could not read '{}'", path.display()))
            })
            .transpose()
    }
}

pub fn run_suite(
    suite_name: &OsString,
    suite_root_dir: &Path,
    only_this: Option<&OsString>,
    max_steps: Option<u64>,
) -> anyhow::Result<bool> {
    let suite_dir = suite_root_dir.join(suite_name);
    let all_units = find_units(&suite_dir)?;

    let mut selected_units = match only_this {
        None => all_units,
        Some(only_this) => vec![all_units
            .into_iter()
            .find(|unit| &unit.name == only_this)
            .with_context(|| format!("no unit named {:?} in {}", only_this, suite_dir.display()))?],
    };

    selected_units.sort_unstable_by(|unit1, unit2| unit1.name.cmp(&unit2.name));

    Ok(run_units(
        &suite_name.to_string_lossy(),
        max_steps,
        &selected_units,
    ))
}

fn find_unit(path: &Path) -> Option<UnitSrc> {
    if !path.extension().map_or(false, |ext| ext == SOURCE_EXT) {
        return None;
    }

    let expected = path.with_extension(EXPECTED_OUTPUT_EXT);
    Some(UnitSrc::new(
        path.file_stem()?.to_owned(),
        PathBuf::from(path),
        if expected.exists() { Some(expected) } else { None },
    ))
}

fn find_units(suite_dir: &Path) -> anyhow::Result<Vec<UnitSrc>> {
    let mut units = Vec::new();
    let entries = suite_dir
        .read_dir()
        .with_context(|| format!("could not open suite directory '{}'", suite_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            units.extend(find_unit(&entry.path()));
        }
    }
    Ok(units)
}

fn run_units(name: &str, max_steps: Option<u64>, units: &[UnitSrc]) -> bool {
    let name_pad = units.iter().map(|unit| unit.name.len()).max().unwrap_or(0);

    println!("Running suite: '{}' ({} units)", name, units.len());
    println!("{:-<line_len$}", "", line_len = name_pad + 45);

    let passes = units
        .iter()
        .enumerate()
        .filter(|(num, unit)| run_unit(unit, num + 1, name_pad, max_steps))
        .count();
    let success = passes == units.len();

    println!("{:-<line_len$}", "", line_len = name_pad + 45);
    println!(
        "Suite Result: {}, {}/{} passes",
        if success {
            Green.bold().paint("SUCCESS")
        } else {
            Red.bold().paint("FAILED")
        },
        passes,
        units.len()
    );

    success
}

fn fail(what: &str, detail: impl std::fmt::Display) -> (bool, String) {
    (
        false,
        format!(
            "{}:\n\t{}",
            Red.bold().paint(format!("FAIL: {}", what)),
            detail.to_string().replace("\n", "\n\t")
        ),
    )
}

fn run_unit(src: &UnitSrc, num: usize, name_pad: usize, max_steps: Option<u64>) -> bool {
    let outcome = execute(&src.src, max_steps)
        .and_then(|summary| Ok((src.expected_output()?, summary)));

    let (success, msg) = match outcome {
        Err(err) => fail("ASSEMBLY ERROR", format!("{:#}", err)),
        Ok((_, summary)) if summary.state != State::Finished => {
            let state = summary.state;
            fail(
                "RUNTIME ERROR",
                summary.error.unwrap_or_else(|| state.to_string()),
            )
        }
        Ok((Some(expected), summary)) if expected != summary.output => fail(
            "WRONG OUTPUT",
            format!("expected {:?}\ngot      {:?}", expected, summary.output),
        ),
        Ok((_, summary)) => (
            true,
            format!(
                "{} {:7 } steps {:8 } cycles ({: >6.2}M steps/s)",
                Green.bold().paint("PASS"),
                summary.steps,
                summary.cycles,
                summary.steps_per_second() / 1e6,
            ),
        ),
    };

    let name = src.name.to_string_lossy();
    println!(
        "Unit {:2 }: {} {}{}",
        num,
        name,
        " ".repeat(name_pad.saturating_sub(name.len())),
        msg
    );

    success
}
