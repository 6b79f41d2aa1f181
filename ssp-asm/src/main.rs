#[macro_use]
extern crate clap;

use anyhow::Context;
use clap::Arg;
use log::LevelFilter;
use ssp_asm::{assemble, disassemble};
use ssp_vm::codec::write_program;
use ssp_vm::{Emulator, EmulatorState};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Smoke-test step cap for `--exec`, since an assembled program may
/// legitimately loop forever (spec.md §8 scenario 4: "running halts only
/// if a step cap is imposed... tests should use a bounded `many_step`").
const EXEC_STEP_CAP: usize = 10_000;

fn main() -> ExitCode {
    let matches = app_from_crate!()
        .about("Assembler/disassembler for the Supersonic Shiny Proton scripting language")
        .arg(
            Arg::with_name("INPUT")
                .help("Input file: assembly source, or a binary with --disasm")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Output file to write"),
        )
        .arg(
            Arg::with_name("disasm")
                .short("d")
                .long("disasm")
                .help("Disassemble a binary instead of assembling source"),
        )
        .arg(
            Arg::with_name("exec")
                .short("x")
                .long("exec")
                .help("Run the assembled program through the emulator headlessly"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Increases log verbosity (repeatable)"),
        )
        .get_matches();

    let verbosity = matches.occurrences_of("verbose");
    init_logging(verbosity);

    let input = matches.value_of("INPUT").unwrap();
    let output = matches.value_of("output");
    let disasm = matches.is_present("disasm");
    let exec = matches.is_present("exec");

    match run(input, output, disasm, exec) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init()
        .ok();
}

fn run(input: &str, output: Option<&str>, disasm: bool, exec: bool) -> anyhow::Result<ExitCode> {
    let input_path = Path::new(input);

    if disasm {
        run_disasm(input_path, output)
    } else {
        run_assemble(input_path, output, exec)
    }
}

fn run_assemble(input_path: &Path, output: Option<&str>, exec: bool) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(input_path)
        .with_context(|| format!("reading input file \"{}\"", input_path.display()))?;

    let result = assemble(&source);
    for diagnostic in &result.diagnostics {
        println!("{}", diagnostic);
    }
    let (warnings, errors, internal_errors) = result.counts();
    println!(
        "{} warnings, {} errors, {} internal errors",
        warnings, errors, internal_errors
    );

    let program = match result.program {
        Some(program) => program,
        None => return Ok(ExitCode::FAILURE),
    };

    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("bin"));
    let mut writer = BufWriter::new(
        File::create(&output_path)
            .with_context(|| format!("creating output file \"{}\"", output_path.display()))?,
    );
    write_program(&mut writer, &program)
        .with_context(|| format!("writing output file \"{}\"", output_path.display()))?;
    writer
        .flush()
        .with_context(|| format!("writing output file \"{}\"", output_path.display()))?;

    if exec {
        run_headless(program);
    }

    Ok(ExitCode::SUCCESS)
}

fn run_disasm(input_path: &Path, output: Option<&str>) -> anyhow::Result<ExitCode> {
    let mut reader = BufReader::new(
        File::open(input_path)
            .with_context(|| format!("reading input file \"{}\"", input_path.display()))?,
    );

    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension("asm"));
    let mut writer = BufWriter::new(
        File::create(&output_path)
            .with_context(|| format!("creating output file \"{}\"", output_path.display()))?,
    );

    disassemble(&mut reader, &mut writer)
        .with_context(|| format!("disassembling \"{}\"", input_path.display()))?;
    writer
        .flush()
        .with_context(|| format!("writing output file \"{}\"", output_path.display()))?;

    Ok(ExitCode::SUCCESS)
}

fn run_headless(program: ssp_vm::Program) {
    let mut emu = Emulator::new(0);
    emu.hook_error(Box::new(|_emu, err, addr| {
        println!("error[0x{:04X}]: {}", addr, err);
    }));
    emu.hook_halted(Box::new(|_emu| println!("halted")));
    emu.hook_send(Box::new(|_emu, target, values| {
        println!("sending {:?} to {}", values, target);
    }));
    emu.hook_block(Box::new(|_emu, reason| {
        println!("blocked on {:?}", reason);
    }));

    emu.set_program(program);
    emu.resume();
    emu.many_step(EXEC_STEP_CAP);
    if emu.state() != EmulatorState::Halted {
        println!(
            "step cap ({}) reached without halting; final state: {:?}",
            EXEC_STEP_CAP,
            emu.state()
        );
    }
}

