use std::fs;
use std::io::BufReader;
use std::process::ExitCode;

use bps::{CorruptPatch, Operation};
use miette::Diagnostic;
use thiserror::Error;

mod cli;
mod logging;

fn main() -> ExitCode {
    logging::init();
    let args = match <cli::Args as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(err) => {
            err.print().ok();
            return ExitCode::from(2);
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Patch(#[from] bps::Error),
    #[error(transparent)]
    Corrupt(#[from] CorruptPatch),
}

fn run(args: cli::Args) -> Result<(), Error> {
    use cli::CommandKind::*;
    match args.command {
        Apply(args) => apply(args),
        Diff(args) => diff(args),
        Asm(args) => asm(args),
        Disasm(args) => disasm(args),
        Validate(args) => validate(args),
        Optimize(args) => optimize(args),
    }
}

fn apply(args: cli::ApplyArgs) -> Result<(), Error> {
    let source = fs::read(&args.source)?;
    let patch = fs::File::open(&args.patch)?;
    let ops: Vec<Operation> = bps::decode(BufReader::new(patch)).collect::<Result<_, _>>()?;
    let target = bps::apply_patch(ops, &source)?;
    fs::write(&args.target, target)?;
    Ok(())
}

fn diff(args: cli::DiffArgs) -> Result<(), Error> {
    let source = fs::read(&args.source)?;
    let target = fs::read(&args.target)?;
    let options = bps::DiffOptions { block_size: args.block_size };
    let ops = bps::diff_with(&source, &target, options);
    let mut out = fs::File::create(&args.patch)?;
    bps::encode(ops, &mut out)?;
    Ok(())
}

fn asm(args: cli::AsmArgs) -> Result<(), Error> {
    let text = fs::File::open(&args.text)?;
    let ops = bps::asm::read_asm(BufReader::new(text))?;
    let mut patch = fs::File::create(&args.patch)?;
    bps::encode(ops, &mut patch)?;
    Ok(())
}

fn disasm(args: cli::DisasmArgs) -> Result<(), Error> {
    let patch = fs::File::open(&args.patch)?;
    let ops: Vec<Operation> = bps::decode(BufReader::new(patch)).collect::<Result<_, _>>()?;
    let mut text = fs::File::create(&args.text)?;
    bps::asm::write_asm(ops, &mut text)?;
    Ok(())
}

fn validate(args: cli::ValidateArgs) -> Result<(), Error> {
    let patch = fs::File::open(&args.patch)?;
    let count = bps::decode(BufReader::new(patch)).collect::<Result<Vec<_>, _>>()?.len();
    log::info!("{} is a valid patch with {count} operations", args.patch.display());
    Ok(())
}

fn optimize(args: cli::OptimizeArgs) -> Result<(), Error> {
    let patch = fs::File::open(&args.input)?;
    let ops: Vec<Operation> = bps::decode(BufReader::new(patch)).collect::<Result<_, _>>()?;
    let optimized = bps::optimize(ops)?;
    let mut out = fs::File::create(&args.output)?;
    bps::encode(optimized, &mut out)?;
    Ok(())
}
