use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bps", about = "Apply, diff, assemble and inspect Blip/BPS binary delta patches.")]
pub struct Args {
    #[command(subcommand)]
    pub command: CommandKind,
}

#[derive(Subcommand)]
pub enum CommandKind {
    /// Apply a patch to a source file, writing the target file.
    Apply(ApplyArgs),
    /// Diff a source file against a target file, writing a patch.
    Diff(DiffArgs),
    /// Assemble a patch's text representation into a binary patch.
    Asm(AsmArgs),
    /// Disassemble a binary patch into its text representation.
    Disasm(DisasmArgs),
    /// Validate a binary patch without applying it.
    Validate(ValidateArgs),
    /// Rewrite a binary patch to an equivalent, smaller one.
    Optimize(OptimizeArgs),
}

#[derive(Parser)]
pub struct ApplyArgs {
    pub patch: PathBuf,
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Parser)]
pub struct DiffArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub patch: PathBuf,

    /// Explicit block size for the differ's block map (default: adaptive).
    #[arg(long)]
    pub block_size: Option<u64>,
}

#[derive(Parser)]
pub struct AsmArgs {
    pub text: PathBuf,
    pub patch: PathBuf,
}

#[derive(Parser)]
pub struct DisasmArgs {
    pub patch: PathBuf,
    pub text: PathBuf,
}

#[derive(Parser)]
pub struct ValidateArgs {
    pub patch: PathBuf,
}

#[derive(Parser)]
pub struct OptimizeArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}
