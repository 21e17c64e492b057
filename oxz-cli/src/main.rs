//! oxz CLI.
//!
//! A small front end over the oxz codec crates: compress to `.xz`, `.lz`,
//! or `.lzma`, decompress any of the three, and list stream structure.
//!
//! Exit codes: 0 success, 1 usage, 2 format error, 3 checksum failure,
//! 4 unsupported feature, 5 memory limit.

mod commands;

use clap::{Parser, Subcommand};
use commands::{CheckArg, FormatArg, cmd_compress, cmd_decompress, cmd_list};
use oxz_core::OxzError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "oxz")]
#[command(author, version, about = "Pure Rust LZMA/LZMA2/XZ compressor")]
#[command(long_about = "
oxz encodes and decodes the XZ container plus the bare LZMA envelopes.

Examples:
  oxz compress file.txt
  oxz compress -l 9 --format lzip file.txt
  oxz decompress file.txt.xz
  oxz list file.txt.xz --json
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file
    #[command(alias = "c")]
    Compress {
        /// File to compress
        file: PathBuf,

        /// Compression level (0-9)
        #[arg(short, long, default_value_t = 6)]
        level: u8,

        /// Container format
        #[arg(short, long, value_enum, default_value = "xz")]
        format: FormatArg,

        /// Integrity check (xz only)
        #[arg(long, value_enum, default_value = "crc64")]
        check: CheckArg,

        /// Output file (default: input path plus format extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decompress a file
    #[command(alias = "d")]
    Decompress {
        /// File to decompress (.xz, .lz, or .lzma)
        file: PathBuf,

        /// Output file (default: input path without its extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the structure of a compressed file
    #[command(alias = "l")]
    List {
        /// File to inspect
        file: PathBuf,

        /// Machine-readable JSON output
        #[arg(short, long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Help and version are not usage errors.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let result = match cli.command {
        Commands::Compress {
            file,
            level,
            format,
            check,
            output,
        } => cmd_compress(&file, level.min(9), format, check, output.as_deref()),
        Commands::Decompress { file, output } => cmd_decompress(&file, output.as_deref()),
        Commands::List { file, json } => cmd_list(&file, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("oxz: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &OxzError) -> u8 {
    match err {
        OxzError::ChecksumFailed { .. } => 3,
        OxzError::UnsupportedFilter { .. } | OxzError::UnsupportedCheck { .. } => 4,
        OxzError::DictionaryTooLarge { .. } => 5,
        _ => 2,
    }
}
