//! Command-line configuration.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Architectures with a relocation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArchName {
    Arm,
    Mips,
}

/// A static relocator for ELF-32 object archives.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Config {
    /// Input object file or ar archive.
    pub input: PathBuf,

    /// Target architecture of the objects.
    #[arg(long, value_enum)]
    pub arch: ArchName,

    /// Memory address at which the first section is placed.
    #[arg(long, default_value = "0", value_parser = parse_address)]
    pub base: u32,

    /// Path of the relocated image.
    #[arg(short, long, default_value = "out.bin")]
    pub output: PathBuf,

    /// Write an address/name listing of the exported symbols.
    #[arg(long)]
    pub sym_file: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Accepts decimal or 0x-prefixed hexadecimal addresses.
fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("invalid address {:?}: {}", s, e))
}
