//! Entry point for the urel relocator.
//!
//! Simple flow: parse args → load objects → relocate until the image is
//! stable → write the flat image (and optionally a symbol listing).

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use urel::arch::arm::Arm;
use urel::arch::mips::Mips;
use urel::arch::Architecture;
use urel::config::{ArchName, Config};
use urel::diag::Diagnostics;
use urel::relocator::Relocator;
use urel::symbol::SymbolTable;
use urel::symdata::SymbolData;

/// Upper bound on convergence passes. Address dependencies settle after a
/// couple of passes in practice; hitting this means they never will.
const MAX_PASSES: u32 = 16;

fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match config.arch {
        ArchName::Arm => run(Arm, &config),
        ArchName::Mips => run(Mips, &config),
    }
}

fn run<A: Architecture>(arch: A, config: &Config) -> Result<()> {
    let mut relocator = Relocator::new(arch);
    relocator.init(&config.input)?;

    let mut table = SymbolTable::new();
    let mut export_diag = Diagnostics::new();
    let exported = relocator.export_symbols(&mut table, &mut export_diag);

    // The outer fixed-point loop the assembler would run: repeat from the
    // same base address until label feedback stops changing the image.
    let mut passes = 0;
    let (size, pass_ok) = loop {
        let mut diag = Diagnostics::new();
        let mut address = config.base;
        let ok = relocator.relocate(&mut table, &mut address, &mut diag);
        passes += 1;

        if !relocator.data_changed() {
            diag.flush();
            break (address, ok);
        }
        if passes >= MAX_PASSES {
            diag.flush();
            bail!("relocation did not converge after {} passes", MAX_PASSES);
        }
    };
    info!("converged after {} pass(es), image size {:#x}", passes, size);

    if !exported || !pass_ok {
        bail!("relocation failed");
    }

    std::fs::write(&config.output, relocator.output_data().as_slice())
        .with_context(|| format!("failed to write {}", config.output.display()))?;
    info!("wrote {}", config.output.display());

    if let Some(sym_path) = &config.sym_file {
        let mut sym_data = SymbolData::new();
        relocator.write_symbols(&mut sym_data);
        std::fs::write(sym_path, sym_data.write_listing())
            .with_context(|| format!("failed to write {}", sym_path.display()))?;
        info!("wrote {}", sym_path.display());
    }

    Ok(())
}
