//! MIPS architecture backend.
//!
//! Implements the `Architecture` trait for little-endian MIPS (ELF32).
//! Addends are implicit: every relocation adds the resolved target into the
//! field already present in the opcode. `R_MIPS_HI16`/`R_MIPS_LO16` are the
//! split-immediate pair; each entry is patched independently with its half
//! of the target address.

use anyhow::{bail, Result};
use object::elf;

use super::{Architecture, RelocationData};

/// The MIPS backend.
pub struct Mips;

impl Architecture for Mips {
    fn machine(&self) -> u16 {
        elf::EM_MIPS
    }

    fn set_symbol_address(&self, rd: &mut RelocationData, address: u32, sym_type: u8) {
        rd.symbol_address = address;
        rd.target_symbol_type = sym_type;
        rd.target_symbol_info = 0;
    }

    fn relocate_opcode(&self, rel_type: u32, rd: &mut RelocationData) -> Result<()> {
        let op = rd.opcode;
        let base = rd.relocation_base;

        rd.opcode = match rel_type {
            elf::R_MIPS_32 => op.wrapping_add(base),

            elf::R_MIPS_26 => {
                // J/JAL: 26-bit word index within the current 256MB region.
                if base & 3 != 0 {
                    bail!("Unaligned jump target {:#010X}", base);
                }
                (op & 0xFC00_0000) | ((op & 0x03FF_FFFF).wrapping_add(base >> 2) & 0x03FF_FFFF)
            }

            elf::R_MIPS_HI16 => {
                (op & 0xFFFF_0000) | ((op & 0xFFFF).wrapping_add(base >> 16) & 0xFFFF)
            }

            elf::R_MIPS_LO16 => {
                (op & 0xFFFF_0000) | ((op & 0xFFFF).wrapping_add(base) & 0xFFFF)
            }

            _ => bail!("Unknown MIPS relocation type {}", rel_type),
        };

        Ok(())
    }
}
